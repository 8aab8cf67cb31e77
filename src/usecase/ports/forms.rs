use serde::Serialize;

use crate::domain::entities::form::{FieldErrors, FormDefinition};
use crate::domain::entities::row::Row;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RenderedForm {
    pub markup: String,
    /// Client-side initialization code, passed through untouched.
    pub script: String,
}

pub trait FormRenderer: Send + Sync {
    fn render(&self, form: &FormDefinition, row: &Row, errors: &FieldErrors) -> RenderedForm;
}
