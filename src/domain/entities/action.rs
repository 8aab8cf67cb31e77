use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::entities::row::Row;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Edit,
    Delete,
    Other,
}

/// A client-side expression such as `e.target`. Objects with any other key are plain values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientExpression {
    pub expression: String,
}

/// Argument of a remote module call: a JSON literal, or a client-side expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionArg {
    Expression(ClientExpression),
    Value(Value),
}

impl ActionArg {
    pub fn expression(expression: impl Into<String>) -> Self {
        ActionArg::Expression(ClientExpression {
            expression: expression.into(),
        })
    }
}

/// Serializable click handler. `Inert` is an opaque client snippet sent as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OnClick {
    RemoteCall {
        module: String,
        function: String,
        #[serde(default)]
        args: Vec<ActionArg>,
    },
    Inert(String),
}

impl OnClick {
    pub fn inert(code: impl Into<String>) -> Self {
        OnClick::Inert(code.into().trim().to_string())
    }

    pub fn remote_call(module: impl Into<String>, function: impl Into<String>, args: Vec<ActionArg>) -> Self {
        OnClick::RemoteCall {
            module: module.into(),
            function: function.into(),
            args,
        }
    }
}

pub type OnClickCallback = Arc<dyn Fn(&Row) -> Option<OnClick> + Send + Sync>;

/// Server-side handler definition. Callbacks are evaluated per row and never transmitted.
#[derive(Clone)]
pub enum ActionHandler {
    Static(OnClick),
    PerRow(OnClickCallback),
}

impl fmt::Debug for ActionHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionHandler::Static(on_click) => f.debug_tuple("Static").field(on_click).finish(),
            ActionHandler::PerRow(_) => f.write_str("PerRow(..)"),
        }
    }
}

/// Hidden data of an action that opens a table form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormActionData {
    pub form_id: String,
    /// Fields identifying the row; empty means the row's `id`.
    pub row_id_fields: Vec<String>,
    pub show_fields: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RowAction {
    pub id: String,
    pub action_type: ActionType,
    pub label: String,
    /// May contain `{field}` placeholders.
    pub url: String,
    pub icon: String,
    pub disabled: bool,
    pub on_click: Option<ActionHandler>,
    pub target: String,
    pub form: Option<FormActionData>,
}

impl RowAction {
    pub fn new(action_type: ActionType) -> Self {
        Self {
            id: String::new(),
            action_type,
            label: String::new(),
            url: String::new(),
            icon: String::new(),
            disabled: false,
            on_click: None,
            target: String::new(),
            form: None,
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = icon.into();
        self
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    pub fn on_click(mut self, on_click: OnClick) -> Self {
        self.on_click = Some(ActionHandler::Static(on_click));
        self
    }

    pub fn on_click_per_row<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Row) -> Option<OnClick> + Send + Sync + 'static,
    {
        self.on_click = Some(ActionHandler::PerRow(Arc::new(callback)));
        self
    }

    pub fn needs_row_rendering(&self) -> bool {
        self.form.is_some() || matches!(self.on_click, Some(ActionHandler::PerRow(_)))
    }
}

/// The wire form of a row action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedAction {
    pub id: String,
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub label: String,
    pub url: String,
    pub icon: String,
    pub disabled: bool,
    pub onclick: Option<OnClick>,
    pub target: String,
}

/// A rendered action reduced to `id` plus the fields that differ from the base action.
pub type PartialRowAction = serde_json::Map<String, Value>;
