use crate::domain::entities::form::{FieldErrors, FieldKind, FormDefinition};
use crate::domain::entities::row::{value_text, Row};
use crate::usecase::ports::forms::{FormRenderer, RenderedForm};

/// Bare `<form>` markup for the demo server. Real applications plug in their own renderer.
#[derive(Debug, Clone, Default)]
pub struct PlainFormRenderer;

impl FormRenderer for PlainFormRenderer {
    fn render(&self, form: &FormDefinition, row: &Row, errors: &FieldErrors) -> RenderedForm {
        let mut markup = format!("<form class=\"sqlgrid-form\" data-formid=\"{}\">", escape(&form.id));

        for field in &form.fields {
            let value = row.get(&field.name).map(value_text).unwrap_or_default();
            let name = escape(&field.name);
            let required = if field.required { " required" } else { "" };

            let input = match field.kind {
                FieldKind::Textarea => format!(
                    "<textarea name=\"{name}\"{required}>{}</textarea>",
                    escape(&value)
                ),
                FieldKind::Hidden => {
                    markup.push_str(&format!(
                        "<input type=\"hidden\" name=\"{name}\" value=\"{}\">",
                        escape(&value)
                    ));
                    continue;
                }
                FieldKind::Number => format!(
                    "<input type=\"number\" name=\"{name}\" value=\"{}\"{required}>",
                    escape(&value)
                ),
                FieldKind::Text => format!(
                    "<input type=\"text\" name=\"{name}\" value=\"{}\"{required}>",
                    escape(&value)
                ),
            };

            markup.push_str(&format!(
                "<label>{}{input}</label>",
                escape(&field.label)
            ));
            if let Some(message) = errors.get(&field.name) {
                markup.push_str(&format!(
                    "<span class=\"error\" data-field=\"{name}\">{}</span>",
                    escape(message)
                ));
            }
        }

        markup.push_str("</form>");
        RenderedForm {
            markup,
            script: String::new(),
        }
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}
