//! Layout rendering for sinks
//!
//! A layout is a nested map whose leaf strings are templates over event
//! fields. `{{ field.path }}` placeholders resolve through the same field
//! paths the matchers use (`reason`, `involvedObject.name`,
//! `labels["k8s.io/foo"]`, ...); a leading dot is accepted and ignored.
//! Rendering a layout produces the structured payload the sink serializes.

use crate::error::SinkError;
use crate::event::{parse_path, EnhancedEvent};
use serde_json::Value;

/// Render a single template string against an event.
///
/// Unknown fields render as the empty string; an unterminated placeholder
/// is a render error and propagates as a send error.
pub fn render_string(event: &EnhancedEvent, template: &str) -> Result<String, SinkError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find("}}").ok_or_else(|| {
            SinkError::Render(format!("unterminated placeholder in template '{template}'"))
        })?;
        let field = after[..end].trim().trim_start_matches('.');
        if field.is_empty() {
            return Err(SinkError::Render(format!(
                "empty placeholder in template '{template}'"
            )));
        }
        let path = parse_path(field);
        if let Some(value) = event.field(&path) {
            out.push_str(&value);
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Render a layout value: leaf strings go through [`render_string`], maps
/// and lists recurse, other scalars pass through untouched.
pub fn render_layout(event: &EnhancedEvent, layout: &Value) -> Result<Value, SinkError> {
    match layout {
        Value::String(template) => Ok(Value::String(render_string(event, template)?)),
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (key, value) in map {
                out.insert(key.clone(), render_layout(event, value)?);
            }
            Ok(Value::Object(out))
        }
        Value::Array(items) => items
            .iter()
            .map(|v| render_layout(event, v))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        other => Ok(other.clone()),
    }
}

/// Serialize an event for a sink: the rendered layout when one is
/// configured, the full enhanced event otherwise.
pub fn event_payload(
    event: &EnhancedEvent,
    layout: Option<&Value>,
) -> Result<Value, SinkError> {
    match layout {
        Some(layout) => render_layout(event, layout),
        None => event.to_json().map_err(SinkError::from),
    }
}
