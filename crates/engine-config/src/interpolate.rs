use crate::error::ConfigError;
use serde_json::Value;
use std::collections::HashMap;

/// Replaces `${VAR}` placeholders in every string of the document. `$$`
/// escapes a literal dollar sign.
pub fn interpolate(value: &mut Value, vars: &HashMap<String, String>) -> Result<(), ConfigError> {
    match value {
        Value::String(s) if s.contains('$') => {
            *s = expand(s, vars)?;
        }
        Value::Array(items) => {
            for item in items {
                interpolate(item, vars)?;
            }
        }
        Value::Object(map) => {
            for item in map.values_mut() {
                interpolate(item, vars)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn expand(input: &str, vars: &HashMap<String, String>) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(idx) = rest.find('$') {
        out.push_str(&rest[..idx]);
        let tail = &rest[idx + 1..];

        if let Some(after) = tail.strip_prefix('$') {
            out.push('$');
            rest = after;
        } else if let Some(body) = tail.strip_prefix('{') {
            let end = body
                .find('}')
                .ok_or_else(|| ConfigError::UnterminatedPlaceholder(input.to_string()))?;
            let name = body[..end].trim();
            let value = vars
                .get(name)
                .ok_or_else(|| ConfigError::MissingVariable(name.to_string()))?;
            out.push_str(value);
            rest = &body[end + 1..];
        } else {
            out.push('$');
            rest = tail;
        }
    }

    out.push_str(rest);
    Ok(out)
}
