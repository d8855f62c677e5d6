use serde_json::Value;

/// Renders a feed cell as trimmed text. Nulls, empty strings and empty
/// containers read as absent; arrays of scalars are joined with `,`.
pub fn as_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(as_text)
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(map) if map.is_empty() => return None,
        Value::Object(_) => value.to_string(),
    };

    (!text.is_empty()).then_some(text)
}

/// Parses a decorated price, accepting a decimal comma and stripping currency
/// symbols, thousands spaces and other decoration.
pub fn parse_decimal(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-'))
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let normalized = match (cleaned.rfind('.'), cleaned.rfind(',')) {
        // "1.234,56" -> comma is the decimal separator
        (Some(dot), Some(comma)) if comma > dot => cleaned.replace('.', "").replace(',', "."),
        // "1,234.56" -> comma groups thousands
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (None, Some(_)) => cleaned.replace(',', "."),
        _ => cleaned,
    };

    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_treats_blank_as_absent() {
        assert_eq!(as_text(&json!("  ")), None);
        assert_eq!(as_text(&json!(null)), None);
        assert_eq!(as_text(&json!(" Boots ")), Some("Boots".into()));
        assert_eq!(as_text(&json!(12)), Some("12".into()));
        assert_eq!(as_text(&json!(["a", "b"])), Some("a,b".into()));
    }

    #[test]
    fn parses_decorated_prices() {
        assert_eq!(parse_decimal("€ 12,99"), Some(12.99));
        assert_eq!(parse_decimal("1.234,50"), Some(1234.5));
        assert_eq!(parse_decimal("1,234.50 USD"), Some(1234.5));
        assert_eq!(parse_decimal("19.9"), Some(19.9));
        assert_eq!(parse_decimal("n/a"), None);
    }
}
