use crate::{document::FeedsyncConfig, error::ConfigError};
use model::{
    execution::connection::FeedConnection,
    transform::mapping::{FilterOp, FilterRule},
};
use std::collections::HashSet;
use tracing::warn;

/// Checks cross-references and bounds. All problems are collected and
/// reported together.
pub fn validate(config: &FeedsyncConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    if config.engine.workers == 0 {
        errors.push("engine.workers must be at least 1".into());
    }
    if config.engine.default_chunk_size == 0 {
        errors.push("engine.default_chunk_size must be greater than 0".into());
    }
    if config.engine.client.max_batch_size == 0 {
        errors.push("engine.client.max_batch_size must be greater than 0".into());
    }
    if config.engine.jobs.max_attempts == 0 {
        errors.push("engine.jobs.max_attempts must be at least 1".into());
    }
    if config.engine.reconcile.batch_size == 0 {
        errors.push("engine.reconcile.batch_size must be greater than 0".into());
    }

    let mut destination_ids = HashSet::new();
    for dest in &config.destinations {
        if !destination_ids.insert(dest.id.as_str()) {
            errors.push(format!("duplicate destination id '{}'", dest.id));
        }
        if !dest.base_url.starts_with("http://") && !dest.base_url.starts_with("https://") {
            errors.push(format!("destination '{}': base_url must be an http(s) URL", dest.id));
        }
        if dest.base_url.starts_with("http://") {
            warn!(destination = %dest.id, "Destination uses plain HTTP; credentials are sent unencrypted");
        }
    }

    let mut connection_ids = HashSet::new();
    for conn in &config.connections {
        if !connection_ids.insert(conn.id.as_str()) {
            errors.push(format!("duplicate connection id '{}'", conn.id));
        }
        if !destination_ids.contains(conn.destination.as_str()) {
            errors.push(format!(
                "connection '{}' references unknown destination '{}'",
                conn.id, conn.destination
            ));
        }
        validate_connection(conn, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Invalid(errors))
    }
}

fn validate_connection(conn: &FeedConnection, errors: &mut Vec<String>) {
    let id = &conn.id;

    if conn.feed.url.trim().is_empty() {
        errors.push(format!("connection '{id}': feed.url is empty"));
    }
    if conn.rules.id_field.trim().is_empty() {
        errors.push(format!("connection '{id}': id_field is required"));
    }
    if conn.chunk_size == Some(0) {
        errors.push(format!("connection '{id}': chunk_size must be greater than 0"));
    }
    if let Some(policy) = &conn.stale_policy
        && policy.stale_after_days == 0
    {
        errors.push(format!(
            "connection '{id}': stale_policy.stale_after_days must be greater than 0"
        ));
    }
    if conn.import_interval_minutes == Some(0) {
        errors.push(format!("connection '{id}': import_interval_minutes must be greater than 0"));
    }

    for mapping in &conn.rules.category_mappings {
        if mapping.delimiter.is_empty() {
            errors.push(format!(
                "connection '{id}': category mapping for '{}' has an empty delimiter",
                mapping.source
            ));
        }
    }
    for mapping in &conn.rules.attribute_mappings {
        if mapping.delimiter.is_empty() {
            errors.push(format!(
                "connection '{id}': attribute mapping '{}' has an empty delimiter",
                mapping.name
            ));
        }
    }
    for rule in &conn.rules.filter_rules {
        if needs_value(rule) && rule.value.is_none() {
            errors.push(format!(
                "connection '{id}': filter on '{}' needs a value",
                rule.field
            ));
        }
    }
}

fn needs_value(rule: &FilterRule) -> bool {
    !matches!(rule.op, FilterOp::Empty | FilterOp::NotEmpty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn collects_every_problem() {
        let raw = r#"{
            "engine": {"workers": 0},
            "destinations": [
                {"id": "shop", "base_url": "ftp://nope", "consumer_key": "k", "consumer_secret": "s"}
            ],
            "connections": [
                {"id": "a", "destination": "missing", "feed": {"url": "x.csv", "format": "csv"},
                 "id_field": "sku", "chunk_size": 0,
                 "filter_rules": [{"field": "stock", "op": "greater_than"}]},
                {"id": "a", "destination": "shop", "feed": {"url": "y.csv", "format": "csv"},
                 "id_field": "", "stale_policy": {"action": "delete", "stale_after_days": 0}}
            ]
        }"#;

        let Err(ConfigError::Invalid(errors)) = FeedsyncConfig::parse(raw, &HashMap::new()) else {
            panic!("expected validation failure");
        };

        assert_eq!(errors.len(), 8, "{errors:#?}");
        assert!(errors.iter().any(|e| e.contains("unknown destination 'missing'")));
        assert!(errors.iter().any(|e| e.contains("duplicate connection id 'a'")));
        assert!(errors.iter().any(|e| e.contains("stale_after_days")));
    }
}
