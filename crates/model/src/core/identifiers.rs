use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunId(String);

impl RunId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh run id, prefixed so it is recognisable in logs and on disk.
    pub fn generate() -> Self {
        Self(format!("run-{}", uuid::Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RunId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for RunId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Global Unique Product Identifier.
///
/// Derived from `(connection, source record id)` only, so the same feed record
/// maps to the same value on every run and every retry. It is the only key used
/// to decide between creating and updating a destination product.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Gupid(String);

impl Gupid {
    const HEX_LEN: usize = 32;

    pub fn compute(connection_id: &ConnectionId, source_id: &str) -> Self {
        let connection = connection_id.as_str().as_bytes();

        // Length prefix keeps ("ab", "c") and ("a", "bc") apart.
        let mut h = blake3::Hasher::new();
        h.update(&(connection.len() as u64).to_le_bytes());
        h.update(connection);
        h.update(b":");
        h.update(source_id.trim().as_bytes());

        let hex = h.finalize().to_hex();
        Self(format!("gp-{}", &hex[..Self::HEX_LEN]))
    }

    /// Wraps a value read back from destination metadata.
    pub fn from_stored(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Gupid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gupid_is_deterministic() {
        let conn = ConnectionId::new("acme-shoes");
        assert_eq!(Gupid::compute(&conn, "SKU-1"), Gupid::compute(&conn, "SKU-1"));
    }

    #[test]
    fn gupid_differs_per_connection() {
        let a = Gupid::compute(&ConnectionId::new("acme"), "42");
        let b = Gupid::compute(&ConnectionId::new("globex"), "42");
        assert_ne!(a, b);
    }

    #[test]
    fn gupid_is_not_ambiguous_on_concatenation() {
        let a = Gupid::compute(&ConnectionId::new("ab"), "c");
        let b = Gupid::compute(&ConnectionId::new("a"), "bc");
        assert_ne!(a, b);
    }

    #[test]
    fn gupid_ignores_surrounding_whitespace_in_source_id() {
        let conn = ConnectionId::new("acme");
        assert_eq!(Gupid::compute(&conn, " 42 "), Gupid::compute(&conn, "42"));
        assert!(Gupid::compute(&conn, "42").as_str().starts_with("gp-"));
    }
}
