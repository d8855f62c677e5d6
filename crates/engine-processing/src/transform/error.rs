use thiserror::Error;

/// A record that cannot be turned into a payload. Always recovered by the
/// chunk loop; never aborts a chunk.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    #[error("Field '{field}' is not a valid number: '{value}'")]
    InvalidNumber { field: String, value: String },

    #[error("Field '{field}' is not a valid whole number: '{value}'")]
    InvalidInteger { field: String, value: String },
}
