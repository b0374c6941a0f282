use thiserror::Error;

/// Errors raised by the engine crate.
///
/// Only structural problems surface here. Blank, unparseable or mismatching
/// cell values are never errors; they become evidence tokens.
#[derive(Debug, Error)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    #[error("config parse error: {0}")]
    ConfigParse(String),

    /// Settings or registry failed validation.
    #[error("config validation error: {0}")]
    ConfigValidation(String),

    /// Two document types normalize to the same header.
    #[error("duplicate document type '{0}' in registry")]
    DuplicateDocument(String),

    /// Two fields of one document normalize to the same header.
    #[error("document '{document}': field '{field}' is declared more than once")]
    DuplicateField { document: String, field: String },

    /// A field spec has a contradictory or incomplete shape.
    #[error("document '{document}', field '{field}': {reason}")]
    InvalidSpec {
        document: String,
        field: String,
        reason: String,
    },

    /// The join-key column could not be located in an input table.
    #[error("{table} table: missing key column '{column}'")]
    MissingKeyColumn { table: String, column: String },

    /// Table text could not be decoded.
    #[error("table decode error: {0}")]
    Table(String),
}

impl From<csv::Error> for ReconError {
    fn from(err: csv::Error) -> Self {
        Self::Table(err.to_string())
    }
}
