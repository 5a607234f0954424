use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlowTaxError {
    #[error("Invalid input: {field} — {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    #[error("Hierarchy violation: {from}({from_level}) -> {to}({to_level})")]
    HierarchyViolation {
        from: String,
        from_level: u32,
        to: String,
        to_level: u32,
    },

    #[error("Malformed {record}: {reason}")]
    MalformedRecord { record: String, reason: String },

    #[error("Flow {from} -> {to} rejected: {reason}")]
    FlowRejected {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl FlowTaxError {
    pub(crate) fn malformed(record: impl Into<String>, reason: impl Into<String>) -> Self {
        FlowTaxError::MalformedRecord {
            record: record.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for FlowTaxError {
    fn from(e: serde_json::Error) -> Self {
        FlowTaxError::SerializationError(e.to_string())
    }
}
