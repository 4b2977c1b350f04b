use thiserror::Error;

pub type Result<T, E = ParseError> = core::result::Result<T, E>;

/// Failure of the external timing service.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("timing oracle failed: {0}")]
pub struct OracleError(pub String);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("malformed markup at byte {position}: {reason}")]
    Malformed { position: usize, reason: String },
    #[error("no expression or gesture named `{0}`")]
    UnknownTag(String),
    #[error("gesture `{0}` needs a target attribute")]
    MissingTarget(String),
    #[error("invalid {attribute}=\"{value}\" on `{tag}`")]
    InvalidAttribute {
        tag: String,
        attribute: String,
        value: String,
    },
    #[error(transparent)]
    Timing(#[from] OracleError),
    #[error("word pattern: {0}")]
    Pattern(String),
}

impl ParseError {
    pub(crate) fn malformed(position: usize, reason: impl Into<String>) -> Self {
        ParseError::Malformed {
            position,
            reason: reason.into(),
        }
    }
}
