use thiserror::Error;

pub type Result<T, E = ActuatorError> = core::result::Result<T, E>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActuatorError {
    #[error("actuator channel unavailable: {0}")]
    ChannelUnavailable(String),
    #[error("goal rejected by {channel}: {reason}")]
    Rejected { channel: String, reason: String },
    #[error("unknown goal token: {0}")]
    UnknownGoal(String),
    #[error("timed out waiting for goal result")]
    Timeout,
    #[error("backend error: {0}")]
    Backend(String),
}
