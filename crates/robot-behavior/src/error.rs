use actuator_link::ActuatorError;
use entity_registry::RegistryError;
use thiserror::Error;
use utterance_parser::ParseError;

pub type Result<T, E = RobotError> = core::result::Result<T, E>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RobotError {
    #[error("utterance rejected: {0}")]
    Parse(#[from] ParseError),
    #[error("actuator channel unavailable: {0}")]
    ChannelUnavailable(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("entity not found: {0}")]
    NotFound(String),
    #[error("timed out waiting for action")]
    Timeout,
    #[error(transparent)]
    Actuator(ActuatorError),
    #[error(transparent)]
    Registry(RegistryError),
    #[error("metrics init error: {0}")]
    Metrics(String),
}

impl From<ActuatorError> for RobotError {
    fn from(e: ActuatorError) -> Self {
        match e {
            ActuatorError::ChannelUnavailable(name) => RobotError::ChannelUnavailable(name),
            ActuatorError::Timeout => RobotError::Timeout,
            other => RobotError::Actuator(other),
        }
    }
}

impl From<RegistryError> for RobotError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::NotFound(id) => RobotError::NotFound(id),
            other => RobotError::Registry(other),
        }
    }
}

impl RobotError {
    pub(crate) fn invalid(what: impl Into<String>) -> Self {
        RobotError::InvalidArgument(what.into())
    }
}
