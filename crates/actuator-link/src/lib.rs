//! actuator-link: goal submission and action handles for robot actuators
//!
//! Each output modality (speech, gaze, expression, gesture) is served by an
//! external backend that accepts goals, streams feedback and reports a terminal
//! outcome on its own threads. [`ActuatorChannel`] wraps one backend, connects
//! lazily, and hands out [`GoalHandle`]s that share one wait/cancel contract
//! whether the backend keeps a single live goal or many. The default build
//! enables a `mock` backend so everything can run without hardware.

mod types;
pub use types::{
    ActuatorEvent, CommandGoal, ExpressionGoal, GazeGoal, GestureGoal, GoalMode, GoalToken,
    HandleId, Modality, Outcome, SpeechGoal,
};

mod error;
pub use error::{ActuatorError, Result};

mod traits;
pub use traits::{ActionControl, ActuatorBackend, EventSink};

mod handle;
pub use handle::{GoalHandle, GoalRef};

mod channel;
pub use channel::{ActuatorChannel, ChannelSettings, CompletionHook};

#[cfg(feature = "mock")]
mod mock;
#[cfg(feature = "mock")]
pub use mock::{MockActuator, MockBehavior, MockSubmission, WordCounter};
