use crate::{ActuatorEvent, CommandGoal, GoalToken, HandleId, Outcome, Result};
use std::time::Duration;

/// Sender half handed to a backend with every submitted goal.
pub type EventSink = crossbeam_channel::Sender<ActuatorEvent>;

/// An external actuator subsystem (speech synthesis, gaze control, ...).
///
/// Implementations run their own threads and deliver events through the sink
/// concurrently with the caller.
pub trait ActuatorBackend: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Block until the backend is available or `timeout` elapses.
    fn wait_for_server(&self, timeout: Duration) -> bool;

    /// Submit a goal. Feedback and the terminal event for the returned token go to `sink`.
    fn submit(&self, goal: CommandGoal, sink: EventSink) -> Result<GoalToken>;

    /// Request cancellation. Cancelling a finished goal is a no-op.
    fn cancel(&self, token: GoalToken) -> Result<()>;
}

/// The `{wait, cancel}` capability every action handle provides.
pub trait ActionControl {
    fn id(&self) -> HandleId;

    /// Block until a terminal state. Returns the last known outcome if already finished.
    fn wait(&self) -> Outcome;

    /// Like [`ActionControl::wait`] but gives up after `timeout` with `ActuatorError::Timeout`.
    fn wait_timeout(&self, timeout: Duration) -> Result<Outcome>;

    /// Request cancellation. A no-op once the action has finished.
    fn cancel(&self) -> Result<()>;

    /// Terminal outcome if already reached.
    fn outcome(&self) -> Option<Outcome>;

    fn is_finished(&self) -> bool {
        self.outcome().is_some()
    }
}
