use crate::plan::PlanHandle;
use actuator_link::{ActionControl, GoalHandle, HandleId, Outcome, Result};
use std::time::Duration;

/// Any action the robot has in flight: one actuator goal or a whole
/// audience-directed utterance.
#[derive(Clone, Debug)]
pub enum ActionHandle {
    Goal(GoalHandle),
    Plan(PlanHandle),
}

impl ActionControl for ActionHandle {
    fn id(&self) -> HandleId {
        match self {
            ActionHandle::Goal(h) => h.id(),
            ActionHandle::Plan(h) => h.id(),
        }
    }

    fn wait(&self) -> Outcome {
        match self {
            ActionHandle::Goal(h) => h.wait(),
            ActionHandle::Plan(h) => h.wait(),
        }
    }

    fn wait_timeout(&self, timeout: Duration) -> Result<Outcome> {
        match self {
            ActionHandle::Goal(h) => h.wait_timeout(timeout),
            ActionHandle::Plan(h) => h.wait_timeout(timeout),
        }
    }

    fn cancel(&self) -> Result<()> {
        match self {
            ActionHandle::Goal(h) => h.cancel(),
            ActionHandle::Plan(h) => h.cancel(),
        }
    }

    fn outcome(&self) -> Option<Outcome> {
        match self {
            ActionHandle::Goal(h) => h.outcome(),
            ActionHandle::Plan(h) => h.outcome(),
        }
    }
}

impl From<GoalHandle> for ActionHandle {
    fn from(handle: GoalHandle) -> Self {
        ActionHandle::Goal(handle)
    }
}

impl From<PlanHandle> for ActionHandle {
    fn from(handle: PlanHandle) -> Self {
        ActionHandle::Plan(handle)
    }
}
