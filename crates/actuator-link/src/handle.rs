use crate::channel::ActuatorChannel;
use crate::{ActionControl, ActuatorError, ActuatorEvent, GoalToken, HandleId, Modality, Outcome, Result};
use crossbeam_channel::Sender;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Per-goal record shared by the channel dispatcher and every handle clone.
pub(crate) struct GoalSlot {
    token: GoalToken,
    state: Mutex<SlotState>,
    cond: Condvar,
}

struct SlotState {
    outcome: Option<Outcome>,
    progress: Option<u32>,
    watcher: Option<Sender<ActuatorEvent>>,
}

impl GoalSlot {
    pub(crate) fn new(token: GoalToken, watcher: Option<Sender<ActuatorEvent>>) -> Self {
        Self {
            token,
            state: Mutex::new(SlotState {
                outcome: None,
                progress: None,
                watcher,
            }),
            cond: Condvar::new(),
        }
    }

    pub(crate) fn token(&self) -> GoalToken {
        self.token
    }

    pub(crate) fn record_progress(&self, progress: u32) {
        let mut state = self.state.lock();
        if state.outcome.is_some() {
            return;
        }
        state.progress = Some(progress);
        if let Some(watcher) = &state.watcher {
            // A watcher that hung up simply stops receiving.
            let _ = watcher.send(ActuatorEvent::Feedback {
                token: self.token,
                progress,
            });
        }
    }

    /// Store the terminal outcome. Returns false if one was already stored.
    pub(crate) fn finish(&self, outcome: Outcome) -> bool {
        let mut state = self.state.lock();
        if state.outcome.is_some() {
            return false;
        }
        state.outcome = Some(outcome.clone());
        if let Some(watcher) = state.watcher.take() {
            let _ = watcher.send(ActuatorEvent::Done {
                token: self.token,
                outcome,
            });
        }
        self.cond.notify_all();
        true
    }

    pub(crate) fn outcome(&self) -> Option<Outcome> {
        self.state.lock().outcome.clone()
    }

    pub(crate) fn progress(&self) -> Option<u32> {
        self.state.lock().progress
    }

    pub(crate) fn wait(&self) -> Outcome {
        let mut state = self.state.lock();
        loop {
            if let Some(outcome) = &state.outcome {
                return outcome.clone();
            }
            self.cond.wait(&mut state);
        }
    }

    pub(crate) fn wait_until(&self, deadline: Instant) -> Result<Outcome> {
        let mut state = self.state.lock();
        loop {
            if let Some(outcome) = &state.outcome {
                return Ok(outcome.clone());
            }
            if self.cond.wait_until(&mut state, deadline).timed_out() {
                return state.outcome.clone().ok_or(ActuatorError::Timeout);
            }
        }
    }
}

/// Channel plus slot: what both handle variants point at.
#[derive(Clone)]
pub struct GoalRef {
    channel: ActuatorChannel,
    slot: Arc<GoalSlot>,
}

impl GoalRef {
    pub(crate) fn new(channel: ActuatorChannel, slot: Arc<GoalSlot>) -> Self {
        Self { channel, slot }
    }
}

/// Handle over one goal issued to an actuator channel.
///
/// `Single` goals live on a channel that keeps one goal at a time, so cancelling
/// only reaches the backend while the goal is still the channel's current one.
/// `Multi` goals are cancelled by token.
#[derive(Clone)]
pub enum GoalHandle {
    Single(GoalRef),
    Multi(GoalRef),
}

impl GoalHandle {
    fn inner(&self) -> &GoalRef {
        match self {
            GoalHandle::Single(r) | GoalHandle::Multi(r) => r,
        }
    }

    pub fn token(&self) -> GoalToken {
        self.inner().slot.token()
    }

    pub fn modality(&self) -> Modality {
        self.inner().channel.modality()
    }

    pub fn channel_name(&self) -> &str {
        self.inner().channel.name()
    }

    /// Last feedback marker seen for this goal.
    pub fn progress(&self) -> Option<u32> {
        self.inner().slot.progress()
    }
}

impl std::fmt::Debug for GoalHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            GoalHandle::Single(_) => "Single",
            GoalHandle::Multi(_) => "Multi",
        };
        f.debug_struct("GoalHandle")
            .field("kind", &kind)
            .field("channel", &self.channel_name())
            .field("token", &self.token())
            .finish()
    }
}

impl ActionControl for GoalHandle {
    fn id(&self) -> HandleId {
        HandleId::from(self.token())
    }

    fn wait(&self) -> Outcome {
        self.inner().slot.wait()
    }

    fn wait_timeout(&self, timeout: Duration) -> Result<Outcome> {
        self.inner().slot.wait_until(Instant::now() + timeout)
    }

    fn cancel(&self) -> Result<()> {
        match self {
            GoalHandle::Single(r) => r.channel.cancel_if_current(&r.slot),
            GoalHandle::Multi(r) => r.channel.cancel_token(&r.slot),
        }
    }

    fn outcome(&self) -> Option<Outcome> {
        self.inner().slot.outcome()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_is_recorded_once() {
        let slot = GoalSlot::new(GoalToken::new(), None);
        assert!(slot.finish(Outcome::Succeeded));
        assert!(!slot.finish(Outcome::Cancelled));
        assert_eq!(slot.wait(), Outcome::Succeeded);
        assert_eq!(slot.wait(), Outcome::Succeeded);
    }

    #[test]
    fn wait_until_times_out_without_outcome() {
        let slot = GoalSlot::new(GoalToken::new(), None);
        let res = slot.wait_until(Instant::now() + Duration::from_millis(20));
        assert_eq!(res, Err(ActuatorError::Timeout));
    }

    #[test]
    fn watcher_sees_progress_then_done() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let slot = GoalSlot::new(GoalToken::new(), Some(tx));
        slot.record_progress(1);
        slot.record_progress(2);
        slot.finish(Outcome::Succeeded);
        slot.record_progress(3);

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[1], ActuatorEvent::Feedback { progress: 2, .. }));
        assert!(matches!(
            events[2],
            ActuatorEvent::Done {
                outcome: Outcome::Succeeded,
                ..
            }
        ));
        assert_eq!(slot.progress(), Some(2));
    }
}
