use crate::handle::ActionHandle;
use actuator_link::{ActionControl, HandleId};
use parking_lot::Mutex;
use prometheus::IntGauge;
use std::collections::HashMap;
use tracing::trace;

/// The robot's set of outstanding action handles.
///
/// Registration and retirement may race (a goal can finish on a backend
/// thread before its issuer registers it); retiring an unknown or already
/// retired id is a no-op.
pub struct HandleTracker {
    handles: Mutex<HashMap<HandleId, ActionHandle>>,
    gauge: Option<IntGauge>,
}

impl HandleTracker {
    pub fn new() -> Self {
        Self {
            handles: Mutex::new(HashMap::new()),
            gauge: None,
        }
    }

    pub fn with_gauge(gauge: IntGauge) -> Self {
        Self {
            handles: Mutex::new(HashMap::new()),
            gauge: Some(gauge),
        }
    }

    pub fn register(&self, handle: ActionHandle) {
        let id = handle.id();
        // Checked after insertion and outside the lock: a plan handle's
        // outcome lives behind the plan's own mutex.
        let finished = handle.clone();
        {
            let mut handles = self.handles.lock();
            handles.insert(id, handle);
            self.update_gauge(handles.len());
        }
        if finished.is_finished() {
            trace!(handle = %id, "handle finished before registration");
            self.retire(id);
        }
    }

    /// Remove a handle. Returns it if this call did the removal.
    pub fn retire(&self, id: HandleId) -> Option<ActionHandle> {
        let removed = {
            let mut handles = self.handles.lock();
            let removed = handles.remove(&id);
            self.update_gauge(handles.len());
            removed
        };
        if removed.is_some() {
            trace!(handle = %id, "handle retired");
        }
        removed
    }

    pub fn contains(&self, id: HandleId) -> bool {
        self.handles.lock().contains_key(&id)
    }

    pub fn snapshot(&self) -> Vec<ActionHandle> {
        self.handles.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.handles.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn update_gauge(&self, len: usize) {
        if let Some(gauge) = &self.gauge {
            gauge.set(i64::try_from(len).unwrap_or(i64::MAX));
        }
    }
}

impl Default for HandleTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use actuator_link::{
        ActuatorChannel, ChannelSettings, CommandGoal, GoalMode, MockActuator, Modality, Outcome,
        SpeechGoal,
    };
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn channel() -> (ActuatorChannel, Arc<MockActuator>) {
        let mock = Arc::new(MockActuator::manual("tts", GoalMode::Multi));
        let settings = ChannelSettings::new("tts", GoalMode::Multi);
        (ActuatorChannel::new(Modality::Speech, settings, mock.clone()), mock)
    }

    fn speech() -> CommandGoal {
        CommandGoal::Speech(SpeechGoal {
            sentence: "hi".into(),
        })
    }

    #[test]
    fn retire_is_idempotent() {
        let (ch, _mock) = channel();
        let tracker = HandleTracker::new();
        let handle = ch.issue(speech()).unwrap();
        let id = handle.id();
        tracker.register(handle.into());
        assert_eq!(tracker.len(), 1);
        assert!(tracker.retire(id).is_some());
        assert!(tracker.retire(id).is_none());
        assert!(tracker.is_empty());
    }

    #[test]
    fn finished_handles_are_not_kept() {
        let (ch, mock) = channel();
        let tracker = HandleTracker::new();
        let handle = ch.issue(speech()).unwrap();
        assert!(mock.finish(handle.token(), Outcome::Succeeded));
        let deadline = Instant::now() + Duration::from_secs(2);
        while !handle.is_finished() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        tracker.register(handle.into());
        assert!(tracker.is_empty());
    }

    #[test]
    fn gauge_follows_set_size() {
        let gauge = IntGauge::new("t_outstanding", "test").unwrap();
        let (ch, _mock) = channel();
        let tracker = HandleTracker::with_gauge(gauge.clone());
        let a = ch.issue(speech()).unwrap();
        let b = ch.issue(speech()).unwrap();
        let a_id = a.id();
        tracker.register(a.into());
        tracker.register(b.into());
        assert_eq!(gauge.get(), 2);
        tracker.retire(a_id);
        assert_eq!(gauge.get(), 1);
    }
}
