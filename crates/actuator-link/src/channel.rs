use crate::handle::{GoalRef, GoalSlot};
use crate::{
    ActuatorBackend, ActuatorError, ActuatorEvent, CommandGoal, EventSink, GoalHandle, GoalMode,
    GoalToken, Modality, Outcome, Result,
};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Called once per goal after its terminal outcome is stored.
pub type CompletionHook = Box<dyn Fn(GoalToken, &Outcome) + Send + Sync>;

/// Connection settings for one actuator channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSettings {
    pub name: String,
    pub mode: GoalMode,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

impl ChannelSettings {
    pub fn new(name: impl Into<String>, mode: GoalMode) -> Self {
        Self {
            name: name.into(),
            mode,
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

struct GoalTable {
    live: HashMap<GoalToken, Arc<GoalSlot>>,
    current: Option<GoalToken>,
}

struct Shared {
    modality: Modality,
    settings: ChannelSettings,
    backend: Arc<dyn ActuatorBackend>,
    link: Mutex<Option<EventSink>>,
    goals: Mutex<GoalTable>,
    on_done: RwLock<Option<CompletionHook>>,
}

impl Shared {
    fn deliver(&self, event: ActuatorEvent) {
        match event {
            ActuatorEvent::Feedback { token, progress } => {
                let slot = self.goals.lock().live.get(&token).cloned();
                match slot {
                    Some(slot) => slot.record_progress(progress),
                    None => trace!(channel = %self.settings.name, %token, "feedback for retired goal"),
                }
            }
            ActuatorEvent::Done { token, outcome } => {
                let slot = {
                    let mut table = self.goals.lock();
                    if table.current == Some(token) {
                        table.current = None;
                    }
                    table.live.remove(&token)
                };
                let Some(slot) = slot else {
                    trace!(channel = %self.settings.name, %token, "duplicate terminal event");
                    return;
                };
                if slot.finish(outcome.clone()) {
                    debug!(channel = %self.settings.name, %token, ?outcome, "goal finished");
                    if let Some(hook) = self.on_done.read().as_ref() {
                        hook(token, &outcome);
                    }
                }
            }
        }
    }
}

/// One actuator modality: lazily connects its backend and issues goals.
#[derive(Clone)]
pub struct ActuatorChannel {
    shared: Arc<Shared>,
}

impl ActuatorChannel {
    pub fn new(
        modality: Modality,
        settings: ChannelSettings,
        backend: Arc<dyn ActuatorBackend>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                modality,
                settings,
                backend,
                link: Mutex::new(None),
                goals: Mutex::new(GoalTable {
                    live: HashMap::new(),
                    current: None,
                }),
                on_done: RwLock::new(None),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.settings.name
    }

    pub fn modality(&self) -> Modality {
        self.shared.modality
    }

    pub fn mode(&self) -> GoalMode {
        self.shared.settings.mode
    }

    pub fn is_ready(&self) -> bool {
        self.shared.link.lock().is_some()
    }

    /// Install the hook run after every goal on this channel terminates.
    pub fn on_completion(&self, hook: CompletionHook) {
        *self.shared.on_done.write() = Some(hook);
    }

    /// Connect on first use. Blocks until the backend is up or the connect timeout elapses.
    pub fn ensure_ready(&self) -> Result<()> {
        let mut link = self.shared.link.lock();
        if link.is_some() {
            return Ok(());
        }
        let settings = &self.shared.settings;
        info!(channel = %settings.name, modality = %self.shared.modality, "waiting for actuator server");
        if !self.shared.backend.wait_for_server(settings.connect_timeout()) {
            warn!(channel = %settings.name, timeout_ms = settings.connect_timeout_ms, "actuator server not available");
            return Err(ActuatorError::ChannelUnavailable(settings.name.clone()));
        }
        let (tx, rx) = crossbeam_channel::unbounded();
        spawn_dispatcher(&settings.name, Arc::downgrade(&self.shared), rx)?;
        *link = Some(tx);
        info!(channel = %settings.name, "actuator channel connected");
        Ok(())
    }

    /// Issue a goal on this channel.
    pub fn issue(&self, goal: CommandGoal) -> Result<GoalHandle> {
        self.submit(goal, None)
    }

    /// Issue a goal and forward its feedback and terminal events to `watcher`.
    pub fn issue_watched(
        &self,
        goal: CommandGoal,
        watcher: Sender<ActuatorEvent>,
    ) -> Result<GoalHandle> {
        self.submit(goal, Some(watcher))
    }

    fn submit(
        &self,
        goal: CommandGoal,
        watcher: Option<Sender<ActuatorEvent>>,
    ) -> Result<GoalHandle> {
        if goal.modality() != self.shared.modality {
            return Err(ActuatorError::Rejected {
                channel: self.name().to_string(),
                reason: format!("{} goal on {} channel", goal.modality(), self.shared.modality),
            });
        }
        self.ensure_ready()?;
        let sink = self
            .shared
            .link
            .lock()
            .clone()
            .ok_or_else(|| ActuatorError::ChannelUnavailable(self.name().to_string()))?;

        // The table lock spans the backend call so the dispatcher cannot see
        // events for this token before its slot exists.
        let mut table = self.shared.goals.lock();
        let token = self.shared.backend.submit(goal, sink)?;
        let slot = Arc::new(GoalSlot::new(token, watcher));
        table.live.insert(token, slot.clone());
        let goal_ref = GoalRef::new(self.clone(), slot);
        let handle = match self.shared.settings.mode {
            GoalMode::Single => {
                table.current = Some(token);
                GoalHandle::Single(goal_ref)
            }
            GoalMode::Multi => GoalHandle::Multi(goal_ref),
        };
        drop(table);

        debug!(channel = %self.name(), %token, "goal issued");
        Ok(handle)
    }

    /// Number of goals issued on this channel that have not yet terminated.
    pub fn live_goals(&self) -> usize {
        self.shared.goals.lock().live.len()
    }

    pub(crate) fn cancel_if_current(&self, slot: &GoalSlot) -> Result<()> {
        if slot.outcome().is_some() {
            return Ok(());
        }
        let current = self.shared.goals.lock().current;
        if current != Some(slot.token()) {
            trace!(channel = %self.name(), token = %slot.token(), "goal already superseded");
            return Ok(());
        }
        info!(channel = %self.name(), token = %slot.token(), "cancelling goal");
        self.shared.backend.cancel(slot.token())
    }

    pub(crate) fn cancel_token(&self, slot: &GoalSlot) -> Result<()> {
        if slot.outcome().is_some() {
            return Ok(());
        }
        info!(channel = %self.name(), token = %slot.token(), "cancelling goal");
        self.shared.backend.cancel(slot.token())
    }
}

fn spawn_dispatcher(name: &str, shared: Weak<Shared>, rx: Receiver<ActuatorEvent>) -> Result<()> {
    thread::Builder::new()
        .name(format!("{name}-events"))
        .spawn(move || {
            for event in rx.iter() {
                let Some(shared) = shared.upgrade() else {
                    break;
                };
                shared.deliver(event);
            }
        })
        .map(|_| ())
        .map_err(|e| ActuatorError::Backend(format!("spawning dispatcher: {e}")))
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use crate::{ActionControl, MockActuator, SpeechGoal};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn speech(text: &str) -> CommandGoal {
        CommandGoal::Speech(SpeechGoal {
            sentence: text.to_string(),
        })
    }

    fn channel(mode: GoalMode, backend: Arc<MockActuator>) -> ActuatorChannel {
        ActuatorChannel::new(Modality::Speech, ChannelSettings::new("tts", mode), backend)
    }

    #[test]
    fn unavailable_backend_is_reported() {
        let backend = Arc::new(MockActuator::unavailable("tts", GoalMode::Single));
        let mut settings = ChannelSettings::new("tts", GoalMode::Single);
        settings.connect_timeout_ms = 10;
        let ch = ActuatorChannel::new(Modality::Speech, settings, backend);
        let err = ch.issue(speech("hi")).unwrap_err();
        assert_eq!(err, ActuatorError::ChannelUnavailable("tts".into()));
        assert!(!ch.is_ready());
    }

    #[test]
    fn wrong_modality_is_rejected() {
        let backend = Arc::new(MockActuator::manual("tts", GoalMode::Single));
        let ch = channel(GoalMode::Single, backend.clone());
        let goal = CommandGoal::Gesture(crate::GestureGoal {
            name: "wave".into(),
            target: None,
            duration: None,
        });
        assert!(matches!(ch.issue(goal), Err(ActuatorError::Rejected { .. })));
        assert!(backend.submitted().is_empty());
    }

    #[test]
    fn single_goal_supersedes_previous() {
        let backend = Arc::new(MockActuator::manual("tts", GoalMode::Single));
        let ch = channel(GoalMode::Single, backend.clone());
        let first = ch.issue(speech("one")).unwrap();
        let second = ch.issue(speech("two")).unwrap();

        assert_eq!(first.wait(), Outcome::Cancelled);
        // Cancelling a superseded goal never reaches the backend.
        first.cancel().unwrap();
        assert_eq!(backend.cancel_requests(), 0);

        backend.finish(second.token(), Outcome::Succeeded);
        assert_eq!(second.wait(), Outcome::Succeeded);
    }

    #[test]
    fn multi_goals_are_independent() {
        let backend = Arc::new(MockActuator::manual("tts", GoalMode::Multi));
        let ch = channel(GoalMode::Multi, backend.clone());
        let a = ch.issue(speech("a")).unwrap();
        let b = ch.issue(speech("b")).unwrap();
        assert_eq!(ch.live_goals(), 2);

        a.cancel().unwrap();
        assert_eq!(a.wait(), Outcome::Cancelled);
        assert!(b.outcome().is_none());

        backend.finish(b.token(), Outcome::Failed("jammed".into()));
        assert_eq!(b.wait(), Outcome::Failed("jammed".into()));
    }

    #[test]
    fn completion_hook_runs_once_per_goal() {
        let backend = Arc::new(MockActuator::manual("tts", GoalMode::Multi));
        let ch = channel(GoalMode::Multi, backend.clone());
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        ch.on_completion(Box::new(move |_, _| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));

        let h = ch.issue(speech("hello")).unwrap();
        backend.finish(h.token(), Outcome::Succeeded);
        assert_eq!(h.wait(), Outcome::Succeeded);
        h.cancel().unwrap();
        // A misbehaving backend repeating the terminal event is absorbed.
        ch.shared.deliver(ActuatorEvent::Done {
            token: h.token(),
            outcome: Outcome::Cancelled,
        });
        assert_eq!(h.wait(), Outcome::Succeeded);

        let probe = ch.issue(speech("probe")).unwrap();
        backend.finish(probe.token(), Outcome::Succeeded);
        probe.wait();
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while calls.load(Ordering::SeqCst) < 2 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        thread::sleep(Duration::from_millis(20));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn watcher_receives_feedback_in_order() {
        let backend = Arc::new(MockActuator::manual("tts", GoalMode::Single));
        let ch = channel(GoalMode::Single, backend.clone());
        let (tx, rx) = crossbeam_channel::unbounded();
        let h = ch.issue_watched(speech("one two three"), tx).unwrap();
        for i in 1..=3 {
            backend.feedback(h.token(), i);
        }
        backend.finish(h.token(), Outcome::Succeeded);

        let progress: Vec<u32> = rx
            .iter()
            .filter_map(|ev| match ev {
                ActuatorEvent::Feedback { progress, .. } => Some(progress),
                ActuatorEvent::Done { .. } => None,
            })
            .collect();
        assert_eq!(progress, vec![1, 2, 3]);
        assert_eq!(h.progress(), Some(3));
    }
}
