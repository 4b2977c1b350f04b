use crate::{
    ActuatorBackend, ActuatorEvent, CommandGoal, EventSink, GoalMode, GoalToken, Outcome, Result,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

// Process-wide so submissions to different mocks can be ordered against each other.
static SUBMIT_SEQ: AtomicU64 = AtomicU64::new(0);

/// How a [`MockActuator`] progresses its goals.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MockBehavior {
    /// Goals only advance through [`MockActuator::feedback`] / [`MockActuator::finish`].
    Manual,
    /// Each goal runs on its own thread. Speech emits one feedback tick per word,
    /// `tick` apart, then succeeds; other goals succeed after one tick.
    Scripted { tick: Duration },
}

/// Counts the feedback ticks a scripted speech goal emits.
pub type WordCounter = Arc<dyn Fn(&str) -> u32 + Send + Sync>;

/// A goal as the mock received it.
#[derive(Clone, Debug)]
pub struct MockSubmission {
    pub token: GoalToken,
    pub goal: CommandGoal,
    pub seq: u64,
}

#[derive(Default)]
struct MockState {
    sinks: HashMap<GoalToken, EventSink>,
    submissions: Vec<MockSubmission>,
    current: Option<GoalToken>,
    cancels: usize,
}

impl MockState {
    fn finish(&mut self, token: GoalToken, outcome: Outcome) -> bool {
        let Some(sink) = self.sinks.remove(&token) else {
            return false;
        };
        if self.current == Some(token) {
            self.current = None;
        }
        let _ = sink.send(ActuatorEvent::Done { token, outcome });
        true
    }
}

/// In-process actuator backend for tests and demos.
pub struct MockActuator {
    name: String,
    mode: GoalMode,
    available: bool,
    behavior: MockBehavior,
    words: WordCounter,
    state: Arc<Mutex<MockState>>,
}

impl MockActuator {
    pub fn manual(name: &str, mode: GoalMode) -> Self {
        Self::with_behavior(name, mode, MockBehavior::Manual)
    }

    pub fn scripted(name: &str, mode: GoalMode, tick: Duration) -> Self {
        Self::with_behavior(name, mode, MockBehavior::Scripted { tick })
    }

    /// A backend that never comes up.
    pub fn unavailable(name: &str, mode: GoalMode) -> Self {
        let mut mock = Self::manual(name, mode);
        mock.available = false;
        mock
    }

    pub fn with_behavior(name: &str, mode: GoalMode, behavior: MockBehavior) -> Self {
        Self {
            name: name.to_string(),
            mode,
            available: true,
            behavior,
            words: Arc::new(|sentence: &str| sentence.split_whitespace().count() as u32),
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Replace the whitespace word count used by scripted speech.
    pub fn with_word_counter(mut self, words: WordCounter) -> Self {
        self.words = words;
        self
    }

    pub fn submitted(&self) -> Vec<MockSubmission> {
        self.state.lock().submissions.clone()
    }

    pub fn last_token(&self) -> Option<GoalToken> {
        self.state.lock().submissions.last().map(|s| s.token)
    }

    pub fn cancel_requests(&self) -> usize {
        self.state.lock().cancels
    }

    pub fn is_live(&self, token: GoalToken) -> bool {
        self.state.lock().sinks.contains_key(&token)
    }

    /// Emit a feedback tick for a live goal. Returns false if the goal already terminated.
    pub fn feedback(&self, token: GoalToken, progress: u32) -> bool {
        let state = self.state.lock();
        match state.sinks.get(&token) {
            Some(sink) => sink
                .send(ActuatorEvent::Feedback { token, progress })
                .is_ok(),
            None => false,
        }
    }

    /// Terminate a live goal. Returns false if it already terminated.
    pub fn finish(&self, token: GoalToken, outcome: Outcome) -> bool {
        self.state.lock().finish(token, outcome)
    }
}

impl ActuatorBackend for MockActuator {
    fn name(&self) -> &str {
        &self.name
    }

    fn wait_for_server(&self, timeout: Duration) -> bool {
        if !self.available {
            thread::sleep(timeout);
        }
        self.available
    }

    fn submit(&self, goal: CommandGoal, sink: EventSink) -> Result<GoalToken> {
        let token = GoalToken::new();
        {
            let mut state = self.state.lock();
            if self.mode == GoalMode::Single {
                if let Some(previous) = state.current {
                    state.finish(previous, Outcome::Cancelled);
                }
                state.current = Some(token);
            }
            state.sinks.insert(token, sink);
            state.submissions.push(MockSubmission {
                token,
                goal: goal.clone(),
                seq: SUBMIT_SEQ.fetch_add(1, Ordering::SeqCst),
            });
        }
        tracing::debug!(backend = %self.name, %token, "mock goal accepted");

        if let MockBehavior::Scripted { tick } = self.behavior {
            let words = match &goal {
                CommandGoal::Speech(speech) => (self.words)(&speech.sentence),
                _ => 0,
            };
            let state = self.state.clone();
            thread::spawn(move || run_script(state, token, words, tick));
        }
        Ok(token)
    }

    fn cancel(&self, token: GoalToken) -> Result<()> {
        let mut state = self.state.lock();
        state.cancels += 1;
        state.finish(token, Outcome::Cancelled);
        Ok(())
    }
}

fn run_script(state: Arc<Mutex<MockState>>, token: GoalToken, words: u32, tick: Duration) {
    for word in 1..=words {
        thread::sleep(tick);
        let state = state.lock();
        let Some(sink) = state.sinks.get(&token) else {
            return;
        };
        let _ = sink.send(ActuatorEvent::Feedback {
            token,
            progress: word,
        });
    }
    thread::sleep(tick);
    state.lock().finish(token, Outcome::Succeeded);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SpeechGoal;

    #[test]
    fn scripted_speech_ticks_per_word() {
        let mock = MockActuator::scripted("tts", GoalMode::Single, Duration::from_millis(1));
        let (tx, rx) = crossbeam_channel::unbounded();
        let goal = CommandGoal::Speech(SpeechGoal {
            sentence: "one two three".into(),
        });
        let token = mock.submit(goal, tx).unwrap();

        let events: Vec<_> = rx.iter().take(4).collect();
        assert_eq!(
            events.last(),
            Some(&ActuatorEvent::Done {
                token,
                outcome: Outcome::Succeeded
            })
        );
        assert_eq!(events.len(), 4);
        assert!(!mock.is_live(token));
    }

    #[test]
    fn word_counter_sets_the_tick_count() -> anyhow::Result<()> {
        let mock = MockActuator::scripted("tts", GoalMode::Single, Duration::from_millis(1))
            .with_word_counter(Arc::new(|sentence: &str| {
                sentence.split_whitespace().filter(|w| *w != "-").count() as u32
            }));
        let (tx, rx) = crossbeam_channel::unbounded();
        let goal = CommandGoal::Speech(SpeechGoal {
            sentence: "Hi - friend".into(),
        });
        let token = mock.submit(goal, tx)?;

        let ticks: Vec<u32> = rx
            .iter()
            .map_while(|event| match event {
                ActuatorEvent::Feedback { progress, .. } => Some(progress),
                ActuatorEvent::Done { .. } => None,
            })
            .collect();
        assert_eq!(ticks, vec![1, 2]);
        assert!(!mock.is_live(token));
        Ok(())
    }

    #[test]
    fn cancel_after_finish_sends_nothing() {
        let mock = MockActuator::manual("gesture", GoalMode::Multi);
        let (tx, rx) = crossbeam_channel::unbounded();
        let goal = CommandGoal::Speech(SpeechGoal { sentence: "x".into() });
        let token = mock.submit(goal, tx).unwrap();
        assert!(mock.finish(token, Outcome::Succeeded));
        mock.cancel(token).unwrap();
        assert!(!mock.feedback(token, 1));
        assert_eq!(rx.try_iter().count(), 1);
        assert_eq!(mock.cancel_requests(), 1);
    }
}
