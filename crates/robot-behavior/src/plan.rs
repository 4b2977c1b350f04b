//! Execution of one audience-directed utterance.
//!
//! A plan runs on its own thread: it turns the robot toward the audience,
//! waits for the gaze to settle, starts speech and then reacts to speech
//! feedback, re-gazing at clause starts and firing expression and gesture
//! cues at their words. Cancellation is cooperative: every command is issued
//! under the plan's lock after checking the preemption flag, so nothing is
//! issued once [`PlanHandle::cancel`] has set it.

use crate::channels::Channels;
use crate::config::GazeDefaults;
use crate::metrics::MetricsHub;
use crate::tracker::HandleTracker;
use crate::{ActionHandle, Result, RobotError};
use actuator_link::{
    ActionControl, ActuatorError, ActuatorEvent, CommandGoal, GazeGoal, GoalHandle, HandleId,
    Modality, Outcome, SpeechGoal,
};
use entity_registry::{Audience, Entity, Registry};
use parking_lot::{Condvar, Mutex};
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};
use utterance_parser::UtterancePlan;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanPhase {
    Idle,
    SelectingGaze,
    Speaking,
    Done,
}

/// What a plan thread borrows from the robot.
#[derive(Clone)]
pub(crate) struct PlanContext {
    pub(crate) registry: Arc<Registry>,
    pub(crate) robot: Arc<Entity>,
    pub(crate) channels: Channels,
    pub(crate) tracker: Arc<HandleTracker>,
    pub(crate) metrics: MetricsHub,
    pub(crate) gaze: GazeDefaults,
}

struct PlanState {
    phase: PlanPhase,
    preempted: bool,
    gaze: Option<GoalHandle>,
    speech: Option<GoalHandle>,
    auxiliary: Vec<GoalHandle>,
    gazee: Option<String>,
    last_word: u32,
    outcome: Option<Outcome>,
}

struct PlanShared {
    id: HandleId,
    plan: UtterancePlan,
    audience: Audience,
    metrics: MetricsHub,
    state: Mutex<PlanState>,
    finished: Condvar,
}

impl PlanShared {
    fn wait_finished(&self, deadline: Option<Instant>) -> bool {
        let mut state = self.state.lock();
        while state.phase != PlanPhase::Done {
            match deadline {
                Some(deadline) => {
                    if self.finished.wait_until(&mut state, deadline).timed_out() {
                        return state.phase == PlanPhase::Done;
                    }
                }
                None => self.finished.wait(&mut state),
            }
        }
        true
    }

    /// Speech and auxiliary handles. Only complete once the plan thread is done.
    fn spawned(&self) -> Vec<GoalHandle> {
        let state = self.state.lock();
        state
            .speech
            .iter()
            .chain(state.auxiliary.iter())
            .cloned()
            .collect()
    }
}

/// Handle over a running plan.
#[derive(Clone)]
pub struct PlanHandle {
    shared: Arc<PlanShared>,
    thread: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl PlanHandle {
    pub(crate) fn start(plan: UtterancePlan, audience: Audience, ctx: PlanContext) -> Result<Self> {
        let shared = Arc::new(PlanShared {
            id: HandleId::new(),
            plan,
            audience,
            metrics: ctx.metrics.clone(),
            state: Mutex::new(PlanState {
                phase: PlanPhase::Idle,
                preempted: false,
                gaze: None,
                speech: None,
                auxiliary: Vec::new(),
                gazee: None,
                last_word: 0,
                outcome: None,
            }),
            finished: Condvar::new(),
        });
        let executor = Executor {
            shared: shared.clone(),
            ctx,
        };
        let join = thread::Builder::new()
            .name(format!("plan-{}", shared.id))
            .spawn(move || executor.run())
            .map_err(|e| {
                RobotError::Actuator(ActuatorError::Backend(format!("spawning plan thread: {e}")))
            })?;
        shared.metrics.behavior.plans_started.inc();
        info!(plan = %shared.id, sentence = %shared.plan.sentence, "plan started");
        Ok(Self {
            shared,
            thread: Arc::new(Mutex::new(Some(join))),
        })
    }

    pub fn plan(&self) -> &UtterancePlan {
        &self.shared.plan
    }

    pub fn audience(&self) -> &Audience {
        &self.shared.audience
    }

    pub fn phase(&self) -> PlanPhase {
        self.shared.state.lock().phase
    }

    pub fn is_preempted(&self) -> bool {
        self.shared.state.lock().preempted
    }

    /// Id of the entity currently gazed at.
    pub fn gazee(&self) -> Option<String> {
        self.shared.state.lock().gazee.clone()
    }

    pub fn speech(&self) -> Option<GoalHandle> {
        self.shared.state.lock().speech.clone()
    }

    /// Expression and gesture goals fired so far.
    pub fn auxiliary(&self) -> Vec<GoalHandle> {
        self.shared.state.lock().auxiliary.clone()
    }

    /// Block until the plan thread has exited, without waiting on spawned goals.
    pub(crate) fn join_thread(&self) {
        self.join();
        self.shared.wait_finished(None);
    }

    fn join(&self) {
        let join = self.thread.lock().take();
        if let Some(join) = join {
            if join.join().is_err() {
                warn!(plan = %self.shared.id, "plan thread panicked");
            }
        }
    }
}

impl std::fmt::Debug for PlanHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanHandle")
            .field("id", &self.shared.id)
            .field("sentence", &self.shared.plan.sentence)
            .field("phase", &self.phase())
            .finish()
    }
}

impl ActionControl for PlanHandle {
    fn id(&self) -> HandleId {
        self.shared.id
    }

    fn wait(&self) -> Outcome {
        self.join();
        self.shared.wait_finished(None);
        for handle in self.shared.spawned() {
            handle.wait();
        }
        self.outcome().unwrap_or(Outcome::Cancelled)
    }

    fn wait_timeout(&self, timeout: Duration) -> actuator_link::Result<Outcome> {
        let deadline = Instant::now() + timeout;
        if !self.shared.wait_finished(Some(deadline)) {
            return Err(ActuatorError::Timeout);
        }
        self.join();
        for handle in self.shared.spawned() {
            let left = deadline.saturating_duration_since(Instant::now());
            handle.wait_timeout(left)?;
        }
        self.outcome().ok_or(ActuatorError::Timeout)
    }

    /// Stop the plan and everything it spawned. After speech has finished
    /// this still reaches gaze, expression and gesture goals left running.
    fn cancel(&self) -> actuator_link::Result<()> {
        let (handles, running) = {
            let mut state = self.shared.state.lock();
            if state.preempted {
                return Ok(());
            }
            state.preempted = true;
            let handles: Vec<GoalHandle> = state
                .gaze
                .iter()
                .chain(state.speech.iter())
                .chain(state.auxiliary.iter())
                .cloned()
                .collect();
            (handles, state.phase != PlanPhase::Done)
        };
        if running {
            self.shared.metrics.behavior.plans_preempted.inc();
            info!(plan = %self.shared.id, handles = handles.len(), "plan preempted");
        } else {
            debug!(plan = %self.shared.id, handles = handles.len(), "cancelling finished plan's goals");
        }
        for handle in handles {
            if let Err(e) = handle.cancel() {
                warn!(plan = %self.shared.id, channel = %handle.channel_name(), error = %e, "cancel failed");
            }
        }
        Ok(())
    }

    fn outcome(&self) -> Option<Outcome> {
        self.shared.state.lock().outcome.clone()
    }
}

struct Executor {
    shared: Arc<PlanShared>,
    ctx: PlanContext,
}

impl Executor {
    fn run(self) {
        let outcome = self.execute();
        let outcome = {
            let mut state = self.shared.state.lock();
            let outcome = if state.preempted {
                Outcome::Cancelled
            } else {
                outcome
            };
            state.phase = PlanPhase::Done;
            state.outcome = Some(outcome.clone());
            self.shared.finished.notify_all();
            outcome
        };
        self.ctx.tracker.retire(self.shared.id);
        info!(plan = %self.shared.id, ?outcome, "plan finished");
    }

    fn execute(&self) -> Outcome {
        self.set_phase(PlanPhase::SelectingGaze);
        match self.initial_gazee() {
            Some(person) => self.gaze_at(&person),
            None => debug!(plan = %self.shared.id, "no one to gaze at"),
        }

        // Look first, then talk.
        let gaze = self.shared.state.lock().gaze.clone();
        if let Some(gaze) = gaze {
            let settled = gaze.wait();
            trace!(plan = %self.shared.id, ?settled, "initial gaze settled");
        }

        let (tx, rx) = crossbeam_channel::unbounded();
        let speech = {
            let mut state = self.shared.state.lock();
            if state.preempted {
                debug!(plan = %self.shared.id, "preempted before speech");
                return Outcome::Cancelled;
            }
            let goal = CommandGoal::Speech(SpeechGoal {
                sentence: self.shared.plan.sentence.clone(),
            });
            match self.ctx.channels.get(Modality::Speech).issue_watched(goal, tx) {
                Ok(handle) => {
                    self.track(&handle);
                    state.speech = Some(handle.clone());
                    state.phase = PlanPhase::Speaking;
                    handle
                }
                Err(e) => {
                    warn!(plan = %self.shared.id, error = %e, "speech could not be issued");
                    return Outcome::Failed(e.to_string());
                }
            }
        };

        for event in rx.iter() {
            match event {
                ActuatorEvent::Feedback { progress, .. } => self.on_word(progress),
                ActuatorEvent::Done { outcome, .. } => return outcome,
            }
        }
        speech.wait()
    }

    fn set_phase(&self, phase: PlanPhase) {
        self.shared.state.lock().phase = phase;
        debug!(plan = %self.shared.id, ?phase, "plan phase");
    }

    fn on_word(&self, progress: u32) {
        {
            let mut state = self.shared.state.lock();
            if state.preempted {
                return;
            }
            if progress <= state.last_word {
                trace!(plan = %self.shared.id, word = progress, "repeated feedback tick");
                return;
            }
            state.last_word = progress;
        }
        let Ok(word) = usize::try_from(progress) else {
            return;
        };
        let plan = &self.shared.plan;

        if plan.is_gaze_trigger(word) {
            if let Some(person) = self.reselect_gazee() {
                debug!(plan = %self.shared.id, word, gazee = %person.id(), "gaze reselected");
                self.gaze_at(&person);
            }
        }
        if let Some(goal) = plan.expression_at(word) {
            debug!(plan = %self.shared.id, word, expression = %goal.name, "expression cue");
            self.issue_auxiliary(goal.clone().into());
        }
        if let Some(goal) = plan.gesture_at(word) {
            debug!(plan = %self.shared.id, word, gesture = %goal.name, "gesture cue");
            self.issue_auxiliary(goal.clone().into());
        }
    }

    fn initial_gazee(&self) -> Option<Arc<Entity>> {
        match self
            .shared
            .audience
            .resolve_nearest(&self.ctx.registry, &self.ctx.robot)
        {
            Ok(candidates) => candidates.into_iter().next(),
            Err(e) => {
                warn!(plan = %self.shared.id, error = %e, "audience could not be resolved");
                None
            }
        }
    }

    /// A single addressee is looked at again; a group gets a uniformly random member.
    fn reselect_gazee(&self) -> Option<Arc<Entity>> {
        let candidates = match self.shared.audience.resolve(&self.ctx.registry) {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(plan = %self.shared.id, error = %e, "audience could not be resolved");
                return None;
            }
        };
        if self.shared.audience.is_single() || candidates.len() <= 1 {
            return candidates.into_iter().next();
        }
        // The current gazee stays eligible.
        candidates.choose(&mut rand::thread_rng()).cloned()
    }

    fn gaze_at(&self, person: &Arc<Entity>) {
        let target = self.ctx.registry.attention_target(person);
        let goal = CommandGoal::Gaze(GazeGoal {
            target: target.id().to_string(),
            speed: self.ctx.gaze.speed,
            acceleration: self.ctx.gaze.acceleration,
        });
        let mut state = self.shared.state.lock();
        if let Some(handle) = self.issue_locked(&state, goal) {
            state.gaze = Some(handle);
            state.gazee = Some(person.id().to_string());
        }
    }

    fn issue_auxiliary(&self, goal: CommandGoal) {
        let mut state = self.shared.state.lock();
        if let Some(handle) = self.issue_locked(&state, goal) {
            state.auxiliary.push(handle);
        }
    }

    /// Issue unless preempted. The caller holds the plan lock across the
    /// check and the issue so a concurrent cancel cannot slip in between.
    fn issue_locked(&self, state: &PlanState, goal: CommandGoal) -> Option<GoalHandle> {
        if state.preempted {
            debug!(plan = %self.shared.id, modality = %goal.modality(), "preempted, not issuing");
            return None;
        }
        let modality = goal.modality();
        match self.ctx.channels.get(modality).issue(goal) {
            Ok(handle) => {
                self.track(&handle);
                Some(handle)
            }
            Err(e) => {
                warn!(plan = %self.shared.id, %modality, error = %e, "goal could not be issued");
                None
            }
        }
    }

    fn track(&self, handle: &GoalHandle) {
        self.ctx.metrics.goal_issued(handle.modality());
        self.ctx
            .tracker
            .register(ActionHandle::Goal(handle.clone()));
    }
}
