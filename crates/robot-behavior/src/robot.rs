use crate::channels::{Backends, Channels};
use crate::config::RobotConfig;
use crate::metrics::MetricsHub;
use crate::plan::{PlanContext, PlanHandle};
use crate::tracker::HandleTracker;
use crate::{ActionHandle, Result, RobotError};
use actuator_link::{
    ActionControl, CommandGoal, ExpressionGoal, GazeGoal, GestureGoal, GoalHandle, GoalToken,
    HandleId, Modality, Outcome, SpeechGoal,
};
use entity_registry::{kinds, Audience, Entity, Registry};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use utterance_parser::{TimingOracle, UtteranceCompiler};

#[derive(Default)]
struct PauseGate {
    generation: Mutex<u64>,
    cond: Condvar,
}

/// The component applications drive: speech, gaze, expressions, gestures
/// and audience-directed utterances, plus bookkeeping of every action in
/// flight.
pub struct Robot {
    config: RobotConfig,
    entity: Arc<Entity>,
    registry: Arc<Registry>,
    channels: Channels,
    compiler: UtteranceCompiler,
    oracle: Arc<dyn TimingOracle>,
    tracker: Arc<HandleTracker>,
    metrics: MetricsHub,
    active_plan: Mutex<Option<PlanHandle>>,
    pause: PauseGate,
}

impl Robot {
    pub fn new(
        config: RobotConfig,
        registry: Arc<Registry>,
        backends: Backends,
        oracle: Arc<dyn TimingOracle>,
    ) -> Result<Self> {
        let metrics = MetricsHub::new().map_err(RobotError::Metrics)?;
        let tracker = Arc::new(HandleTracker::with_gauge(
            metrics.behavior.outstanding_handles.clone(),
        ));
        let channels = Channels::new(&config.channels, backends);
        for channel in channels.iter() {
            let tracker = Arc::downgrade(&tracker);
            let metrics = metrics.clone();
            let modality = channel.modality();
            channel.on_completion(Box::new(move |token: GoalToken, outcome: &Outcome| {
                if *outcome == Outcome::Cancelled {
                    metrics.goal_cancelled(modality);
                }
                if let Some(tracker) = tracker.upgrade() {
                    tracker.retire(HandleId::from(token));
                }
            }));
        }

        let mut entity = Entity::new(kinds::ROBOT, config.robot_id.clone());
        if let Some(position) = config.position {
            entity = entity.with_position(position);
        }
        let entity = registry.register(&Arc::new(entity));
        let compiler = UtteranceCompiler::new()?;
        info!(robot = %entity.id(), "robot ready");

        Ok(Self {
            config,
            entity,
            registry,
            channels,
            compiler,
            oracle,
            tracker,
            metrics,
            active_plan: Mutex::new(None),
            pause: PauseGate::default(),
        })
    }

    /// A robot on in-process mock backends, with the mocks returned for driving.
    #[cfg(feature = "mock")]
    pub fn with_mocks(
        config: RobotConfig,
        registry: Arc<Registry>,
        behavior: actuator_link::MockBehavior,
    ) -> Result<(Self, crate::MockBackends)> {
        let mocks = crate::MockBackends::new(&config, behavior);
        let oracle = Arc::new(utterance_parser::WordRateOracle::default());
        let robot = Self::new(config, registry, mocks.backends(), oracle)?;
        Ok((robot, mocks))
    }

    pub fn config(&self) -> &RobotConfig {
        &self.config
    }

    pub fn entity(&self) -> &Arc<Entity> {
        &self.entity
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn metrics(&self) -> &MetricsHub {
        &self.metrics
    }

    pub fn active_plan(&self) -> Option<PlanHandle> {
        self.active_plan.lock().clone()
    }

    pub fn say(&self, text: &str) -> Result<GoalHandle> {
        self.issue(CommandGoal::Speech(SpeechGoal {
            sentence: text.to_string(),
        }))
    }

    pub fn say_and_wait(&self, text: &str, timeout: Option<Duration>) -> Result<Outcome> {
        let handle = self.say(text)?;
        self.settle(&handle, timeout)
    }

    /// Look at `target`, registering it if the registry does not know it yet.
    ///
    /// People are looked at through their registered head when they have one.
    pub fn gaze(&self, target: &Arc<Entity>, speed: Option<f32>) -> Result<GoalHandle> {
        let speed = speed.unwrap_or(self.config.gaze.speed);
        check_unit("gaze speed", speed)?;
        let target = self.registry.register(target);
        let focus = self.registry.attention_target(&target);
        self.issue(CommandGoal::Gaze(GazeGoal {
            target: focus.id().to_string(),
            speed,
            acceleration: self.config.gaze.acceleration,
        }))
    }

    pub fn gaze_at(&self, id: &str, speed: Option<f32>) -> Result<GoalHandle> {
        let target = self.registry.lookup(id)?;
        self.gaze(&target, speed)
    }

    pub fn gaze_and_wait(
        &self,
        target: &Arc<Entity>,
        speed: Option<f32>,
        timeout: Option<Duration>,
    ) -> Result<Outcome> {
        let handle = self.gaze(target, speed)?;
        self.settle(&handle, timeout)
    }

    pub fn expression(&self, goal: ExpressionGoal) -> Result<GoalHandle> {
        let goal = CommandGoal::Expression(goal);
        self.validate(&goal)?;
        self.issue(goal)
    }

    pub fn expression_and_wait(
        &self,
        goal: ExpressionGoal,
        timeout: Option<Duration>,
    ) -> Result<Outcome> {
        let handle = self.expression(goal)?;
        self.settle(&handle, timeout)
    }

    pub fn gesture(&self, goal: GestureGoal) -> Result<GoalHandle> {
        let goal = CommandGoal::Gesture(goal);
        self.validate(&goal)?;
        self.issue(goal)
    }

    pub fn gesture_and_wait(&self, goal: GestureGoal, timeout: Option<Duration>) -> Result<Outcome> {
        let handle = self.gesture(goal)?;
        self.settle(&handle, timeout)
    }

    /// Speak annotated `text` to `audience`, gazing and gesturing along the way.
    ///
    /// The utterance is compiled and every channel connected before anything
    /// is issued, so errors leave the robot untouched. A plan still running
    /// from an earlier call is preempted and its thread joined first.
    pub fn say_to(&self, text: &str, audience: impl Into<Audience>) -> Result<PlanHandle> {
        let audience = audience.into();
        let plan = self
            .compiler
            .compile(text, &self.config.vocabulary, self.oracle.as_ref())?;
        audience.validate(&self.registry)?;
        self.channels.ensure_ready()?;

        let mut active = self.active_plan.lock();
        if let Some(previous) = active.take() {
            if !previous.is_finished() {
                info!(plan = %previous.id(), "superseding running plan");
                if let Err(e) = previous.cancel() {
                    warn!(plan = %previous.id(), error = %e, "cancelling previous plan failed");
                }
            }
            previous.join_thread();
            self.tracker.retire(previous.id());
        }

        let ctx = PlanContext {
            registry: self.registry.clone(),
            robot: self.entity.clone(),
            channels: self.channels.clone(),
            tracker: self.tracker.clone(),
            metrics: self.metrics.clone(),
            gaze: self.config.gaze,
        };
        let handle = PlanHandle::start(plan, audience, ctx)?;
        self.tracker.register(ActionHandle::Plan(handle.clone()));
        *active = Some(handle.clone());
        Ok(handle)
    }

    pub fn say_to_and_wait(
        &self,
        text: &str,
        audience: impl Into<Audience>,
        timeout: Option<Duration>,
    ) -> Result<Outcome> {
        let handle = self.say_to(text, audience)?;
        self.settle(&handle, timeout)
    }

    /// Issue prebuilt goals on their modality's channel.
    ///
    /// All goals are validated before the first is issued.
    pub fn perform(&self, goals: Vec<CommandGoal>) -> Result<Vec<GoalHandle>> {
        for goal in &goals {
            self.validate(goal)?;
        }
        goals.into_iter().map(|goal| self.issue(goal)).collect()
    }

    pub fn wait<H: ActionControl>(&self, handle: &H) -> Outcome {
        let outcome = handle.wait();
        self.tracker.retire(handle.id());
        outcome
    }

    pub fn wait_timeout<H: ActionControl>(&self, handle: &H, timeout: Duration) -> Result<Outcome> {
        self.settle(handle, Some(timeout))
    }

    pub fn cancel<H: ActionControl>(&self, handle: &H) -> Result<()> {
        handle.cancel()?;
        self.tracker.retire(handle.id());
        Ok(())
    }

    pub fn wait_each(&self, handles: &[ActionHandle]) -> Vec<Outcome> {
        handles.iter().map(|h| self.wait(h)).collect()
    }

    /// Cancel every handle, continuing past failures. Returns the first error.
    pub fn cancel_each(&self, handles: &[ActionHandle]) -> Result<()> {
        let mut first = None;
        for handle in handles {
            if let Err(e) = self.cancel(handle) {
                warn!(handle = %handle.id(), error = %e, "cancel failed");
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }

    pub fn wait_all(&self) -> Vec<Outcome> {
        self.wait_each(&self.tracker.snapshot())
    }

    pub fn cancel_all(&self) -> Result<()> {
        let handles = self.tracker.snapshot();
        info!(count = handles.len(), "cancelling all actions");
        self.cancel_each(&handles)
    }

    /// Handles issued and not yet retired.
    pub fn outstanding(&self) -> Vec<ActionHandle> {
        self.tracker.snapshot()
    }

    /// Sleep for `duration` unless [`Robot::interrupt_pause`] is called first.
    /// Returns true if interrupted.
    pub fn pause(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut generation = self.pause.generation.lock();
        let start = *generation;
        while *generation == start {
            if self
                .pause
                .cond
                .wait_until(&mut generation, deadline)
                .timed_out()
            {
                return *generation != start;
            }
        }
        true
    }

    pub fn interrupt_pause(&self) {
        *self.pause.generation.lock() += 1;
        self.pause.cond.notify_all();
    }

    fn settle<H: ActionControl>(&self, handle: &H, timeout: Option<Duration>) -> Result<Outcome> {
        let outcome = match timeout {
            Some(timeout) => handle.wait_timeout(timeout)?,
            None => handle.wait(),
        };
        self.tracker.retire(handle.id());
        Ok(outcome)
    }

    fn issue(&self, goal: CommandGoal) -> Result<GoalHandle> {
        let modality = goal.modality();
        let handle = self.channels.get(modality).issue(goal)?;
        self.metrics.goal_issued(modality);
        self.tracker.register(ActionHandle::Goal(handle.clone()));
        debug!(%modality, token = %handle.token(), "goal issued");
        Ok(handle)
    }

    fn validate(&self, goal: &CommandGoal) -> Result<()> {
        match goal {
            CommandGoal::Speech(_) => Ok(()),
            CommandGoal::Gaze(g) => {
                check_unit("gaze speed", g.speed)?;
                self.registry.lookup(&g.target)?;
                Ok(())
            }
            CommandGoal::Expression(e) => {
                if !self.config.vocabulary.is_expression(&e.name) {
                    return Err(RobotError::invalid(format!("unknown expression `{}`", e.name)));
                }
                if let Some(intensity) = e.intensity {
                    check_unit("expression intensity", intensity)?;
                }
                if let Some(speed) = e.speed {
                    check_unit("expression speed", speed)?;
                }
                check_duration(e.duration)
            }
            CommandGoal::Gesture(g) => {
                if !self.config.vocabulary.is_gesture(&g.name) {
                    return Err(RobotError::invalid(format!("unknown gesture `{}`", g.name)));
                }
                if let Some(target) = &g.target {
                    self.registry.lookup(target)?;
                }
                check_duration(g.duration)
            }
        }
    }

    pub fn is_ready(&self, modality: Modality) -> bool {
        self.channels.get(modality).is_ready()
    }
}

impl Drop for Robot {
    fn drop(&mut self) {
        if let Some(plan) = self.active_plan.lock().take() {
            if let Err(e) = plan.cancel() {
                warn!(plan = %plan.id(), error = %e, "cancelling plan on drop failed");
            }
        }
    }
}

fn check_unit(what: &str, value: f32) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(RobotError::invalid(format!("{what} {value} outside [0, 1]")))
    }
}

fn check_duration(duration: Option<Duration>) -> Result<()> {
    match duration {
        Some(d) if d.is_zero() => Err(RobotError::invalid("duration must be positive")),
        _ => Ok(()),
    }
}
