//! robot-behavior: coordinated speech, gaze, expression and gesture
//!
//! [`Robot`] owns one actuator channel per modality and the entity registry
//! handle. `say_to` compiles an annotated utterance and runs it as a plan on
//! its own thread; every goal the robot issues is tracked until it finishes,
//! is waited on, or is cancelled.

mod channels;
#[cfg(feature = "mock")]
pub use channels::MockBackends;
pub use channels::Backends;

mod config;
pub use config::{load_config, ChannelMap, GazeDefaults, MockActuatorConfig, RobotConfig};

mod error;
pub use error::{Result, RobotError};

mod handle;
pub use handle::ActionHandle;

mod metrics;
pub use metrics::{BehaviorMetrics, MetricsHub};

mod plan;
pub use plan::{PlanHandle, PlanPhase};

mod robot;
pub use robot::Robot;

mod tracker;
pub use tracker::HandleTracker;
