use core::fmt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Output modality served by one actuator channel.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Speech,
    Gaze,
    Expression,
    Gesture,
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Modality::Speech => "speech",
            Modality::Gaze => "gaze",
            Modality::Expression => "expression",
            Modality::Gesture => "gesture",
        };
        f.write_str(s)
    }
}

/// How many goals a backend keeps alive at once.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalMode {
    /// One live goal; a new goal supersedes the previous one.
    Single,
    /// Many concurrent goals, told apart by their token.
    Multi,
}

/// Opaque identifier the backend assigns to a submitted goal.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct GoalToken(Uuid);

impl GoalToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for GoalToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GoalToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of any action handle, used for outstanding-handle bookkeeping.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct HandleId(Uuid);

impl HandleId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for HandleId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<GoalToken> for HandleId {
    fn from(token: GoalToken) -> Self {
        Self(token.as_uuid())
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Terminal state reported exactly once per goal.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Outcome {
    Succeeded,
    Failed(String),
    Cancelled,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Succeeded)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpeechGoal {
    pub sentence: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GazeGoal {
    pub target: String,
    pub speed: f32,
    pub acceleration: f32,
}

/// Unset optional fields leave the choice to the backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExpressionGoal {
    pub name: String,
    pub intensity: Option<f32>,
    pub speed: Option<f32>,
    pub duration: Option<Duration>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GestureGoal {
    pub name: String,
    pub target: Option<String>,
    pub duration: Option<Duration>,
}

impl ExpressionGoal {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            intensity: None,
            speed: None,
            duration: None,
        }
    }

    pub fn with_intensity(mut self, intensity: f32) -> Self {
        self.intensity = Some(intensity);
        self
    }

    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }
}

impl GestureGoal {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: None,
            duration: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }
}

/// One discrete command for an actuator channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommandGoal {
    Speech(SpeechGoal),
    Gaze(GazeGoal),
    Expression(ExpressionGoal),
    Gesture(GestureGoal),
}

impl CommandGoal {
    pub fn modality(&self) -> Modality {
        match self {
            CommandGoal::Speech(_) => Modality::Speech,
            CommandGoal::Gaze(_) => Modality::Gaze,
            CommandGoal::Expression(_) => Modality::Expression,
            CommandGoal::Gesture(_) => Modality::Gesture,
        }
    }
}

impl From<SpeechGoal> for CommandGoal {
    fn from(goal: SpeechGoal) -> Self {
        CommandGoal::Speech(goal)
    }
}

impl From<GazeGoal> for CommandGoal {
    fn from(goal: GazeGoal) -> Self {
        CommandGoal::Gaze(goal)
    }
}

impl From<ExpressionGoal> for CommandGoal {
    fn from(goal: ExpressionGoal) -> Self {
        CommandGoal::Expression(goal)
    }
}

impl From<GestureGoal> for CommandGoal {
    fn from(goal: GestureGoal) -> Self {
        CommandGoal::Gesture(goal)
    }
}

/// Notification streamed back by a backend for a submitted goal.
///
/// `Feedback` markers are nondecreasing per token. `Done` arrives exactly once.
#[derive(Clone, Debug, PartialEq)]
pub enum ActuatorEvent {
    Feedback { token: GoalToken, progress: u32 },
    Done { token: GoalToken, outcome: Outcome },
}

impl ActuatorEvent {
    pub fn token(&self) -> GoalToken {
        match self {
            ActuatorEvent::Feedback { token, .. } | ActuatorEvent::Done { token, .. } => *token,
        }
    }
}
