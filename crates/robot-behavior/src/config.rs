use actuator_link::{ChannelSettings, GoalMode, Modality};
use anyhow::Context;
use entity_registry::Position;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use utterance_parser::Vocabulary;

/// Everything a [`crate::Robot`] needs besides its backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    /// Registry id of the robot entity.
    pub robot_id: String,
    /// Where the robot stands; audience ranking measures from here.
    pub position: Option<Position>,
    pub channels: ChannelMap,
    pub gaze: GazeDefaults,
    pub vocabulary: Vocabulary,
    pub mock: MockActuatorConfig,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            robot_id: "robot1".into(),
            position: Some(Position::new(0.0, 0.0, 0.0)),
            channels: ChannelMap::default(),
            gaze: GazeDefaults::default(),
            vocabulary: Vocabulary::new(
                ["smile", "frown", "surprise", "happy", "sad", "angry", "afraid"],
                ["wave", "point", "nod", "shake_head", "shrug", "bow"],
            ),
            mock: MockActuatorConfig::default(),
        }
    }
}

impl RobotConfig {
    pub fn from_yaml_str(raw: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(raw).context("decoding robot config")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelMap {
    pub speech: ChannelSettings,
    pub gaze: ChannelSettings,
    pub expression: ChannelSettings,
    pub gesture: ChannelSettings,
}

impl Default for ChannelMap {
    fn default() -> Self {
        Self {
            speech: ChannelSettings::new("text_to_speech", GoalMode::Single),
            gaze: ChannelSettings::new("gaze", GoalMode::Single),
            expression: ChannelSettings::new("expression", GoalMode::Multi),
            gesture: ChannelSettings::new("gesture", GoalMode::Multi),
        }
    }
}

impl ChannelMap {
    pub fn get(&self, modality: Modality) -> &ChannelSettings {
        match modality {
            Modality::Speech => &self.speech,
            Modality::Gaze => &self.gaze,
            Modality::Expression => &self.expression,
            Modality::Gesture => &self.gesture,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct GazeDefaults {
    pub speed: f32,
    pub acceleration: f32,
}

impl Default for GazeDefaults {
    fn default() -> Self {
        Self {
            speed: 0.5,
            acceleration: 0.3,
        }
    }
}

/// Settings for the in-process mock backends used by demos.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct MockActuatorConfig {
    /// Delay between speech feedback ticks, one tick per word.
    pub word_tick_ms: u64,
}

impl Default for MockActuatorConfig {
    fn default() -> Self {
        Self { word_tick_ms: 250 }
    }
}

impl MockActuatorConfig {
    pub fn word_tick(&self) -> Duration {
        Duration::from_millis(self.word_tick_ms)
    }
}

pub fn load_config(path: impl AsRef<Path>) -> anyhow::Result<RobotConfig> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading robot config: {}", path.display()))?;
    let config: RobotConfig = serde_yaml::from_str(&raw)
        .with_context(|| format!("parsing yaml: {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_original_channel_layout() {
        let cfg = RobotConfig::default();
        assert_eq!(cfg.channels.speech.name, "text_to_speech");
        assert_eq!(cfg.channels.speech.mode, GoalMode::Single);
        assert_eq!(cfg.channels.gesture.mode, GoalMode::Multi);
        assert_eq!(cfg.channels.gaze.connect_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.gaze.speed, 0.5);
        assert_eq!(cfg.gaze.acceleration, 0.3);
    }

    #[test]
    fn partial_yaml_keeps_defaults() -> anyhow::Result<()> {
        let cfg = RobotConfig::from_yaml_str(
            r#"
robot_id: pepper
channels:
  gesture:
    name: arms
    mode: single
    connect_timeout_ms: 100
vocabulary:
  expressions: [happy]
  gestures: [wave]
"#,
        )?;
        assert_eq!(cfg.robot_id, "pepper");
        assert_eq!(cfg.channels.gesture.name, "arms");
        assert_eq!(cfg.channels.gesture.mode, GoalMode::Single);
        assert_eq!(cfg.channels.speech.name, "text_to_speech");
        assert!(cfg.vocabulary.is_expression("happy"));
        assert!(!cfg.vocabulary.is_expression("smile"));
        Ok(())
    }

    #[test]
    fn load_reports_path_on_error() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "robot_id: [unterminated")?;
        let err = load_config(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("parsing yaml"));

        let mut good = tempfile::NamedTempFile::new()?;
        writeln!(good, "mock:\n  word_tick_ms: 10")?;
        assert_eq!(load_config(good.path())?.mock.word_tick(), Duration::from_millis(10));
        Ok(())
    }
}
