use crate::config::ChannelMap;
use actuator_link::{ActuatorBackend, ActuatorChannel, Modality, Result};
use std::sync::Arc;

const MODALITIES: [Modality; 4] = [
    Modality::Speech,
    Modality::Gaze,
    Modality::Expression,
    Modality::Gesture,
];

/// One backend per modality.
#[derive(Clone)]
pub struct Backends {
    pub speech: Arc<dyn ActuatorBackend>,
    pub gaze: Arc<dyn ActuatorBackend>,
    pub expression: Arc<dyn ActuatorBackend>,
    pub gesture: Arc<dyn ActuatorBackend>,
}

#[derive(Clone)]
pub(crate) struct Channels {
    speech: ActuatorChannel,
    gaze: ActuatorChannel,
    expression: ActuatorChannel,
    gesture: ActuatorChannel,
}

impl Channels {
    pub(crate) fn new(settings: &ChannelMap, backends: Backends) -> Self {
        Self {
            speech: ActuatorChannel::new(Modality::Speech, settings.speech.clone(), backends.speech),
            gaze: ActuatorChannel::new(Modality::Gaze, settings.gaze.clone(), backends.gaze),
            expression: ActuatorChannel::new(
                Modality::Expression,
                settings.expression.clone(),
                backends.expression,
            ),
            gesture: ActuatorChannel::new(
                Modality::Gesture,
                settings.gesture.clone(),
                backends.gesture,
            ),
        }
    }

    pub(crate) fn get(&self, modality: Modality) -> &ActuatorChannel {
        match modality {
            Modality::Speech => &self.speech,
            Modality::Gaze => &self.gaze,
            Modality::Expression => &self.expression,
            Modality::Gesture => &self.gesture,
        }
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &ActuatorChannel> {
        MODALITIES.into_iter().map(move |m| self.get(m))
    }

    pub(crate) fn ensure_ready(&self) -> Result<()> {
        self.iter().try_for_each(ActuatorChannel::ensure_ready)
    }
}

#[cfg(feature = "mock")]
pub use mock::MockBackends;

#[cfg(feature = "mock")]
mod mock {
    use super::Backends;
    use crate::config::RobotConfig;
    use actuator_link::{MockActuator, MockBehavior};
    use std::sync::Arc;
    use utterance_parser::Tokenizer;

    /// In-process backends for every modality, kept reachable so tests and
    /// demos can inspect and drive them.
    #[derive(Clone)]
    pub struct MockBackends {
        pub speech: Arc<MockActuator>,
        pub gaze: Arc<MockActuator>,
        pub expression: Arc<MockActuator>,
        pub gesture: Arc<MockActuator>,
    }

    impl MockBackends {
        pub fn new(config: &RobotConfig, behavior: MockBehavior) -> Self {
            let make = |settings: &actuator_link::ChannelSettings| {
                Arc::new(MockActuator::with_behavior(&settings.name, settings.mode, behavior))
            };
            Self {
                speech: make(&config.channels.speech),
                gaze: make(&config.channels.gaze),
                expression: make(&config.channels.expression),
                gesture: make(&config.channels.gesture),
            }
        }

        /// Scripted backends ticking at the configured word rate, one tick
        /// per word as the utterance compiler counts them.
        pub fn scripted(config: &RobotConfig) -> crate::Result<Self> {
            let mut mocks = Self::new(
                config,
                MockBehavior::Scripted {
                    tick: config.mock.word_tick(),
                },
            );
            let tokenizer = Tokenizer::new()?;
            let speech = &config.channels.speech;
            mocks.speech = Arc::new(
                MockActuator::scripted(&speech.name, speech.mode, config.mock.word_tick())
                    .with_word_counter(Arc::new(move |sentence: &str| {
                        u32::try_from(tokenizer.num_words(sentence)).unwrap_or(u32::MAX)
                    })),
            );
            Ok(mocks)
        }

        pub fn backends(&self) -> Backends {
            Backends {
                speech: self.speech.clone(),
                gaze: self.gaze.clone(),
                expression: self.expression.clone(),
                gesture: self.gesture.clone(),
            }
        }
    }
}
