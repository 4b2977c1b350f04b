//! utterance-parser: annotated robot utterances to timed plans
//!
//! An utterance is plain text with optional expression and gesture tags:
//!
//! ```text
//! <happy intensity="0.8">Hi</happy> <wave target="person1">there</wave>
//! ```
//!
//! [`UtteranceCompiler::compile`] strips the tags into the spoken sentence and
//! records, per 1-based word index, which expression or gesture starts there
//! and where gaze should move to a new listener.

mod error;
pub use error::{OracleError, ParseError, Result};

pub mod markup;
pub use markup::{parse_fragment, text_runs, Element, Node};

mod words;
pub use words::{normalize_whitespace, Tokenizer};

mod oracle;
pub use oracle::{TimingOracle, WordRateOracle};

mod compile;
pub use compile::{Cue, UtteranceCompiler, UtterancePlan, Vocabulary, DEFAULT_INTENSITY, DEFAULT_SPEED};
