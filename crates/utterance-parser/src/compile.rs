//! Compiles annotated text into an [`UtterancePlan`].

use crate::markup::{parse_fragment, text_runs, Element, Node};
use crate::words::{normalize_whitespace, Tokenizer};
use crate::{ParseError, Result, TimingOracle};
use actuator_link::{ExpressionGoal, GestureGoal};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

pub const DEFAULT_INTENSITY: f32 = 0.5;
pub const DEFAULT_SPEED: f32 = 0.5;

/// Expression and gesture names tags may use. Matching is case-sensitive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vocabulary {
    #[serde(default)]
    pub expressions: BTreeSet<String>,
    #[serde(default)]
    pub gestures: BTreeSet<String>,
}

impl Vocabulary {
    pub fn new<E, G, S, T>(expressions: E, gestures: G) -> Self
    where
        E: IntoIterator<Item = S>,
        G: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        Self {
            expressions: expressions.into_iter().map(Into::into).collect(),
            gestures: gestures.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_expression(&self, name: &str) -> bool {
        self.expressions.contains(name)
    }

    pub fn is_gesture(&self, name: &str) -> bool {
        self.gestures.contains(name)
    }
}

/// A goal bound to the span of words its tag enclosed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cue<G> {
    /// Words spoken before the tag.
    pub start_word: usize,
    /// `start_word` plus the words inside the tag.
    pub end_word: usize,
    pub goal: G,
}

/// Timed plan for one utterance.
///
/// Cue tables are keyed by the 1-based index of the first word inside the
/// tag, the index speech feedback reports when that word starts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UtterancePlan {
    pub sentence: String,
    pub word_count: usize,
    pub gaze_triggers: BTreeSet<usize>,
    pub expressions: BTreeMap<usize, Cue<ExpressionGoal>>,
    pub gestures: BTreeMap<usize, Cue<GestureGoal>>,
}

impl UtterancePlan {
    pub fn is_gaze_trigger(&self, word: usize) -> bool {
        self.gaze_triggers.contains(&word)
    }

    pub fn expression_at(&self, word: usize) -> Option<&ExpressionGoal> {
        self.expressions.get(&word).map(|c| &c.goal)
    }

    pub fn gesture_at(&self, word: usize) -> Option<&GestureGoal> {
        self.gestures.get(&word).map(|c| &c.goal)
    }

    pub fn has_cues(&self) -> bool {
        !self.expressions.is_empty() || !self.gestures.is_empty()
    }
}

enum TagKind {
    Expression,
    Gesture { target: String },
}

pub struct UtteranceCompiler {
    tokenizer: Tokenizer,
}

impl UtteranceCompiler {
    pub fn new() -> Result<Self> {
        Ok(Self {
            tokenizer: Tokenizer::new()?,
        })
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    /// The spoken sentence: text runs concatenated, tags dropped, whitespace collapsed.
    pub fn sentence(&self, text: &str) -> Result<String> {
        Ok(sentence_of(&parse_fragment(text)?))
    }

    pub fn compile(
        &self,
        text: &str,
        vocabulary: &Vocabulary,
        oracle: &dyn TimingOracle,
    ) -> Result<UtterancePlan> {
        let nodes = parse_fragment(text)?;
        let raw = text_runs(&nodes).concat();
        let sentence = normalize_whitespace(&raw);
        let mut plan = UtterancePlan {
            word_count: self.tokenizer.num_words(&sentence),
            gaze_triggers: self.tokenizer.gaze_triggers(&sentence),
            sentence,
            ..UtterancePlan::default()
        };

        let mut walk = Walk {
            tokenizer: &self.tokenizer,
            vocabulary,
            oracle,
            raw: &raw,
            offset: 0,
            plan: &mut plan,
        };
        walk.visit(&nodes)?;

        debug!(
            words = plan.word_count,
            expressions = plan.expressions.len(),
            gestures = plan.gestures.len(),
            gaze_triggers = plan.gaze_triggers.len(),
            "compiled utterance"
        );
        Ok(plan)
    }
}

fn sentence_of(nodes: &[Node]) -> String {
    normalize_whitespace(&text_runs(nodes).concat())
}

struct Walk<'a> {
    tokenizer: &'a Tokenizer,
    vocabulary: &'a Vocabulary,
    oracle: &'a dyn TimingOracle,
    /// All text runs concatenated; `offset` is how far the walk has read.
    raw: &'a str,
    offset: usize,
    plan: &'a mut UtterancePlan,
}

impl Walk<'_> {
    fn visit(&mut self, nodes: &[Node]) -> Result<()> {
        for node in nodes {
            match node {
                Node::Text(text) => self.offset += text.len(),
                Node::Element(el) => {
                    let kind = self.classify(el)?;
                    // A tag opening mid-word belongs to that word.
                    let start_word = self.tokenizer.words_ending_by(self.raw, self.offset);
                    self.visit(&el.children)?;
                    let end_word = self.tokenizer.words_starting_before(self.raw, self.offset);
                    self.add_cue(el, kind, start_word, end_word)?;
                }
            }
        }
        Ok(())
    }

    fn classify(&self, el: &Element) -> Result<TagKind> {
        if self.vocabulary.is_expression(&el.name) {
            return Ok(TagKind::Expression);
        }
        if self.vocabulary.is_gesture(&el.name) {
            let target = el
                .attribute("target")
                .ok_or_else(|| ParseError::MissingTarget(el.name.clone()))?;
            return Ok(TagKind::Gesture {
                target: target.to_string(),
            });
        }
        Err(ParseError::UnknownTag(el.name.clone()))
    }

    fn add_cue(&mut self, el: &Element, kind: TagKind, start_word: usize, end_word: usize) -> Result<()> {
        let duration = self
            .oracle
            .estimate_duration(&self.plan.sentence, start_word, end_word)?;
        let key = start_word + 1;
        match kind {
            TagKind::Expression => {
                let goal = ExpressionGoal {
                    name: el.name.clone(),
                    intensity: Some(unit_attribute(el, "intensity", DEFAULT_INTENSITY)?),
                    speed: Some(unit_attribute(el, "speed", DEFAULT_SPEED)?),
                    duration: Some(duration),
                };
                let cue = Cue {
                    start_word,
                    end_word,
                    goal,
                };
                if self.plan.expressions.insert(key, cue).is_some() {
                    debug!(word = key, tag = %el.name, "expression cue replaced an earlier one");
                }
            }
            TagKind::Gesture { target } => {
                let goal = GestureGoal {
                    name: el.name.clone(),
                    target: Some(target),
                    duration: Some(duration),
                };
                let cue = Cue {
                    start_word,
                    end_word,
                    goal,
                };
                if self.plan.gestures.insert(key, cue).is_some() {
                    debug!(word = key, tag = %el.name, "gesture cue replaced an earlier one");
                }
            }
        }
        Ok(())
    }
}

fn unit_attribute(el: &Element, name: &str, default: f32) -> Result<f32> {
    let Some(raw) = el.attribute(name) else {
        return Ok(default);
    };
    match raw.trim().parse::<f32>() {
        Ok(v) if (0.0..=1.0).contains(&v) => Ok(v),
        _ => Err(ParseError::InvalidAttribute {
            tag: el.name.clone(),
            attribute: name.to_string(),
            value: raw.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{OracleError, WordRateOracle};
    use std::sync::Mutex;
    use std::time::Duration;

    fn vocab() -> Vocabulary {
        Vocabulary::new(["happy", "sad"], ["wave", "point"])
    }

    fn oracle() -> WordRateOracle {
        WordRateOracle::new(Duration::from_millis(100))
    }

    fn compile(text: &str) -> Result<UtterancePlan> {
        UtteranceCompiler::new()?.compile(text, &vocab(), &oracle())
    }

    #[test]
    fn plain_utterance_has_no_cues() {
        let plan = compile("Hello there").unwrap();
        assert_eq!(plan.sentence, "Hello there");
        assert_eq!(plan.word_count, 2);
        assert!(!plan.has_cues());
        assert!(plan.gaze_triggers.is_empty());
    }

    #[test]
    fn tagged_utterance_builds_tables() {
        let plan =
            compile(r#"<happy intensity="0.8">Hi</happy> <wave target="P">there</wave>"#).unwrap();
        assert_eq!(plan.sentence, "Hi there");

        let happy = plan.expression_at(1).unwrap();
        assert_eq!(happy.name, "happy");
        assert_eq!(happy.intensity, Some(0.8));
        assert_eq!(happy.speed, Some(0.5));
        assert_eq!(happy.duration, Some(Duration::from_millis(100)));

        let wave = plan.gesture_at(2).unwrap();
        assert_eq!(wave.name, "wave");
        assert_eq!(wave.target.as_deref(), Some("P"));
        assert_eq!(plan.gestures[&2].start_word, 1);
        assert_eq!(plan.gestures[&2].end_word, 2);
    }

    #[test]
    fn span_indices_follow_preceding_words() {
        let plan =
            compile(r#"Well, I think <sad speed="0.2">this is not great</sad> news."#).unwrap();
        let cue = &plan.expressions[&4];
        assert_eq!(cue.start_word, 3);
        assert_eq!(cue.end_word, 7);
        assert_eq!(cue.goal.speed, Some(0.2));
        assert_eq!(cue.goal.duration, Some(Duration::from_millis(400)));
        assert_eq!(plan.sentence, "Well, I think this is not great news.");
    }

    #[test]
    fn nested_tags_count_inner_text_once() {
        let plan = compile(r#"<happy>so <point target="door">over there</point></happy> now"#)
            .unwrap();
        assert_eq!(plan.sentence, "so over there now");
        assert_eq!(plan.expressions[&1].end_word, 3);
        assert_eq!(plan.gestures[&2].start_word, 1);
        assert_eq!(plan.gestures[&2].end_word, 3);
    }

    #[test]
    fn missing_target_is_reported() {
        let err = compile("<wave>there</wave>").unwrap_err();
        assert_eq!(err, ParseError::MissingTarget("wave".into()));
    }

    #[test]
    fn unknown_and_case_mismatched_tags_fail() {
        assert_eq!(
            compile("<dance>now</dance>").unwrap_err(),
            ParseError::UnknownTag("dance".into())
        );
        assert_eq!(
            compile("<Happy>now</Happy>").unwrap_err(),
            ParseError::UnknownTag("Happy".into())
        );
    }

    #[test]
    fn out_of_range_attributes_fail() {
        for bad in [r#"<happy intensity="1.5">x</happy>"#, r#"<happy speed="fast">x</happy>"#] {
            assert!(matches!(
                compile(bad),
                Err(ParseError::InvalidAttribute { .. })
            ));
        }
    }

    #[test]
    fn same_start_word_keeps_last_tag() {
        let plan = compile(r#"<happy/><sad>b</sad>"#).unwrap();
        assert_eq!(plan.expressions.len(), 1);
        assert_eq!(plan.expression_at(1).unwrap().name, "sad");

        // Adjacent runs form one word, so both tags start on it.
        let plan = compile(r#"<happy>a</happy><sad>b</sad>"#).unwrap();
        assert_eq!(plan.sentence, "ab");
        assert_eq!(plan.expressions.len(), 1);
        assert_eq!(plan.expression_at(1).unwrap().name, "sad");
    }

    #[test]
    fn tag_inside_a_word_cues_that_word() {
        let plan = compile(r#"Say hel<happy>lo</happy> there"#).unwrap();
        assert_eq!(plan.sentence, "Say hello there");
        assert_eq!(plan.word_count, 3);
        let cue = &plan.expressions[&2];
        assert_eq!(cue.start_word, 1);
        assert_eq!(cue.end_word, 2);
    }

    #[test]
    fn punctuation_after_a_tag_stays_attached() {
        let plan = compile(r#"<happy>Hi</happy>, friend"#).unwrap();
        assert_eq!(plan.sentence, "Hi, friend");
        assert_eq!(plan.word_count, 2);
        assert_eq!(plan.gaze_triggers.iter().copied().collect::<Vec<_>>(), vec![2]);
        assert_eq!(plan.expressions[&1].end_word, 1);
    }

    #[test]
    fn oracle_sees_sentence_and_span() {
        let calls = Mutex::new(Vec::new());
        let recorder = |sentence: &str, start: usize, end: usize| -> std::result::Result<Duration, OracleError> {
            calls.lock().unwrap().push((sentence.to_string(), start, end));
            Ok(Duration::from_secs(1))
        };
        UtteranceCompiler::new()
            .unwrap()
            .compile(r#"Hi <wave target="P">you there</wave>"#, &vocab(), &recorder)
            .unwrap();
        assert_eq!(
            calls.into_inner().unwrap(),
            vec![("Hi you there".to_string(), 1, 3)]
        );
    }

    #[test]
    fn oracle_failure_aborts_compile() {
        let down = |_: &str, _: usize, _: usize| -> std::result::Result<Duration, OracleError> {
            Err(OracleError("timeout".into()))
        };
        let err = UtteranceCompiler::new()
            .unwrap()
            .compile(r#"<happy>Hi</happy>"#, &vocab(), &down)
            .unwrap_err();
        assert_eq!(err, ParseError::Timing(OracleError("timeout".into())));
    }

    #[test]
    fn sentence_is_idempotent() {
        let compiler = UtteranceCompiler::new().unwrap();
        let once = compiler
            .sentence(r#"  <happy>Hi</happy>   <wave target="P">there</wave>, friend "#)
            .unwrap();
        assert_eq!(once, "Hi there, friend");
        assert_eq!(compiler.sentence(&once).unwrap(), once);
    }

    #[test]
    fn word_count_matches_tagged_tokens() {
        let compiler = UtteranceCompiler::new().unwrap();
        let text = r#"<happy>Hello big</happy> <wave target="P">world</wave>"#;
        let sentence = compiler.sentence(text).unwrap();
        assert_eq!(compiler.tokenizer().num_words(&sentence), 3);
        let joined = compiler.sentence(r#"<happy>Hello big</happy><wave target="P">world</wave>"#);
        assert_eq!(joined.unwrap(), "Hello bigworld");
    }

    #[test]
    fn plan_serializes_with_word_keys() -> anyhow::Result<()> {
        let plan = compile(r#"Hi, <point target="door">look</point>"#)?;
        let json = serde_json::to_value(&plan)?;
        assert_eq!(json["sentence"], "Hi, look");
        assert_eq!(json["gaze_triggers"], serde_json::json!([2]));
        assert_eq!(json["gestures"]["2"]["goal"]["target"], "door");
        Ok(())
    }

    #[test]
    fn malformed_markup_fails_before_anything_else() {
        assert!(matches!(
            compile("<happy>Hi"),
            Err(ParseError::Malformed { .. })
        ));
    }
}
