use crate::OracleError;
use std::time::Duration;

/// External service estimating how long speech takes to cover a word span.
///
/// `start_word` is the number of words before the span; `end_word` includes
/// the span's own words.
pub trait TimingOracle: Send + Sync {
    fn estimate_duration(
        &self,
        sentence: &str,
        start_word: usize,
        end_word: usize,
    ) -> Result<Duration, OracleError>;
}

impl<F> TimingOracle for F
where
    F: Fn(&str, usize, usize) -> Result<Duration, OracleError> + Send + Sync,
{
    fn estimate_duration(
        &self,
        sentence: &str,
        start_word: usize,
        end_word: usize,
    ) -> Result<Duration, OracleError> {
        self(sentence, start_word, end_word)
    }
}

/// Fixed speaking rate estimate, for tests and offline runs.
#[derive(Debug, Clone, Copy)]
pub struct WordRateOracle {
    pub per_word: Duration,
}

impl WordRateOracle {
    pub fn new(per_word: Duration) -> Self {
        Self { per_word }
    }
}

impl Default for WordRateOracle {
    fn default() -> Self {
        // Roughly 150 words per minute.
        Self::new(Duration::from_millis(400))
    }
}

impl TimingOracle for WordRateOracle {
    fn estimate_duration(
        &self,
        _sentence: &str,
        start_word: usize,
        end_word: usize,
    ) -> Result<Duration, OracleError> {
        let span = end_word.saturating_sub(start_word).max(1);
        let span = u32::try_from(span).map_err(|_| OracleError(format!("span of {span} words")))?;
        Ok(self.per_word * span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_rate_scales_with_span() {
        let oracle = WordRateOracle::new(Duration::from_millis(100));
        assert_eq!(
            oracle.estimate_duration("a b c", 0, 3).unwrap(),
            Duration::from_millis(300)
        );
        // Empty spans still last one word.
        assert_eq!(
            oracle.estimate_duration("a b c", 2, 2).unwrap(),
            Duration::from_millis(100)
        );
    }

    #[test]
    fn closures_are_oracles() {
        let failing = |_: &str, _: usize, _: usize| -> Result<Duration, OracleError> {
            Err(OracleError("service down".into()))
        };
        assert!(failing.estimate_duration("x", 0, 1).is_err());
    }
}
