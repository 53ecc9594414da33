//! Binary-search prompt truncation.
//!
//! Over-long prompts are cut down to a token budget by keeping whole word
//! units from the front, the rear, or both ends of the text. Chinese text is
//! split with a word segmenter, everything else on single spaces.

use std::sync::OnceLock;

use jieba_rs::Jieba;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::estimator::TokenEstimator;

/// Which part of an over-long prompt is kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TruncationMode {
    /// Never truncate.
    #[default]
    None,
    /// Drop the front, keep the last units.
    Front,
    /// Drop the middle, keep units from both ends.
    Mid,
    /// Drop the rear, keep the first units.
    Rear,
}

impl TruncationMode {
    /// Whether prompts are truncated at all.
    pub fn is_enabled(&self) -> bool {
        !matches!(self, TruncationMode::None)
    }
}

fn jieba() -> &'static Jieba {
    static JIEBA: OnceLock<Jieba> = OnceLock::new();
    JIEBA.get_or_init(Jieba::new)
}

fn chinese_char() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\u{4e00}-\u{9fa5}]").expect("valid chinese regex"))
}

/// Word units of `text` and the separator that rejoins them.
fn split_units(text: &str) -> (Vec<&str>, &'static str) {
    if chinese_char().is_match(text) {
        (jieba().cut(text, true), "")
    } else {
        (text.split(' ').collect(), " ")
    }
}

fn char_units(text: &str) -> Vec<&str> {
    text.char_indices()
        .map(|(i, c)| &text[i..i + c.len_utf8()])
        .collect()
}

/// Truncates prompts to a token budget.
#[derive(Debug, Clone)]
pub struct Truncator {
    estimator: TokenEstimator,
    mode: TruncationMode,
}

impl Truncator {
    /// Create a truncator that measures with `estimator`.
    pub fn new(estimator: TokenEstimator, mode: TruncationMode) -> Self {
        Self { estimator, mode }
    }

    /// The configured mode.
    pub fn mode(&self) -> TruncationMode {
        self.mode
    }

    /// Shrink `text` until its estimated length is at most `budget`.
    ///
    /// Text that already fits is returned unchanged. Callers must skip the
    /// request instead of calling this with a budget `<= 0`.
    ///
    /// The result is never empty, so it can still exceed `budget` when a
    /// single character costs more than the budget (an emoji is several
    /// subword tokens). Re-estimate the returned text before sizing the
    /// output length.
    pub fn truncate(&self, text: &str, budget: i64) -> String {
        if !self.mode.is_enabled() || self.fits(text, budget) {
            return text.to_string();
        }

        let (units, sep) = split_units(text);
        let fragment = self.search(&units, sep, budget);
        if self.fits(&fragment, budget) {
            debug!(
                mode = ?self.mode,
                budget,
                units = units.len(),
                "truncated prompt on word units"
            );
            return fragment;
        }

        // a single word unit is already over budget
        let chars = char_units(text);
        self.search(&chars, "", budget)
    }

    fn fits(&self, text: &str, budget: i64) -> bool {
        self.estimator.estimate(text) as i64 <= budget
    }

    /// Largest `k` found to fit, narrowed until the interval is at most 2 wide.
    fn search(&self, units: &[&str], sep: &str, budget: i64) -> String {
        let (mut lo, mut hi) = (1usize, units.len());
        while lo + 2 < hi {
            let mid = (lo + hi) / 2;
            if self.fits(&self.fragment(units, sep, mid), budget) {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        self.fragment(units, sep, lo)
    }

    fn fragment(&self, units: &[&str], sep: &str, k: usize) -> String {
        let k = k.min(units.len());
        let head = || units[..k].join(sep);
        let tail = || units[units.len() - k..].join(sep);
        match self.mode {
            TruncationMode::Front => tail(),
            TruncationMode::Rear => head(),
            TruncationMode::Mid => head() + &tail(),
            TruncationMode::None => units.join(sep),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::EstimationMethod;

    const WORDS: &str = "one two three four five six seven eight nine ten \
                         eleven twelve thirteen fourteen fifteen sixteen seventeen eighteen nineteen twenty";

    fn truncator(mode: TruncationMode) -> Truncator {
        Truncator::new(TokenEstimator::heuristic(), mode)
    }

    #[test]
    fn test_fitting_text_is_unchanged() {
        for mode in [TruncationMode::Front, TruncationMode::Mid, TruncationMode::Rear] {
            assert_eq!(truncator(mode).truncate(WORDS, 20), WORDS);
            assert_eq!(truncator(mode).truncate(WORDS, 1_000), WORDS);
        }
    }

    #[test]
    fn test_none_mode_never_truncates() {
        assert_eq!(truncator(TruncationMode::None).truncate(WORDS, 3), WORDS);
    }

    #[test]
    fn test_front_keeps_suffix() {
        let out = truncator(TruncationMode::Front).truncate(WORDS, 5);
        assert_eq!(out, "sixteen seventeen eighteen nineteen twenty");
        assert!(WORDS.ends_with(&out));
    }

    #[test]
    fn test_rear_keeps_prefix() {
        let t = truncator(TruncationMode::Rear);
        let out = t.truncate(WORDS, 5);
        assert_eq!(out, "one two three four five");
        assert!(WORDS.starts_with(&out));
    }

    #[test]
    fn test_mid_adjoins_both_ends() {
        let t = truncator(TruncationMode::Mid);
        let out = t.truncate(WORDS, 6);
        assert!(out.starts_with("one two three"));
        assert!(out.ends_with("eighteen nineteen twenty"));
        assert!(TokenEstimator::heuristic().estimate(&out) <= 6);
    }

    #[test]
    fn test_output_fits_and_is_non_empty() {
        let estimator = TokenEstimator::heuristic();
        for mode in [TruncationMode::Front, TruncationMode::Mid, TruncationMode::Rear] {
            for budget in 1..20 {
                let out = truncator(mode).truncate(WORDS, budget);
                assert!(!out.is_empty(), "{mode:?} budget {budget}");
                assert!(estimator.estimate(&out) as i64 <= budget, "{mode:?} budget {budget}");
            }
        }
    }

    #[test]
    fn test_chinese_front_keeps_suffix() {
        let text = "今天天气很好我们一起去公园散步然后回家吃饭";
        let out = truncator(TruncationMode::Front).truncate(text, 4);
        assert!(!out.is_empty());
        assert!(text.ends_with(&out));
        assert!(TokenEstimator::heuristic().estimate(&out) <= 4);
    }

    #[test]
    fn test_single_overlong_word_falls_back_to_chars() {
        let text = "a-b-c-d-e-f-g-h";
        let out = truncator(TruncationMode::Rear).truncate(text, 3);
        assert_eq!(out, "a-b-c-");
    }

    #[test]
    fn test_single_char_over_budget_is_kept() {
        let estimator = TokenEstimator::new(EstimationMethod::Exact, "gpt-4", None);
        let text = "🤖🤖🤖🤖🤖🤖";
        let out = Truncator::new(estimator.clone(), TruncationMode::Front).truncate(text, 1);
        assert_eq!(out, "🤖");
        assert!(text.ends_with(&out));
        assert!(estimator.estimate(&out) > 1);
    }

    #[test]
    fn test_mode_deserializes_lowercase() {
        let mode: TruncationMode = serde_json::from_str("\"front\"").unwrap();
        assert_eq!(mode, TruncationMode::Front);
        assert!(!TruncationMode::default().is_enabled());
    }
}
