//! Token estimation utilities.
//!
//! Two strategies are available. The exact one runs a real BPE tokenizer
//! for the configured model; the heuristic one counts Latin word runs and
//! CJK characters with regexes and needs no tokenizer data at all.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tiktoken_rs::CoreBPE;
use tokenizers::Tokenizer as HfTokenizer;
use tracing::{debug, warn};

/// File name of a Hugging Face tokenizer inside a model directory.
const TOKENIZER_FILE: &str = "tokenizer.json";

/// Token estimation strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimationMethod {
    /// Model-aware subword tokenizer with a lazily loaded fallback.
    Exact,
    /// Regex word/CJK-character count.
    Heuristic,
}

impl Default for EstimationMethod {
    fn default() -> Self {
        Self::Exact
    }
}

/// Tokenizer used when the model has no known BPE encoding.
enum Fallback {
    /// Hugging Face `tokenizer.json` loaded from the override path.
    Hf(Box<HfTokenizer>),
    /// General-purpose `cl100k_base` encoding.
    Bpe(CoreBPE),
}

/// Token estimator for counting tokens from text.
///
/// Cloning is cheap: loaded tokenizers are shared between clones.
#[derive(Clone)]
pub struct TokenEstimator {
    method: EstimationMethod,
    /// Tokenizer override when set, else the model id.
    tokenizer_name: String,
    primary: Arc<OnceLock<Option<CoreBPE>>>,
    fallback: Arc<OnceLock<Option<Fallback>>>,
}

impl std::fmt::Debug for TokenEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenEstimator")
            .field("method", &self.method)
            .field("tokenizer_name", &self.tokenizer_name)
            .finish()
    }
}

impl TokenEstimator {
    /// Create an estimator for `model`.
    ///
    /// `tokenizer_override` replaces the model id as tokenizer key. When it
    /// names a `tokenizer.json` file, or a model directory holding one, that
    /// tokenizer is also the fallback.
    pub fn new(method: EstimationMethod, model: &str, tokenizer_override: Option<&str>) -> Self {
        Self {
            method,
            tokenizer_name: tokenizer_override.unwrap_or(model).to_string(),
            primary: Arc::new(OnceLock::new()),
            fallback: Arc::new(OnceLock::new()),
        }
    }

    /// Create a heuristic estimator that never loads tokenizer data.
    pub fn heuristic() -> Self {
        Self::new(EstimationMethod::Heuristic, "", None)
    }

    /// The configured strategy.
    pub fn method(&self) -> EstimationMethod {
        self.method
    }

    /// Estimate tokens from text.
    pub fn estimate(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        match self.method {
            EstimationMethod::Heuristic => heuristic_count(text),
            EstimationMethod::Exact => self.exact_count(text),
        }
    }

    fn exact_count(&self, text: &str) -> usize {
        if let Some(bpe) = self.primary() {
            return bpe.encode_ordinary(text).len();
        }

        match self.fallback() {
            Some(Fallback::Hf(tokenizer)) => match tokenizer.encode(text, false) {
                Ok(encoding) => encoding.get_ids().len(),
                Err(e) => {
                    warn!(error = %e, "fallback tokenizer failed, using heuristic count");
                    heuristic_count(text)
                }
            },
            Some(Fallback::Bpe(bpe)) => bpe.encode_ordinary(text).len(),
            None => heuristic_count(text),
        }
    }

    fn primary(&self) -> Option<&CoreBPE> {
        self.primary
            .get_or_init(|| match tiktoken_rs::get_bpe_from_model(&self.tokenizer_name) {
                Ok(bpe) => Some(bpe),
                Err(e) => {
                    debug!(tokenizer = %self.tokenizer_name, error = %e, "no BPE encoding for tokenizer name");
                    None
                }
            })
            .as_ref()
    }

    fn fallback(&self) -> Option<&Fallback> {
        self.fallback
            .get_or_init(|| {
                if let Some(path) = tokenizer_file(Path::new(&self.tokenizer_name)) {
                    match HfTokenizer::from_file(&path) {
                        Ok(tokenizer) => return Some(Fallback::Hf(Box::new(tokenizer))),
                        Err(e) => {
                            warn!(path = %path.display(), error = %e, "failed to load tokenizer file")
                        }
                    }
                }
                match tiktoken_rs::cl100k_base() {
                    Ok(bpe) => Some(Fallback::Bpe(bpe)),
                    Err(e) => {
                        warn!(error = %e, "cl100k_base unavailable, token counts are heuristic");
                        None
                    }
                }
            })
            .as_ref()
    }
}

/// `tokenizer.json` for a file path or a model directory containing one.
fn tokenizer_file(path: &Path) -> Option<PathBuf> {
    if path.is_file() {
        return Some(path.to_path_buf());
    }
    if path.is_dir() {
        let candidate = path.join(TOKENIZER_FILE);
        if candidate.is_file() {
            return Some(candidate);
        }
        debug!(dir = %path.display(), "model directory has no tokenizer.json");
    }
    None
}

fn latin_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z0-9]+").expect("valid latin run regex"))
}

fn cjk_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\u{4e00}-\u{9fff}]+").expect("valid cjk regex"))
}

/// Count Latin words and CJK characters.
pub fn heuristic_count(text: &str) -> usize {
    let latin = latin_runs().find_iter(text).count();
    let cjk: usize = cjk_runs()
        .find_iter(text)
        .map(|m| m.as_str().chars().count())
        .sum();
    latin + cjk
}
