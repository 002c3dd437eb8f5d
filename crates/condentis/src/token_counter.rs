use std::collections::HashMap;
use std::path::PathBuf;
use tokenizers::tokenizer::Tokenizer;

const GPT_4O_TOKENIZER_KEY: &str = "Xenova--gpt-4o";
const CLAUDE_TOKENIZER_KEY: &str = "Xenova--claude-tokenizer";
const QWEN_TOKENIZER_KEY: &str = "Qwen--Qwen2.5-Coder-32B-Instruct";

/// Tokenizer substituted when the model's own scheme is not loaded.
const DEFAULT_TOKENIZER_KEY: &str = GPT_4O_TOKENIZER_KEY;

/// Counts tokens per model and trims text to a token budget.
///
/// Tokenizers are loaded from `<dir>/<key>/tokenizer.json`. A model whose
/// tokenizer is missing falls back to the default (gpt-4o) tokenizer, and when
/// no tokenizer is loaded at all the counter estimates `max(1, chars / 4)`.
#[derive(Default)]
pub struct TokenCounter {
    tokenizers: HashMap<String, Tokenizer>,
    tokenizer_dir: Option<PathBuf>,
}

impl TokenCounter {
    /// A counter with no tokenizers loaded; every count is an estimate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the known tokenizers found under `dir`.
    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        let mut counter = TokenCounter {
            tokenizers: HashMap::new(),
            tokenizer_dir: Some(dir.into()),
        };
        for tokenizer_key in [
            GPT_4O_TOKENIZER_KEY,
            CLAUDE_TOKENIZER_KEY,
            QWEN_TOKENIZER_KEY,
        ] {
            counter.add_tokenizer(tokenizer_key);
        }
        counter
    }

    /// Load `tokenizer_key` from the tokenizer directory. Missing or broken
    /// files are logged and skipped.
    pub fn add_tokenizer(&mut self, tokenizer_key: &str) {
        let Some(dir) = &self.tokenizer_dir else {
            tracing::debug!(tokenizer_key, "no tokenizer directory configured");
            return;
        };
        let tokenizer_path = dir.join(tokenizer_key).join("tokenizer.json");
        if !tokenizer_path.is_file() {
            tracing::debug!(path = %tokenizer_path.display(), "tokenizer file not found");
            return;
        }

        match Tokenizer::from_file(&tokenizer_path) {
            Ok(tokenizer) => {
                self.tokenizers.insert(tokenizer_key.to_string(), tokenizer);
            }
            Err(e) => {
                tracing::warn!("Failed to load tokenizer {}: {}", tokenizer_key, e);
            }
        }
    }

    fn model_to_tokenizer_key(model_name: Option<&str>) -> &'static str {
        let model_name = model_name.unwrap_or("gpt-4o").to_lowercase();
        if model_name.contains("claude") {
            CLAUDE_TOKENIZER_KEY
        } else if model_name.contains("qwen") {
            QWEN_TOKENIZER_KEY
        } else {
            // default
            GPT_4O_TOKENIZER_KEY
        }
    }

    fn tokenizer_for(&self, model_name: Option<&str>) -> Option<&Tokenizer> {
        let tokenizer_key = Self::model_to_tokenizer_key(model_name);
        self.tokenizers
            .get(tokenizer_key)
            .or_else(|| self.tokenizers.get(DEFAULT_TOKENIZER_KEY))
    }

    pub fn count_tokens(&self, text: &str, model_name: Option<&str>) -> usize {
        match self.tokenizer_for(model_name) {
            Some(tokenizer) => match tokenizer.encode(text, false) {
                Ok(encoding) => encoding.len(),
                Err(e) => {
                    tracing::debug!("tokenizer failed, estimating instead: {}", e);
                    estimate_tokens(text)
                }
            },
            None => estimate_tokens(text),
        }
    }

    /// Trim `text` so that the part before `suffix` fits in
    /// `max_tokens - count(suffix)` tokens.
    ///
    /// Text already within budget is returned unchanged. With
    /// `preserve_lines`, whole lines are kept while they fit; if not even the
    /// first line fits, or without `preserve_lines`, the longest fitting
    /// character prefix is kept instead. When the suffix alone consumes the
    /// budget, the suffix clipped to `max_tokens` characters is returned.
    pub fn truncate(
        &self,
        text: &str,
        max_tokens: usize,
        model_name: Option<&str>,
        suffix: &str,
        preserve_lines: bool,
    ) -> String {
        if self.count_tokens(text, model_name) <= max_tokens {
            return text.to_string();
        }

        let suffix_tokens = self.count_tokens(suffix, model_name);
        if suffix_tokens >= max_tokens {
            return suffix.chars().take(max_tokens).collect();
        }
        let target = max_tokens - suffix_tokens;

        let kept = if preserve_lines {
            self.truncate_by_lines(text, target, model_name)
        } else {
            None
        };
        let kept = kept.unwrap_or_else(|| self.truncate_by_chars(text, target, model_name));

        format!("{kept}{suffix}")
    }

    fn truncate_by_lines<'t>(
        &self,
        text: &'t str,
        target: usize,
        model_name: Option<&str>,
    ) -> Option<&'t str> {
        let lines: Vec<&str> = text.split('\n').collect();
        let mut kept = 0;
        let mut used = 0;
        for line in &lines {
            let tokens = self.count_tokens(line, model_name);
            if used + tokens > target {
                break;
            }
            used += tokens;
            kept += 1;
        }

        if kept == 0 {
            return None;
        }
        let prefix = line_prefix(text, &lines, kept);
        if self.count_tokens(prefix, model_name) <= target {
            return Some(prefix);
        }

        // Per-line counts undercounted the joined text; search for the
        // longest run of whole lines that still fits.
        let (mut low, mut high) = (0, kept - 1);
        while low < high {
            let mid = (low + high + 1) / 2;
            if self.count_tokens(line_prefix(text, &lines, mid), model_name) <= target {
                low = mid;
            } else {
                high = mid - 1;
            }
        }
        (low > 0).then(|| line_prefix(text, &lines, low))
    }

    fn truncate_by_chars<'t>(&self, text: &'t str, target: usize, model_name: Option<&str>) -> &'t str {
        let boundaries: Vec<usize> = text
            .char_indices()
            .map(|(offset, _)| offset)
            .chain(std::iter::once(text.len()))
            .collect();

        let (mut low, mut high) = (0, boundaries.len() - 1);
        while low < high {
            let mid = (low + high + 1) / 2;
            if self.count_tokens(&text[..boundaries[mid]], model_name) <= target {
                low = mid;
            } else {
                high = mid - 1;
            }
        }
        &text[..boundaries[low]]
    }
}

/// The first `count` lines of `text`, without the trailing line break.
fn line_prefix<'t>(text: &'t str, lines: &[&str], count: usize) -> &'t str {
    let len = lines[..count].iter().map(|line| line.len()).sum::<usize>() + count - 1;
    &text[..len]
}

/// Rough token estimate used when no tokenizer is available.
pub fn estimate_tokens(text: &str) -> usize {
    std::cmp::max(1, text.chars().count() / 4)
}
