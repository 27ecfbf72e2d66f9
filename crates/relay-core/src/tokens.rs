//! Token estimation used for usage accounting when a vendor does not report
//! completion counts.

/// Counts tokens of a text for a model
pub trait TokenCounter: Send + Sync {
    /// Estimated token count of `text` under `model`
    fn count_tokens(&self, text: &str, model: &str) -> u32;
}

impl<F> TokenCounter for F
where
    F: Fn(&str, &str) -> u32 + Send + Sync,
{
    fn count_tokens(&self, text: &str, model: &str) -> u32 {
        self(text, model)
    }
}

/// Character-ratio estimator: roughly four characters per token
#[derive(Debug, Clone, Copy)]
pub struct EstimatingTokenCounter {
    chars_per_token: u32,
}

impl EstimatingTokenCounter {
    /// Estimator with a custom ratio (clamped to at least 1)
    #[must_use]
    pub fn with_ratio(chars_per_token: u32) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
        }
    }
}

impl Default for EstimatingTokenCounter {
    fn default() -> Self {
        Self { chars_per_token: 4 }
    }
}

impl TokenCounter for EstimatingTokenCounter {
    fn count_tokens(&self, text: &str, _model: &str) -> u32 {
        let chars = u32::try_from(text.chars().count()).unwrap_or(u32::MAX);
        if chars == 0 {
            return 0;
        }
        chars.div_ceil(self.chars_per_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate() {
        let counter = EstimatingTokenCounter::default();
        assert_eq!(counter.count_tokens("", "m"), 0);
        assert_eq!(counter.count_tokens("hi", "m"), 1);
        assert_eq!(counter.count_tokens("hello world!", "m"), 3);
        assert_eq!(counter.count_tokens("你好你好你", "m"), 2);
    }

    #[test]
    fn test_closure_counter() {
        let counter = |text: &str, _model: &str| text.split_whitespace().count() as u32;
        assert_eq!(counter.count_tokens("one two three", "ERNIE-Bot"), 3);
    }
}
