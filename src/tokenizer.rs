//! Token Counter - Pre-flight budget estimation
//!
//! Approximates token usage BEFORE calling the completion API to:
//! - Keep the conversation window under the model's context limit
//! - Size `max_tokens` for the response
//! - Refuse requests that leave no room for an answer
//!
//! Counting is a whitespace word count, not a real tokenizer. The error is
//! accepted: the budget keeps a reserve for exactly that reason.

use crate::history::Turn;

/// Default context limit of the hosted model (tokens)
pub const DEFAULT_TOKEN_LIMIT: usize = 8193;

/// Reserve kept free below the limit when truncating, and the smallest
/// response budget worth sending a request for
pub const MIN_RESPONSE_TOKENS: usize = 100;

/// Upper bound on `max_tokens` requested per response
pub const MAX_RESPONSE_TOKENS: usize = 1024;

/// Estimate the token count of a text (whitespace-delimited words)
pub fn estimate(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Estimate the token count of a whole history
pub fn estimate_history(turns: &[Turn]) -> usize {
    turns.iter().map(|t| estimate(&t.content)).sum()
}

/// Budget check result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetCheck {
    /// Request can go out with this `max_tokens`
    Ok { max_tokens: usize },
    /// Not enough room left for a useful answer
    Exceeded { remaining: usize },
}

/// Context window policy for one model
#[derive(Debug, Clone, Copy)]
pub struct TokenBudget {
    /// Model context limit
    pub limit: usize,
    /// Minimum viable response size (also the truncation reserve)
    pub min_response: usize,
    /// Cap for `max_tokens`
    pub max_response: usize,
}

impl Default for TokenBudget {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_LIMIT)
    }
}

impl TokenBudget {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            min_response: MIN_RESPONSE_TOKENS,
            max_response: MAX_RESPONSE_TOKENS,
        }
    }

    /// Budget the history is truncated to
    pub fn truncation_budget(&self) -> usize {
        self.limit.saturating_sub(self.min_response)
    }

    /// Evict oldest turns until the history fits the truncation budget.
    ///
    /// Never removes the last remaining turn, even if it alone is over budget.
    /// Returns the number of evicted turns.
    pub fn truncate(&self, history: &mut Vec<Turn>) -> usize {
        let budget = self.truncation_budget();
        let mut total = estimate_history(history);
        let mut evict = 0;

        while total > budget && history.len() - evict > 1 {
            total -= estimate(&history[evict].content);
            evict += 1;
        }

        history.drain(..evict);
        evict
    }

    /// `max_tokens` for the next response, or a refusal.
    ///
    /// The raw remaining room (`limit - estimate`) is compared against the
    /// minimum before clamping into `[min_response, max_response]`.
    pub fn check(&self, history: &[Turn]) -> BudgetCheck {
        let remaining = self.limit.saturating_sub(estimate_history(history));

        if remaining < self.min_response {
            BudgetCheck::Exceeded { remaining }
        } else {
            BudgetCheck::Ok {
                max_tokens: self.max_response_budget(history),
            }
        }
    }

    /// `clamp(limit - estimate_history, min_response, max_response)`
    pub fn max_response_budget(&self, history: &[Turn]) -> usize {
        self.limit
            .saturating_sub(estimate_history(history))
            .clamp(self.min_response, self.max_response)
    }
}

/// Format token count for display
pub fn format_tokens(tokens: usize) -> String {
    if tokens >= 1_000_000 {
        format!("{:.1}M", tokens as f64 / 1_000_000.0)
    } else if tokens >= 1_000 {
        format!("{:.1}K", tokens as f64 / 1_000.0)
    } else {
        tokens.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        vec!["w"; n].join(" ")
    }

    #[test]
    fn test_estimate() {
        assert_eq!(estimate(""), 0);
        assert_eq!(estimate("   \n\t "), 0);
        assert_eq!(estimate("Hello"), 1);
        assert_eq!(estimate("  hello   big\nworld\t!  "), 4);
        assert_eq!(estimate("こんにちは 世界"), 2);
    }

    #[test]
    fn test_estimate_history() {
        let history = vec![Turn::user("one two"), Turn::assistant("three four five")];
        assert_eq!(estimate_history(&history), 5);
        assert_eq!(estimate_history(&[]), 0);
    }

    #[test]
    fn test_truncate_evicts_oldest_first() {
        let budget = TokenBudget::new(110); // truncation budget: 10
        let mut history = vec![
            Turn::user(&words(4)),
            Turn::assistant(&words(4)),
            Turn::user(&words(4)),
        ];

        let evicted = budget.truncate(&mut history);
        assert_eq!(evicted, 1);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0], Turn::assistant(&words(4)));
        assert!(estimate_history(&history) <= budget.truncation_budget());
    }

    #[test]
    fn test_truncate_keeps_single_oversized_turn() {
        let budget = TokenBudget::new(110);
        let mut history = vec![Turn::user(&words(3)), Turn::user(&words(50))];

        budget.truncate(&mut history);
        assert_eq!(history, vec![Turn::user(&words(50))]);

        // Already a single turn: untouched
        assert_eq!(budget.truncate(&mut history), 0);
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_truncate_is_idempotent() {
        let budget = TokenBudget::new(120);
        let mut history: Vec<Turn> = (1..=8).map(|n| Turn::user(&words(n))).collect();
        let original_len = history.len();

        budget.truncate(&mut history);
        let once = history.clone();
        budget.truncate(&mut history);

        assert_eq!(history, once);
        assert!(history.len() <= original_len);
        assert!(estimate_history(&history) <= budget.truncation_budget() || history.len() == 1);
    }

    #[test]
    fn test_truncate_empty_history() {
        let mut history = Vec::new();
        assert_eq!(TokenBudget::default().truncate(&mut history), 0);
        assert!(history.is_empty());
    }

    #[test]
    fn test_max_response_budget_clamps() {
        let budget = TokenBudget::default();

        // 8193 - 1 = 8192 -> capped at 1024
        assert_eq!(budget.max_response_budget(&[Turn::user("Hello")]), 1024);

        // 8193 - 7693 = 500
        assert_eq!(budget.max_response_budget(&[Turn::user(&words(7693))]), 500);

        // Below the floor -> raised to 100
        assert_eq!(budget.max_response_budget(&[Turn::user(&words(8150))]), 100);
    }

    #[test]
    fn test_budget_check() {
        let budget = TokenBudget::default();

        let check = budget.check(&[Turn::user("Hello")]);
        assert_eq!(check, BudgetCheck::Ok { max_tokens: 1024 });

        let check = budget.check(&[Turn::user(&words(8100))]);
        assert_eq!(check, BudgetCheck::Exceeded { remaining: 93 });

        // Exactly the minimum still goes out
        let check = budget.check(&[Turn::user(&words(8093))]);
        assert_eq!(check, BudgetCheck::Ok { max_tokens: 100 });
    }

    #[test]
    fn test_format() {
        assert_eq!(format_tokens(500), "500");
        assert_eq!(format_tokens(1500), "1.5K");
        assert_eq!(format_tokens(1_500_000), "1.5M");
    }
}
