//! Token counting traits and utilities

use crate::prompt::PromptPair;

pub mod tiktoken;

/// Trait for counting tokens in a string.
pub trait CountToken {
    fn count_token(&self, string: &str) -> usize;
}

/// Blanket impl of CountToken for Fn(&str) -> usize.
impl<F> CountToken for F where F: Fn(&str) -> usize {
    fn count_token(&self, string: &str) -> usize {
        self(string)
    }
}

/// Count the number of tokens in a string by the length of the string.
#[inline]
pub fn count_tokens_by_len(string: &str) -> usize {
    string.len()
}

/// Token counts of both halves of a [PromptPair].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptTokenCount {
    pub system: usize,
    pub user: usize,
}

impl PromptTokenCount {
    pub fn new(prompt: &PromptPair, counter: &impl CountToken) -> Self {
        Self {
            system: counter.count_token(&prompt.system),
            user: counter.count_token(&prompt.user),
        }
    }

    #[inline]
    pub fn total(&self) -> usize {
        self.system + self.user
    }
}
