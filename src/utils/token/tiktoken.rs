use anyhow::Result;
pub use tiktoken_rs::CoreBPE;

use crate::utils::token::CountToken;

/// Name of the encoding used for prompt size estimates.
pub const DEFAULT_ENCODING: &str = "cl100k_base";

/// Counter using the Tiktoken tokenizer.
///
/// Providers other than OpenAI tokenize differently, so counts are estimates for them.
#[readonly::make]
pub struct Tiktoken {
    /// The encoding name of the tokenizer. read-only.
    #[readonly]
    pub encoding: String,
    bpe: CoreBPE,
}

impl Tiktoken {
    /// Create a counter with the `cl100k_base` encoding.
    pub fn new() -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base()?;
        Ok(Self {
            encoding: DEFAULT_ENCODING.to_string(),
            bpe,
        })
    }
}

impl CountToken for Tiktoken {
    fn count_token(&self, string: &str) -> usize {
        self.bpe.encode_with_special_tokens(string).len()
    }
}
