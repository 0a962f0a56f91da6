//! Query request types

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Query request body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryRequest {
    /// The question to answer
    pub question: String,

    /// Number of chunks to retrieve (1-10, default from config)
    #[serde(default)]
    pub k: Option<usize>,

    /// Sampling temperature (0.0-1.0)
    #[serde(default)]
    pub temperature: Option<f32>,

    /// Completion budget in tokens (1-4096)
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

impl QueryRequest {
    /// Create a new query
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Default::default()
        }
    }

    /// Set number of chunks to retrieve
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = Some(k);
        self
    }

    /// Generation options with unset values taken from `defaults`
    pub fn options(&self, defaults: &GenerationOptions) -> GenerationOptions {
        GenerationOptions {
            temperature: self.temperature.unwrap_or(defaults.temperature),
            max_tokens: self.max_tokens.unwrap_or(defaults.max_tokens),
        }
    }
}

/// Sampling options passed to the language model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 1024,
        }
    }
}

impl GenerationOptions {
    /// Check both values are in range
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(Error::config(format!(
                "temperature must be within 0..=1, got {}",
                self.temperature
            )));
        }
        if !(1..=4096).contains(&self.max_tokens) {
            return Err(Error::config(format!(
                "max_tokens must be within 1..=4096, got {}",
                self.max_tokens
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_fill_defaults() {
        let defaults = GenerationOptions::default();
        let request: QueryRequest =
            serde_json::from_str(r#"{"question": "what?", "max_tokens": 64}"#).unwrap();

        let options = request.options(&defaults);
        assert_eq!(options.temperature, defaults.temperature);
        assert_eq!(options.max_tokens, 64);
        assert!(request.k.is_none());
    }

    #[test]
    fn test_options_validation() {
        assert!(GenerationOptions::default().validate().is_ok());

        let hot = GenerationOptions {
            temperature: 1.5,
            ..Default::default()
        };
        assert!(hot.validate().is_err());

        let empty = GenerationOptions {
            max_tokens: 0,
            ..Default::default()
        };
        assert!(empty.validate().is_err());
    }
}
