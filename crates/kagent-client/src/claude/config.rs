//! Claude API client configuration.

use std::fmt;

use crate::model::ModelError;

#[derive(Clone)]
pub struct ClaudeConfig {
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub system_prompt: Option<String>,
}

impl fmt::Debug for ClaudeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClaudeConfig")
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("system_prompt", &self.system_prompt)
            .finish()
    }
}

impl ClaudeConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 4096,
            system_prompt: None,
        }
    }

    /// Read the API key from `ANTHROPIC_API_KEY`.
    pub fn from_env() -> Result<Self, ModelError> {
        match std::env::var("ANTHROPIC_API_KEY") {
            Ok(key) => Ok(Self::new(key)),
            Err(_) => Err(ModelError::Api(
                "Claude API not configured. Set ANTHROPIC_API_KEY.".into(),
            )),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_api_key() {
        let config = ClaudeConfig::new("sk-ant-secret");
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-ant-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn builders_apply() {
        let config = ClaudeConfig::new("key")
            .with_model("claude-haiku-4")
            .with_max_tokens(1024)
            .with_system_prompt("be terse");
        assert_eq!(config.model, "claude-haiku-4");
        assert_eq!(config.max_tokens, 1024);
        assert_eq!(config.system_prompt.as_deref(), Some("be terse"));
    }
}
