use serde::{Deserialize, Serialize};

/// Model providers kritiq can talk to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Google Gemini `generateContent`
    #[default]
    Gemini,
    /// OpenRouter chat completions
    #[value(name = "openrouter")]
    OpenRouter,
}

impl Provider {
    pub fn label(&self) -> &'static str {
        match self {
            Provider::Gemini => "Gemini",
            Provider::OpenRouter => "OpenRouter",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::Gemini => "gemini-2.5-flash",
            Provider::OpenRouter => "google/gemini-2.5-flash",
        }
    }

    /// Provider-specific environment variable for the API key.
    pub fn key_env_var(&self) -> &'static str {
        match self {
            Provider::Gemini => "GEMINI_API_KEY",
            Provider::OpenRouter => "OPENROUTER_API_KEY",
        }
    }

    /// Max output tokens requested. Whole files come back, so this is generous.
    pub fn max_output_tokens(&self) -> u32 {
        16384
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_defaults() {
        assert_eq!(Provider::default(), Provider::Gemini);
        assert!(Provider::Gemini.default_model().starts_with("gemini"));
        assert!(Provider::OpenRouter.default_model().contains('/'));
    }

    #[test]
    fn test_provider_serde_names() {
        let json = serde_json::to_string(&Provider::OpenRouter).unwrap();
        assert_eq!(json, "\"openrouter\"");
        let parsed: Provider = serde_json::from_str("\"gemini\"").unwrap();
        assert_eq!(parsed, Provider::Gemini);
    }
}
