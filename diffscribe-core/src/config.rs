// configuration loading - one immutable value constructed at startup and
// passed explicitly into every component

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

/// body policy: `auto` derives the decision from diff size and user context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncludeBody {
    Auto,
    Never,
    Always,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScopeRuleConfig {
    pub scope: String,
    // the config key is `match`; a keyword in rust, so aliased here
    #[serde(alias = "match")]
    pub pattern: String,
}

/// resolved settings; every field defaults so a partial config file merges
/// over the hardcoded values
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub model: String,
    pub retry_model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
    pub max_title_length: usize,
    pub include_body: IncludeBody,
    pub scope_rules: Vec<ScopeRuleConfig>,
    pub enable_behavior_templates: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            model: "openai/gpt-4o-mini".to_string(),
            retry_model: "openai/gpt-4o".to_string(),
            max_tokens: 400,
            temperature: 0.3,
            top_p: 0.9,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            max_title_length: 72,
            include_body: IncludeBody::Auto,
            scope_rules: Vec::new(),
            enable_behavior_templates: false,
        }
    }
}

impl Config {
    /// true when the configured model is a reduced-context "mini" tier; the
    /// diff tier thresholds and retry escalation both key off this
    pub fn is_mini_model(&self) -> bool {
        self.model.to_lowercase().contains("mini")
    }
}

fn config_path() -> Option<PathBuf> {
    if let Ok(explicit) = std::env::var("DIFFSCRIBE_CONFIG") {
        return Some(PathBuf::from(explicit));
    }
    let home = std::env::var_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("diffscribe")
            .join("config.toml"),
    )
}

fn parse_config(text: &str) -> Result<Config> {
    toml::from_str(text).context("failed to parse diffscribe config")
}

/// load the config file if present; a missing file yields the defaults and a
/// malformed file is reported once and ignored
pub fn load_config() -> Config {
    let Some(path) = config_path() else {
        return Config::default();
    };
    let Ok(text) = std::fs::read_to_string(&path) else {
        return Config::default();
    };
    match parse_config(&text) {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "{} {} ({})",
                console::style("warning:").yellow().bold(),
                console::style("ignoring malformed config file").yellow(),
                e
            );
            Config::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.max_title_length, 72);
        assert_eq!(config.include_body, IncludeBody::Auto);
        assert!(config.is_mini_model());
        assert!(config.scope_rules.is_empty());
    }

    #[test]
    fn test_partial_file_merges_over_defaults() {
        let config = parse_config("max_title_length = 60\ninclude_body = \"never\"\n").unwrap();
        assert_eq!(config.max_title_length, 60);
        assert_eq!(config.include_body, IncludeBody::Never);
        // untouched fields keep their defaults
        assert_eq!(config.max_tokens, 400);
        assert_eq!(config.model, "openai/gpt-4o-mini");
    }

    #[test]
    fn test_scope_rules_parse() {
        let config = parse_config(
            "[[scope_rules]]\nscope = \"parser\"\npattern = \"^src/parse\"\n",
        )
        .unwrap();
        assert_eq!(config.scope_rules.len(), 1);
        assert_eq!(config.scope_rules[0].scope, "parser");

        // `match` is the documented key; `pattern` stays accepted
        let config = parse_config(
            "[[scope_rules]]\nscope = \"parser\"\nmatch = \"^src/parse\"\n",
        )
        .unwrap();
        assert_eq!(config.scope_rules[0].pattern, "^src/parse");
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        assert!(parse_config("max_tokens = \"not a number\"").is_err());
    }
}
