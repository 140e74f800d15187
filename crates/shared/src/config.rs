use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result, MAX_RETRIES};
use crate::store::database_path;

pub const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_MODEL: &str = "claude-3-5-haiku-20241022";

/// Process-wide settings, read once at startup and handed to each component.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub home_dir: PathBuf,
    pub anthropic_api_key: Option<String>,
    pub anthropic_base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub llm_timeout: Duration,
    pub llm_max_retries: u32,
}

/// Everything the language-model client needs.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::try_load_dotenv();
        Self::from_vars(|name| env::var(name).ok())
    }

    /// Builds the config from an arbitrary variable lookup.
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let database_url = get("DATABASE_URL").ok_or_else(|| {
            Error::Configuration(
                "DATABASE_URL not found.\n\n\
                Set it to the SQLite database path, e.g. in ~/.config/news-digest/.env:\n  \
                DATABASE_URL=sqlite:///var/lib/news-digest/news.db"
                    .to_string(),
            )
        })?;
        database_path(&database_url)?;

        let llm_max_retries = parse_or("ANTHROPIC_MAX_RETRIES", get("ANTHROPIC_MAX_RETRIES"), 1)?;
        if llm_max_retries > MAX_RETRIES {
            return Err(Error::Configuration(format!(
                "ANTHROPIC_MAX_RETRIES must be at most {MAX_RETRIES}, got {llm_max_retries}"
            )));
        }

        let home_dir = match get("NEWS_DIGEST_HOME") {
            Some(dir) => PathBuf::from(dir),
            None => env::current_dir().map_err(|source| Error::Io {
                path: PathBuf::from("."),
                source,
            })?,
        };

        Ok(Self {
            database_url,
            home_dir,
            anthropic_api_key: get("ANTHROPIC_API_KEY"),
            anthropic_base_url: get("ANTHROPIC_BASE_URL")
                .unwrap_or_else(|| DEFAULT_ANTHROPIC_BASE_URL.to_string()),
            model: get("ANTHROPIC_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_tokens: parse_or("ANTHROPIC_MAX_TOKENS", get("ANTHROPIC_MAX_TOKENS"), 2048)?,
            llm_timeout: Duration::from_secs(parse_or(
                "ANTHROPIC_TIMEOUT_SECS",
                get("ANTHROPIC_TIMEOUT_SECS"),
                60,
            )?),
            llm_max_retries,
        })
    }

    /// Location of the feed list inside the working directory.
    pub fn feeds_path(&self) -> PathBuf {
        self.home_dir.join("feeds.json")
    }

    /// The summarizer cannot run without an API key; the ingestor never asks.
    pub fn llm_settings(&self) -> Result<LlmSettings> {
        let api_key = self.anthropic_api_key.clone().ok_or_else(|| {
            Error::Configuration(
                "ANTHROPIC_API_KEY not found.\n\n\
                Get your Anthropic API key from: https://console.anthropic.com/settings/keys"
                    .to_string(),
            )
        })?;

        Ok(LlmSettings {
            api_key,
            base_url: self.anthropic_base_url.trim_end_matches('/').to_string(),
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            timeout: self.llm_timeout,
            max_retries: self.llm_max_retries,
            retry_backoff: Duration::from_secs(2),
        })
    }

    fn try_load_dotenv() {
        // Current directory first, for development
        if dotenvy::dotenv().is_ok() {
            return;
        }

        if let Some(config_dir) = dirs::config_dir() {
            let config_path = config_dir.join("news-digest").join(".env");
            if config_path.exists() && dotenvy::from_path(&config_path).is_ok() {
                return;
            }
        }

        if let Some(home_dir) = dirs::home_dir() {
            let home_path = home_dir.join(".env");
            if home_path.exists() {
                let _ = dotenvy::from_path(&home_path);
            }
        }
    }
}

fn parse_or<T: FromStr>(name: &str, raw: Option<String>, default: T) -> Result<T> {
    match raw {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| Error::Configuration(format!("{name} has an invalid value: {value}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn missing_database_url_is_a_configuration_error() {
        let err = Config::from_vars(lookup(&[("ANTHROPIC_API_KEY", "k")])).unwrap_err();
        assert!(matches!(err, Error::Configuration(msg) if msg.contains("DATABASE_URL")));
    }

    #[test]
    fn defaults_apply_when_optional_vars_are_absent() {
        let config = Config::from_vars(lookup(&[
            ("DATABASE_URL", "news.db"),
            ("NEWS_DIGEST_HOME", "/srv/news"),
        ]))
        .unwrap();

        assert_eq!(config.feeds_path(), PathBuf::from("/srv/news/feeds.json"));
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.llm_timeout, Duration::from_secs(60));
        assert_eq!(config.llm_max_retries, 1);
        assert!(matches!(config.llm_settings(), Err(Error::Configuration(_))));
    }

    #[test]
    fn llm_settings_trim_trailing_slash() {
        let config = Config::from_vars(lookup(&[
            ("DATABASE_URL", "news.db"),
            ("ANTHROPIC_API_KEY", "secret"),
            ("ANTHROPIC_BASE_URL", "http://localhost:9000/"),
            ("ANTHROPIC_MAX_RETRIES", "0"),
        ]))
        .unwrap();

        let llm = config.llm_settings().unwrap();
        assert_eq!(llm.base_url, "http://localhost:9000");
        assert_eq!(llm.api_key, "secret");
        assert_eq!(llm.max_retries, 0);
    }

    #[test]
    fn non_sqlite_database_url_is_rejected() {
        let err = Config::from_vars(lookup(&[(
            "DATABASE_URL",
            "postgresql://user:pw@dbhost/news",
        )]))
        .unwrap_err();
        assert!(matches!(err, Error::Configuration(msg) if msg.contains("postgresql")));

        let config = Config::from_vars(lookup(&[("DATABASE_URL", "sqlite:///srv/news.db")])).unwrap();
        assert_eq!(config.database_url, "sqlite:///srv/news.db");
    }

    #[test]
    fn llm_retries_are_capped() {
        let err = Config::from_vars(lookup(&[
            ("DATABASE_URL", "news.db"),
            ("ANTHROPIC_MAX_RETRIES", "32"),
        ]))
        .unwrap_err();
        assert!(matches!(err, Error::Configuration(msg) if msg.contains("ANTHROPIC_MAX_RETRIES")));
    }

    #[test]
    fn unparsable_numbers_are_rejected() {
        let err = Config::from_vars(lookup(&[
            ("DATABASE_URL", "news.db"),
            ("ANTHROPIC_TIMEOUT_SECS", "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, Error::Configuration(msg) if msg.contains("ANTHROPIC_TIMEOUT_SECS")));
    }
}
