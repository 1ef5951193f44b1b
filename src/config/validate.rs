use std::collections::HashSet;

use chrono::{FixedOffset, Offset, Utc};
use teloxide::types::{ChatId, UserId};
use thiserror::Error;

use crate::alerts::Language;

use super::schema::{Config, SiteConfig};

const MIN_PERIOD_SECS: u32 = 10;
const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Validation(String),
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bot_token.trim().is_empty() {
            return Err(ConfigError::Validation(
                "bot_token must not be empty".to_string(),
            ));
        }
        if self.owner_id == 0 {
            return Err(ConfigError::Validation(
                "owner_id must be a positive integer".to_string(),
            ));
        }
        if self.scan_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "scan_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.utc_offset_minutes.abs() > MAX_UTC_OFFSET_MINUTES {
            return Err(ConfigError::Validation(format!(
                "utc_offset_minutes must be between -{0} and {0}",
                MAX_UTC_OFFSET_MINUTES
            )));
        }
        if self.server.listen.trim().is_empty() {
            return Err(ConfigError::Validation(
                "server.listen must not be empty".to_string(),
            ));
        }
        if self.store.path.trim().is_empty() {
            return Err(ConfigError::Validation(
                "store.path must not be empty".to_string(),
            ));
        }

        let mut ids = HashSet::new();
        let mut api_keys = HashSet::new();
        for site in &self.sites {
            validate_site(site)?;
            if !ids.insert(site.id.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "sites: duplicate id {:?}",
                    site.id
                )));
            }
            if !api_keys.insert(site.api_key.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "sites.{}: api_key is already used by another site",
                    site.id
                )));
            }
        }

        Ok(())
    }

    pub fn owner_chat_id(&self) -> Result<ChatId, ConfigError> {
        let chat_id = i64::try_from(self.owner_id).map_err(|_| {
            ConfigError::Validation("owner_id is too large to fit Telegram chat id".to_string())
        })?;
        Ok(ChatId(chat_id))
    }

    pub fn owner_user_id(&self) -> Result<UserId, ConfigError> {
        if self.owner_id == 0 {
            return Err(ConfigError::Validation(
                "owner_id must be a positive integer".to_string(),
            ));
        }

        Ok(UserId(self.owner_id))
    }
}

pub fn utc_offset_from_minutes(minutes: i32) -> FixedOffset {
    FixedOffset::east_opt(minutes.saturating_mul(60)).unwrap_or_else(|| Utc.fix())
}

fn validate_site(site: &SiteConfig) -> Result<(), ConfigError> {
    if site.id.trim().is_empty() || site.id.contains(char::is_whitespace) {
        return Err(ConfigError::Validation(
            "sites: id must be non-empty and contain no whitespace".to_string(),
        ));
    }
    if site.name.trim().is_empty() {
        return Err(ConfigError::Validation(format!(
            "sites.{}: name must not be empty",
            site.id
        )));
    }
    if site.api_key.trim().is_empty() {
        return Err(ConfigError::Validation(format!(
            "sites.{}: api_key must not be empty",
            site.id
        )));
    }
    if site.heartbeat_period_secs < MIN_PERIOD_SECS {
        return Err(ConfigError::Validation(format!(
            "sites.{}: heartbeat_period_secs must be at least {}",
            site.id, MIN_PERIOD_SECS
        )));
    }
    if site.grace_period_secs < MIN_PERIOD_SECS {
        return Err(ConfigError::Validation(format!(
            "sites.{}: grace_period_secs must be at least {}",
            site.id, MIN_PERIOD_SECS
        )));
    }
    if Language::parse(&site.language).is_none() {
        return Err(ConfigError::Validation(format!(
            "sites.{}: language must be one of en, ru, uk",
            site.id
        )));
    }
    Ok(())
}
