//! Repository configuration and builder.

use std::collections::BTreeSet;

use chrono::{NaiveDate, Utc};
use tessera_catalog_core::daily_count::parse_date;
use tessera_catalog_core::{CatalogError, Result};

/// Environment variable listing automated actors, comma separated.
pub const ENV_BOT_USERS: &str = "TESSERA_BOT_USERS";
/// Environment variable pinning "today" (`yyyy-MM-dd`).
pub const ENV_TODAY: &str = "TESSERA_TODAY";
/// Environment variable for the actor recorded when none is given.
pub const ENV_DEFAULT_UPDATED_BY: &str = "TESSERA_DEFAULT_UPDATED_BY";

/// Source of "today" for the join-statistics window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Clock {
    /// Current UTC date
    #[default]
    System,
    /// Fixed date, for tests and replays
    Fixed(NaiveDate),
}

impl Clock {
    pub fn today(&self) -> NaiveDate {
        match self {
            Clock::System => Utc::now().date_naive(),
            Clock::Fixed(date) => *date,
        }
    }
}

/// Configuration for the table repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryConfig {
    /// Actors whose PUTs may not overwrite curated descriptions
    pub bot_users: BTreeSet<String>,
    pub clock: Clock,
    /// Recorded as `updated_by` when a caller passes none (default: "admin")
    pub default_updated_by: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            bot_users: ["ingestion-bot".to_string()].into_iter().collect(),
            clock: Clock::System,
            default_updated_by: "admin".to_string(),
        }
    }
}

impl RepositoryConfig {
    pub fn builder() -> RepositoryConfigBuilder {
        RepositoryConfigBuilder::default()
    }

    /// Load from `TESSERA_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        let mut builder = Self::builder();

        if let Ok(raw) = std::env::var(ENV_BOT_USERS) {
            builder = builder.bot_users(
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
            );
        }

        if let Ok(raw) = std::env::var(ENV_TODAY) {
            let date = parse_date(raw.trim()).map_err(|e| {
                CatalogError::InvalidArgument(format!("{} is invalid: {}", ENV_TODAY, e))
            })?;
            builder = builder.clock(Clock::Fixed(date));
        }

        if let Ok(raw) = std::env::var(ENV_DEFAULT_UPDATED_BY) {
            builder = builder.default_updated_by(raw.trim());
        }

        builder.build()
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_updated_by.trim().is_empty() {
            return Err(CatalogError::InvalidArgument(
                "default_updated_by cannot be empty".to_string(),
            ));
        }

        if self.bot_users.iter().any(|u| u.trim().is_empty()) {
            return Err(CatalogError::InvalidArgument(
                "bot user names cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    pub fn is_bot(&self, user: &str) -> bool {
        self.bot_users.contains(user)
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }
}

/// Builder for [`RepositoryConfig`].
#[derive(Debug, Default)]
pub struct RepositoryConfigBuilder {
    config: RepositoryConfig,
}

impl RepositoryConfigBuilder {
    /// Replace the set of automated actors.
    pub fn bot_users<I, S>(mut self, users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.bot_users = users.into_iter().map(Into::into).collect();
        self
    }

    pub fn bot_user(mut self, user: impl Into<String>) -> Self {
        self.config.bot_users.insert(user.into());
        self
    }

    pub fn clock(mut self, clock: Clock) -> Self {
        self.config.clock = clock;
        self
    }

    /// Shorthand for `clock(Clock::Fixed(date))`.
    pub fn today(self, date: NaiveDate) -> Self {
        self.clock(Clock::Fixed(date))
    }

    pub fn default_updated_by(mut self, user: impl Into<String>) -> Self {
        self.config.default_updated_by = user.into();
        self
    }

    /// Build the configuration, validating all settings.
    pub fn build(self) -> Result<RepositoryConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        std::env::remove_var(ENV_BOT_USERS);
        std::env::remove_var(ENV_TODAY);
        std::env::remove_var(ENV_DEFAULT_UPDATED_BY);
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = RepositoryConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.is_bot("ingestion-bot"));
        assert!(!config.is_bot("alice"));
    }

    #[test]
    fn test_builder() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        let config = RepositoryConfig::builder()
            .bot_users(["etl"])
            .bot_user("profiler")
            .today(date)
            .default_updated_by("system")
            .build()
            .unwrap();

        assert!(config.is_bot("etl"));
        assert!(config.is_bot("profiler"));
        assert!(!config.is_bot("ingestion-bot"));
        assert_eq!(config.today(), date);
        assert_eq!(config.default_updated_by, "system");
    }

    #[test]
    fn test_builder_rejects_empty_values() {
        assert!(RepositoryConfig::builder()
            .default_updated_by("  ")
            .build()
            .is_err());
        assert!(RepositoryConfig::builder().bot_user("").build().is_err());
    }

    #[test]
    #[serial]
    fn test_from_env() {
        clear_env();
        std::env::set_var(ENV_BOT_USERS, "etl, profiler,,");
        std::env::set_var(ENV_TODAY, "2024-03-31");
        std::env::set_var(ENV_DEFAULT_UPDATED_BY, "ops");

        let config = RepositoryConfig::from_env().unwrap();
        clear_env();

        assert_eq!(config.bot_users.len(), 2);
        assert!(config.is_bot("profiler"));
        assert_eq!(
            config.clock,
            Clock::Fixed(NaiveDate::from_ymd_opt(2024, 3, 31).unwrap())
        );
        assert_eq!(config.default_updated_by, "ops");
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_bad_date() {
        clear_env();
        std::env::set_var(ENV_TODAY, "31/03/2024");
        let result = RepositoryConfig::from_env();
        clear_env();

        assert!(matches!(result, Err(CatalogError::InvalidArgument(_))));
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear_env();
        let config = RepositoryConfig::from_env().unwrap();
        assert_eq!(config, RepositoryConfig::default());
    }
}
