//! Account batch configuration loaded via OrthoConfig.
//!
//! Values are layered from defaults, configuration files, `ACCOUNT_BATCH_*`
//! environment variables, and command-line flags.

use ortho_config::OrthoConfig;
use serde::Deserialize;

/// Support mailbox copied on every welcome notification.
pub const DEFAULT_SUPPORT_CC: &str = "support@company.com";
/// Connection pool size used when none is configured.
pub const DEFAULT_POOL_MAX_SIZE: u32 = 4;

/// Settings for the account batch runner.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "ACCOUNT_BATCH")]
pub struct AccountBatchSettings {
    /// PostgreSQL connection string.
    pub database_url: Option<String>,
    /// Maximum number of pooled connections.
    pub pool_max_size: Option<u32>,
    /// Send welcome notifications after a create batch commits.
    #[ortho_config(default = false)]
    pub notify_on_create: bool,
    /// Carbon-copy address for welcome notifications.
    pub support_cc: Option<String>,
}

impl AccountBatchSettings {
    /// Return the configured pool size, falling back to the default.
    pub fn pool_max_size(&self) -> u32 {
        self.pool_max_size.unwrap_or(DEFAULT_POOL_MAX_SIZE)
    }

    /// Return the configured support address, falling back to the default.
    pub fn support_cc(&self) -> &str {
        self.support_cc.as_deref().unwrap_or(DEFAULT_SUPPORT_CC)
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for account batch configuration parsing.

    use super::*;
    use std::ffi::OsString;

    use env_lock::lock_env;
    use rstest::rstest;

    fn load_from_empty_args() -> AccountBatchSettings {
        AccountBatchSettings::load_from_iter([OsString::from("account-batch")])
            .expect("config should load")
    }

    #[rstest]
    fn default_values_are_used_when_missing() {
        let _guard = lock_env([
            ("ACCOUNT_BATCH_DATABASE_URL", None::<String>),
            ("ACCOUNT_BATCH_POOL_MAX_SIZE", None::<String>),
            ("ACCOUNT_BATCH_NOTIFY_ON_CREATE", None::<String>),
            ("ACCOUNT_BATCH_SUPPORT_CC", None::<String>),
        ]);

        let settings = load_from_empty_args();
        assert!(settings.database_url.is_none());
        assert_eq!(settings.pool_max_size(), DEFAULT_POOL_MAX_SIZE);
        assert!(!settings.notify_on_create);
        assert_eq!(settings.support_cc(), DEFAULT_SUPPORT_CC);
    }

    #[rstest]
    fn environment_overrides_are_respected() {
        let _guard = lock_env([
            (
                "ACCOUNT_BATCH_DATABASE_URL",
                Some("postgres://localhost/accounts".to_owned()),
            ),
            ("ACCOUNT_BATCH_POOL_MAX_SIZE", Some("2".to_owned())),
            ("ACCOUNT_BATCH_NOTIFY_ON_CREATE", Some("true".to_owned())),
            (
                "ACCOUNT_BATCH_SUPPORT_CC",
                Some("helpdesk@example.com".to_owned()),
            ),
        ]);

        let settings = load_from_empty_args();
        assert_eq!(
            settings.database_url.as_deref(),
            Some("postgres://localhost/accounts")
        );
        assert_eq!(settings.pool_max_size(), 2);
        assert!(settings.notify_on_create);
        assert_eq!(settings.support_cc(), "helpdesk@example.com");
    }
}
