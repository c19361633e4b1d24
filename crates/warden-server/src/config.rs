//! Server configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use warden_auth::AuthConfig;
use warden_db::DbConfig;
use warden_kv::RedisConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} is not a valid {expected}: {value:?}")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Everything the server needs to start.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub auth: AuthConfig,
    pub db: DbConfig,
    pub redis: RedisConfig,
}

impl ServerConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                  | Required | Default                     |
    /// |--------------------------|----------|-----------------------------|
    /// | `JWT_ACCESS_SECRET`      | **yes**  | --                          |
    /// | `JWT_REFRESH_SECRET`     | **yes**  | --                          |
    /// | `PASSWORD_PEPPER`        | no       | none                        |
    /// | `ACCESS_TOKEN_TTL_SECS`  | no       | `900`                       |
    /// | `REFRESH_TOKEN_TTL_SECS` | no       | `604800`                    |
    /// | `LOGIN_MAX_FAILURES`     | no       | `5`                         |
    /// | `LOGIN_FAIL_WINDOW_SECS` | no       | `600`                       |
    /// | `LOGIN_LOCK_SECS`        | no       | `900`                       |
    /// | `AUDIT_QUEUE_CAPACITY`   | no       | `1024`                      |
    /// | `REDIS_URL`              | no       | `redis://127.0.0.1:6379/0`  |
    /// | `STORE_TIMEOUT_MS`       | no       | `3000`                      |
    /// | `SURREAL_URL`            | no       | `127.0.0.1:8000`            |
    /// | `SURREAL_NS`             | no       | `warden`                    |
    /// | `SURREAL_DB`             | no       | `main`                      |
    /// | `SURREAL_USER`           | no       | `root`                      |
    /// | `SURREAL_PASS`           | no       | `root`                      |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };
        let defaults = AuthConfig::default();

        let auth = AuthConfig {
            access_token_secret: env.required("JWT_ACCESS_SECRET")?,
            refresh_token_secret: env.required("JWT_REFRESH_SECRET")?,
            pepper: env.get("PASSWORD_PEPPER"),
            access_token_ttl: env.secs("ACCESS_TOKEN_TTL_SECS", defaults.access_token_ttl)?,
            refresh_token_ttl: env.secs("REFRESH_TOKEN_TTL_SECS", defaults.refresh_token_ttl)?,
            max_failed_logins: env.parse(
                "LOGIN_MAX_FAILURES",
                "integer",
                defaults.max_failed_logins,
            )?,
            fail_window: env.secs("LOGIN_FAIL_WINDOW_SECS", defaults.fail_window)?,
            lock_duration: env.secs("LOGIN_LOCK_SECS", defaults.lock_duration)?,
            audit_queue_capacity: env.parse(
                "AUDIT_QUEUE_CAPACITY",
                "integer",
                defaults.audit_queue_capacity,
            )?,
            ..defaults
        };

        let redis_defaults = RedisConfig::default();
        let store_timeout_ms = env.parse(
            "STORE_TIMEOUT_MS",
            "integer",
            u64::try_from(redis_defaults.op_timeout.as_millis()).unwrap_or(3000),
        )?;
        let redis = RedisConfig {
            url: env.get("REDIS_URL").unwrap_or(redis_defaults.url),
            op_timeout: Duration::from_millis(store_timeout_ms),
        };

        let db_defaults = DbConfig::default();
        let db = DbConfig {
            url: env.get("SURREAL_URL").unwrap_or(db_defaults.url),
            namespace: env.get("SURREAL_NS").unwrap_or(db_defaults.namespace),
            database: env.get("SURREAL_DB").unwrap_or(db_defaults.database),
            username: env.get("SURREAL_USER").unwrap_or(db_defaults.username),
            password: env.get("SURREAL_PASS").unwrap_or(db_defaults.password),
        };

        Ok(Self { auth, db, redis })
    }
}

struct Env<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Env<F> {
    /// Set, non-blank value of `name`.
    fn get(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, name: &'static str) -> Result<String, ConfigError> {
        self.get(name).ok_or(ConfigError::Missing(name))
    }

    fn parse<T: FromStr>(
        &self,
        name: &'static str,
        expected: &'static str,
        default: T,
    ) -> Result<T, ConfigError> {
        match self.get(name) {
            None => Ok(default),
            Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
                name,
                expected,
                value,
            }),
        }
    }

    fn secs(&self, name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
        self.parse(name, "number of seconds", default.as_secs())
            .map(Duration::from_secs)
    }
}
