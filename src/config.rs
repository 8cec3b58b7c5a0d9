use std::env;

use chrono::Duration;
use log::LevelFilter;
use thiserror::Error;
use url::Url;

const DEFAULT_MAIL_FROM: &str = "register@yamdb.local";
const DEFAULT_CHALLENGE_TTL_MINUTES: i64 = 15;

/// Configuration read from the environment when yamdb starts
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Postgres connection string, data is kept in memory without it
    pub database_url: Option<String>,
    /// HTTP endpoint that relays mail, codes are only logged without it
    pub mail_relay: Option<Url>,
    pub mail_from: String,
    pub challenge_ttl: Duration,
    /// Made a superuser on start, with an account created for it if needed
    pub superuser_email: Option<String>,
    /// Level of the yamdb crates, other crates only log warnings and errors
    pub log_level: LevelFilter,
}

#[derive(Debug, Error)]
#[error("{name} must be {expected}, got \"{value}\"")]
pub struct ConfigError {
    pub name: &'static str,
    expected: &'static str,
    value: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &'static str| lookup(name).filter(|v| !v.trim().is_empty());

        let port = match var("YAMDB_SERVER_PORT") {
            Some(value) => value.parse().map_err(|_| ConfigError {
                name: "YAMDB_SERVER_PORT",
                expected: "a port number",
                value,
            })?,
            None => yamdb_server::DEFAULT_PORT,
        };

        let mail_relay = match var("YAMDB_MAIL_RELAY_URL") {
            Some(value) => Some(Url::parse(&value).map_err(|_| ConfigError {
                name: "YAMDB_MAIL_RELAY_URL",
                expected: "an absolute URL",
                value,
            })?),
            None => None,
        };

        let challenge_ttl = match var("YAMDB_CHALLENGE_TTL_MINUTES") {
            Some(value) => match value.parse::<i64>() {
                Ok(minutes) if minutes > 0 => Duration::minutes(minutes),
                _ => {
                    return Err(ConfigError {
                        name: "YAMDB_CHALLENGE_TTL_MINUTES",
                        expected: "a positive number of minutes",
                        value,
                    })
                }
            },
            None => Duration::minutes(DEFAULT_CHALLENGE_TTL_MINUTES),
        };

        let superuser_email = match var("YAMDB_SUPERUSER_EMAIL") {
            Some(value) if looks_like_email(value.trim()) => Some(value.trim().to_string()),
            Some(value) => {
                return Err(ConfigError {
                    name: "YAMDB_SUPERUSER_EMAIL",
                    expected: "an email address",
                    value,
                })
            }
            None => None,
        };

        let log_level = match var("YAMDB_LOG_LEVEL") {
            Some(value) => value.trim().parse().map_err(|_| ConfigError {
                name: "YAMDB_LOG_LEVEL",
                expected: "one of off, error, warn, info, debug, trace",
                value,
            })?,
            None => LevelFilter::Info,
        };

        Ok(Self {
            port,
            database_url: var("DATABASE_URL"),
            mail_relay,
            mail_from: var("YAMDB_MAIL_FROM").unwrap_or_else(|| DEFAULT_MAIL_FROM.to_string()),
            challenge_ttl,
            superuser_email,
            log_level,
        })
    }
}

/// A rough check for an email address
fn looks_like_email(value: &str) -> bool {
    value
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'))
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<_, _> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.port, 9050);
        assert_eq!(config.database_url, None);
        assert_eq!(config.mail_relay, None);
        assert_eq!(config.mail_from, "register@yamdb.local");
        assert_eq!(config.challenge_ttl, Duration::minutes(15));
        assert_eq!(config.superuser_email, None);
        assert_eq!(config.log_level, LevelFilter::Info);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("YAMDB_SERVER_PORT", "8080"),
            ("DATABASE_URL", "postgres://localhost/yamdb"),
            ("YAMDB_MAIL_RELAY_URL", "http://relay.local/send"),
            ("YAMDB_CHALLENGE_TTL_MINUTES", "5"),
            ("YAMDB_SUPERUSER_EMAIL", "root@yamdb.local"),
            ("YAMDB_LOG_LEVEL", "DEBUG"),
        ])
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/yamdb")
        );
        assert_eq!(
            config.mail_relay.map(|u| u.to_string()),
            Some("http://relay.local/send".to_string())
        );
        assert_eq!(config.challenge_ttl, Duration::minutes(5));
        assert_eq!(config.superuser_email.as_deref(), Some("root@yamdb.local"));
        assert_eq!(config.log_level, LevelFilter::Debug);
    }

    #[test]
    fn test_invalid_values() {
        let error = config_from(&[("YAMDB_SERVER_PORT", "lots")]).unwrap_err();
        assert_eq!(error.name, "YAMDB_SERVER_PORT");

        let error = config_from(&[("YAMDB_CHALLENGE_TTL_MINUTES", "0")]).unwrap_err();
        assert_eq!(error.name, "YAMDB_CHALLENGE_TTL_MINUTES");

        let error = config_from(&[("YAMDB_MAIL_RELAY_URL", "not a url")]).unwrap_err();
        assert_eq!(error.name, "YAMDB_MAIL_RELAY_URL");

        let error = config_from(&[("YAMDB_SUPERUSER_EMAIL", "root")]).unwrap_err();
        assert_eq!(error.name, "YAMDB_SUPERUSER_EMAIL");

        let error = config_from(&[("YAMDB_LOG_LEVEL", "loud")]).unwrap_err();
        assert_eq!(error.name, "YAMDB_LOG_LEVEL");
    }
}
