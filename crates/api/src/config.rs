//! Process configuration, read once from the environment at start-up.

use std::fmt;
use std::str::FromStr;

use chrono::Duration;
use thiserror::Error;

use tourbook_infra::SmtpConfig;

const DEV_JWT_SECRET: &str = "dev-secret-change-me-dev-secret-change-me";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_TOKEN_DAYS: i64 = 90;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} has an invalid value {value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0} must be set in production")]
    Missing(&'static str),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_development(&self) -> bool {
        matches!(self, Environment::Development)
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            _ => Err("expected development or production".to_string()),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Environment::Development => "development",
            Environment::Production => "production",
        })
    }
}

#[derive(Clone, PartialEq)]
pub struct AppConfig {
    pub environment: Environment,
    pub port: u16,
    /// Base URL used in emails and checkout redirects, without a trailing slash.
    pub public_url: String,
    pub jwt_secret: String,
    pub jwt_expires_in: Duration,
    pub jwt_cookie_expires_in: Duration,
    /// SMTP delivery; `None` selects the recording mailer.
    pub smtp: Option<SmtpConfig>,
    /// `None` selects the fake checkout gateway.
    pub stripe_secret_key: Option<String>,
    pub stripe_webhook_secret: Option<String>,
    /// Postgres connection string; `None` keeps everything in memory.
    pub database_url: Option<String>,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("environment", &self.environment)
            .field("port", &self.port)
            .field("public_url", &self.public_url)
            .field("jwt_expires_in", &self.jwt_expires_in)
            .field("smtp", &self.smtp.as_ref().map(|s| &s.host))
            .field("stripe", &self.stripe_secret_key.is_some())
            .field("database", &self.database_url.is_some())
            .finish_non_exhaustive()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let environment = parse_or("APP_ENV", get("APP_ENV"), Environment::Development)?;
        let port = parse_or("PORT", get("PORT"), DEFAULT_PORT)?;
        let public_url = get("PUBLIC_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| format!("http://localhost:{port}"));

        let jwt_secret = match get("JWT_SECRET") {
            Some(secret) => secret,
            None if environment.is_development() => {
                tracing::warn!("JWT_SECRET not set; using insecure dev default");
                DEV_JWT_SECRET.to_string()
            }
            None => return Err(ConfigError::Missing("JWT_SECRET")),
        };

        let jwt_expires_in = days("JWT_EXPIRES_IN_DAYS", get("JWT_EXPIRES_IN_DAYS"))?;
        let jwt_cookie_expires_in = days("JWT_COOKIE_EXPIRES_IN_DAYS", get("JWT_COOKIE_EXPIRES_IN_DAYS"))?;

        let smtp = match get("EMAIL_HOST") {
            Some(host) => Some(SmtpConfig {
                host,
                port: parse_or("EMAIL_PORT", get("EMAIL_PORT"), 587)?,
                username: get("EMAIL_USERNAME"),
                password: get("EMAIL_PASSWORD"),
                from: get("EMAIL_FROM").unwrap_or_else(|| "Tourbook <hello@tourbook.io>".to_string()),
            }),
            None => None,
        };

        Ok(Self {
            environment,
            port,
            public_url,
            jwt_secret,
            jwt_expires_in,
            jwt_cookie_expires_in,
            smtp,
            stripe_secret_key: get("STRIPE_SECRET_KEY"),
            stripe_webhook_secret: get("STRIPE_WEBHOOK_SECRET"),
            database_url: get("DATABASE_URL"),
        })
    }

    /// Development settings with the given JWT secret and no external services.
    pub fn development(jwt_secret: impl Into<String>) -> Self {
        Self {
            environment: Environment::Development,
            port: DEFAULT_PORT,
            public_url: format!("http://localhost:{DEFAULT_PORT}"),
            jwt_secret: jwt_secret.into(),
            jwt_expires_in: Duration::days(DEFAULT_TOKEN_DAYS),
            jwt_cookie_expires_in: Duration::days(DEFAULT_TOKEN_DAYS),
            smtp: None,
            stripe_secret_key: None,
            stripe_webhook_secret: None,
            database_url: None,
        }
    }
}

fn parse_or<T>(var: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
            value,
        }),
    }
}

fn days(var: &'static str, raw: Option<String>) -> Result<Duration, ConfigError> {
    let days: i64 = parse_or(var, raw.clone(), DEFAULT_TOKEN_DAYS)?;
    if days <= 0 {
        return Err(ConfigError::Invalid {
            var,
            value: raw.unwrap_or_default(),
            reason: "must be a positive number of days".to_string(),
        });
    }
    Ok(Duration::days(days))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_describe_a_local_development_server() {
        let c = config(&[]).unwrap();
        assert_eq!(c.environment, Environment::Development);
        assert_eq!(c.port, 8080);
        assert_eq!(c.public_url, "http://localhost:8080");
        assert_eq!(c.jwt_expires_in, Duration::days(90));
        assert!(c.smtp.is_none());
        assert!(c.stripe_secret_key.is_none());
        assert!(!c.jwt_secret.is_empty());
    }

    #[test]
    fn production_requires_a_secret() {
        assert_eq!(
            config(&[("APP_ENV", "production")]).unwrap_err(),
            ConfigError::Missing("JWT_SECRET")
        );
        let c = config(&[("APP_ENV", "production"), ("JWT_SECRET", "s3cret")]).unwrap();
        assert_eq!(c.environment, Environment::Production);
    }

    #[test]
    fn smtp_is_enabled_by_host() {
        let c = config(&[("EMAIL_HOST", "smtp.mailtrap.io"), ("EMAIL_PORT", "2525"), ("EMAIL_USERNAME", "u")])
            .unwrap();
        let smtp = c.smtp.unwrap();
        assert_eq!(smtp.port, 2525);
        assert_eq!(smtp.username.as_deref(), Some("u"));
        assert_eq!(smtp.password, None);
    }

    #[test]
    fn rejects_malformed_numbers() {
        assert!(matches!(config(&[("PORT", "http")]), Err(ConfigError::Invalid { var: "PORT", .. })));
        assert!(matches!(
            config(&[("JWT_EXPIRES_IN_DAYS", "0")]),
            Err(ConfigError::Invalid { var: "JWT_EXPIRES_IN_DAYS", .. })
        ));
    }

    #[test]
    fn public_url_drops_trailing_slash() {
        let c = config(&[("PUBLIC_URL", "https://tourbook.io/"), ("PORT", "3000")]).unwrap();
        assert_eq!(c.public_url, "https://tourbook.io");
        assert_eq!(c.port, 3000);
    }
}
