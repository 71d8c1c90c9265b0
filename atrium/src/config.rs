//! Application configuration.
//!
//! Configuration is layered with figment: a YAML file (default
//! `config.yaml`, overridable with `--config`/`ATRIUM_CONFIG`) merged with
//! `ATRIUM_`-prefixed environment variables, `__` separating nesting levels.
//! For example `ATRIUM_BILLING__STRIPE__API_KEY` sets
//! `billing.stripe.api_key`. `DATABASE_URL` is accepted as a common
//! shorthand for the database connection string.

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::errors::Error;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "ATRIUM_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    /// Useful for CI/CD pipelines to catch config errors before deployment.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// All fields have sensible defaults defined in the `Default` implementation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Base URL where the member dashboard is accessible. Used for
    /// activation, password-reset and rejection emails.
    pub dashboard_url: String,
    /// Shorthand for `database.url`, settable via DATABASE_URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Email address for the initial admin user (created on first startup)
    pub admin_email: String,
    /// Password for the initial admin user (optional, can be set via environment)
    pub admin_password: Option<String>,
    /// Secret key for JWT signing (required when native auth is enabled)
    pub secret_key: Option<String>,
    /// Payment processor configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub billing: Option<BillingConfig>,
    /// Authentication configuration
    pub auth: AuthConfig,
    /// Email transport configuration
    pub email: EmailConfig,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            dashboard_url: "http://localhost:3000".to_string(),
            database_url: None,
            database: DatabaseConfig::default(),
            admin_email: "admin@localhost".to_string(),
            admin_password: None,
            secret_key: None,
            billing: None,
            auth: AuthConfig::default(),
            email: EmailConfig::default(),
            enable_otel_export: false,
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Connection string for the PostgreSQL database
    pub url: String,
    /// Connection pool settings
    pub pool: PoolSettings,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost:5432/atrium".to_string(),
            pool: PoolSettings::default(),
        }
    }
}

/// Connection pool settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolSettings {
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Maximum time to wait for a connection (seconds)
    pub acquire_timeout_secs: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout_secs: 30,
        }
    }
}

/// Payment processor configuration.
///
/// Credentials should be set via environment variables:
/// - `ATRIUM_BILLING__STRIPE__API_KEY` - secret API key
/// - `ATRIUM_BILLING__STRIPE__WEBHOOK_SECRET` - webhook signing secret
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingConfig {
    /// Stripe payment processing
    Stripe(StripeConfig),
    /// In-memory dummy processor for development and testing
    Dummy(DummyBillingConfig),
}

/// Stripe processor configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeConfig {
    /// Secret API key (starts with sk_)
    pub api_key: String,
    /// Webhook signing secret shared with the processor (starts with whsec_)
    pub webhook_secret: String,
    /// API base URL; overridable for tests against a stub server
    #[serde(default = "StripeConfig::default_api_base")]
    pub api_base: Url,
    /// Timeout applied to every processor call
    #[serde(default = "StripeConfig::default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl StripeConfig {
    fn default_api_base() -> Url {
        Url::parse("https://api.stripe.com").expect("static URL parses")
    }

    fn default_timeout() -> Duration {
        Duration::from_secs(10)
    }
}

/// Dummy processor configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DummyBillingConfig {
    /// Webhook signing secret, so webhook handling is exercised end-to-end
    pub webhook_secret: String,
}

impl Default for DummyBillingConfig {
    fn default() -> Self {
        Self {
            webhook_secret: "whsec_dummy".to_string(),
        }
    }
}

/// Authentication configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    /// Native email/password authentication
    pub native: NativeAuthConfig,
    /// Security settings (JWT, CORS)
    pub security: SecurityConfig,
}

/// Native email/password authentication configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct NativeAuthConfig {
    /// Enable native authentication (login, password resets, activation)
    pub enabled: bool,
    /// Password validation rules
    pub password: PasswordConfig,
    /// Session cookie configuration
    pub session: SessionConfig,
    /// How long password reset tokens are valid
    #[serde(with = "humantime_serde")]
    pub password_reset_token_duration: Duration,
    /// How long activation tokens (admission approvals, moderator
    /// invitations) are valid
    #[serde(with = "humantime_serde")]
    pub activation_token_duration: Duration,
}

impl Default for NativeAuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            password: PasswordConfig::default(),
            session: SessionConfig::default(),
            password_reset_token_duration: Duration::from_secs(30 * 60),
            activation_token_duration: Duration::from_secs(48 * 60 * 60),
        }
    }
}

/// Session cookie configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Cookie name for session token
    pub cookie_name: String,
    /// Set Secure flag on cookies (HTTPS only)
    pub cookie_secure: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "atrium_session".to_string(),
            cookie_secure: true,
        }
    }
}

/// Password validation rules.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PasswordConfig {
    /// Minimum password length
    pub min_length: usize,
    /// Maximum password length
    pub max_length: usize,
    /// Argon2 memory cost in KiB
    pub argon2_memory_kib: u32,
    /// Argon2 iterations
    pub argon2_iterations: u32,
    /// Argon2 parallelism
    pub argon2_parallelism: u32,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            min_length: 8,
            max_length: 128,
            argon2_memory_kib: 19456,
            argon2_iterations: 2,
            argon2_parallelism: 1,
        }
    }
}

impl PasswordConfig {
    pub fn argon2_params(&self) -> crate::auth::password::Argon2Params {
        crate::auth::password::Argon2Params {
            memory_kib: self.argon2_memory_kib,
            iterations: self.argon2_iterations,
            parallelism: self.argon2_parallelism,
        }
    }
}

/// Security configuration for JWT and CORS.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SecurityConfig {
    /// JWT token expiry duration
    #[serde(with = "humantime_serde")]
    pub jwt_expiry: Duration,
    /// CORS configuration for browser clients
    pub cors: CorsConfig,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            jwt_expiry: Duration::from_secs(24 * 60 * 60),
            cors: CorsConfig::default(),
        }
    }
}

/// CORS (Cross-Origin Resource Sharing) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// Allowed origins for CORS requests
    pub allowed_origins: Vec<CorsOrigin>,
    /// Allow credentials (cookies) in CORS requests
    pub allow_credentials: bool,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![CorsOrigin::Wildcard],
            allow_credentials: false,
        }
    }
}

/// CORS origin specification.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CorsOrigin {
    Url(Url),
    Wildcard,
}

/// Email configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
// Note: Cannot use deny_unknown_fields here due to #[serde(flatten)] on transport
pub struct EmailConfig {
    /// Email transport method
    #[serde(flatten)]
    pub transport: EmailTransportConfig,
    /// Sender email address
    pub from_email: String,
    /// Sender display name
    pub from_name: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            transport: EmailTransportConfig::File {
                path: ".atrium_emails".to_string(),
            },
            from_email: "no-reply@localhost".to_string(),
            from_name: "Atrium".to_string(),
        }
    }
}

/// Email transport configuration - either SMTP or file-based for testing.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EmailTransportConfig {
    /// Send emails via SMTP server
    Smtp {
        /// SMTP server hostname
        host: String,
        /// SMTP server port
        port: u16,
        /// SMTP authentication username
        username: String,
        /// SMTP authentication password
        password: String,
        /// Use TLS encryption
        use_tls: bool,
    },
    /// Write emails to files (for development/testing)
    File {
        /// Directory path where email files will be written
        path: String,
    },
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let mut config: Self = Self::figment(args).extract()?;

        // DATABASE_URL shorthand wins over the nested field
        if let Some(url) = config.database_url.take() {
            config.database.url = url;
        }

        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values
            .merge(Env::prefixed("ATRIUM_").split("__"))
            // Common DATABASE_URL pattern
            .merge(Env::raw().only(&["DATABASE_URL"]))
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        if self.auth.native.enabled {
            if self.secret_key.is_none() {
                return Err(Error::Internal {
                    operation: "Config validation: Native authentication is enabled but secret_key is not configured. \
                     Please set ATRIUM_SECRET_KEY or add secret_key to the config file."
                        .to_string(),
                });
            }

            if self.auth.native.password.min_length > self.auth.native.password.max_length {
                return Err(Error::Internal {
                    operation: format!(
                        "Config validation: Invalid password configuration: min_length ({}) cannot be greater than max_length ({})",
                        self.auth.native.password.min_length, self.auth.native.password.max_length
                    ),
                });
            }

            if self.auth.native.password.min_length < 1 {
                return Err(Error::Internal {
                    operation: "Config validation: Invalid password configuration: min_length must be at least 1".to_string(),
                });
            }
        }

        if self.auth.security.jwt_expiry.as_secs() < 300 {
            return Err(Error::Internal {
                operation: "Config validation: JWT expiry duration is too short (minimum 5 minutes)".to_string(),
            });
        }

        if self.auth.security.jwt_expiry.as_secs() > 86400 * 30 {
            return Err(Error::Internal {
                operation: "Config validation: JWT expiry duration is too long (maximum 30 days)".to_string(),
            });
        }

        if self.auth.security.cors.allowed_origins.is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: CORS allowed_origins cannot be empty. Add at least one allowed origin.".to_string(),
            });
        }

        let has_wildcard = self
            .auth
            .security
            .cors
            .allowed_origins
            .iter()
            .any(|origin| matches!(origin, CorsOrigin::Wildcard));
        if has_wildcard && self.auth.security.cors.allow_credentials {
            return Err(Error::Internal {
                operation: "Config validation: CORS cannot use wildcard origin '*' with allow_credentials=true. Specify explicit origins."
                    .to_string(),
            });
        }

        if let Some(BillingConfig::Stripe(stripe)) = &self.billing {
            if stripe.timeout.is_zero() {
                return Err(Error::Internal {
                    operation: "Config validation: billing timeout must be non-zero; calls to the processor must be bounded".to_string(),
                });
            }
        }

        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn args_for(file: &str) -> Args {
        Args {
            config: file.to_string(),
            validate: false,
        }
    }

    #[test]
    fn test_defaults_are_valid_without_native_auth() {
        let mut config = Config::default();
        config.auth.native.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_native_auth_requires_secret_key() {
        let config = Config::default();
        assert!(config.auth.native.enabled);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_yaml_and_env_layering() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
                port: 8080
                secret_key: from-yaml
                billing:
                  stripe:
                    api_key: sk_test_123
                    webhook_secret: whsec_123
                "#,
            )?;
            jail.set_env("ATRIUM_SECRET_KEY", "from-env");
            jail.set_env("DATABASE_URL", "postgres://db.example/atrium");

            let config = Config::load(&args_for("test.yaml")).expect("config should load");

            assert_eq!(config.port, 8080);
            // Env overrides YAML
            assert_eq!(config.secret_key.as_deref(), Some("from-env"));
            // DATABASE_URL shorthand lands in database.url
            assert_eq!(config.database.url, "postgres://db.example/atrium");

            match config.billing {
                Some(BillingConfig::Stripe(stripe)) => {
                    assert_eq!(stripe.api_key, "sk_test_123");
                    assert_eq!(stripe.api_base.as_str(), "https://api.stripe.com/");
                    assert_eq!(stripe.timeout, Duration::from_secs(10));
                }
                other => panic!("expected stripe billing config, got {other:?}"),
            }

            Ok(())
        });
    }

    #[test]
    fn test_wildcard_cors_with_credentials_rejected() {
        let mut config = Config::default();
        config.auth.native.enabled = false;
        config.auth.security.cors.allow_credentials = true;
        assert!(config.validate().is_err());
    }
}
