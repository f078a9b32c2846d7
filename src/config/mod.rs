//! Application configuration module
//!
//! Type-safe configuration loading from environment variables using the
//! `config` and `dotenvy` crates. Configuration is loaded with the
//! `QUILL` prefix and nested values use double underscores as separators.
//!
//! # Example
//!
//! ```no_run
//! use quill_entitlements::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Server running on {}", config.server.socket_addr());
//! ```

mod apple;
mod database;
mod error;
mod google;
mod server;
mod stripe;
mod trial;

pub use apple::AppleConfig;
pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use google::GoogleConfig;
pub use server::{Environment, ServerConfig};
pub use stripe::StripeConfig;
pub use trial::TrialConfig;

use serde::Deserialize;

/// Root application configuration
///
/// Load using [`AppConfig::load()`] which reads from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port, environment)
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration (PostgreSQL connection)
    pub database: DatabaseConfig,

    /// Apple App Store configuration
    pub apple: AppleConfig,

    /// Google Play configuration
    pub google: GoogleConfig,

    /// Stripe configuration
    pub stripe: StripeConfig,

    /// Trial ledger configuration
    pub trial: TrialConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// # Environment Variable Format
    ///
    /// - `QUILL__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `QUILL__STRIPE__WEBHOOK_SECRET=whsec_…` -> `stripe.webhook_secret`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required environment variables are missing
    /// or values cannot be parsed into expected types.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("QUILL")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.database.validate()?;
        self.apple.validate()?;
        self.google.validate()?;
        self.stripe.validate()?;
        self.trial.validate()?;
        Ok(())
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}
