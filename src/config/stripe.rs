//! Stripe configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::error::ValidationError;

/// Stripe configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StripeConfig {
    /// Webhook signing secret (whsec_…)
    pub webhook_secret: SecretString,

    /// Reject test-mode events in production
    #[serde(default)]
    pub require_livemode: bool,
}

impl StripeConfig {
    /// Validate Stripe configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        let secret = self.webhook_secret.expose_secret();
        if secret.is_empty() {
            return Err(ValidationError::MissingRequired("STRIPE_WEBHOOK_SECRET"));
        }
        if !secret.starts_with("whsec_") {
            return Err(ValidationError::InvalidStripeWebhookSecret);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_secret_passes() {
        let config = StripeConfig {
            webhook_secret: SecretString::new("whsec_abc123".to_string()),
            require_livemode: false,
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_secret_fails() {
        let config = StripeConfig {
            webhook_secret: SecretString::new(String::new()),
            require_livemode: false,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn wrong_prefix_fails() {
        let config = StripeConfig {
            webhook_secret: SecretString::new("sk_test_abc".to_string()),
            require_livemode: false,
        };
        assert!(config.validate().is_err());
    }
}
