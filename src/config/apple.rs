//! Apple App Store configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::error::ValidationError;

/// Production verifyReceipt endpoint.
const PRODUCTION_VERIFY_URL: &str = "https://buy.itunes.apple.com/verifyReceipt";

/// Sandbox verifyReceipt endpoint, used on the 21007 redirect.
const SANDBOX_VERIFY_URL: &str = "https://sandbox.itunes.apple.com/verifyReceipt";

/// Apple App Store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppleConfig {
    /// App-specific shared secret for verifyReceipt
    pub shared_secret: SecretString,

    /// Expected bundle identifier in signed notifications
    pub bundle_id: String,

    /// Expected App Store environment in signed notifications
    /// ("Production" or "Sandbox")
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Pinned Apple root certificates, base64 DER, comma-separated.
    /// Signed-notification chains must anchor to one of these.
    pub root_certificates: Option<String>,

    /// verifyReceipt endpoint override (tests)
    #[serde(default = "default_production_url")]
    pub production_url: String,

    /// Sandbox verifyReceipt endpoint override (tests)
    #[serde(default = "default_sandbox_url")]
    pub sandbox_url: String,
}

impl AppleConfig {
    /// Pinned root certificates as individual base64 strings.
    pub fn root_certificate_list(&self) -> Vec<String> {
        self.root_certificates
            .as_ref()
            .map(|s| s.split(',').map(|c| c.trim().to_string()).collect())
            .unwrap_or_default()
    }

    /// Validate Apple configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.shared_secret.expose_secret().is_empty() {
            return Err(ValidationError::MissingRequired("APPLE_SHARED_SECRET"));
        }
        // Reverse-DNS shape, e.g. com.quillchat.app
        if self.bundle_id.split('.').count() < 2 || self.bundle_id.contains(char::is_whitespace) {
            return Err(ValidationError::InvalidBundleId);
        }
        for cert in self.root_certificate_list() {
            if cert.is_empty()
                || !cert
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '='))
            {
                return Err(ValidationError::InvalidAppleRootCertificate);
            }
        }
        Ok(())
    }
}

fn default_environment() -> String {
    "Production".to_string()
}

fn default_production_url() -> String {
    PRODUCTION_VERIFY_URL.to_string()
}

fn default_sandbox_url() -> String {
    SANDBOX_VERIFY_URL.to_string()
}
