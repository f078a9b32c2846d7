//! Platform and product classification value objects.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Payment platform a purchase originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Apple App Store (receipt validation).
    Ios,
    /// Google Play (purchase token validation).
    Android,
    /// Stripe (webhook-driven only; never client-validated).
    Stripe,
}

impl Platform {
    /// Parse a client-supplied platform string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ios" => Some(Platform::Ios),
            "android" => Some(Platform::Android),
            "stripe" => Some(Platform::Stripe),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Ios => "ios",
            Platform::Android => "android",
            Platform::Stripe => "stripe",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Billing class of a product: renewing subscription or one-time lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductClass {
    Monthly,
    Annual,
    Lifetime,
}

impl ProductClass {
    /// Classifies a store product id.
    ///
    /// Product ids follow the store catalog convention
    /// (`premium_monthly`, `premium_annual`, `premium_lifetime`); the
    /// substring is the contract, not the full id, so regional or
    /// versioned SKUs (`premium_annual_v2`) classify the same way.
    pub fn classify(product_id: &str) -> Self {
        let id = product_id.to_ascii_lowercase();
        if id.contains("lifetime") {
            ProductClass::Lifetime
        } else if id.contains("annual") || id.contains("year") {
            ProductClass::Annual
        } else {
            ProductClass::Monthly
        }
    }

    /// Returns true for one-time, non-expiring products.
    pub fn is_lifetime(&self) -> bool {
        matches!(self, ProductClass::Lifetime)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProductClass::Monthly => "monthly",
            ProductClass::Annual => "annual",
            ProductClass::Lifetime => "lifetime",
        }
    }
}

impl fmt::Display for ProductClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
