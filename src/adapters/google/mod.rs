//! Google Play adapters.
//!
//! Service-account authentication and the Play Developer API client
//! used to verify subscription purchase tokens and one-time products.

mod play;
mod token;

pub use play::GooglePlayVerifier;
pub use token::{AccessTokenProvider, ServiceAccountTokenProvider};
