//! Billing HTTP module: the client validation RPC and the two
//! platform-pushed webhook endpoints.

mod dto;
mod handlers;
mod routes;

pub use dto::{ErrorResponse, StripeAckResponse, ValidatePurchaseRequest};
pub use handlers::{AuthenticatedUser, BillingApiError, BillingAppState};
pub use routes::{billing_router, billing_routes, webhook_routes};
