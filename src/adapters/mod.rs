//! Adapters: I/O implementations of the ports, plus the HTTP surface.

pub mod apple;
pub mod google;
pub mod http;
pub mod postgres;
pub mod stripe;
