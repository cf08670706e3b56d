//! Payment provider implementations
//!
//! Concrete implementations of the PaymentProvider trait.

pub mod cielo;

pub use cielo::{CieloConfig, CieloProvider};
