//! Card payment module
//!
//! Collects checkout input, submits transactions to Cielo and turns the answer
//! into order state and a checkout result.

pub mod gateway;
pub mod providers;
pub mod traits;
pub mod types;
pub mod validation;

pub use gateway::{CieloGateway, GatewaySettings};
pub use traits::PaymentProvider;
