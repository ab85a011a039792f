//! Concrete adapters for the ports declared under `domain::repositories`.
//!
//! Everything in here is venue- or vendor-specific; the trading layer only
//! ever talks to the traits.

pub mod exchange_adapter;
pub mod llm_client;
pub mod telegram_notifier;
