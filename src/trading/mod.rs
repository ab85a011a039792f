//! Orchestration layer: the stateful pieces that wire the pure domain
//! services together with the exchange, the LLM and the database (spec §4.5-§4.8).
//!
//! Everything under `domain` is pure or trait-abstracted; everything here
//! does the actual fetching, persisting and notifying, in the order the
//! operations below describe.

pub mod core;
pub mod position_manager;
pub mod scanner;
pub mod scheduler;
pub mod trader;
