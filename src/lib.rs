//! Automated crypto trading agent — trading control plane (spec §1-§9).
//!
//! `domain` holds pure types and the ports (`ExchangeClient`, `LlmClient`,
//! `Notifier`) the rest of the crate programs against. `infrastructure`
//! implements those ports against real venues. `persistence` is the sqlx
//! layer over the five owned tables. `trading` is the orchestration layer:
//! `Core` (process state), `trader` (open/close), `position_manager`
//! (reconciliation + the per-tick exit state machine), `scanner` (discovery
//! → pre-filter → LLM fan-out), and `scheduler` (the four periodic jobs).

pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod persistence;
pub mod trading;
