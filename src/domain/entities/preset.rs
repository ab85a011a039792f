//! A named, saved settings snapshot. Read-only from the core's perspective —
//! preset CRUD lives in the out-of-scope API surface; the core only ever
//! reads a preset's `settings` map to apply it.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct Preset {
    pub id: i64,
    pub name: String,
    pub settings: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
}
