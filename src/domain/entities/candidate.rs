//! A symbol the Scanner has surfaced, with the indicators computed for it.
//! The whole table is overwritten on each interactive scan (see
//! `persistence::repository::CandidateRepository::replace_all`).

use chrono::{DateTime, Utc};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct ScannerCandidate {
    pub symbol: String,
    pub source: String,
    pub timeframe: String,
    pub indicators: HashMap<String, f64>,
    pub last_updated: DateTime<Utc>,
}

impl ScannerCandidate {
    pub fn new(
        symbol: String,
        source: String,
        timeframe: String,
        indicators: HashMap<String, f64>,
    ) -> Self {
        ScannerCandidate {
            symbol,
            source,
            timeframe,
            indicators,
            last_updated: Utc::now(),
        }
    }
}
