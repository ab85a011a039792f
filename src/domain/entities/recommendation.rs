//! Tagged recommendation returned by the LLM Client's response parser.
//!
//! Replaces the duck-typed JSON the original analyst produced: the boundary
//! parses once into this enum and everything downstream branches on the
//! variant instead of re-inspecting strings.

use serde::Deserialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Recommendation {
    /// "AL" — open a long.
    Buy,
    /// "SAT" — open a short.
    Sell,
    /// "BEKLE" — no action on a scan candidate.
    Wait,
    /// "TUT" — keep an open position.
    Hold,
    /// "KAPAT" — close an open position.
    Close,
}

impl Recommendation {
    /// Parse the Turkish-language literal the original analyst prompts request.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_uppercase().as_str() {
            "AL" => Some(Recommendation::Buy),
            "SAT" => Some(Recommendation::Sell),
            "BEKLE" => Some(Recommendation::Wait),
            "TUT" => Some(Recommendation::Hold),
            "KAPAT" => Some(Recommendation::Close),
            _ => None,
        }
    }

    pub fn is_entry_signal(&self) -> bool {
        matches!(self, Recommendation::Buy | Recommendation::Sell)
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Recommendation::Buy => "AL",
            Recommendation::Sell => "SAT",
            Recommendation::Wait => "BEKLE",
            Recommendation::Hold => "TUT",
            Recommendation::Close => "KAPAT",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_literal() {
        assert_eq!(Recommendation::parse("AL"), Some(Recommendation::Buy));
        assert_eq!(Recommendation::parse("sat"), Some(Recommendation::Sell));
        assert_eq!(Recommendation::parse("Bekle"), Some(Recommendation::Wait));
        assert_eq!(Recommendation::parse("TUT"), Some(Recommendation::Hold));
        assert_eq!(Recommendation::parse("KAPAT"), Some(Recommendation::Close));
        assert_eq!(Recommendation::parse("garbage"), None);
    }

    #[test]
    fn entry_signal_only_for_buy_sell() {
        assert!(Recommendation::Buy.is_entry_signal());
        assert!(Recommendation::Sell.is_entry_signal());
        assert!(!Recommendation::Wait.is_entry_signal());
        assert!(!Recommendation::Hold.is_entry_signal());
        assert!(!Recommendation::Close.is_entry_signal());
    }

    #[test]
    fn roundtrips_through_display() {
        for r in [
            Recommendation::Buy,
            Recommendation::Sell,
            Recommendation::Wait,
            Recommendation::Hold,
            Recommendation::Close,
        ] {
            assert_eq!(Recommendation::parse(&r.to_string()), Some(r));
        }
    }
}
