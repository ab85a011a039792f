//! Symbol canonicalization.
//!
//! The core works internally in "BASE/QUOTE" form regardless of how a symbol
//! arrived (from settings, the scanner, or an exchange payload); venue-specific
//! adapters re-derive their own wire form from the canonical one at the boundary.

const DEFAULT_QUOTE: &str = "USDT";

/// Quote assets Binance futures lists contracts against, longest first so a
/// concatenated symbol like "BTCFDUSD" doesn't get mis-split on a shorter
/// quote that happens to also be a suffix.
static RECOGNIZED_QUOTES: once_cell::sync::Lazy<Vec<&'static str>> =
    once_cell::sync::Lazy::new(|| {
        let mut quotes = vec!["USDT", "BUSD", "USDC", "FDUSD"];
        quotes.sort_by_key(|q| std::cmp::Reverse(q.len()));
        quotes
    });

/// Canonicalize a symbol into "BASE/QUOTE" upper-case form.
///
/// Accepts "btc", "BTCUSDT", "BTC/USDT", "BTC-USDT" and returns "BTC/USDT".
/// A bare base symbol is assumed to be quoted in USDT, matching the
/// Binance-futures convention the adapter targets.
pub fn canonicalize(input: &str) -> String {
    let upper = input.trim().to_uppercase();

    if let Some((base, quote)) = split_on(&upper, '/') {
        return format!("{base}/{quote}");
    }
    if let Some((base, quote)) = split_on(&upper, '-') {
        return format!("{base}/{quote}");
    }
    for quote in RECOGNIZED_QUOTES.iter() {
        if let Some(base) = upper.strip_suffix(quote) {
            if !base.is_empty() {
                return format!("{base}/{quote}");
            }
        }
    }
    format!("{upper}/{DEFAULT_QUOTE}")
}

fn split_on(upper: &str, sep: char) -> Option<(String, String)> {
    let mut parts = upper.splitn(2, sep);
    let base = parts.next()?;
    let quote = parts.next()?;
    if base.is_empty() || quote.is_empty() {
        return None;
    }
    Some((base.to_string(), quote.to_string()))
}

/// Render a canonical "BASE/QUOTE" symbol in Binance-futures wire form, e.g. "BTCUSDT".
pub fn to_binance_futures(canonical: &str) -> String {
    canonical.replace('/', "")
}

/// The base asset of a canonical symbol, e.g. "BTC" from "BTC/USDT".
pub fn base_asset(canonical: &str) -> &str {
    canonical.split('/').next().unwrap_or(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalizes_bare_base() {
        assert_eq!(canonicalize("btc"), "BTC/USDT");
        assert_eq!(canonicalize("BTC"), "BTC/USDT");
    }

    #[test]
    fn canonicalizes_concatenated_form() {
        assert_eq!(canonicalize("BTCUSDT"), "BTC/USDT");
        assert_eq!(canonicalize("ethusdt"), "ETH/USDT");
    }

    #[test]
    fn canonicalizes_separated_forms() {
        assert_eq!(canonicalize("BTC/USDT"), "BTC/USDT");
        assert_eq!(canonicalize("BTC-USDT"), "BTC/USDT");
    }

    #[test]
    fn is_idempotent() {
        for input in ["btc", "BTCUSDT", "BTC/USDT", "eth-usdt"] {
            let once = canonicalize(input);
            let twice = canonicalize(&once);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn renders_binance_futures_form() {
        assert_eq!(to_binance_futures("BTC/USDT"), "BTCUSDT");
    }

    #[test]
    fn extracts_base_asset() {
        assert_eq!(base_asset("BTC/USDT"), "BTC");
    }

    #[test]
    fn recognizes_non_usdt_quotes() {
        assert_eq!(canonicalize("BTCBUSD"), "BTC/BUSD");
        assert_eq!(canonicalize("ethusdc"), "ETH/USDC");
    }
}
