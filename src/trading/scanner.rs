//! Scanner: candidate discovery, pre-filtering, and the AI analysis fan-out
//! (spec §4.7).
//!
//! External screener and social-trending sources (`ExternalSymbolSource`) and
//! the holistic-analysis news/sentiment inputs (`NewsSource`,
//! `SentimentSource`) are all optional collaborator traits (SPEC_FULL.md §C):
//! absent by default, so discovery degrades to whitelist + gainers/losers +
//! volume-spike, and analysis degrades to single/MTA technicals, without
//! needing a live integration to build or test against.

use crate::config::Settings;
use crate::domain::entities::candidate::ScannerCandidate;
use crate::domain::entities::recommendation::Recommendation;
use crate::domain::services::indicators::{atr_percent_latest, compute_snapshot, volume_ema_latest, IndicatorParams};
use crate::domain::services::prompts::{
    build_holistic_prompt, build_mta_prompt, build_single_prompt, HolisticAnalysisInput,
    MtaAnalysisInput, SingleAnalysisInput,
};
use crate::domain::value_objects::symbol;
use crate::persistence::repository::ScannerCandidateRepository;
use crate::trading::core::{Core, SCAN_CONCURRENCY};
use crate::trading::trader::{self, OpenRequest};
use futures_util::stream::{self, StreamExt};
use std::collections::HashSet;
use tracing::{info, warn};

/// An external ranked-symbol source beyond the exchange's own 24h tickers
/// (e.g. a third-party screener or a social-trending feed). Absent by
/// default; the Scanner simply skips sources with no configured provider.
#[async_trait::async_trait]
pub trait ExternalSymbolSource: Send + Sync {
    async fn symbols(&self) -> Vec<String>;
    fn name(&self) -> &str;
}

/// Recent headlines for a symbol, for the holistic analysis prompt
/// (SPEC_FULL.md §C). Absent by default.
#[async_trait::async_trait]
pub trait NewsSource: Send + Sync {
    async fn headlines(&self, symbol: &str) -> Vec<String>;
}

/// An aggregate sentiment score for a symbol in `[-1.0, 1.0]`, for the
/// holistic analysis prompt (SPEC_FULL.md §C). Absent by default.
#[async_trait::async_trait]
pub trait SentimentSource: Send + Sync {
    async fn score(&self, symbol: &str) -> f64;
}

/// One candidate symbol plus which discovery source surfaced it first.
#[derive(Debug, Clone)]
struct Discovered {
    symbol: String,
    source: String,
}

/// Per-candidate outcome recorded for the scan summary (SPEC_FULL.md §C).
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub symbol: String,
    pub recommendation: Option<Recommendation>,
    pub opened: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ScanSummary {
    pub scanned: usize,
    pub pre_filtered: usize,
    pub ai_analyzed: usize,
    pub opportunities: usize,
    pub auto_trades: usize,
    pub errors: usize,
    pub details: Vec<ScanOutcome>,
}

/// Cap on how many 24h tickers are probed for a volume spike, to bound the
/// number of OHLCV calls a single scan cycle makes.
const VOLUME_SPIKE_PROBE_CAP: usize = 40;

async fn discover_candidates(
    core: &Core,
    settings: &Settings,
    external_sources: &[&dyn ExternalSymbolSource],
) -> Vec<Discovered> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::new();

    for raw in &settings.proactive_scan_whitelist {
        let sym = symbol::canonicalize(raw);
        if seen.insert(sym.clone()) {
            out.push(Discovered { symbol: sym, source: "whitelist".to_string() });
        }
    }

    let tickers = if settings.proactive_scan_use_gainers_losers || settings.proactive_scan_use_volume_spike {
        core.exchange.fetch_tickers_24h().await.unwrap_or_else(|e| {
            warn!(error = %e, "fetch_tickers_24h failed, scanner degrading to whitelist-only sources");
            Vec::new()
        })
    } else {
        Vec::new()
    };
    let liquid: Vec<_> = tickers
        .iter()
        .filter(|t| t.quote_volume >= settings.proactive_scan_min_volume_usdt)
        .collect();

    if settings.proactive_scan_use_gainers_losers {
        let mut sorted = liquid.clone();
        sorted.sort_by(|a, b| b.price_change_percent.total_cmp(&a.price_change_percent));
        for ticker in sorted.iter().take(settings.proactive_scan_top_n) {
            let sym = symbol::canonicalize(&ticker.symbol);
            if seen.insert(sym.clone()) {
                out.push(Discovered { symbol: sym, source: "gainers".to_string() });
            }
        }
        sorted.reverse();
        for ticker in sorted.iter().take(settings.proactive_scan_top_n) {
            let sym = symbol::canonicalize(&ticker.symbol);
            if seen.insert(sym.clone()) {
                out.push(Discovered { symbol: sym, source: "losers".to_string() });
            }
        }
    }

    if settings.proactive_scan_use_volume_spike {
        let mut by_volume = liquid.clone();
        by_volume.sort_by(|a, b| b.quote_volume.total_cmp(&a.quote_volume));
        for ticker in by_volume.iter().take(VOLUME_SPIKE_PROBE_CAP) {
            let sym = symbol::canonicalize(&ticker.symbol);
            if seen.contains(&sym) {
                continue;
            }
            let bars = match core
                .exchange
                .fetch_ohlcv(
                    &sym,
                    &settings.proactive_scan_volume_timeframe,
                    settings.proactive_scan_volume_period + 5,
                )
                .await
            {
                Ok(b) => b,
                Err(_) => continue,
            };
            let Some(last_volume) = bars.last().map(|b| b.volume) else { continue };
            let Ok(ema) = volume_ema_latest(&bars, settings.proactive_scan_volume_period) else { continue };
            if last_volume > ema * settings.proactive_scan_volume_multiplier {
                seen.insert(sym.clone());
                out.push(Discovered { symbol: sym, source: "volume_spike".to_string() });
            }
        }
    }

    for source in external_sources {
        for raw in source.symbols().await {
            let sym = symbol::canonicalize(&raw);
            if seen.insert(sym.clone()) {
                out.push(Discovered { symbol: sym, source: source.name().to_string() });
            }
        }
    }

    let blacklist: HashSet<&str> = settings.proactive_scan_blacklist.iter().map(String::as_str).collect();
    out.retain(|c| !blacklist.contains(symbol::base_asset(&c.symbol)));
    out
}

struct PreFilterSnapshot {
    rsi: Option<f64>,
    adx: Option<f64>,
    atr_percent: Option<f64>,
    volume_confirmed: bool,
}

async fn prefilter_snapshot(core: &Core, settings: &Settings, symbol: &str) -> PreFilterSnapshot {
    let bars = core
        .exchange
        .fetch_ohlcv(symbol, &settings.proactive_scan_entry_timeframe, 100)
        .await
        .unwrap_or_default();

    let indicators = compute_snapshot(&bars, &IndicatorParams::default());
    let atr_percent = atr_percent_latest(&bars, settings.proactive_scan_atr_period).ok();

    let volume_confirmed = if settings.proactive_scan_use_volume_filter {
        match volume_ema_latest(&bars, settings.proactive_scan_volume_avg_period) {
            Ok(ema) => bars
                .last()
                .map(|b| b.volume >= ema * settings.proactive_scan_volume_confirm_multiplier)
                .unwrap_or(false),
            Err(_) => false,
        }
    } else {
        true
    };

    PreFilterSnapshot {
        rsi: indicators.get("rsi").copied(),
        adx: indicators.get("adx").copied(),
        atr_percent,
        volume_confirmed,
    }
}

fn passes_prefilter(settings: &Settings, snapshot: &PreFilterSnapshot) -> bool {
    if !settings.proactive_scan_prefilter_enabled {
        return true;
    }
    let rsi_ok = snapshot
        .rsi
        .map(|v| v < settings.proactive_scan_rsi_lower || v > settings.proactive_scan_rsi_upper)
        .unwrap_or(false);
    let adx_ok = snapshot.adx.map(|v| v > settings.proactive_scan_adx_threshold).unwrap_or(false);
    let atr_ok = if settings.proactive_scan_use_volatility_filter {
        snapshot
            .atr_percent
            .map(|v| v >= settings.proactive_scan_atr_threshold_percent)
            .unwrap_or(false)
    } else {
        true
    };
    rsi_ok && adx_ok && atr_ok && snapshot.volume_confirmed
}

async fn analyze_candidate(core: &Core, settings: &Settings, symbol: &str) -> Result<Recommendation, String> {
    let _permit = core.scan_semaphore.acquire().await.map_err(|e| e.to_string())?;

    let entry_bars = core
        .exchange
        .fetch_ohlcv(symbol, &settings.proactive_scan_entry_timeframe, 100)
        .await
        .map_err(|e| e.to_string())?;
    let entry_indicators = compute_snapshot(&entry_bars, &IndicatorParams::default());
    let current_price = core.exchange.fetch_price(symbol).await.map_err(|e| e.to_string())?;

    let prompt = if let (Some(news), Some(sentiment)) =
        (core.news_source.as_ref(), core.sentiment_source.as_ref())
    {
        let news_headlines = news.headlines(symbol).await;
        let sentiment_score = sentiment.score(symbol).await;
        build_holistic_prompt(&HolisticAnalysisInput {
            symbol,
            timeframe: &settings.proactive_scan_entry_timeframe,
            price: current_price,
            indicators: &entry_indicators,
            news_headlines: &news_headlines,
            sentiment_score,
        })
    } else if settings.use_mta_analysis {
        let trend_bars = core
            .exchange
            .fetch_ohlcv(symbol, &settings.proactive_scan_trend_timeframe, 100)
            .await
            .map_err(|e| e.to_string())?;
        let trend_indicators = compute_snapshot(&trend_bars, &IndicatorParams::default());
        let entry_adx = entry_indicators.get("adx").copied().unwrap_or(0.0);
        let trend_adx = trend_indicators.get("adx").copied().unwrap_or(0.0);
        build_mta_prompt(&MtaAnalysisInput {
            symbol,
            entry_timeframe: &settings.proactive_scan_entry_timeframe,
            trend_timeframe: &settings.proactive_scan_trend_timeframe,
            price: current_price,
            entry_indicators: &entry_indicators,
            trend_indicators: &trend_indicators,
            entry_adx,
            trend_adx,
        })
    } else {
        build_single_prompt(&SingleAnalysisInput {
            symbol,
            timeframe: &settings.proactive_scan_entry_timeframe,
            price: current_price,
            indicators: &entry_indicators,
        })
    };

    let response = core.llm.invoke(&prompt).await.map_err(|e| e.to_string())?;
    Ok(response.recommendation)
}

/// One survivor's full per-candidate pipeline (spec §4.7 "Analysis
/// fan-out"): analyze, then open on an entry signal if auto-confirm is on.
/// Run inside `run_scan`'s `buffer_unordered` so up to `SCAN_CONCURRENCY`
/// of these are in flight at once; `analyze_candidate`'s own
/// `core.scan_semaphore` acquire is what actually enforces that bound.
async fn analyze_and_maybe_open(
    core: &Core,
    settings: &Settings,
    candidate: &Discovered,
) -> (String, Result<Recommendation, String>, Option<Result<(), String>>) {
    let symbol = candidate.symbol.clone();
    match analyze_candidate(core, settings, &symbol).await {
        Ok(recommendation) => {
            let open_result = if recommendation.is_entry_signal() && settings.proactive_scan_auto_confirm {
                let request = OpenRequest {
                    symbol: symbol.clone(),
                    recommendation,
                    timeframe: settings.proactive_scan_entry_timeframe.clone(),
                    reason: format!("scanner:{}", candidate.source),
                };
                Some(trader::open(core, request).await.map(|_| ()).map_err(|e| e.to_string()))
            } else {
                None
            };
            (symbol, Ok(recommendation), open_result)
        }
        Err(e) => (symbol, Err(e), None),
    }
}

/// Full proactive scan cycle: discover, pre-filter, analyze, act
/// (spec §4.7, auto-confirm vs. opportunity-recording branching).
pub async fn run_scan(core: &Core, external_sources: &[&dyn ExternalSymbolSource]) -> ScanSummary {
    let settings = core.settings_snapshot();
    let discovered = discover_candidates(core, &settings, external_sources).await;
    let mut summary = ScanSummary { scanned: discovered.len(), ..Default::default() };

    let mut pre_filtered = Vec::new();
    for candidate in &discovered {
        let snapshot = prefilter_snapshot(core, &settings, &candidate.symbol).await;
        if passes_prefilter(&settings, &snapshot) {
            pre_filtered.push(candidate.clone());
        }
    }
    summary.pre_filtered = pre_filtered.len();

    // Every survivor's analysis (and, on an entry signal with auto-confirm,
    // its open attempt) is fanned out concurrently, bounded at
    // `SCAN_CONCURRENCY` in-flight at once (spec §4.7/§5): a strictly
    // sequential `for` loop here would leave `core.scan_semaphore` with
    // nothing to actually bound.
    let outcomes: Vec<_> = stream::iter(pre_filtered.iter().cloned())
        .map(|candidate| {
            let settings = settings.clone();
            async move { analyze_and_maybe_open(core, &settings, &candidate).await }
        })
        .buffer_unordered(SCAN_CONCURRENCY)
        .collect()
        .await;

    for (symbol, analysis, open_result) in outcomes {
        summary.ai_analyzed += 1;
        match analysis {
            Ok(recommendation) => {
                let mut opened = false;
                if recommendation.is_entry_signal() {
                    summary.opportunities += 1;
                    if let Some(result) = open_result {
                        match result {
                            Ok(()) => {
                                opened = true;
                                summary.auto_trades += 1;
                            }
                            Err(e) => {
                                summary.errors += 1;
                                summary.details.push(ScanOutcome {
                                    symbol: symbol.clone(),
                                    recommendation: Some(recommendation),
                                    opened: false,
                                    error: Some(e),
                                });
                                continue;
                            }
                        }
                    }
                }
                summary.details.push(ScanOutcome { symbol, recommendation: Some(recommendation), opened, error: None });
            }
            Err(e) => {
                summary.errors += 1;
                summary.details.push(ScanOutcome { symbol, recommendation: None, opened: false, error: Some(e) });
            }
        }
    }

    info!(
        scanned = summary.scanned,
        pre_filtered = summary.pre_filtered,
        ai_analyzed = summary.ai_analyzed,
        opportunities = summary.opportunities,
        auto_trades = summary.auto_trades,
        errors = summary.errors,
        "scan cycle complete"
    );
    summary
}

/// Interactive scan: discovery + indicator snapshot only, no pre-filter and
/// no LLM calls, persisted for the (out-of-scope) UI to read back.
pub async fn run_interactive_scan(core: &Core, external_sources: &[&dyn ExternalSymbolSource]) -> usize {
    let settings = core.settings_snapshot();
    let discovered = discover_candidates(core, &settings, external_sources).await;

    let mut candidates = Vec::with_capacity(discovered.len());
    for d in &discovered {
        let bars = core
            .exchange
            .fetch_ohlcv(&d.symbol, &settings.proactive_scan_entry_timeframe, 100)
            .await
            .unwrap_or_default();
        let indicators = compute_snapshot(&bars, &IndicatorParams::default());
        candidates.push(ScannerCandidate::new(
            d.symbol.clone(),
            d.source.clone(),
            settings.proactive_scan_entry_timeframe.clone(),
            indicators,
        ));
    }

    let count = candidates.len();
    if let Err(e) = ScannerCandidateRepository::new(core.db.clone()).replace_all(&candidates).await {
        warn!(error = %e, "failed to persist interactive scan candidates");
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_prefilter_requires_every_enabled_check() {
        let settings = Settings::default();
        let snapshot = PreFilterSnapshot {
            rsi: Some(30.0),
            adx: Some(25.0),
            atr_percent: Some(0.6),
            volume_confirmed: true,
        };
        assert!(passes_prefilter(&settings, &snapshot));

        let failing = PreFilterSnapshot { rsi: Some(50.0), ..snapshot };
        assert!(!passes_prefilter(&settings, &failing));
    }

    #[test]
    fn passes_prefilter_rsi_exactly_at_lower_bound_fails() {
        let settings = Settings::default();
        let snapshot = PreFilterSnapshot {
            rsi: Some(settings.proactive_scan_rsi_lower),
            adx: Some(25.0),
            atr_percent: Some(0.6),
            volume_confirmed: true,
        };
        assert!(!passes_prefilter(&settings, &snapshot));
    }

    #[test]
    fn passes_prefilter_adx_exactly_at_threshold_fails() {
        let settings = Settings::default();
        let snapshot = PreFilterSnapshot {
            rsi: Some(30.0),
            adx: Some(settings.proactive_scan_adx_threshold),
            atr_percent: Some(0.6),
            volume_confirmed: true,
        };
        assert!(!passes_prefilter(&settings, &snapshot));
    }

    #[test]
    fn passes_prefilter_short_circuits_when_disabled() {
        let mut settings = Settings::default();
        settings.proactive_scan_prefilter_enabled = false;
        let snapshot = PreFilterSnapshot { rsi: None, adx: None, atr_percent: None, volume_confirmed: false };
        assert!(passes_prefilter(&settings, &snapshot));
    }
}
