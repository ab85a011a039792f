//! LLM prompt construction (spec §4.4).
//!
//! Pure string builders — one per analysis shape the Scanner/Trader/Position
//! Manager can request. Every prompt ends by demanding a single-line JSON
//! object so `llm_client::parse_response` can decode it without a second
//! round trip; the `recommendation` field must be one of the five literals
//! `Recommendation::parse` understands.
//!
//! Grounded on `backend/core/agent.py`'s prompt builders — the indicator set,
//! the Turkish recommendation literals, and the fields each shape asks for
//! are preserved; the English wording is our own (the original's prose is
//! never carried over, only its behavior).

use std::collections::HashMap;

fn format_indicators(indicators: &HashMap<String, f64>) -> String {
    let mut keys: Vec<&String> = indicators.keys().collect();
    keys.sort();
    keys.iter()
        .map(|k| format!("{k}={:.4}", indicators[*k]))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Single-timeframe technical analysis (spec §4.4's default Scanner/Trader shape).
pub struct SingleAnalysisInput<'a> {
    pub symbol: &'a str,
    pub timeframe: &'a str,
    pub price: f64,
    pub indicators: &'a HashMap<String, f64>,
}

pub fn build_single_prompt(input: &SingleAnalysisInput) -> String {
    format!(
        "You are a derivatives trading analyst. Given the following technical \
         snapshot for {symbol} on the {timeframe} timeframe, decide whether to \
         open a position.\n\
         Current price: {price}\n\
         Indicators: {indicators}\n\n\
         Respond with a single-line JSON object: \
         {{\"symbol\": \"{symbol}\", \"timeframe\": \"{timeframe}\", \
         \"recommendation\": \"AL\" | \"SAT\" | \"BEKLE\", \"reason\": \"<one sentence>\", \
         \"analysis_type\": \"Single\", \"data\": {{\"price\": {price}}}}}.\n\
         AL means open long, SAT means open short, BEKLE means no trade.",
        symbol = input.symbol,
        timeframe = input.timeframe,
        price = input.price,
        indicators = format_indicators(input.indicators),
    )
}

/// Multi-timeframe-analysis shape: an entry timeframe plus a higher trend
/// timeframe, both with their own indicator snapshot (spec §4.4 MTA).
///
/// `entry_adx`/`trend_adx` are threaded through explicitly (rather than
/// making the prompt dig them back out of the indicator maps) so
/// `build_mta_prompt` can state the actual dominant timeframe — spec.md:112
/// ("the timeframe with higher ADX is 'dominant'") and
/// `original_source/backend/core/agent.py:254-262`'s
/// `entry_adx > trend_adx` comparison.
pub struct MtaAnalysisInput<'a> {
    pub symbol: &'a str,
    pub entry_timeframe: &'a str,
    pub trend_timeframe: &'a str,
    pub price: f64,
    pub entry_indicators: &'a HashMap<String, f64>,
    pub trend_indicators: &'a HashMap<String, f64>,
    pub entry_adx: f64,
    pub trend_adx: f64,
}

pub fn build_mta_prompt(input: &MtaAnalysisInput) -> String {
    let (dominant_timeframe, dominant_label) = if input.entry_adx > input.trend_adx {
        (input.entry_timeframe, "entry signal")
    } else {
        (input.trend_timeframe, "main trend")
    };
    format!(
        "You are a derivatives trading analyst performing multi-timeframe \
         analysis on {symbol}. First compare the ADX (trend strength) of the \
         two timeframes: whichever is higher is the dominant signal right now. \
         Here, {dominant_timeframe} ({entry_adx_label}={entry_adx:.2}, \
         {trend_adx_label}={trend_adx:.2}) is dominant as the {dominant_label}; \
         weight it more heavily and use the other timeframe only to confirm or \
         weaken that call, not to override it.\n\
         Current price: {price}\n\
         {trend_timeframe} indicators (trend): {trend_indicators}\n\
         {entry_timeframe} indicators (entry): {entry_indicators}\n\n\
         Respond with a single-line JSON object: \
         {{\"symbol\": \"{symbol}\", \"timeframe\": \"{entry_timeframe}\", \
         \"recommendation\": \"AL\" | \"SAT\" | \"BEKLE\", \"reason\": \"<one sentence>\", \
         \"analysis_type\": \"MTA\", \"trend_timeframe\": \"{trend_timeframe}\", \
         \"data\": {{\"price\": {price}}}}}.",
        symbol = input.symbol,
        entry_timeframe = input.entry_timeframe,
        trend_timeframe = input.trend_timeframe,
        dominant_timeframe = dominant_timeframe,
        dominant_label = dominant_label,
        entry_adx_label = input.entry_timeframe,
        entry_adx = input.entry_adx,
        trend_adx_label = input.trend_timeframe,
        trend_adx = input.trend_adx,
        price = input.price,
        entry_indicators = format_indicators(input.entry_indicators),
        trend_indicators = format_indicators(input.trend_indicators),
    )
}

/// Holistic analysis: technicals plus news/sentiment (spec §4.4, the
/// `original_source`-supplemented shape — see SPEC_FULL.md §C).
pub struct HolisticAnalysisInput<'a> {
    pub symbol: &'a str,
    pub timeframe: &'a str,
    pub price: f64,
    pub indicators: &'a HashMap<String, f64>,
    pub news_headlines: &'a [String],
    pub sentiment_score: f64,
}

pub fn build_holistic_prompt(input: &HolisticAnalysisInput) -> String {
    let headlines = if input.news_headlines.is_empty() {
        "none available".to_string()
    } else {
        input.news_headlines.join(" | ")
    };
    format!(
        "You are a derivatives trading analyst combining technical and \
         sentiment signals for {symbol} on the {timeframe} timeframe.\n\
         Current price: {price}\n\
         Indicators: {indicators}\n\
         Recent headlines: {headlines}\n\
         Aggregate sentiment score (-1 bearish to +1 bullish): {sentiment_score}\n\n\
         Respond with a single-line JSON object: \
         {{\"symbol\": \"{symbol}\", \"timeframe\": \"{timeframe}\", \
         \"recommendation\": \"AL\" | \"SAT\" | \"BEKLE\", \"reason\": \"<one sentence>\", \
         \"analysis_type\": \"Holistic\", \
         \"data\": {{\"price\": {price}, \"sentiment_score\": {sentiment_score}}}}}.",
        symbol = input.symbol,
        timeframe = input.timeframe,
        price = input.price,
        indicators = format_indicators(input.indicators),
        headlines = headlines,
        sentiment_score = input.sentiment_score,
    )
}

/// Re-analysis of an already-open position that crossed a hard bracket or
/// hit a scanner re-scan (spec §4.4): asks whether to hold or close.
pub struct ReanalysisInput<'a> {
    pub symbol: &'a str,
    pub side: &'a str,
    pub entry_price: f64,
    pub current_price: f64,
    pub timeframe: &'a str,
    pub indicators: &'a HashMap<String, f64>,
}

pub fn build_reanalysis_prompt(input: &ReanalysisInput) -> String {
    format!(
        "You are reviewing an open {side} position on {symbol}, entered at \
         {entry_price} and now trading at {current_price} on the {timeframe} \
         timeframe. Indicators: {indicators}\n\n\
         Respond with a single-line JSON object: \
         {{\"symbol\": \"{symbol}\", \"recommendation\": \"TUT\" | \"KAPAT\", \
         \"reason\": \"<one sentence>\"}}.\n\
         TUT means keep the position open, KAPAT means close it now.",
        symbol = input.symbol,
        side = input.side,
        entry_price = input.entry_price,
        current_price = input.current_price,
        timeframe = input.timeframe,
        indicators = format_indicators(input.indicators),
    )
}

/// Bailout confirmation (spec §4.6.3): the position has armed its bailout
/// and recovered past the extremum's recovery target; ask whether to take
/// the exit now or keep riding it. Grounded on
/// `agent.py::create_bailout_reanalysis_prompt`'s field set
/// (symbol/side/entry_price/extremum_price/timeframe/pnl_percentage).
pub struct BailoutInput<'a> {
    pub symbol: &'a str,
    pub side: &'a str,
    pub entry_price: f64,
    pub current_price: f64,
    pub extremum_price: f64,
    pub pnl_percentage: f64,
    pub timeframe: &'a str,
    pub indicators: &'a HashMap<String, f64>,
}

pub fn build_bailout_prompt(input: &BailoutInput) -> String {
    format!(
        "You are reviewing a losing {side} position on {symbol} that armed a \
         bailout exit and has since recovered off its worst price. Entry: \
         {entry_price}, worst price since entry: {extremum_price}, current \
         price: {current_price}, current PnL: {pnl_percentage:.2}%, timeframe: \
         {timeframe}.\n\
         Indicators: {indicators}\n\n\
         Decide whether this recovery is a genuine reversal (close now while \
         the loss is smaller) or just noise within a trend that still favors \
         this position (hold).\n\
         Respond with a single-line JSON object: \
         {{\"symbol\": \"{symbol}\", \"recommendation\": \"TUT\" | \"KAPAT\", \
         \"reason\": \"<one sentence>\"}}.",
        symbol = input.symbol,
        side = input.side,
        entry_price = input.entry_price,
        extremum_price = input.extremum_price,
        current_price = input.current_price,
        pnl_percentage = input.pnl_percentage,
        timeframe = input.timeframe,
        indicators = format_indicators(input.indicators),
    )
}
