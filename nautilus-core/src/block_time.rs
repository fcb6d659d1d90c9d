//! Block-time table and block count conversions between chains.

/// Minutes per block of the generic account-based token fallback.
const GENERIC_TOKEN_MINUTES: f64 = 0.2;

/// Average minutes per block for a currency symbol.
///
/// Unknown symbols fall back to the generic token block time.
pub fn minutes_per_block(symbol: &str) -> f64 {
    match symbol {
        "BTC" => 10.0,
        "LTC" => 2.5,
        "ETH" => GENERIC_TOKEN_MINUTES,
        "L-BTC" | "ELEMENTS" => 1.0,
        _ => GENERIC_TOKEN_MINUTES,
    }
}

/// Convert a block count on chain `from` into the smallest block count on chain `to`
/// covering at least the same wall-clock time.
///
/// The result is rounded up so that the converted timeout never expires before
/// the original one.
pub fn convert_blocks(from: &str, to: &str, blocks: u32) -> u32 {
    ((blocks as f64 * minutes_per_block(from)) / minutes_per_block(to)).ceil() as u32
}

/// Wall-clock minutes covered by `blocks` blocks on the chain of `symbol`.
pub fn blocks_to_minutes(symbol: &str, blocks: u32) -> f64 {
    blocks as f64 * minutes_per_block(symbol)
}

/// Convert a wall-clock delta in minutes into a block count on the chain of `symbol`.
///
/// Returns [`None`] unless the conversion yields a positive integer, which makes
/// misconfigured timeout deltas fail loudly at load time.
pub fn minutes_to_blocks(symbol: &str, minutes: u64) -> Option<u32> {
    let blocks = minutes as f64 / minutes_per_block(symbol);
    let rounded = blocks.round();

    // Guard against float noise from non-integer block times.
    if (blocks - rounded).abs() > 1e-9 || rounded < 1.0 {
        return None;
    }

    Some(rounded as u32)
}
