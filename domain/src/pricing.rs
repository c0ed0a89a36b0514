//! Chargeable symbol and price computation.

/// Rounds `n` up to the nearest multiple of `min_num_symbols`, saturating
/// at `u64::MAX` on overflow rather than wrapping.
pub fn symbols_charged(n: u64, min_num_symbols: u64) -> u64 {
    if min_num_symbols == 0 {
        return n;
    }
    if n <= min_num_symbols {
        return min_num_symbols;
    }

    let remainder = n % min_num_symbols;
    if remainder == 0 {
        n
    } else {
        match n.checked_add(min_num_symbols - remainder) {
            Some(v) => v,
            None => u64::MAX,
        }
    }
}

/// `symbols_charged(n) * price_per_symbol`, in arbitrary-precision-enough
/// `u128`, saturating on overflow.
pub fn payment_charged(num_symbols: u64, min_num_symbols: u64, price_per_symbol: u128) -> u128 {
    let symbols = symbols_charged(num_symbols, min_num_symbols);
    (symbols as u128).saturating_mul(price_per_symbol)
}
