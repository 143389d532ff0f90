use alloy_primitives::U256;

/// Render a raw integer amount with `decimals` fractional digits, trimming trailing zeros.
pub fn format_token_amount(amount: U256, decimals: u8) -> String {
    let digits = amount.to_string();
    let decimals = decimals as usize;
    if decimals == 0 {
        return digits;
    }

    let padded = format!("{:0>width$}", digits, width = decimals + 1);
    let (whole, fraction) = padded.split_at(padded.len() - decimals);
    let fraction = fraction.trim_end_matches('0');

    if fraction.is_empty() {
        whole.to_string()
    } else {
        format!("{}.{}", whole, fraction)
    }
}

/// Approximate fiat value of a raw amount at `unit_price` per whole token.
pub fn token_value(amount: U256, decimals: u8, unit_price: f64) -> f64 {
    format_token_amount(amount, decimals)
        .parse::<f64>()
        .map(|units| units * unit_price)
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_fractional_amounts() {
        let amount = U256::from(1_500_000_000_000_000_000u128);
        assert_eq!(format_token_amount(amount, 18), "1.5");
        assert_eq!(format_token_amount(U256::from(5u64), 6), "0.000005");
        assert_eq!(format_token_amount(U256::from(2_000_000u64), 6), "2");
        assert_eq!(format_token_amount(U256::ZERO, 18), "0");
        assert_eq!(format_token_amount(U256::from(42u64), 0), "42");
    }

    #[test]
    fn values_amount_at_price() {
        let amount = U256::from(2_500_000u64);
        assert!((token_value(amount, 6, 2.0) - 5.0).abs() < 1e-9);
    }
}
