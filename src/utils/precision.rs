// src/utils/precision.rs
use rust_decimal::Decimal;

/// Rounds a quantity DOWN to the nearest multiple of `step_size`.
/// Example: amount=10.999, step=1.0 -> 10.0
pub fn normalize_quantity(amount: Decimal, step_size: Decimal) -> Decimal {
    if step_size.is_zero() {
        return amount;
    }
    (amount / step_size).floor() * step_size
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rounds_down_to_step() {
        assert_eq!(normalize_quantity(dec!(10.999), dec!(1.0)), dec!(10.0));
        assert_eq!(normalize_quantity(dec!(0.123456), dec!(0.001)), dec!(0.123));
    }

    #[test]
    fn exact_multiples_are_untouched() {
        assert_eq!(normalize_quantity(dec!(0.5), dec!(0.001)), dec!(0.5));
    }

    #[test]
    fn zero_step_passes_through() {
        assert_eq!(normalize_quantity(dec!(1.2345), Decimal::ZERO), dec!(1.2345));
    }
}
