//! Small shared helpers for money math.

/// Round to two decimal places for money/percentage display.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Safe division: 0 when the denominator is 0 (never NaN/Infinity).
pub fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round2() {
        assert_eq!(round2(33.333_333), 33.33);
        assert_eq!(round2(0.0), 0.0);
        assert_eq!(round2(199.999), 200.0);
    }

    #[test]
    fn test_ratio_zero_denominator() {
        assert_eq!(ratio(10.0, 0.0), 0.0);
        assert_eq!(ratio(10.0, 4.0), 2.5);
    }
}
