//! Display formatting for metric values.

/// Format a fraction in `[0, 1]` as a percentage with two decimals.
#[must_use]
pub fn format_pct(fraction: f64) -> String {
    format!("{:.2}%", fraction * 100.0)
}

/// Format a ratio with four decimals.
#[must_use]
pub fn format_ratio(value: f64) -> String {
    format!("{value:.4}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats() {
        assert_eq!(format_pct(0.5), "50.00%");
        assert_eq!(format_pct(0.12345), "12.35%");
        assert_eq!(format_ratio(1.23456789), "1.2346");
        assert_eq!(format_ratio(-0.5), "-0.5000");
    }
}
