//! Statistical helpers shared by the aggregator and optimizer.

/// Arithmetic mean. Empty input yields 0.
#[must_use]
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator). Fewer than two values
/// yields 0.
#[must_use]
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>()
        / (values.len() - 1) as f64;
    variance.sqrt()
}

/// Pearson correlation of two equal-length series.
///
/// `None` when either series has zero variance or fewer than two points;
/// correlation is undefined there, not zero.
#[must_use]
pub fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() != b.len() || a.len() < 2 {
        return None;
    }

    let mean_a = mean(a);
    let mean_b = mean(b);

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }

    if var_a == 0.0 || var_b == 0.0 {
        return None;
    }
    Some(cov / (var_a.sqrt() * var_b.sqrt()))
}

/// Linearly interpolated percentile, `p` in `[0, 100]`. Empty input
/// yields 0.
#[must_use]
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let rank = (p / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let weight = rank - lower as f64;
    sorted[lower] * (1.0 - weight) + sorted[upper] * weight
}

/// Herfindahl index of a share vector: sum of squared shares.
///
/// Shares are normalized internally; a zero-sum input yields 1.0 (fully
/// concentrated by convention).
#[must_use]
pub fn herfindahl(weights: &[f64]) -> f64 {
    let total: f64 = weights.iter().map(|w| w.abs()).sum();
    if total == 0.0 {
        return 1.0;
    }
    weights
        .iter()
        .map(|w| {
            let share = w.abs() / total;
            share * share
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-10;

    #[test]
    fn mean_and_std_dev() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((mean(&values) - 5.0).abs() < TOL);
        // Sample std dev of the classic example.
        assert!((std_dev(&values) - 2.138_089_935).abs() < 1e-6);

        assert_eq!(mean(&[]), 0.0);
        assert_eq!(std_dev(&[3.0]), 0.0);
    }

    #[test]
    fn pearson_perfect_and_inverse() {
        let a = [1.0, 2.0, 3.0, 4.0];
        let b = [2.0, 4.0, 6.0, 8.0];
        let c = [8.0, 6.0, 4.0, 2.0];

        assert!((pearson(&a, &b).unwrap() - 1.0).abs() < TOL);
        assert!((pearson(&a, &c).unwrap() + 1.0).abs() < TOL);
    }

    #[test]
    fn pearson_undefined_for_constant_series() {
        let flat = [5.0, 5.0, 5.0];
        let varying = [1.0, 2.0, 3.0];
        assert_eq!(pearson(&flat, &varying), None);
        assert_eq!(pearson(&varying, &[1.0]), None);
    }

    #[test]
    fn percentile_interpolates() {
        let values = [10.0, 20.0, 30.0, 40.0];
        assert!((percentile(&values, 0.0) - 10.0).abs() < TOL);
        assert!((percentile(&values, 100.0) - 40.0).abs() < TOL);
        assert!((percentile(&values, 50.0) - 25.0).abs() < TOL);
        assert_eq!(percentile(&[], 50.0), 0.0);
    }

    #[test]
    fn herfindahl_bounds() {
        // Equal 4-way split: 4 * 0.25^2 = 0.25.
        assert!((herfindahl(&[1.0, 1.0, 1.0, 1.0]) - 0.25).abs() < TOL);
        // Fully concentrated.
        assert!((herfindahl(&[1.0, 0.0]) - 1.0).abs() < TOL);
        assert_eq!(herfindahl(&[0.0, 0.0]), 1.0);
    }
}
