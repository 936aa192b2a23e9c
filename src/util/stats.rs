//! Shared numeric summary helpers used by column profiling (§4.F), the
//! expression evaluator's column-wise functions (§4.B), and the hybrid
//! executor's in-process aggregates (§4.I) — one linear-interpolation
//! percentile implementation so all three agree.

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Population standard deviation (denominator `n`, not `n-1`) — spec §4.I says
/// "stddev uses the population formula here".
pub fn stddev_population(values: &[f64], precomputed_mean: Option<f64>) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = precomputed_mean.unwrap_or_else(|| mean(values).unwrap_or(0.0));
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

pub fn median(sorted: &[f64]) -> Option<f64> {
    percentile(sorted, 50.0)
}

/// Linear-interpolation percentile à la NumPy's default method. `sorted` must
/// already be sorted ascending. `p` is in `[0, 100]`.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    if sorted.len() == 1 {
        return Some(sorted[0]);
    }
    let rank = (p / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        Some(sorted[lower])
    } else {
        let fraction = rank - lower as f64;
        Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
    }
}

pub fn min_max(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let mut min = values[0];
    let mut max = values[0];
    for &v in &values[1..] {
        if v < min {
            min = v;
        }
        if v > max {
            max = v;
        }
    }
    Some((min, max))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_interpolates_between_points() {
        let sorted = vec![1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&sorted, 0.0), Some(1.0));
        assert_eq!(percentile(&sorted, 100.0), Some(4.0));
        assert_eq!(percentile(&sorted, 50.0), Some(2.5));
    }

    #[test]
    fn stddev_population_uses_n_denominator() {
        let values = vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let m = mean(&values).unwrap();
        let sd = stddev_population(&values, Some(m));
        assert!((sd - 2.0).abs() < 1e-9);
    }

    #[test]
    fn min_max_handles_single_element() {
        assert_eq!(min_max(&[5.0]), Some((5.0, 5.0)));
        assert_eq!(min_max(&[]), None);
    }
}
