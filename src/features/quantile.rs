//! Small numeric helpers shared by the aggregators: means, linear
//! interpolation quantiles, and equal-frequency bucket assignment.

use anyhow::{Result, bail};

/// Computes the arithmetic mean of a slice of values. Returns 0.0 for empty input.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Linear-interpolation quantile over ascending-sorted values. `q` is a
/// probability in [0, 1]; an empty slice yields NaN (callers guard it).
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
    }
}

/// Interior cut points of `values` at the given ascending probabilities.
///
/// Fails on empty input so no caller ever bins against nothing.
pub fn quantile_edges(values: &[f64], probs: &[f64]) -> Result<Vec<f64>> {
    if values.is_empty() {
        bail!("cannot compute quantile edges of an empty column");
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    Ok(probs.iter().map(|q| quantile_sorted(&sorted, *q)).collect())
}

/// Interior probabilities of an equal-frequency split into `buckets`
/// buckets: 1/n, 2/n, …, (n−1)/n.
pub fn equal_frequency_probs(buckets: usize) -> Vec<f64> {
    (1..buckets).map(|i| i as f64 / buckets as f64).collect()
}

/// Bucket index of `value` given ascending interior edges. Intervals are
/// right-closed: a value equal to an edge falls in the lower bucket.
pub fn bucket_for(value: f64, edges: &[f64]) -> usize {
    edges.iter().filter(|edge| value > **edge).count()
}

/// Weighted mean. Fails on zero total weight so empty or zero-population
/// groups surface instead of dividing by zero.
pub fn weighted_mean(values: &[f64], weights: &[f64]) -> Result<f64> {
    let total: f64 = weights.iter().sum();
    if total == 0.0 {
        bail!("zero total weight in weighted mean");
    }
    let dot: f64 = values.iter().zip(weights).map(|(v, w)| v * w).sum();
    Ok(dot / total)
}

/// Rounds to 2 decimal places, the precision of the percentage columns.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
