//! Descriptive statistics over small `f64` samples.
//!
//! Missing observations are modelled as `Option<f64>`; every reduction here
//! ignores them rather than failing, and undefined results come back as
//! `None` instead of `NaN`.

// ── Central tendency ──────────────────────────────────────────────────────────

/// Arithmetic mean of the present values. `None` when no value is present.
pub fn mean<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    let (sum, n) = values
        .into_iter()
        .flatten()
        .fold((0.0_f64, 0_usize), |(sum, n), v| (sum + v, n + 1));
    if n == 0 {
        None
    } else {
        Some(sum / n as f64)
    }
}

// ── Dispersion ────────────────────────────────────────────────────────────────

/// Standard deviation with `ddof` degrees of freedom removed from the divisor.
///
/// `None` when fewer than `ddof + 1` values are present.
fn std_dev(values: &[f64], ddof: usize) -> Option<f64> {
    let n = values.len();
    if n <= ddof {
        return None;
    }
    let m = values.iter().sum::<f64>() / n as f64;
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some((ss / (n - ddof) as f64).sqrt())
}

/// Population standard deviation (divisor `n`).
pub fn population_std<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    let present: Vec<f64> = values.into_iter().flatten().collect();
    std_dev(&present, 0)
}

/// Sample standard deviation (divisor `n - 1`). `None` for fewer than two values.
pub fn sample_std<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    let present: Vec<f64> = values.into_iter().flatten().collect();
    std_dev(&present, 1)
}

// ── Standardisation ───────────────────────────────────────────────────────────

/// Z-score of every element against the series' own mean and population
/// standard deviation.
///
/// The result is index-aligned with `values`. An element is `None` when:
/// * the element itself is missing,
/// * fewer than two values are present, or
/// * the series has zero variance.
pub fn z_scores(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    let stats = location_and_spread(&present);

    values
        .iter()
        .map(|v| {
            let (m, sd) = stats?;
            v.map(|x| (x - m) / sd)
        })
        .collect()
}

/// Mean and population standard deviation, or `None` when the series has
/// fewer than two values or no variance.
///
/// A constant series of a non-representable ratio such as 4/3 can yield a
/// standard deviation of a few ULPs; anything at or below the accumulated
/// rounding error of the mean counts as zero.
fn location_and_spread(present: &[f64]) -> Option<(f64, f64)> {
    let first = *present.first()?;
    if present.len() < 2 || present.iter().all(|&v| v == first) {
        return None;
    }
    let m = mean(present.iter().copied().map(Some))?;
    let sd = population_std(present.iter().copied().map(Some))?;
    let tolerance = f64::EPSILON * m.abs().max(1.0) * present.len() as f64;
    (sd.is_finite() && sd > tolerance).then_some((m, sd))
}

// ── Rounding / quantiles ──────────────────────────────────────────────────────

/// Round `value` to `decimals` places, halves away from zero.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10_f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Compute the `p`-th percentile of a **sorted** slice using linear
/// interpolation between the two closest ranks.
///
/// Returns `None` for an empty slice.
pub fn percentile(sorted_data: &[f64], p: f64) -> Option<f64> {
    let len = sorted_data.len();
    match len {
        0 => None,
        1 => Some(sorted_data[0]),
        _ => {
            let rank = (p / 100.0) * (len as f64 - 1.0);
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            if lo == hi {
                return Some(sorted_data[lo]);
            }
            let frac = rank - lo as f64;
            Some(sorted_data[lo] + frac * (sorted_data[hi] - sorted_data[lo]))
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
