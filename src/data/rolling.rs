//! Lagged rolling statistics
//!
//! Every statistic at index i is computed from the `window` values at
//! indices i-window .. i-1 only; the value being scored never enters its
//! own normalizing statistics. Undefined inputs propagate as `None` rather
//! than sentinel numbers.

/// Rolling mean over the `window` values strictly before each index.
///
/// None until `window` prior values exist, or when any of them is None.
pub fn lagged_mean(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    lagged_window_stat(values, window, |slice| {
        slice.iter().sum::<f64>() / slice.len() as f64
    })
}

/// Rolling population standard deviation over the prior `window` values.
pub fn lagged_std(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    lagged_window_stat(values, window, |slice| {
        let mean = slice.iter().sum::<f64>() / slice.len() as f64;
        let variance =
            slice.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / slice.len() as f64;
        variance.sqrt()
    })
}

/// Rolling z-score with one-step-lagged mean and standard deviation.
///
/// Returns (z, mu, sd). z[i] is None when the value, the window statistics,
/// or a zero standard deviation make it unevaluable; mu/sd stay defined in
/// the zero-sd case so callers can audit the degenerate window.
pub fn lagged_zscore(
    values: &[Option<f64>],
    window: usize,
) -> (Vec<Option<f64>>, Vec<Option<f64>>, Vec<Option<f64>>) {
    let mu = lagged_mean(values, window);
    let sd = lagged_std(values, window);

    let z = values
        .iter()
        .zip(mu.iter().zip(sd.iter()))
        .map(|(value, (mean, std))| match (value, mean, std) {
            (Some(v), Some(m), Some(s)) if *s != 0.0 => Some((v - m) / s),
            _ => None,
        })
        .collect();

    (z, mu, sd)
}

/// Rolling interpolated percentile (p in 0-100) of the prior `window` values.
pub fn lagged_quantile(values: &[Option<f64>], window: usize, p: f64) -> Vec<Option<f64>> {
    lagged_window_stat(values, window, |slice| {
        let mut sorted = slice.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        percentile_sorted(&sorted, p)
    })
}

/// Percentile rank of each value against the prior `window` values, 0-100.
///
/// The rank is the fraction of prior values strictly less than today's;
/// ties do not count. None when fewer than `window` priors exist or when
/// any prior value or today's value is undefined.
pub fn lagged_percent_rank(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    let n = values.len();
    let mut out = vec![None; n];

    for i in window..n {
        let current = match values[i] {
            Some(v) => v,
            None => continue,
        };

        let mut below = 0usize;
        let mut complete = true;
        for value in &values[i - window..i] {
            match value {
                Some(v) if *v < current => below += 1,
                Some(_) => {}
                None => {
                    complete = false;
                    break;
                }
            }
        }

        if complete {
            out[i] = Some(below as f64 / window as f64 * 100.0);
        }
    }

    out
}

/// Linearly interpolated p-th percentile (p in 0-100) of a slice.
pub fn percentile(data: &[f64], p: f64) -> f64 {
    assert!(!data.is_empty(), "percentile of empty slice");

    let mut sorted = data.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    percentile_sorted(&sorted, p)
}

fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }

    let rank = p / 100.0 * (n - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = rank - lo as f64;
        sorted[lo] + (sorted[hi] - sorted[lo]) * frac
    }
}

fn lagged_window_stat<F>(values: &[Option<f64>], window: usize, stat: F) -> Vec<Option<f64>>
where
    F: Fn(&[f64]) -> f64,
{
    let n = values.len();
    let mut out = vec![None; n];
    if window == 0 {
        return out;
    }

    let mut slice = Vec::with_capacity(window);
    for i in window..n {
        slice.clear();
        for value in &values[i - window..i] {
            match value {
                Some(v) => slice.push(*v),
                None => break,
            }
        }

        if slice.len() == window {
            out[i] = Some(stat(&slice));
        }
    }

    out
}
