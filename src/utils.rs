use std::f64;

/// Log of the sum of exponentials, stable for very negative inputs.
///
/// An empty slice, or a slice of only `-inf`, gives `-inf`.
///
/// ```
/// use lotinduction::utils::logsumexp;
///
/// let lp = logsumexp(&[(0.25f64).ln(), (0.25f64).ln()]);
/// assert!((lp - (0.5f64).ln()).abs() < 1e-12);
/// assert_eq!(logsumexp(&[]), f64::NEG_INFINITY);
/// ```
#[inline(always)]
pub fn logsumexp(lps: &[f64]) -> f64 {
    let largest = lps.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if largest == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    if largest == f64::INFINITY {
        return f64::INFINITY;
    }
    let x = lps.iter().map(|lp| (lp - largest).exp()).sum::<f64>().ln();
    largest + x
}

/// `ln(exp(a) + exp(b))`.
#[inline]
pub fn logplusexp(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        b
    } else if b == f64::NEG_INFINITY {
        a
    } else if a > b {
        a + (b - a).exp().ln_1p()
    } else {
        b + (a - b).exp().ln_1p()
    }
}

/// Adds `lp` into a running logsumexp accumulator.
#[inline]
pub(crate) fn accumulate(acc: &mut f64, lp: f64) {
    *acc = logplusexp(*acc, lp)
}
