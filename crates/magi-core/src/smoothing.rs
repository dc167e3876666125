//! Smoothing primitives shared by every estimator.
//!
//! All functions here are pure: no state, no side effects.

/// Exponential moving average step.
///
/// Returns `previous * (1 - alpha) + sample * alpha`. `alpha` is expected in
/// `(0, 1]`; values outside that range are clamped into it.
pub fn ema(previous: f64, sample: f64, alpha: f64) -> f64 {
    let alpha = clamp(alpha, f64::MIN_POSITIVE, 1.0);
    alpha.mul_add(sample, (1.0 - alpha) * previous)
}

/// Clamp `value` into `[lo, hi]`. NaN collapses to `lo`.
pub fn clamp(value: f64, lo: f64, hi: f64) -> f64 {
    if value.is_nan() {
        return lo;
    }
    value.max(lo).min(hi)
}

/// Sensor sanitising: NaN, infinities and negatives become 0.
pub fn sanitize(value: f64) -> f64 {
    if !value.is_finite() || value < 0.0 {
        0.0
    } else {
        value
    }
}

/// Clamp into `[0, 100]` and round to the nearest whole percent.
pub fn percent(value: f64) -> f64 {
    clamp(value, 0.0, 100.0).round()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ema_interpolates_between_previous_and_sample() {
        let pairs = [(0.0, 100.0), (80.0, 20.0), (50.0, 50.0), (3.5, -7.25)];
        for (prev, sample) in pairs {
            for alpha in [0.01, 0.2, 0.3, 0.5, 0.99, 1.0] {
                let out = ema(prev, sample, alpha);
                let lo = prev.min(sample);
                let hi = prev.max(sample);
                assert!(
                    out >= lo - 1e-9 && out <= hi + 1e-9,
                    "ema({prev}, {sample}, {alpha}) = {out} escaped [{lo}, {hi}]"
                );
            }
        }
    }

    #[test]
    fn ema_alpha_one_is_the_sample() {
        assert!((ema(12.0, 90.0, 1.0) - 90.0).abs() < 1e-12);
    }

    #[test]
    fn ema_matches_formula() {
        let out = ema(40.0, 100.0, 0.3);
        assert!((out - 58.0).abs() < 1e-9);
    }

    #[test]
    fn clamp_bounds() {
        assert_eq!(clamp(-5.0, 0.0, 100.0), 0.0);
        assert_eq!(clamp(105.0, 0.0, 100.0), 100.0);
        assert_eq!(clamp(42.0, 0.0, 100.0), 42.0);
        assert_eq!(clamp(f64::NAN, 0.0, 100.0), 0.0);
    }

    #[test]
    fn sanitize_rejects_garbage() {
        assert_eq!(sanitize(f64::NAN), 0.0);
        assert_eq!(sanitize(f64::INFINITY), 0.0);
        assert_eq!(sanitize(-12.0), 0.0);
        assert_eq!(sanitize(7.5), 7.5);
    }

    #[test]
    fn percent_rounds_and_clamps() {
        assert_eq!(percent(49.5), 50.0);
        assert_eq!(percent(130.0), 100.0);
        assert_eq!(percent(-3.0), 0.0);
    }
}
