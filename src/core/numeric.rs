/// Replaces NaN and infinities with `fallback`.
pub fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() { value } else { fallback }
}

pub fn clamp(value: f64, lo: f64, hi: f64) -> f64 {
    value.max(lo).min(hi)
}

/// Magnitude past which an `f64` carries no sub-cent digits.
const WHOLE_CENTS_ABOVE: f64 = 1e15;

/// Rounds to cents, half away from zero. Non-finite input rounds to 0.
pub fn round2(value: f64) -> f64 {
    let x = finite_or(value, 0.0);
    if x.abs() >= WHOLE_CENTS_ABOVE {
        // Scaling by 100 could overflow to infinity.
        return x;
    }
    // `+ 0.0` folds a negative zero into a positive one.
    (x * 100.0).round() / 100.0 + 0.0
}

/// Fixed two-decimal rendering used in explanation lines.
pub fn money(value: f64) -> String {
    format!("{:.2}", round2(value))
}

pub fn percent(fraction: f64) -> String {
    format!("{:.1}%", finite_or(fraction, 0.0) * 100.0)
}
