//! Numeric constants shared by every layer of the model.

/// Magnitude below which a number or biomass is treated as zero when it
/// would otherwise be used as a denominator.
pub const NEGLIGIBLE: f64 = 1e-10;

/// Largest share of a prey length group that predators may remove in a
/// single sub-step. The per-step ceiling is this value raised to the number
/// of sub-steps.
pub const MAX_RATIO_CONSUMED: f64 = 0.95;

/// Returns `true` when `value` is small enough to be treated as zero.
pub fn is_negligible(value: f64) -> bool {
    value.abs() < NEGLIGIBLE
}

/// Divide `numerator` by `denominator`, substituting zero when the
/// denominator is negligible.
pub fn guarded_div(numerator: f64, denominator: f64) -> f64 {
    if is_negligible(denominator) {
        0.0
    } else {
        numerator / denominator
    }
}
