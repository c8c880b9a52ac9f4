/// Returns the two arguments ordered as (lesser, greater).
pub fn min_max(a: f32, b: f32) -> (f32, f32) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// A tiny positive quantity used to pad bounds and guard strict comparisons
/// against float round-off.
pub const TINY: f32 = 1e-6;
