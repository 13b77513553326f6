//! Points shrink by 30% per extra attempt, never below a third of the maximum.

pub const ATTEMPT_PENALTY: f64 = 0.3;

/// `attempt` is 1-based; zero is treated as a first attempt.
pub fn points_for_attempt(max_points: u32, attempt: u32) -> u32 {
    let attempt = attempt.max(1);
    let factor = 1.0 - f64::from(attempt - 1) * ATTEMPT_PENALTY;
    let scaled = (f64::from(max_points) * factor).floor().max(0.0) as u32;
    scaled.max(max_points / 3)
}
