//! Experience levels: level L starts at `floor(100 * (1.5^(L-1) - 1))` xp.

use serde::Serialize;

const BASE_XP: f64 = 100.0;
const GROWTH_FACTOR: f64 = 1.5;
const MAX_LEVEL: u32 = 100;

/// XP at which `level` begins. Level 1 begins at 0.
pub fn xp_for_level(level: u32) -> i64 {
    let exponent = level.max(1) as i32 - 1;
    (BASE_XP * (GROWTH_FACTOR.powi(exponent) - 1.0)).floor() as i64
}

/// Level reached with `xp`; never below 1.
pub fn calculate_level(xp: i64) -> u32 {
    let mut level = 1;
    while level < MAX_LEVEL && xp >= xp_for_level(level + 1) {
        level += 1;
    }
    level
}

/// Percent of the way from the current level to the next, 0..=100.
pub fn progress_to_next_level(xp: i64) -> u32 {
    let level = calculate_level(xp);
    let current = xp_for_level(level);
    let next = xp_for_level(level + 1);
    if next <= current {
        return 100;
    }

    let percent = ((xp - current) as f64 / (next - current) as f64 * 100.0).floor();
    percent.clamp(0.0, 100.0) as u32
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelInfo {
    pub level: u32,
    pub current_xp: i64,
    pub next_level_xp: i64,
    pub progress_to_next_level: u32,
    pub xp_needed_for_next_level: i64,
}

impl LevelInfo {
    pub fn for_xp(xp: i64) -> Self {
        let level = calculate_level(xp);
        let next_level_xp = xp_for_level(level + 1);
        Self {
            level,
            current_xp: xp,
            next_level_xp,
            progress_to_next_level: progress_to_next_level(xp),
            xp_needed_for_next_level: next_level_xp - xp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xp_thresholds() {
        assert_eq!(xp_for_level(1), 0);
        assert_eq!(xp_for_level(2), 50);
        assert_eq!(xp_for_level(3), 125);
        assert_eq!(xp_for_level(4), 237);
    }

    #[test]
    fn test_calculate_level() {
        assert_eq!(calculate_level(-10), 1);
        assert_eq!(calculate_level(0), 1);
        assert_eq!(calculate_level(49), 1);
        assert_eq!(calculate_level(50), 2);
        assert_eq!(calculate_level(124), 2);
        assert_eq!(calculate_level(125), 3);
        assert_eq!(calculate_level(i64::MAX), MAX_LEVEL);
    }

    #[test]
    fn test_progress() {
        assert_eq!(progress_to_next_level(0), 0);
        assert_eq!(progress_to_next_level(25), 50);
        assert_eq!(progress_to_next_level(50), 0);
        assert_eq!(progress_to_next_level(-5), 0);
    }

    #[test]
    fn test_level_info() {
        let info = LevelInfo::for_xp(60);
        assert_eq!(info.level, 2);
        assert_eq!(info.next_level_xp, 125);
        assert_eq!(info.xp_needed_for_next_level, 65);
        assert_eq!(info.progress_to_next_level, 13);
    }
}
