//! Elo rating updates applied on 2-player match completion.

pub const DEFAULT_RATING: i32 = 1200;
pub const RATING_FLOOR: i32 = 100;
const K_FACTOR: f64 = 32.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EloChange {
    pub change_a: i32,
    pub change_b: i32,
    pub new_a: i32,
    pub new_b: i32,
}

/// `score_a` is 1.0 for an A win, 0.5 for a draw, 0.0 for a loss.
/// With equal K-factors the changes are exact opposites; ratings never
/// fall below [`RATING_FLOOR`].
pub fn calculate(rating_a: i32, rating_b: i32, score_a: f64) -> EloChange {
    let expected_a = 1.0 / (1.0 + 10f64.powf((rating_b - rating_a) as f64 / 400.0));
    let change_a = (K_FACTOR * (score_a - expected_a)).round() as i32;
    let change_b = -change_a;
    EloChange {
        change_a,
        change_b,
        new_a: (rating_a + change_a).max(RATING_FLOOR),
        new_b: (rating_b + change_b).max(RATING_FLOOR),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_ratings_win_moves_16() {
        let change = calculate(1200, 1200, 1.0);
        assert_eq!(change.change_a, 16);
        assert_eq!(change.change_b, -16);
        assert_eq!(change.new_a, 1216);
        assert_eq!(change.new_b, 1184);
    }

    #[test]
    fn test_draw_between_equals_changes_nothing() {
        let change = calculate(1200, 1200, 0.5);
        assert_eq!(change.change_a, 0);
        assert_eq!(change.change_b, 0);
    }

    #[test]
    fn test_symmetry() {
        for (a, b, score) in [(1200, 1400, 1.0), (900, 1500, 0.0), (1000, 1000, 0.5)] {
            let forward = calculate(a, b, score);
            let backward = calculate(b, a, 1.0 - score);
            assert_eq!(forward.change_a, -backward.change_b);
            assert_eq!(forward.change_b, -backward.change_a);
        }
    }

    #[test]
    fn test_underdog_win_pays_more() {
        let change = calculate(1000, 1400, 1.0);
        assert!(change.change_a > 16);
    }

    #[test]
    fn test_rating_floor() {
        let change = calculate(105, 200, 0.0);
        assert!(change.change_a < -5);
        assert_eq!(change.new_a, RATING_FLOOR);
    }
}
