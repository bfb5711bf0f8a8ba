//! Points, streak and level arithmetic applied to a scored visit.
//!
//! Everything here is pure: callers pass "today" in, so the rules can be
//! checked without a clock or a database.

use chrono::{Days, NaiveDate};
use serde::Serialize;

pub const BASE_POINTS: i32 = 100;
pub const EXPERIENCE_PER_LEVEL: i64 = 1000;

/// Gamification state of a member before a visit is scored.
#[derive(Debug, Clone, Copy)]
pub struct Progress {
    pub total_points: i64,
    pub experience: i64,
    pub level: i32,
    pub current_streak: i32,
    pub longest_streak: i32,
    pub last_visit: Option<NaiveDate>,
}

/// Outcome of scoring one visit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VisitScore {
    pub streak: i32,
    pub multiplier: f64,
    pub base_points: i32,
    pub earned: i32,
    pub total_points: i64,
    pub experience: i64,
    pub level: i32,
    pub longest_streak: i32,
    pub leveled_up: bool,
}

fn yesterday(today: NaiveDate) -> Option<NaiveDate> {
    today.checked_sub_days(Days::new(1))
}

/// A visit the day after the last scored one continues the streak; any other
/// history (a gap, no history at all) starts a new streak of one.
pub fn streak_after_visit(current_streak: i32, last_visit: Option<NaiveDate>, today: NaiveDate) -> i32 {
    match last_visit {
        Some(last) if Some(last) == yesterday(today) => current_streak.max(0) + 1,
        _ => 1,
    }
}

/// Tenths of the multiplier: streak 1 → 10, streak 4 → 13. Never below 10.
fn multiplier_tenths(streak: i32) -> i64 {
    (10 + i64::from(streak) - 1).max(10)
}

/// `max(1.0, 1.0 + (streak - 1) * 0.1)`. Uncapped.
pub fn streak_multiplier(streak: i32) -> f64 {
    multiplier_tenths(streak) as f64 / 10.0
}

/// `floor(BASE_POINTS * multiplier)`, computed in integer tenths.
pub fn points_for_streak(streak: i32) -> i32 {
    let earned = i64::from(BASE_POINTS) * multiplier_tenths(streak) / 10;
    i32::try_from(earned).unwrap_or(i32::MAX)
}

pub fn level_for_experience(experience: i64) -> i32 {
    let level = experience.max(0) / EXPERIENCE_PER_LEVEL + 1;
    i32::try_from(level).unwrap_or(i32::MAX)
}

pub fn experience_to_next_level(level: i32, experience: i64) -> i64 {
    i64::from(level) * EXPERIENCE_PER_LEVEL - experience
}

/// Applies a flat point grant (badge awards) without touching streaks.
pub fn grant_points(progress: &Progress, points: i32) -> (i64, i64, i32) {
    let total_points = progress.total_points + i64::from(points);
    let experience = progress.experience + i64::from(points);
    (total_points, experience, level_for_experience(experience))
}

/// Scores the first visit of `today`.
pub fn score_visit(progress: &Progress, today: NaiveDate) -> VisitScore {
    let streak = streak_after_visit(progress.current_streak, progress.last_visit, today);
    let earned = points_for_streak(streak);
    let (total_points, experience, level) = grant_points(progress, earned);

    VisitScore {
        streak,
        multiplier: streak_multiplier(streak),
        base_points: BASE_POINTS,
        earned,
        total_points,
        experience,
        level,
        longest_streak: progress.longest_streak.max(streak),
        leveled_up: level > progress.level,
    }
}

/// Length of the run of distinct visit days ending today. Input order and
/// duplicates do not matter.
pub fn consecutive_visit_days(visits: &[NaiveDate], today: NaiveDate) -> u32 {
    let mut days: Vec<NaiveDate> = visits.iter().copied().filter(|d| *d <= today).collect();
    days.sort_unstable_by(|a, b| b.cmp(a));
    days.dedup();

    let mut expected = today;
    let mut streak = 0;
    for day in days {
        if day != expected {
            break;
        }
        streak += 1;
        match yesterday(expected) {
            Some(prev) => expected = prev,
            None => break,
        }
    }
    streak
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn progress(streak: i32, last_visit: Option<NaiveDate>) -> Progress {
        Progress {
            total_points: 0,
            experience: 0,
            level: 1,
            current_streak: streak,
            longest_streak: streak,
            last_visit,
        }
    }

    #[test]
    fn streak_continues_from_yesterday() {
        let today = day(2025, 3, 10);
        assert_eq!(streak_after_visit(3, Some(day(2025, 3, 9)), today), 4);
    }

    #[test]
    fn streak_resets_after_a_gap() {
        let today = day(2025, 3, 10);
        assert_eq!(streak_after_visit(12, Some(day(2025, 3, 8)), today), 1);
        assert_eq!(streak_after_visit(12, Some(day(2024, 3, 9)), today), 1);
    }

    #[test]
    fn first_scored_visit_starts_at_one() {
        assert_eq!(streak_after_visit(0, None, day(2025, 3, 10)), 1);
    }

    #[test]
    fn streak_continues_across_month_and_year_boundaries() {
        assert_eq!(streak_after_visit(5, Some(day(2025, 2, 28)), day(2025, 3, 1)), 6);
        assert_eq!(streak_after_visit(1, Some(day(2024, 12, 31)), day(2025, 1, 1)), 2);
    }

    #[test]
    fn multiplier_and_points() {
        assert_eq!(streak_multiplier(1), 1.0);
        assert_eq!(points_for_streak(1), 100);
        assert_eq!(streak_multiplier(4), 1.3);
        assert_eq!(points_for_streak(4), 130);
        assert_eq!(points_for_streak(10), 190);
        assert_eq!(streak_multiplier(100), 10.9);
        assert_eq!(points_for_streak(100), 1090);
        // a corrupt non-positive streak never drops below the base
        assert_eq!(streak_multiplier(0), 1.0);
        assert_eq!(points_for_streak(-3), 100);
    }

    #[test]
    fn level_is_experience_over_a_thousand_plus_one() {
        assert_eq!(level_for_experience(0), 1);
        assert_eq!(level_for_experience(999), 1);
        assert_eq!(level_for_experience(1000), 2);
        assert_eq!(level_for_experience(4321), 5);
        assert_eq!(experience_to_next_level(5, 4321), 679);
    }

    #[test]
    fn streak_of_three_scanning_again_earns_130() {
        let today = day(2025, 6, 2);
        let before = Progress {
            total_points: 500,
            experience: 500,
            level: 1,
            current_streak: 3,
            longest_streak: 7,
            last_visit: Some(day(2025, 6, 1)),
        };

        let score = score_visit(&before, today);
        assert_eq!(score.streak, 4);
        assert_eq!(score.multiplier, 1.3);
        assert_eq!(score.earned, 130);
        assert_eq!(score.total_points, 630);
        assert_eq!(score.longest_streak, 7);
        assert!(!score.leveled_up);
    }

    #[test]
    fn crossing_a_thousand_levels_up() {
        let today = day(2025, 6, 2);
        let mut before = progress(0, None);
        before.experience = 950;
        before.total_points = 950;

        let score = score_visit(&before, today);
        assert_eq!(score.experience, 1050);
        assert_eq!(score.level, 2);
        assert!(score.leveled_up);
        assert_eq!(score.longest_streak, 1);
    }

    #[test]
    fn badge_grants_recompute_level() {
        let mut before = progress(2, None);
        before.experience = 600;
        before.total_points = 800;
        assert_eq!(grant_points(&before, 500), (1300, 1100, 2));
    }

    #[test]
    fn consecutive_days_counts_distinct_days_ending_today() {
        let today = day(2025, 6, 10);
        let visits = [
            day(2025, 6, 10),
            day(2025, 6, 10),
            day(2025, 6, 9),
            day(2025, 6, 8),
            day(2025, 6, 5),
        ];
        assert_eq!(consecutive_visit_days(&visits, today), 3);
    }

    #[test]
    fn no_visit_today_means_no_running_streak() {
        let today = day(2025, 6, 10);
        assert_eq!(consecutive_visit_days(&[day(2025, 6, 9)], today), 0);
        assert_eq!(consecutive_visit_days(&[], today), 0);
    }
}
