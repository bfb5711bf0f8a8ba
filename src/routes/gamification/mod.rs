mod handler;
pub mod model;

pub use handler::{
    award_badge, get_profile, leaderboard, list_badges, mark_notification_read, member_stats,
    notifications, patch_profile,
};
