//! Shared types for the Raven Rush quest service: stored records, the wire
//! format of the HTTP surface, and the leaderboard rules.

pub mod api;
pub mod constants;
pub use constants::*;
pub mod leaderboard;
pub use leaderboard::{
    rank_points, rank_referrals, PointsLeaderboardEntry, ReferralLeaderboardEntry,
};
pub mod records;
pub use records::{
    cooldown_remaining, migrate_legacy_referrals, normalize_address, ref_code_for, Action,
    LegacyReferral, ReferralRecord, UnknownAction, UserPointsRecord,
};
