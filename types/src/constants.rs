/// Minimum time between two check-ins by the same address (6 hours).
pub const CHECKIN_COOLDOWN_MS: u64 = 6 * 60 * 60 * 1000;

/// Points granted by a successful check-in.
pub const CHECKIN_POINTS: u64 = 10;

/// Points granted by a boost.
pub const BOOST_POINTS: u64 = 200;

/// Maximum number of rows returned by the referral leaderboard.
pub const REFERRAL_LEADERBOARD_LIMIT: usize = 50;

/// Number of address characters (after any `0x` prefix) forming a referral code.
pub const REF_CODE_LEN: usize = 8;
