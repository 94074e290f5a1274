//! Derived leaderboards. Nothing here is persisted; both views are rebuilt
//! from the full record store on every read.

use serde::{Deserialize, Serialize};

use crate::records::{ReferralRecord, UserPointsRecord};

/// One row of the points leaderboard.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsLeaderboardEntry {
    pub address: String,
    pub points: u64,
    pub boosts: u64,
    pub last_check_in: Option<u64>,
    /// 1-based position.
    pub rank: u32,
}

/// One row of the referral leaderboard.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralLeaderboardEntry {
    pub address: String,
    pub ref_code: String,
    pub invites: u64,
    /// 1-based position.
    pub rank: u32,
}

/// Rank every address holding points, highest first.
///
/// Zero-point records are dropped before ranking. Ties keep store order.
pub fn rank_points(records: &[UserPointsRecord]) -> Vec<PointsLeaderboardEntry> {
    let mut ranked: Vec<&UserPointsRecord> =
        records.iter().filter(|record| record.points > 0).collect();
    // `sort_by` is stable, which gives the store-order tie break.
    ranked.sort_by(|a, b| b.points.cmp(&a.points));
    ranked
        .into_iter()
        .enumerate()
        .map(|(index, record)| PointsLeaderboardEntry {
            address: record.address.clone(),
            points: record.points,
            boosts: record.boosts,
            last_check_in: record.last_check_in,
            rank: index as u32 + 1,
        })
        .collect()
}

/// Rank referrers with at least one invite, capped at `limit` rows.
pub fn rank_referrals(records: &[ReferralRecord], limit: usize) -> Vec<ReferralLeaderboardEntry> {
    let mut ranked: Vec<&ReferralRecord> =
        records.iter().filter(|record| record.invites > 0).collect();
    ranked.sort_by(|a, b| b.invites.cmp(&a.invites));
    ranked
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(index, record)| ReferralLeaderboardEntry {
            address: record.address.clone(),
            ref_code: record.ref_code.clone(),
            invites: record.invites,
            rank: index as u32 + 1,
        })
        .collect()
}
