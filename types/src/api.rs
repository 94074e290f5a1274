//! Request and response bodies of the quest HTTP surface.

use serde::{Deserialize, Serialize};

use crate::leaderboard::{PointsLeaderboardEntry, ReferralLeaderboardEntry};
use crate::records::{ReferralRecord, UserPointsRecord};

/// `POST /users` body. Fields are loosely typed so that a missing or
/// non-string value can be reported as bad input rather than a decode error.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ActionRequest {
    #[serde(default)]
    pub address: Option<serde_json::Value>,
    #[serde(default)]
    pub action: Option<serde_json::Value>,
}

/// `POST /referrals` body.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralRequest {
    #[serde(default)]
    pub address: Option<serde_json::Value>,
    #[serde(default)]
    pub referral_code_used: Option<serde_json::Value>,
}

/// `GET /users?address=` response.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub leaderboard: Vec<PointsLeaderboardEntry>,
    pub user: Option<UserPointsRecord>,
    pub cooldown_remaining_ms: u64,
}

/// `POST /users` response.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResponse {
    pub success: bool,
    pub user: UserPointsRecord,
    pub leaderboard: Vec<PointsLeaderboardEntry>,
    pub cooldown_remaining_ms: u64,
}

/// `POST /referrals` response.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ReferralResponse {
    pub success: bool,
    pub record: ReferralRecord,
    /// False when the address was already registered.
    pub created: bool,
}

/// `GET /referrals` response without an address.
pub type ReferralLeaderboard = Vec<ReferralLeaderboardEntry>;

/// Body of every non-2xx response.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}
