use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error as ThisError;

use crate::REF_CODE_LEN;

/// Points, boosts, and check-in history for one wallet address.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPointsRecord {
    pub address: String,
    #[serde(default)]
    pub points: u64,
    #[serde(default)]
    pub boosts: u64,
    /// Milliseconds since the epoch of the last successful check-in.
    pub last_check_in: Option<u64>,
    pub last_boost: Option<u64>,
}

impl UserPointsRecord {
    /// Zeroed record for an address that has never acted.
    pub fn new(address: String) -> Self {
        Self {
            address,
            ..Self::default()
        }
    }
}

/// Referral bookkeeping for one wallet address.
///
/// `address`, `ref_code`, and `referrer` are fixed at registration; only
/// `invites` moves afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralRecord {
    pub address: String,
    pub ref_code: String,
    /// Code entered at registration, kept verbatim even if nobody owns it.
    pub referrer: Option<String>,
    #[serde(default)]
    pub invites: u64,
}

impl ReferralRecord {
    pub fn new(address: String, referrer: Option<String>) -> Self {
        let ref_code = ref_code_for(&address);
        Self {
            address,
            ref_code,
            referrer,
            invites: 0,
        }
    }
}

/// Entry of the earlier object-shaped referral store
/// (`{ "<address>": { referralCode, referredBy, timestamp } }`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyReferral {
    pub referral_code: String,
    #[serde(default)]
    pub referred_by: Option<String>,
    #[serde(default)]
    pub timestamp: Option<u64>,
}

/// Convert the object-shaped referral store into list records.
///
/// Legacy keys were raw addresses, so keys differing only in case name the
/// same address; the entry with the earliest `timestamp` wins (first in key
/// order on a tie or when untimed). Invite counts were never stored and are
/// recomputed from the `referredBy` links of the merged entries.
pub fn migrate_legacy_referrals(legacy: BTreeMap<String, LegacyReferral>) -> Vec<ReferralRecord> {
    let mut merged: BTreeMap<String, LegacyReferral> = BTreeMap::new();
    for (address, entry) in legacy {
        let address = address.to_lowercase();
        match merged.get(&address) {
            Some(kept) if !registered_earlier(&entry, kept) => {}
            _ => {
                merged.insert(address, entry);
            }
        }
    }

    merged
        .iter()
        .map(|(address, entry)| {
            let invites = merged
                .iter()
                .filter(|(other, _)| *other != address)
                .filter(|(_, other)| other.referred_by.as_deref() == Some(entry.referral_code.as_str()))
                .count() as u64;
            ReferralRecord {
                address: address.clone(),
                ref_code: entry.referral_code.clone(),
                referrer: entry.referred_by.clone(),
                invites,
            }
        })
        .collect()
}

fn registered_earlier(candidate: &LegacyReferral, kept: &LegacyReferral) -> bool {
    candidate.timestamp.unwrap_or(u64::MAX) < kept.timestamp.unwrap_or(u64::MAX)
}

#[derive(Debug, ThisError, PartialEq, Eq)]
#[error("unknown action: {0}")]
pub struct UnknownAction(pub String);

/// Points ledger action requested by a client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    /// Timed check-in, gated by the cooldown.
    CheckIn,
    /// Unconditional boost.
    Boost,
    /// Create the record if missing, otherwise no-op.
    Ensure,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::CheckIn => "checkin",
            Action::Boost => "boost",
            Action::Ensure => "ensure",
        }
    }
}

impl FromStr for Action {
    type Err = UnknownAction;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "checkin" => Ok(Self::CheckIn),
            "boost" => Ok(Self::Boost),
            "ensure" => Ok(Self::Ensure),
            other => Err(UnknownAction(other.to_string())),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical key for an address: trimmed and lowercased. Blank input is rejected.
pub fn normalize_address(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_lowercase())
}

/// Referral code owned by `address`: the first [`REF_CODE_LEN`] characters
/// after an optional `0x` prefix, uppercased.
pub fn ref_code_for(address: &str) -> String {
    let body = address
        .strip_prefix("0x")
        .or_else(|| address.strip_prefix("0X"))
        .unwrap_or(address);
    body.chars().take(REF_CODE_LEN).collect::<String>().to_uppercase()
}

/// Milliseconds until `last_check_in + window` is reached, or 0 if eligible.
pub fn cooldown_remaining(now: u64, last_check_in: Option<u64>, window: u64) -> u64 {
    match last_check_in {
        None => 0,
        Some(last) => window.saturating_sub(now.saturating_sub(last)),
    }
}
