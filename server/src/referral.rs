//! Referral registry: one record per address, invite counts credited to the
//! owner of the code a new user signs up with.

use raven_rush_types::{
    normalize_address, rank_referrals, ReferralLeaderboardEntry, ReferralRecord,
    REFERRAL_LEADERBOARD_LIMIT,
};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

use crate::store::RecordStore;
use crate::QuestError;

/// Outcome of [`ReferralRegistry::register_or_fetch`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registration {
    pub record: ReferralRecord,
    /// False when the address was already registered.
    pub created: bool,
    /// Address whose invite count was incremented, if any.
    pub credited: Option<String>,
}

pub struct ReferralRegistry {
    store: Arc<dyn RecordStore<ReferralRecord>>,
    leaderboard_limit: usize,
    write_lock: Mutex<()>,
}

impl ReferralRegistry {
    pub fn new(store: Arc<dyn RecordStore<ReferralRecord>>) -> Self {
        Self::with_limit(store, REFERRAL_LEADERBOARD_LIMIT)
    }

    pub fn with_limit(store: Arc<dyn RecordStore<ReferralRecord>>, leaderboard_limit: usize) -> Self {
        Self {
            store,
            leaderboard_limit,
            write_lock: Mutex::new(()),
        }
    }

    /// Register `address` with the code it was referred by, or return its
    /// existing record untouched.
    ///
    /// Re-registering never re-processes the referral. A code nobody owns is
    /// still stored as the referrer; it simply credits no one.
    pub fn register_or_fetch(
        &self,
        address: &str,
        referral_code_used: Option<&str>,
    ) -> Result<Registration, QuestError> {
        let address = normalize_address(address)
            .ok_or_else(|| QuestError::InvalidInput("address is required".to_string()))?;

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut records = self.store.load_all()?;
        if let Some(index) = find(&records, &address) {
            debug!(%address, "referral already registered");
            return Ok(Registration {
                record: records[index].clone(),
                created: false,
                credited: None,
            });
        }

        let code = referral_code_used
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .ok_or_else(|| QuestError::InvalidInput("referral code is required".to_string()))?;

        let credited = match records.iter_mut().find(|record| record.ref_code == code) {
            Some(owner) => {
                owner.invites = owner.invites.saturating_add(1);
                info!(referrer = %owner.address, invites = owner.invites, %address, "referral credited");
                Some(owner.address.clone())
            }
            None => {
                debug!(%address, code, "referral code has no owner");
                None
            }
        };

        let record = ReferralRecord::new(address, Some(code.to_string()));
        records.push(record.clone());
        self.store.save_all(&records)?;
        info!(address = %record.address, ref_code = %record.ref_code, "referral registered");

        Ok(Registration {
            record,
            created: true,
            credited,
        })
    }

    /// Top referrers with at least one invite.
    pub fn leaderboard(&self) -> Result<Vec<ReferralLeaderboardEntry>, QuestError> {
        let records = self.store.load_all()?;
        Ok(rank_referrals(&records, self.leaderboard_limit))
    }

    pub fn lookup(&self, address: &str) -> Result<ReferralRecord, QuestError> {
        let address = normalize_address(address)
            .ok_or_else(|| QuestError::InvalidInput("address is required".to_string()))?;
        let records = self.store.load_all()?;
        find(&records, &address)
            .map(|index| records[index].clone())
            .ok_or(QuestError::NotFound)
    }
}

fn find(records: &[ReferralRecord], address: &str) -> Option<usize> {
    records
        .iter()
        .position(|record| record.address.to_lowercase() == address)
}
