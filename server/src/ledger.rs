//! Points ledger: check-ins, boosts, and the points leaderboard.
//!
//! Check-in eligibility is derived from `lastCheckIn` on every request; there
//! is no stored state besides the timestamp. An address is either
//! never-checked-in, cooling down (`cooldown_remaining > 0`), or eligible.

use raven_rush_types::{
    cooldown_remaining, normalize_address, rank_points, Action, PointsLeaderboardEntry,
    UserPointsRecord, BOOST_POINTS, CHECKIN_COOLDOWN_MS, CHECKIN_POINTS,
};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

use crate::store::RecordStore;
use crate::QuestError;

/// Tunables for check-ins and boosts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct LedgerRules {
    pub cooldown_ms: u64,
    pub checkin_points: u64,
    pub boost_points: u64,
}

impl Default for LedgerRules {
    fn default() -> Self {
        Self {
            cooldown_ms: CHECKIN_COOLDOWN_MS,
            checkin_points: CHECKIN_POINTS,
            boost_points: BOOST_POINTS,
        }
    }
}

/// Leaderboard plus, when requested, the caller's own record.
#[derive(Clone, Debug)]
pub struct LedgerView {
    pub leaderboard: Vec<PointsLeaderboardEntry>,
    pub user: Option<UserPointsRecord>,
}

/// Result of a successful action.
#[derive(Clone, Debug)]
pub struct ActionOutcome {
    pub record: UserPointsRecord,
    pub leaderboard: Vec<PointsLeaderboardEntry>,
    pub cooldown_remaining_ms: u64,
    /// True when the action created the record.
    pub created: bool,
}

pub struct PointsLedger {
    store: Arc<dyn RecordStore<UserPointsRecord>>,
    rules: LedgerRules,
    write_lock: Mutex<()>,
}

impl PointsLedger {
    pub fn new(store: Arc<dyn RecordStore<UserPointsRecord>>, rules: LedgerRules) -> Self {
        Self {
            store,
            rules,
            write_lock: Mutex::new(()),
        }
    }

    pub fn rules(&self) -> LedgerRules {
        self.rules
    }

    /// Milliseconds until `record` may check in again.
    pub fn cooldown_remaining(&self, record: &UserPointsRecord, now_ms: u64) -> u64 {
        cooldown_remaining(now_ms, record.last_check_in, self.rules.cooldown_ms)
    }

    /// Ranked leaderboard; `address` additionally selects the raw record of
    /// that address (unranked, and present even with zero points).
    pub fn leaderboard(&self, address: Option<&str>) -> Result<LedgerView, QuestError> {
        let records = self.store.load_all()?;
        let user = address
            .and_then(normalize_address)
            .and_then(|address| find(&records, &address).map(|index| records[index].clone()));
        Ok(LedgerView {
            leaderboard: rank_points(&records),
            user,
        })
    }

    /// Apply `action` for `address` at time `now_ms`.
    ///
    /// The record is created on first sight. A rejected check-in leaves the
    /// store untouched.
    pub fn apply(
        &self,
        address: &str,
        action: Action,
        now_ms: u64,
    ) -> Result<ActionOutcome, QuestError> {
        let address = normalize_address(address)
            .ok_or_else(|| QuestError::InvalidInput("address is required".to_string()))?;

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut records = self.store.load_all()?;
        let (index, created) = match find(&records, &address) {
            Some(index) => (index, false),
            None => {
                debug!(%address, "creating points record");
                records.push(UserPointsRecord::new(address.clone()));
                (records.len() - 1, true)
            }
        };

        let record = &mut records[index];
        let mutated = match action {
            Action::CheckIn => {
                let remaining = self.cooldown_remaining(record, now_ms);
                if remaining > 0 {
                    warn!(%address, remaining_ms = remaining, "check-in rejected: cooldown active");
                    return Err(QuestError::CooldownActive {
                        remaining_ms: remaining,
                    });
                }
                record.points = record.points.saturating_add(self.rules.checkin_points);
                record.last_check_in = Some(now_ms);
                info!(%address, points = record.points, "check-in recorded");
                true
            }
            Action::Boost => {
                record.points = record.points.saturating_add(self.rules.boost_points);
                record.boosts = record.boosts.saturating_add(1);
                record.last_boost = Some(now_ms);
                info!(%address, points = record.points, boosts = record.boosts, "boost recorded");
                true
            }
            Action::Ensure => false,
        };
        let record = record.clone();

        if mutated || created {
            self.store.save_all(&records)?;
        }

        Ok(ActionOutcome {
            cooldown_remaining_ms: self.cooldown_remaining(&record, now_ms),
            record,
            leaderboard: rank_points(&records),
            created,
        })
    }
}

fn find(records: &[UserPointsRecord], address: &str) -> Option<usize> {
    records
        .iter()
        .position(|record| record.address.to_lowercase() == address)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryStore, JsonFileStore, StorageError};

    const T0: u64 = 1_700_000_000_000;
    const HOUR: u64 = 60 * 60 * 1000;

    fn ledger_with(records: Vec<UserPointsRecord>) -> (PointsLedger, Arc<InMemoryStore<UserPointsRecord>>) {
        let store = Arc::new(InMemoryStore::with_records(records));
        let ledger = PointsLedger::new(store.clone(), LedgerRules::default());
        (ledger, store)
    }

    fn user(address: &str, points: u64) -> UserPointsRecord {
        UserPointsRecord {
            address: address.to_string(),
            points,
            ..UserPointsRecord::default()
        }
    }

    struct FailingStore;

    impl RecordStore<UserPointsRecord> for FailingStore {
        fn load_all(&self) -> Result<Vec<UserPointsRecord>, StorageError> {
            Ok(vec![user("0xaaa", 10)])
        }

        fn save_all(&self, _records: &[UserPointsRecord]) -> Result<(), StorageError> {
            Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only",
            )))
        }
    }

    #[test]
    fn ensure_creates_once_and_is_idempotent() {
        let (ledger, store) = ledger_with(Vec::new());

        let first = ledger.apply("0xAAA", Action::Ensure, T0).unwrap();
        assert!(first.created);
        assert_eq!(first.record, UserPointsRecord::new("0xaaa".to_string()));

        for i in 1..5 {
            let outcome = ledger.apply("0xaaa", Action::Ensure, T0 + i).unwrap();
            assert!(!outcome.created);
            assert_eq!(outcome.record, first.record);
        }

        let stored = store.load_all().unwrap();
        assert_eq!(stored, vec![UserPointsRecord::new("0xaaa".to_string())]);
        // Zero-point users are not ranked.
        assert!(first.leaderboard.is_empty());
    }

    #[test]
    fn ensure_leaves_existing_counters_alone() {
        let (ledger, store) = ledger_with(Vec::new());
        ledger.apply("0xaaa", Action::Boost, T0).unwrap();
        ledger.apply("0xaaa", Action::CheckIn, T0).unwrap();
        let before = store.load_all().unwrap();

        let outcome = ledger.apply("0xaaa", Action::Ensure, T0 + HOUR).unwrap();
        assert_eq!(outcome.record, before[0]);
        assert_eq!(store.load_all().unwrap(), before);
    }

    #[test]
    fn second_checkin_within_window_is_rejected() {
        let (ledger, store) = ledger_with(Vec::new());

        let first = ledger.apply("0xaaa", Action::CheckIn, T0).unwrap();
        assert_eq!(first.record.points, 10);
        assert_eq!(first.record.last_check_in, Some(T0));
        assert_eq!(first.cooldown_remaining_ms, CHECKIN_COOLDOWN_MS);

        let err = ledger
            .apply("0xaaa", Action::CheckIn, T0 + 6 * HOUR - 1)
            .unwrap_err();
        assert!(matches!(err, QuestError::CooldownActive { remaining_ms: 1 }));

        let stored = store.load_all().unwrap();
        assert_eq!(stored[0].points, 10);
        assert_eq!(stored[0].last_check_in, Some(T0));
    }

    #[test]
    fn checkin_after_window_succeeds_again() {
        let (ledger, _store) = ledger_with(Vec::new());

        ledger.apply("0xaaa", Action::CheckIn, T0).unwrap();
        let second = ledger.apply("0xaaa", Action::CheckIn, T0 + 6 * HOUR).unwrap();
        assert_eq!(second.record.points, 20);
        assert_eq!(second.record.last_check_in, Some(T0 + 6 * HOUR));

        let third = ledger.apply("0xaaa", Action::CheckIn, T0 + 13 * HOUR).unwrap();
        assert_eq!(third.record.points, 30);
        assert_eq!(third.record.last_check_in, Some(T0 + 13 * HOUR));
    }

    #[test]
    fn boosts_are_never_rate_limited() {
        let (ledger, _store) = ledger_with(Vec::new());
        for k in 1..=5u64 {
            let outcome = ledger.apply("0xaaa", Action::Boost, T0).unwrap();
            assert_eq!(outcome.record.boosts, k);
            assert_eq!(outcome.record.points, 200 * k);
            assert_eq!(outcome.record.last_boost, Some(T0));
        }
    }

    #[test]
    fn boost_does_not_touch_checkin_cooldown() {
        let (ledger, _store) = ledger_with(Vec::new());
        ledger.apply("0xaaa", Action::Boost, T0).unwrap();
        let outcome = ledger.apply("0xaaa", Action::CheckIn, T0).unwrap();
        assert_eq!(outcome.record.points, 210);
        ledger.apply("0xaaa", Action::Boost, T0 + 1).unwrap();
        assert!(ledger.apply("0xaaa", Action::CheckIn, T0 + 2).is_err());
    }

    #[test]
    fn addresses_are_case_insensitive() {
        let (ledger, store) = ledger_with(Vec::new());
        ledger.apply("0xABCDEF", Action::Boost, T0).unwrap();
        ledger.apply("0xabcdef", Action::Boost, T0).unwrap();
        ledger.apply("  0xAbCdEf ", Action::Boost, T0).unwrap();

        let stored = store.load_all().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].address, "0xabcdef");
        assert_eq!(stored[0].boosts, 3);
    }

    #[test]
    fn blank_address_is_invalid() {
        let (ledger, store) = ledger_with(Vec::new());
        assert!(matches!(
            ledger.apply("   ", Action::Ensure, T0),
            Err(QuestError::InvalidInput(_))
        ));
        assert!(store.load_all().unwrap().is_empty());
    }

    #[test]
    fn leaderboard_ranks_and_selects_user() {
        let (ledger, _store) = ledger_with(vec![
            user("0xa", 5),
            user("0xb", 20),
            user("0xc", 20),
            user("0xd", 0),
        ]);

        let view = ledger.leaderboard(Some("0xD")).unwrap();
        let ranks: Vec<(&str, u32)> = view
            .leaderboard
            .iter()
            .map(|entry| (entry.address.as_str(), entry.rank))
            .collect();
        assert_eq!(ranks, vec![("0xb", 1), ("0xc", 2), ("0xa", 3)]);
        assert_eq!(view.user, Some(user("0xd", 0)));

        assert_eq!(ledger.leaderboard(Some("0xeee")).unwrap().user, None);
        assert_eq!(ledger.leaderboard(None).unwrap().user, None);
    }

    #[test]
    fn action_returns_fresh_leaderboard() {
        let (ledger, _store) = ledger_with(vec![user("0xa", 100)]);
        let outcome = ledger.apply("0xb", Action::Boost, T0).unwrap();
        assert_eq!(outcome.leaderboard.len(), 2);
        assert_eq!(outcome.leaderboard[0].address, "0xb");
        assert_eq!(outcome.leaderboard[0].points, 200);
        assert_eq!(outcome.leaderboard[1].rank, 2);
    }

    #[test]
    fn custom_rules_apply() {
        let store = Arc::new(InMemoryStore::<UserPointsRecord>::new());
        let ledger = PointsLedger::new(
            store,
            LedgerRules {
                cooldown_ms: 1_000,
                checkin_points: 3,
                boost_points: 7,
            },
        );
        assert_eq!(ledger.apply("0xa", Action::CheckIn, T0).unwrap().record.points, 3);
        assert!(ledger.apply("0xa", Action::CheckIn, T0 + 999).is_err());
        assert_eq!(ledger.apply("0xa", Action::CheckIn, T0 + 1_000).unwrap().record.points, 6);
        assert_eq!(ledger.apply("0xa", Action::Boost, T0).unwrap().record.points, 13);
    }

    #[test]
    fn storage_failure_is_surfaced() {
        let ledger = PointsLedger::new(Arc::new(FailingStore), LedgerRules::default());
        assert!(matches!(
            ledger.apply("0xaaa", Action::Boost, T0),
            Err(QuestError::Storage(StorageError::Io(_)))
        ));
        // Ensure on an existing record performs no write.
        assert!(ledger.apply("0xaaa", Action::Ensure, T0).is_ok());
    }

    #[test]
    fn bad_row_in_file_does_not_wipe_other_records() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("user-data.json");
        std::fs::write(
            &path,
            r#"[{"address":"0xaaa","points":500,"boosts":2,"lastCheckIn":null,"lastBoost":null},
                {"address":"0xbbb","points":10.5}]"#,
        )
        .unwrap();
        let store = Arc::new(JsonFileStore::<UserPointsRecord>::open(&path).unwrap());
        let ledger = PointsLedger::new(store.clone(), LedgerRules::default());

        ledger.apply("0xccc", Action::Boost, 1).unwrap();

        let stored: Vec<(String, u64)> = store
            .load_all()
            .unwrap()
            .into_iter()
            .map(|record| (record.address, record.points))
            .collect();
        assert_eq!(
            stored,
            vec![("0xaaa".to_string(), 500), ("0xccc".to_string(), 200)]
        );
    }
}
