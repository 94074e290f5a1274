use raven_rush_types::{ReferralRecord, UserPointsRecord};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

mod api;
pub use api::Api;

pub mod config;
pub use config::QuestConfig;

mod error;
pub use error::QuestError;

pub mod ledger;
pub use ledger::{ActionOutcome, LedgerRules, LedgerView, PointsLedger};

mod metrics;
pub use metrics::{HttpMetrics, HttpMetricsSnapshot, LatencySnapshot};

pub mod referral;
pub use referral::{ReferralRegistry, Registration};

pub mod store;
pub use store::{InMemoryStore, JsonFileStore, RecordStore, StorageError, StoredRecord};

/// Wall-clock milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

/// Shared state behind the HTTP surface.
pub struct Quest {
    pub config: QuestConfig,
    ledger: PointsLedger,
    referrals: ReferralRegistry,
    http_metrics: HttpMetrics,
}

impl Quest {
    pub fn new(
        config: QuestConfig,
        points_store: Arc<dyn RecordStore<UserPointsRecord>>,
        referral_store: Arc<dyn RecordStore<ReferralRecord>>,
    ) -> Self {
        let ledger = PointsLedger::new(points_store, config.ledger_rules());
        let referrals = ReferralRegistry::with_limit(referral_store, config.referral_leaderboard_limit);
        Self {
            config,
            ledger,
            referrals,
            http_metrics: HttpMetrics::default(),
        }
    }

    /// Build the stores described by `config` and wire them up.
    pub fn open(config: QuestConfig) -> Result<Self, StorageError> {
        if config.in_memory {
            info!("using in-memory record stores");
            let points: Arc<InMemoryStore<UserPointsRecord>> = Arc::new(InMemoryStore::new());
            let referrals: Arc<InMemoryStore<ReferralRecord>> = Arc::new(InMemoryStore::new());
            return Ok(Self::new(config, points, referrals));
        }

        let points = JsonFileStore::<UserPointsRecord>::open(config.users_path())?;
        let referrals = JsonFileStore::<ReferralRecord>::open(config.referrals_path())?;
        info!(
            users = %points.path().display(),
            referrals = %referrals.path().display(),
            "using JSON file stores"
        );
        Ok(Self::new(config, Arc::new(points), Arc::new(referrals)))
    }

    pub fn ledger(&self) -> &PointsLedger {
        &self.ledger
    }

    pub fn referrals(&self) -> &ReferralRegistry {
        &self.referrals
    }

    pub fn http_metrics(&self) -> &HttpMetrics {
        &self.http_metrics
    }

    pub fn http_metrics_snapshot(&self) -> HttpMetricsSnapshot {
        self.http_metrics.snapshot()
    }
}
