use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const LATENCY_BUCKET_COUNT: usize = 12;
const LATENCY_BUCKETS_MS: [u64; LATENCY_BUCKET_COUNT] =
    [1, 2, 5, 10, 25, 50, 100, 250, 500, 1000, 2500, 5000];

#[derive(Clone, Debug, Serialize)]
pub struct LatencySnapshot {
    pub buckets_ms: Vec<u64>,
    pub counts: Vec<u64>,
    pub overflow: u64,
    pub count: u64,
    pub avg_ms: f64,
    pub max_ms: u64,
}

#[derive(Default)]
struct LatencyMetrics {
    buckets: [AtomicU64; LATENCY_BUCKET_COUNT],
    overflow: AtomicU64,
    count: AtomicU64,
    total_ms: AtomicU64,
    max_ms: AtomicU64,
}

impl LatencyMetrics {
    fn record(&self, duration: Duration) {
        let ms = duration.as_millis() as u64;
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_ms.fetch_add(ms, Ordering::Relaxed);
        self.max_ms.fetch_max(ms, Ordering::Relaxed);

        match LATENCY_BUCKETS_MS.iter().position(|bucket| ms <= *bucket) {
            Some(idx) => {
                self.buckets[idx].fetch_add(1, Ordering::Relaxed);
            }
            None => {
                self.overflow.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn snapshot(&self) -> LatencySnapshot {
        let count = self.count.load(Ordering::Relaxed);
        let total_ms = self.total_ms.load(Ordering::Relaxed);
        let avg_ms = if count > 0 {
            total_ms as f64 / count as f64
        } else {
            0.0
        };
        LatencySnapshot {
            buckets_ms: LATENCY_BUCKETS_MS.to_vec(),
            counts: self
                .buckets
                .iter()
                .map(|bucket| bucket.load(Ordering::Relaxed))
                .collect(),
            overflow: self.overflow.load(Ordering::Relaxed),
            count,
            avg_ms,
            max_ms: self.max_ms.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct HttpMetricsSnapshot {
    pub users_read: LatencySnapshot,
    pub users_write: LatencySnapshot,
    pub referrals_read: LatencySnapshot,
    pub referrals_write: LatencySnapshot,
    pub checkins: u64,
    pub boosts: u64,
    pub cooldown_rejections: u64,
    pub referrals_registered: u64,
    pub referrals_credited: u64,
    pub reject_origin: u64,
    pub reject_body_limit: u64,
    pub reject_rate_limit: u64,
}

#[derive(Default)]
pub struct HttpMetrics {
    users_read: LatencyMetrics,
    users_write: LatencyMetrics,
    referrals_read: LatencyMetrics,
    referrals_write: LatencyMetrics,
    checkins: AtomicU64,
    boosts: AtomicU64,
    cooldown_rejections: AtomicU64,
    referrals_registered: AtomicU64,
    referrals_credited: AtomicU64,
    reject_origin: AtomicU64,
    reject_body_limit: AtomicU64,
    reject_rate_limit: AtomicU64,
}

impl HttpMetrics {
    pub fn record_users_read(&self, duration: Duration) {
        self.users_read.record(duration);
    }

    pub fn record_users_write(&self, duration: Duration) {
        self.users_write.record(duration);
    }

    pub fn record_referrals_read(&self, duration: Duration) {
        self.referrals_read.record(duration);
    }

    pub fn record_referrals_write(&self, duration: Duration) {
        self.referrals_write.record(duration);
    }

    pub fn inc_checkin(&self) {
        self.checkins.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_boost(&self) {
        self.boosts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cooldown_rejection(&self) {
        self.cooldown_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_referral_registered(&self) {
        self.referrals_registered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_referral_credited(&self) {
        self.referrals_credited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_reject_origin(&self) {
        self.reject_origin.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_reject_body_limit(&self) {
        self.reject_body_limit.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_reject_rate_limit(&self) {
        self.reject_rate_limit.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HttpMetricsSnapshot {
        HttpMetricsSnapshot {
            users_read: self.users_read.snapshot(),
            users_write: self.users_write.snapshot(),
            referrals_read: self.referrals_read.snapshot(),
            referrals_write: self.referrals_write.snapshot(),
            checkins: self.checkins.load(Ordering::Relaxed),
            boosts: self.boosts.load(Ordering::Relaxed),
            cooldown_rejections: self.cooldown_rejections.load(Ordering::Relaxed),
            referrals_registered: self.referrals_registered.load(Ordering::Relaxed),
            referrals_credited: self.referrals_credited.load(Ordering::Relaxed),
            reject_origin: self.reject_origin.load(Ordering::Relaxed),
            reject_body_limit: self.reject_body_limit.load(Ordering::Relaxed),
            reject_rate_limit: self.reject_rate_limit.load(Ordering::Relaxed),
        }
    }
}
