use raven_rush_types::{BOOST_POINTS, CHECKIN_COOLDOWN_MS, CHECKIN_POINTS, REFERRAL_LEADERBOARD_LIMIT};
use serde::Serialize;
use std::path::PathBuf;

use crate::ledger::LedgerRules;

const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_USERS_FILE: &str = "users.json";
const DEFAULT_REFERRALS_FILE: &str = "referrals.json";
const DEFAULT_HTTP_RATE_LIMIT_PER_SECOND: u64 = 50;
const DEFAULT_HTTP_RATE_LIMIT_BURST: u32 = 200;
const DEFAULT_WRITE_RATE_LIMIT_PER_MINUTE: u64 = 60;
const DEFAULT_WRITE_RATE_LIMIT_BURST: u32 = 10;
const DEFAULT_HTTP_BODY_LIMIT_BYTES: usize = 16 * 1024;

#[derive(Clone, Debug, Serialize)]
pub struct QuestConfig {
    pub data_dir: PathBuf,
    pub users_file: String,
    pub referrals_file: String,
    pub checkin_cooldown_ms: u64,
    pub checkin_points: u64,
    pub boost_points: u64,
    pub referral_leaderboard_limit: usize,
    pub http_rate_limit_per_second: Option<u64>,
    pub http_rate_limit_burst: Option<u32>,
    pub write_rate_limit_per_minute: Option<u64>,
    pub write_rate_limit_burst: Option<u32>,
    pub http_body_limit_bytes: Option<usize>,
    /// Browser origins accepted by the API; `*` accepts any.
    pub allowed_origins: Vec<String>,
    /// Accept requests that carry no `Origin` header (curl, server-side callers).
    pub allow_no_origin: bool,
    pub in_memory: bool,
}

impl Default for QuestConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            users_file: DEFAULT_USERS_FILE.to_string(),
            referrals_file: DEFAULT_REFERRALS_FILE.to_string(),
            checkin_cooldown_ms: CHECKIN_COOLDOWN_MS,
            checkin_points: CHECKIN_POINTS,
            boost_points: BOOST_POINTS,
            referral_leaderboard_limit: REFERRAL_LEADERBOARD_LIMIT,
            http_rate_limit_per_second: Some(DEFAULT_HTTP_RATE_LIMIT_PER_SECOND),
            http_rate_limit_burst: Some(DEFAULT_HTTP_RATE_LIMIT_BURST),
            write_rate_limit_per_minute: Some(DEFAULT_WRITE_RATE_LIMIT_PER_MINUTE),
            write_rate_limit_burst: Some(DEFAULT_WRITE_RATE_LIMIT_BURST),
            http_body_limit_bytes: Some(DEFAULT_HTTP_BODY_LIMIT_BYTES),
            allowed_origins: Vec::new(),
            allow_no_origin: true,
            in_memory: false,
        }
    }
}

impl QuestConfig {
    pub fn users_path(&self) -> PathBuf {
        self.data_dir.join(&self.users_file)
    }

    pub fn referrals_path(&self) -> PathBuf {
        self.data_dir.join(&self.referrals_file)
    }

    pub fn ledger_rules(&self) -> LedgerRules {
        LedgerRules {
            cooldown_ms: self.checkin_cooldown_ms,
            checkin_points: self.checkin_points,
            boost_points: self.boost_points,
        }
    }

    /// Environment variables override config, matching the deployment scripts.
    pub fn apply_env_overrides(mut self) -> Self {
        if let Ok(raw) = std::env::var("ALLOWED_HTTP_ORIGINS") {
            self.allowed_origins = parse_origin_list(&raw);
        }
        if let Ok(raw) = std::env::var("ALLOW_HTTP_NO_ORIGIN") {
            self.allow_no_origin = parse_flag(&raw);
        }
        if let Some(value) = parse_env_u64("RATE_LIMIT_HTTP_PER_SEC") {
            self.http_rate_limit_per_second = Some(value);
        }
        if let Some(value) = parse_env_u32("RATE_LIMIT_HTTP_BURST") {
            self.http_rate_limit_burst = Some(value);
        }
        if let Some(value) = parse_env_u64("RATE_LIMIT_WRITE_PER_MIN") {
            self.write_rate_limit_per_minute = Some(value);
        }
        if let Some(value) = parse_env_u32("RATE_LIMIT_WRITE_BURST") {
            self.write_rate_limit_burst = Some(value);
        }
        self
    }
}

pub fn parse_origin_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect()
}

fn parse_flag(raw: &str) -> bool {
    matches!(raw, "1" | "true" | "TRUE" | "yes" | "YES")
}

fn parse_env_u64(var: &str) -> Option<u64> {
    std::env::var(var).ok().and_then(|v| v.parse().ok())
}

fn parse_env_u32(var: &str) -> Option<u32> {
    std::env::var(var).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_quest_rules() {
        let config = QuestConfig::default();
        let rules = config.ledger_rules();
        assert_eq!(rules.cooldown_ms, 6 * 60 * 60 * 1000);
        assert_eq!(rules.checkin_points, 10);
        assert_eq!(rules.boost_points, 200);
        assert_eq!(config.referral_leaderboard_limit, 50);
        assert_eq!(config.users_path(), PathBuf::from("data/users.json"));
        assert_eq!(config.referrals_path(), PathBuf::from("data/referrals.json"));
    }

    #[test]
    fn origin_list_skips_blanks() {
        assert_eq!(
            parse_origin_list(" https://a.example ,, https://b.example,"),
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
        assert!(parse_origin_list("").is_empty());
    }

    #[test]
    fn flags_accept_common_truthy_values() {
        assert!(parse_flag("1"));
        assert!(parse_flag("yes"));
        assert!(!parse_flag("0"));
        assert!(!parse_flag("off"));
    }
}
