use axum::{
    body::Bytes,
    extract::{Query, State as AxumState},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use raven_rush_types::{
    api::{ActionRequest, ActionResponse, ReferralRequest, ReferralResponse, UserView},
    Action,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::io;
use std::sync::Arc;
use std::time::Instant;

use crate::store::StorageError;
use crate::{now_ms, Quest, QuestError};

#[derive(Serialize)]
struct HealthzResponse {
    ok: bool,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct AddressQuery {
    address: Option<String>,
}

impl AddressQuery {
    fn address(self) -> Option<String> {
        self.address.filter(|address| !address.trim().is_empty())
    }
}

pub(super) async fn healthz() -> Response {
    Json(HealthzResponse { ok: true }).into_response()
}

pub(super) async fn get_users(
    AxumState(quest): AxumState<Arc<Quest>>,
    Query(query): Query<AddressQuery>,
) -> Response {
    let start = Instant::now();
    let address = query.address();
    let result = run_blocking(quest.clone(), move |quest| {
        let ledger = quest.ledger();
        let view = ledger.leaderboard(address.as_deref())?;
        if address.is_none() {
            return Ok(Json(view.leaderboard).into_response());
        }
        let cooldown_remaining_ms = view
            .user
            .as_ref()
            .map(|user| ledger.cooldown_remaining(user, now_ms()))
            .unwrap_or(0);
        Ok(Json(UserView {
            leaderboard: view.leaderboard,
            user: view.user,
            cooldown_remaining_ms,
        })
        .into_response())
    })
    .await;
    quest.http_metrics().record_users_read(start.elapsed());
    finish(result)
}

pub(super) async fn post_users(AxumState(quest): AxumState<Arc<Quest>>, body: Bytes) -> Response {
    let start = Instant::now();
    let result = match parse_action(&body) {
        Ok((address, action)) => {
            run_blocking(quest.clone(), move |quest| {
                let outcome = quest.ledger().apply(&address, action, now_ms());
                match (&outcome, action) {
                    (Err(QuestError::CooldownActive { .. }), _) => {
                        quest.http_metrics().inc_cooldown_rejection()
                    }
                    (Ok(_), Action::CheckIn) => quest.http_metrics().inc_checkin(),
                    (Ok(_), Action::Boost) => quest.http_metrics().inc_boost(),
                    _ => {}
                }
                let outcome = outcome?;
                Ok(Json(ActionResponse {
                    success: true,
                    user: outcome.record,
                    leaderboard: outcome.leaderboard,
                    cooldown_remaining_ms: outcome.cooldown_remaining_ms,
                })
                .into_response())
            })
            .await
        }
        Err(err) => Err(err),
    };
    quest.http_metrics().record_users_write(start.elapsed());
    finish(result)
}

pub(super) async fn get_referrals(
    AxumState(quest): AxumState<Arc<Quest>>,
    Query(query): Query<AddressQuery>,
) -> Response {
    let start = Instant::now();
    let address = query.address();
    let result = run_blocking(quest.clone(), move |quest| match address {
        Some(address) => Ok(Json(quest.referrals().lookup(&address)?).into_response()),
        None => Ok(Json(quest.referrals().leaderboard()?).into_response()),
    })
    .await;
    quest.http_metrics().record_referrals_read(start.elapsed());
    finish(result)
}

pub(super) async fn post_referrals(
    AxumState(quest): AxumState<Arc<Quest>>,
    body: Bytes,
) -> Response {
    let start = Instant::now();
    let result = match parse_referral(&body) {
        Ok((address, code)) => {
            run_blocking(quest.clone(), move |quest| {
                let registration = quest
                    .referrals()
                    .register_or_fetch(&address, code.as_deref())?;
                if registration.created {
                    quest.http_metrics().inc_referral_registered();
                }
                if registration.credited.is_some() {
                    quest.http_metrics().inc_referral_credited();
                }
                Ok(Json(ReferralResponse {
                    success: true,
                    record: registration.record,
                    created: registration.created,
                })
                .into_response())
            })
            .await
        }
        Err(err) => Err(err),
    };
    quest.http_metrics().record_referrals_write(start.elapsed());
    finish(result)
}

pub(super) async fn http_metrics(
    headers: HeaderMap,
    AxumState(quest): AxumState<Arc<Quest>>,
) -> Response {
    if let Some(status) = metrics_auth_error(&headers) {
        return status.into_response();
    }
    Json(quest.http_metrics_snapshot()).into_response()
}

fn metrics_auth_error(headers: &HeaderMap) -> Option<StatusCode> {
    let token = std::env::var("METRICS_AUTH_TOKEN").unwrap_or_default();
    if token.is_empty() {
        return None;
    }
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));
    let header_token = headers
        .get("x-metrics-token")
        .and_then(|value| value.to_str().ok());
    if bearer == Some(token.as_str()) || header_token == Some(token.as_str()) {
        None
    } else {
        Some(StatusCode::UNAUTHORIZED)
    }
}

/// Store access is synchronous file I/O; keep it off the async workers.
async fn run_blocking<F>(quest: Arc<Quest>, f: F) -> Result<Response, QuestError>
where
    F: FnOnce(&Quest) -> Result<Response, QuestError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&quest))
        .await
        .unwrap_or_else(|err| {
            tracing::error!(?err, "store task failed");
            Err(QuestError::Storage(StorageError::Io(io::Error::other(
                err.to_string(),
            ))))
        })
}

fn finish(result: Result<Response, QuestError>) -> Response {
    result.unwrap_or_else(IntoResponse::into_response)
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, QuestError> {
    serde_json::from_slice(body)
        .map_err(|err| QuestError::InvalidInput(format!("invalid JSON body: {err}")))
}

fn required_string(value: Option<Value>, field: &str) -> Result<String, QuestError> {
    match value {
        Some(Value::String(value)) if !value.trim().is_empty() => Ok(value),
        _ => Err(QuestError::InvalidInput(format!("{field} is required"))),
    }
}

fn parse_action(body: &[u8]) -> Result<(String, Action), QuestError> {
    let request: ActionRequest = parse_body(body)?;
    let address = required_string(request.address, "address")?;
    let action = required_string(request.action, "action")?
        .parse::<Action>()
        .map_err(|err| QuestError::InvalidInput(err.to_string()))?;
    Ok((address, action))
}

fn parse_referral(body: &[u8]) -> Result<(String, Option<String>), QuestError> {
    let request: ReferralRequest = parse_body(body)?;
    let address = required_string(request.address, "address")?;
    let code = match request.referral_code_used {
        None | Some(Value::Null) => None,
        Some(Value::String(code)) => Some(code),
        Some(_) => {
            return Err(QuestError::InvalidInput(
                "referralCodeUsed must be a string".to_string(),
            ))
        }
    };
    Ok((address, code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_body_requires_string_fields() {
        let (address, action) = parse_action(br#"{"address":"0xAB","action":"checkin"}"#).unwrap();
        assert_eq!(address, "0xAB");
        assert_eq!(action, Action::CheckIn);

        for body in [
            &br#"{"action":"checkin"}"#[..],
            br#"{"address":42,"action":"checkin"}"#,
            br#"{"address":"  ","action":"checkin"}"#,
            br#"{"address":"0xab"}"#,
            br#"{"address":"0xab","action":"dance"}"#,
            br#"not json"#,
            b"",
        ] {
            assert!(
                matches!(parse_action(body), Err(QuestError::InvalidInput(_))),
                "accepted {}",
                String::from_utf8_lossy(body)
            );
        }
    }

    #[test]
    fn referral_body_allows_missing_code() {
        let (address, code) = parse_referral(br#"{"address":"0xab"}"#).unwrap();
        assert_eq!(address, "0xab");
        assert_eq!(code, None);

        let (_, code) = parse_referral(br#"{"address":"0xab","referralCodeUsed":null}"#).unwrap();
        assert_eq!(code, None);

        let (_, code) =
            parse_referral(br#"{"address":"0xab","referralCodeUsed":"ABCDEF00"}"#).unwrap();
        assert_eq!(code.as_deref(), Some("ABCDEF00"));

        assert!(matches!(
            parse_referral(br#"{"address":"0xab","referralCodeUsed":7}"#),
            Err(QuestError::InvalidInput(_))
        ));
    }
}
