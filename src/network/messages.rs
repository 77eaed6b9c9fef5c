// src/network/messages.rs

//! Stratum wire messages
//!
//! Outgoing requests are `{id, method, params}`. Incoming lines are either
//! replies `{id, result, error}` or pushes `{method, params}`. Which one a
//! line is depends on whether its id matches a pending request, so decoding
//! happens in two steps: serde into [`RawMessage`], then [`StratumMessage::classify`]
//! with the kind of the pending request (if any).
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Method names used on the wire
pub mod method {
    /// Client → server: open a mining subscription
    pub const SUBSCRIBE: &str = "mining.subscribe";
    /// Client → server: authorize a worker
    pub const AUTHORIZE: &str = "mining.authorize";
    /// Client → server: submit a share
    pub const SUBMIT: &str = "mining.submit";
    /// Server → client: share difficulty changed
    pub const SET_DIFFICULTY: &str = "mining.set_difficulty";
    /// Server → client: new job
    pub const NOTIFY: &str = "mining.notify";
}

/// Extra-nonce-2 size assumed when the pool does not send one
pub const DEFAULT_EXTRANONCE2_SIZE: usize = 4;

/// Kind of an outstanding request, used to interpret its reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// `mining.subscribe`
    Subscribe,
    /// `mining.authorize`
    Authorize,
    /// `mining.submit`
    Submit,
}

/// Outgoing JSON-RPC request
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    /// Session-unique, strictly increasing id
    pub id: u64,
    /// Method name
    pub method: &'static str,
    /// Positional parameters
    pub params: Value,
}

/// Any inbound line, before it is known to be a reply or a push
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawMessage {
    /// Request id; null or absent for pushes
    #[serde(default)]
    pub id: Option<Value>,
    /// Push method name
    #[serde(default)]
    pub method: Option<String>,
    /// Push parameters
    #[serde(default)]
    pub params: Option<Value>,
    /// Reply result
    #[serde(default)]
    pub result: Option<Value>,
    /// Reply error
    #[serde(default)]
    pub error: Option<Value>,
}

impl RawMessage {
    /// Numeric request id, if the line carries one
    pub fn request_id(&self) -> Option<u64> {
        self.id.as_ref().and_then(Value::as_u64)
    }
}

/// Subscription parameters assigned by the pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// Server-assigned extra-nonce-1 (hex)
    pub extranonce1: String,
    /// Size in bytes of the client-chosen extra-nonce-2
    pub extranonce2_size: usize,
}

/// Positional parameters of `mining.notify`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobTemplate {
    /// Unique job identifier
    #[serde(rename = "jobId")]
    pub job_id: String,
    /// Previous block hash (hex)
    #[serde(rename = "prevhash")]
    pub prev_hash: String,
    /// Coinbase part before the extra-nonces
    pub coinb1: String,
    /// Coinbase part after the extra-nonces
    pub coinb2: String,
    /// Merkle branch hashes
    pub merkle_branch: Vec<String>,
    /// Block version (hex)
    pub version: String,
    /// Encoded target (hex)
    pub nbits: String,
    /// Block time (hex)
    pub ntime: String,
    /// Whether earlier jobs must be abandoned
    pub clean_jobs: bool,
}

impl JobTemplate {
    /// Parses `mining.notify` params
    pub fn from_params(params: &[Value]) -> Result<Self, String> {
        if params.len() < 8 {
            return Err(format!("expected at least 8 params, got {}", params.len()));
        }

        let string = |index: usize, name: &str| -> Result<String, String> {
            params[index]
                .as_str()
                .map(str::to_owned)
                .ok_or_else(|| format!("{} not a string", name))
        };

        let merkle_branch = params[4]
            .as_array()
            .ok_or("merkle_branch not an array")?
            .iter()
            .map(|v| v.as_str().map(str::to_owned))
            .collect::<Option<Vec<_>>>()
            .ok_or("merkle branch not a string")?;

        Ok(JobTemplate {
            job_id: string(0, "job_id")?,
            prev_hash: string(1, "prev_hash")?,
            coinb1: string(2, "coinb1")?,
            coinb2: string(3, "coinb2")?,
            merkle_branch,
            version: string(5, "version")?,
            nbits: string(6, "nbits")?,
            ntime: string(7, "ntime")?,
            clean_jobs: params.get(8).and_then(Value::as_bool).unwrap_or(false),
        })
    }
}

/// Closed set of inbound messages the session reacts to
#[derive(Debug, Clone, PartialEq)]
pub enum StratumMessage {
    /// Reply to `mining.subscribe`; `None` when the result lacks extra-nonce data
    SubscribeReply(Option<Subscription>),
    /// Reply to `mining.authorize`
    AuthorizeReply {
        /// `result == true` and no error
        authorized: bool,
    },
    /// Reply to `mining.submit`
    SubmitReply {
        /// `result == true` and no error
        accepted: bool,
        /// Pool supplied rejection reason
        reason: Option<String>,
    },
    /// `mining.set_difficulty`
    DifficultyPush(f64),
    /// `mining.notify`
    NotifyPush(JobTemplate),
    /// A known push whose params could not be used
    InvalidPush {
        /// Push method
        method: String,
        /// What was wrong
        reason: String,
    },
    /// Anything else: unknown method, or a reply nobody waits for
    UnknownPush {
        /// Method name if present
        method: Option<String>,
    },
}

impl StratumMessage {
    /// Interprets a raw line given the kind of the request it answers
    ///
    /// `pending` is `None` when the id did not match an outstanding
    /// request; the line is then dispatched by method name.
    pub fn classify(raw: RawMessage, pending: Option<RequestKind>) -> StratumMessage {
        let ok = raw.result == Some(Value::Bool(true)) && raw.error.is_none();

        match pending {
            Some(RequestKind::Subscribe) => {
                StratumMessage::SubscribeReply(parse_subscription(raw.result.as_ref()))
            }
            Some(RequestKind::Authorize) => StratumMessage::AuthorizeReply { authorized: ok },
            Some(RequestKind::Submit) => StratumMessage::SubmitReply {
                accepted: ok,
                reason: raw.error.as_ref().map(describe_error),
            },
            None => classify_push(raw),
        }
    }
}

fn classify_push(raw: RawMessage) -> StratumMessage {
    let params = match &raw.params {
        Some(Value::Array(items)) => items.as_slice(),
        _ => &[],
    };

    match raw.method.as_deref() {
        Some(method::SET_DIFFICULTY) => match params.first().and_then(Value::as_f64) {
            Some(diff) if diff.is_finite() && diff > 0.0 => StratumMessage::DifficultyPush(diff),
            _ => StratumMessage::InvalidPush {
                method: method::SET_DIFFICULTY.into(),
                reason: format!("invalid difficulty {:?}", params.first()),
            },
        },
        Some(method::NOTIFY) => match JobTemplate::from_params(params) {
            Ok(template) => StratumMessage::NotifyPush(template),
            Err(reason) => StratumMessage::InvalidPush {
                method: method::NOTIFY.into(),
                reason,
            },
        },
        other => StratumMessage::UnknownPush {
            method: other.map(str::to_owned),
        },
    }
}

/// Reads `[subscriptions, extranonce1, extranonce2_size]`
fn parse_subscription(result: Option<&Value>) -> Option<Subscription> {
    let items = result?.as_array()?;
    let extranonce1 = items.get(1)?.as_str()?.to_owned();
    let extranonce2_size = items
        .get(2)
        .and_then(Value::as_u64)
        .filter(|size| *size > 0)
        .map(|size| size as usize)
        .unwrap_or(DEFAULT_EXTRANONCE2_SIZE);

    Some(Subscription {
        extranonce1,
        extranonce2_size,
    })
}

/// Pools report errors as strings, `[code, message, data]` triples or objects
fn describe_error(error: &Value) -> String {
    match error {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .get(1)
            .and_then(Value::as_str)
            .map(str::to_owned)
            .unwrap_or_else(|| error.to_string()),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .unwrap_or_else(|| error.to_string()),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawMessage {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn subscribe_reply_sets_extranonce() {
        let msg = StratumMessage::classify(
            raw(json!({"id": 1, "result": ["sessid", "ab12", 4], "error": null})),
            Some(RequestKind::Subscribe),
        );
        assert_eq!(
            msg,
            StratumMessage::SubscribeReply(Some(Subscription {
                extranonce1: "ab12".into(),
                extranonce2_size: 4,
            }))
        );
    }

    #[test]
    fn subscribe_reply_defaults_extranonce2_size() {
        let msg = StratumMessage::classify(
            raw(json!({"id": 1, "result": [[["mining.notify", "x"]], "ff00"]})),
            Some(RequestKind::Subscribe),
        );
        match msg {
            StratumMessage::SubscribeReply(Some(sub)) => assert_eq!(sub.extranonce2_size, 4),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn subscribe_reply_without_extranonce_is_none() {
        let msg = StratumMessage::classify(
            raw(json!({"id": 1, "result": true})),
            Some(RequestKind::Subscribe),
        );
        assert_eq!(msg, StratumMessage::SubscribeReply(None));
    }

    #[test]
    fn authorize_requires_true_without_error() {
        let ok = StratumMessage::classify(raw(json!({"id": 2, "result": true})), Some(RequestKind::Authorize));
        assert_eq!(ok, StratumMessage::AuthorizeReply { authorized: true });

        let with_error = StratumMessage::classify(
            raw(json!({"id": 2, "result": true, "error": [24, "Unauthorized", null]})),
            Some(RequestKind::Authorize),
        );
        assert_eq!(with_error, StratumMessage::AuthorizeReply { authorized: false });
    }

    #[test]
    fn submit_rejection_carries_reason() {
        let msg = StratumMessage::classify(
            raw(json!({"id": 7, "result": false, "error": "low difficulty"})),
            Some(RequestKind::Submit),
        );
        assert_eq!(
            msg,
            StratumMessage::SubmitReply {
                accepted: false,
                reason: Some("low difficulty".into()),
            }
        );

        let triple = StratumMessage::classify(
            raw(json!({"id": 8, "result": null, "error": [23, "Low difficulty share", null]})),
            Some(RequestKind::Submit),
        );
        assert_eq!(
            triple,
            StratumMessage::SubmitReply {
                accepted: false,
                reason: Some("Low difficulty share".into()),
            }
        );
    }

    #[test]
    fn set_difficulty_push() {
        let msg = StratumMessage::classify(
            raw(json!({"id": null, "method": "mining.set_difficulty", "params": [0.5]})),
            None,
        );
        assert_eq!(msg, StratumMessage::DifficultyPush(0.5));

        let bad = StratumMessage::classify(
            raw(json!({"method": "mining.set_difficulty", "params": ["high"]})),
            None,
        );
        assert!(matches!(bad, StratumMessage::InvalidPush { .. }));
    }

    #[test]
    fn notify_push_parses_positional_params() {
        let msg = StratumMessage::classify(
            raw(json!({
                "id": null,
                "method": "mining.notify",
                "params": ["j1", "prev", "c1", "c2", ["m1", "m2"], "20000000", "1d00ffff", "5f5e1000", true]
            })),
            None,
        );
        match msg {
            StratumMessage::NotifyPush(t) => {
                assert_eq!(t.job_id, "j1");
                assert_eq!(t.merkle_branch, vec!["m1", "m2"]);
                assert_eq!(t.ntime, "5f5e1000");
                assert!(t.clean_jobs);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn notify_with_short_params_is_invalid() {
        let msg = StratumMessage::classify(
            raw(json!({"method": "mining.notify", "params": ["j1", "prev"]})),
            None,
        );
        assert!(matches!(msg, StratumMessage::InvalidPush { ref method, .. } if method == "mining.notify"));
    }

    #[test]
    fn unmatched_reply_is_unknown_push() {
        let msg = StratumMessage::classify(raw(json!({"id": 99, "result": true})), None);
        assert_eq!(msg, StratumMessage::UnknownPush { method: None });

        let other = StratumMessage::classify(raw(json!({"method": "client.reconnect", "params": []})), None);
        assert_eq!(
            other,
            StratumMessage::UnknownPush {
                method: Some("client.reconnect".into())
            }
        );
    }

    #[test]
    fn request_serializes_as_json_rpc() {
        let req = Request {
            id: 3,
            method: method::SUBMIT,
            params: json!(["user", "j1", "00000001", "5f5e1000", "deadbeef"]),
        };
        let text = serde_json::to_string(&req).unwrap();
        assert_eq!(
            text,
            r#"{"id":3,"method":"mining.submit","params":["user","j1","00000001","5f5e1000","deadbeef"]}"#
        );
    }
}
