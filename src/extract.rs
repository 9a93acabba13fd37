//! Turns one framed stream line into a post or a control message.

use crate::error::ParseError;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

pub const CREATED_AT_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub text: String,
    pub symbols: Vec<String>,
    pub is_retweet: bool,
}

impl Post {
    /// Storage form of the symbol list.
    pub fn joined_symbols(&self) -> String {
        self.symbols.join(",")
    }
}

/// Non-post payloads interleaved with statuses on the filter stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    /// Upstream withheld `dropped` matching posts since the connection opened.
    Limit { dropped: u64 },
    Delete { id: String },
    Disconnect { code: i64, reason: String },
    StallWarning {
        code: String,
        message: String,
        percent_full: Option<u64>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Post(Post),
    Control(ControlMessage),
    Invalid(ParseError),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(u64),
    Text(String),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            RawId::Number(n) => n.to_string(),
            RawId::Text(s) => s,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawStatus {
    id: RawId,
    id_str: Option<String>,
    created_at: String,
    text: String,
    entities: RawEntities,
    #[serde(default)]
    retweeted_status: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawEntities {
    symbols: Vec<RawSymbol>,
}

#[derive(Debug, Deserialize)]
struct RawSymbol {
    text: String,
}

#[derive(Debug, Deserialize)]
struct RawLimit {
    #[serde(default)]
    track: u64,
}

#[derive(Debug, Deserialize)]
struct RawDelete {
    status: RawDeletedStatus,
}

#[derive(Debug, Deserialize)]
struct RawDeletedStatus {
    id: RawId,
    id_str: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawDisconnect {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    reason: String,
}

#[derive(Debug, Deserialize)]
struct RawWarning {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
    percent_full: Option<u64>,
}

pub fn extract(raw: &[u8]) -> Record {
    let payload = || String::from_utf8_lossy(raw).into_owned();

    let value: Value = match serde_json::from_slice(raw) {
        Ok(v) => v,
        Err(e) => {
            return Record::Invalid(ParseError::Json {
                reason: e.to_string(),
                payload: payload(),
            })
        }
    };

    match control_message(&value) {
        Some(Ok(control)) => return Record::Control(control),
        Some(Err(reason)) => {
            return Record::Invalid(ParseError::Status {
                reason,
                payload: payload(),
            })
        }
        None => {}
    }

    match parse_status(value) {
        Ok(post) => Record::Post(post),
        Err(err) => Record::Invalid(err.with_payload(payload())),
    }
}

fn control_message(value: &Value) -> Option<Result<ControlMessage, String>> {
    let object = value.as_object()?;

    if let Some(limit) = object.get("limit") {
        return Some(
            RawLimit::deserialize(limit)
                .map(|l| ControlMessage::Limit { dropped: l.track })
                .map_err(|e| format!("limit notice: {e}")),
        );
    }
    if let Some(delete) = object.get("delete") {
        return Some(
            RawDelete::deserialize(delete)
                .map(|d| ControlMessage::Delete {
                    id: d.status.id_str.unwrap_or_else(|| d.status.id.into_string()),
                })
                .map_err(|e| format!("delete notice: {e}")),
        );
    }
    if let Some(disconnect) = object.get("disconnect") {
        return Some(
            RawDisconnect::deserialize(disconnect)
                .map(|d| ControlMessage::Disconnect {
                    code: d.code,
                    reason: d.reason,
                })
                .map_err(|e| format!("disconnect notice: {e}")),
        );
    }
    if let Some(warning) = object.get("warning") {
        return Some(
            RawWarning::deserialize(warning)
                .map(|w| ControlMessage::StallWarning {
                    code: w.code,
                    message: w.message,
                    percent_full: w.percent_full,
                })
                .map_err(|e| format!("warning notice: {e}")),
        );
    }
    None
}

enum StatusError {
    Shape(String),
    Timestamp { value: String, reason: String },
}

impl StatusError {
    fn with_payload(self, payload: String) -> ParseError {
        match self {
            StatusError::Shape(reason) => ParseError::Status { reason, payload },
            StatusError::Timestamp { value, reason } => ParseError::Timestamp {
                value,
                reason,
                payload,
            },
        }
    }
}

fn parse_status(value: Value) -> Result<Post, StatusError> {
    let raw = RawStatus::deserialize(value).map_err(|e| StatusError::Shape(e.to_string()))?;

    let created_at = DateTime::parse_from_str(&raw.created_at, CREATED_AT_FORMAT)
        .map_err(|e| StatusError::Timestamp {
            value: raw.created_at.clone(),
            reason: e.to_string(),
        })?
        .with_timezone(&Utc);

    Ok(Post {
        id: raw.id_str.unwrap_or_else(|| raw.id.into_string()),
        created_at,
        text: raw.text.replace(['\r', '\n'], ""),
        symbols: raw
            .entities
            .symbols
            .into_iter()
            .map(|s| s.text.to_uppercase())
            .collect(),
        is_retweet: raw.retweeted_status.as_ref().is_some_and(is_truthy),
    })
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
