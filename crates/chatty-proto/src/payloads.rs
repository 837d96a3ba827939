//! JSON payloads.
//!
//! Bodies of STOMP frames and REST responses. Field names match the backend's
//! JSON keys, so no renaming is needed.
//!
//! Inbound decoding is lenient where the backend is known to vary: message ids
//! arrive as strings or numbers, timestamps as RFC 3339, zone-less ISO
//! date-times or epoch milliseconds.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, de::DeserializeOwned};

use crate::errors::Result;

/// Presence status reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// User has an open session.
    Online,
    /// User left.
    Offline,
    /// Any value this client does not understand.
    #[serde(other)]
    Unknown,
}

/// Roster entry of `GET /users`, also published on `/app/user.addUser`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPayload {
    /// Account name
    pub username: String,
    /// Presence status. Absent on some backend versions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
}

impl UserPayload {
    /// Join announcement for `username`.
    pub fn online(username: impl Into<String>) -> Self {
        Self { username: username.into(), status: Some(Status::Online) }
    }

    /// Whether the entry counts as online.
    ///
    /// `/users` lists connected users, so a missing status counts as online.
    pub fn is_online(&self) -> bool {
        matches!(self.status, None | Some(Status::Online))
    }
}

/// Leave announcement published on `/app/user.disconnectUser`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeavePayload {
    /// Account name
    pub username: String,
}

/// One-to-one chat message.
///
/// Inbound on the private queue and in `GET /messages/{a}/{b}`; outbound on
/// `/app/chat` (without `id`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessagePayload {
    /// Server-assigned id
    #[serde(default, deserialize_with = "lenient_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Author username
    pub sender: String,
    /// Addressee username
    pub recipient: String,
    /// Message text
    pub content: String,
    /// Send time
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Parse a JSON body.
pub fn from_json<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(body)?)
}

/// Serialize a payload to JSON text.
pub fn to_json<T: Serialize>(payload: &T) -> Result<String> {
    Ok(serde_json::to_string(payload)?)
}

/// Parse an RFC 3339 timestamp, or an ISO local date-time taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").ok().map(|naive| naive.and_utc())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(serde_json::Number),
}

fn lenient_id<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<String>, D::Error> {
    Ok(Option::<RawId>::deserialize(deserializer)?.map(|raw| match raw {
        RawId::Text(text) => text,
        RawId::Number(number) => number.to_string(),
    }))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Text(String),
    Millis(i64),
}

fn lenient_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<DateTime<Utc>>, D::Error> {
    match Option::<RawTimestamp>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawTimestamp::Text(text)) => parse_timestamp(&text)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {text:?}"))),
        Some(RawTimestamp::Millis(millis)) => DateTime::from_timestamp_millis(millis)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("timestamp out of range: {millis}"))),
    }
}
