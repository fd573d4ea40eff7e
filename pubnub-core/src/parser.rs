//! L6 — Response Parser (§4.6).
//!
//! Extracts the well-known fields per operation from the service's
//! JSON envelopes using the bounded scanner in `json_scan`, never a
//! general object model. Message/metadata payloads are handed back as
//! raw JSON text (§4.6: "not decoded").

use crate::error::ResultCode;
use crate::json_scan::{self, Value};
use crate::message::{Message, MessageType, Timetoken};

/// §4.6 publish envelope: `[status, description, timetoken]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishResult {
    pub ok: bool,
    pub description: String,
    pub timetoken: Timetoken,
}

pub fn parse_publish(body: &str) -> Result<PublishResult, ResultCode> {
    let v = json_scan::parse(body).map_err(|_| ResultCode::FormatError)?;
    let status = v.index(0).and_then(|v| v.as_u32()).ok_or(ResultCode::FormatError)?;
    let description = v
        .index(1)
        .and_then(|v| v.as_str())
        .ok_or(ResultCode::FormatError)?
        .to_string();
    let t = v
        .index(2)
        .and_then(|v| v.as_str())
        .ok_or(ResultCode::FormatError)?
        .to_string();
    Ok(PublishResult {
        ok: status == 1,
        description,
        timetoken: Timetoken { t, r: "0".to_string() },
    })
}

/// §4.6 subscribe v2 envelope: `{"t":{"t":..,"r":..},"m":[...]}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeResult {
    pub timetoken: Timetoken,
    pub messages: Vec<Message>,
}

pub fn parse_subscribe(body: &str) -> Result<SubscribeResult, ResultCode> {
    let v = json_scan::parse(body).map_err(|_| ResultCode::FormatError)?;
    let t_obj = v.get("t").ok_or(ResultCode::FormatError)?;
    let t = t_obj.get("t").and_then(|v| v.as_str()).ok_or(ResultCode::FormatError)?;
    let r = t_obj.get("r").and_then(|v| v.as_str()).unwrap_or("0");
    let timetoken = Timetoken {
        t: t.to_string(),
        r: r.to_string(),
    };

    let members = v
        .get("m")
        .and_then(|v| v.as_array())
        .ok_or(ResultCode::FormatError)?;

    let mut messages = Vec::with_capacity(members.len());
    for member in members {
        messages.push(parse_subscribe_message(member)?);
    }

    Ok(SubscribeResult { timetoken, messages })
}

fn parse_subscribe_message(member: &Value<'_>) -> Result<Message, ResultCode> {
    let channel = member
        .get("c")
        .and_then(|v| v.as_str())
        .ok_or(ResultCode::FormatError)?
        .to_string();
    let route = member.get("b").and_then(|v| v.as_str()).map(|s| s.to_string());
    let payload = member.get("d").map(|v| v.to_json()).unwrap_or_else(|| "null".to_string());
    let metadata = member.get("u").map(|v| v.to_json());
    let message_type = member
        .get("e")
        .and_then(|v| v.as_u32())
        .map(MessageType::from_code)
        .unwrap_or(MessageType::Publish);
    let publisher = member.get("i").and_then(|v| v.as_str()).map(|s| s.to_string());

    let timetoken = match member.get("p") {
        Some(p) => Timetoken {
            t: p.get("t").and_then(|v| v.as_str()).unwrap_or("0").to_string(),
            r: p.get("r").and_then(|v| v.as_str()).unwrap_or("0").to_string(),
        },
        None => Timetoken::default(),
    };

    Ok(Message {
        message_type,
        route,
        channel,
        payload,
        metadata,
        timetoken,
        publisher,
    })
}

/// §4.6 history envelope: `[messages, start, end]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryResult {
    /// Raw JSON text per message, undecoded.
    pub messages: Vec<String>,
    pub start: String,
    pub end: String,
}

pub fn parse_history(body: &str) -> Result<HistoryResult, ResultCode> {
    let v = json_scan::parse(body).map_err(|_| ResultCode::FormatError)?;
    let messages = v
        .index(0)
        .and_then(|v| v.as_array())
        .ok_or(ResultCode::FormatError)?
        .iter()
        .map(|m| m.to_json())
        .collect();
    let start = v.index(1).map(|v| v.as_str().unwrap_or_default().to_string()).unwrap_or_default();
    let end = v.index(2).map(|v| v.as_str().unwrap_or_default().to_string()).unwrap_or_default();
    Ok(HistoryResult { messages, start, end })
}

/// §4.6 presence / here-now / where-now / state envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceResult {
    pub status: Option<i64>,
    pub service: Option<String>,
    /// Raw JSON text of whatever payload field the endpoint returned
    /// (`payload`/`uuids`/`channels`/…), undecoded.
    pub payload: String,
}

pub fn parse_presence(body: &str) -> Result<PresenceResult, ResultCode> {
    let v = json_scan::parse(body).map_err(|_| ResultCode::FormatError)?;
    let status = v.get("status").and_then(|v| v.as_str()).and_then(|s| s.parse().ok());
    let service = v.get("service").and_then(|v| v.as_str()).map(|s| s.to_string());
    let payload = v
        .get("payload")
        .or_else(|| v.get("uuids"))
        .or_else(|| v.get("channels"))
        .map(|v| v.to_json())
        .unwrap_or_else(|| v.to_json());
    Ok(PresenceResult { status, service, payload })
}

/// §4.6 time envelope: `[timetoken]`.
pub fn parse_time(body: &str) -> Result<Timetoken, ResultCode> {
    let v = json_scan::parse(body).map_err(|_| ResultCode::FormatError)?;
    let t = v.index(0).and_then(|v| v.as_str()).ok_or(ResultCode::FormatError)?;
    Ok(Timetoken {
        t: t.to_string(),
        r: "0".to_string(),
    })
}

/// §4.6 grant/revoke token envelope: either `{"data":{"token":"..."}}`
/// on success or an error body with a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenResult {
    Token(String),
    Error(String),
}

pub fn parse_token(body: &str) -> Result<TokenResult, ResultCode> {
    let v = json_scan::parse(body).map_err(|_| ResultCode::FormatError)?;
    if let Some(token) = v.get("data").and_then(|d| d.get("token")).and_then(|t| t.as_str()) {
        return Ok(TokenResult::Token(token.to_string()));
    }
    if let Some(message) = v
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
    {
        return Ok(TokenResult::Error(message.to_string()));
    }
    Err(ResultCode::FormatError)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_ok() {
        let r = parse_publish(r#"[1,"Sent","17000000000000000"]"#).unwrap();
        assert!(r.ok);
        assert_eq!(r.description, "Sent");
        assert_eq!(r.timetoken.t, "17000000000000000");
    }

    #[test]
    fn publish_failed() {
        let r = parse_publish(r#"[0,"Invalid","0"]"#).unwrap();
        assert!(!r.ok);
        assert_eq!(r.description, "Invalid");
    }

    #[test]
    fn subscribe_handshake_then_message() {
        let handshake = parse_subscribe(r#"{"t":{"t":"16000","r":"1"},"m":[]}"#).unwrap();
        assert_eq!(handshake.timetoken.t, "16000");
        assert!(handshake.messages.is_empty());

        let with_message = parse_subscribe(
            r#"{"t":{"t":"16001","r":"1"},"m":[{"c":"hello_world","d":"msg"}]}"#,
        )
        .unwrap();
        assert_eq!(with_message.timetoken.t, "16001");
        assert_eq!(with_message.messages.len(), 1);
        assert_eq!(with_message.messages[0].channel, "hello_world");
        assert_eq!(with_message.messages[0].payload, "\"msg\"");
    }

    #[test]
    fn history_envelope() {
        let r = parse_history(r#"[["a","b"],"100","200"]"#).unwrap();
        assert_eq!(r.messages, vec!["\"a\"".to_string(), "\"b\"".to_string()]);
        assert_eq!(r.start, "100");
        assert_eq!(r.end, "200");
    }

    #[test]
    fn time_envelope() {
        let r = parse_time(r#"["16000000000000000"]"#).unwrap();
        assert_eq!(r.t, "16000000000000000");
    }

    #[test]
    fn token_success_and_error() {
        let ok = parse_token(r#"{"data":{"token":"p0abc"}}"#).unwrap();
        assert_eq!(ok, TokenResult::Token("p0abc".to_string()));

        let err = parse_token(r#"{"error":{"message":"Invalid signature"}}"#).unwrap();
        assert_eq!(err, TokenResult::Error("Invalid signature".to_string()));
    }

    #[test]
    fn malformed_body_is_format_error() {
        assert_eq!(parse_publish("not json").unwrap_err(), ResultCode::FormatError);
    }
}
