//! Message/timetoken types. The payload is carried as raw, undecoded
//! JSON text (`String`) rather than a parsed value (§4.6/§9): the core
//! never pulls in a general JSON object model; callers decode the
//! payload themselves if they need to.

use std::fmt;

/// An opaque decimal server timestamp used as a subscribe cursor (§3,
/// GLOSSARY). Compared as a decimal integer for monotonicity checks
/// (§8 property 2), not as a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timetoken {
    pub t: String,
    pub r: String,
}

impl Default for Timetoken {
    fn default() -> Timetoken {
        Timetoken {
            t: "0".to_string(),
            r: "0".to_string(),
        }
    }
}

impl fmt::Display for Timetoken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.t)
    }
}

impl Timetoken {
    /// Parse `t` as a decimal integer for ordering comparisons. A
    /// non-numeric timetoken (should never happen against a real
    /// server) sorts as zero rather than panicking.
    pub fn as_u128(&self) -> u128 {
        self.t.parse().unwrap_or(0)
    }

    /// §8 property 2: timetoken monotonicity on the success path.
    pub fn is_monotonic_from(&self, previous: &Timetoken) -> bool {
        self.as_u128() >= previous.as_u128()
    }
}

/// PubNub delivers multiple kinds of messages over subscribe v2;
/// `Unknown` keeps the client forward-compatible with new types the
/// service may introduce.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum MessageType {
    Publish,
    Signal,
    Objects,
    Action,
    Presence,
    Unknown(u32),
}

impl MessageType {
    pub fn from_code(code: u32) -> MessageType {
        match code {
            0 => MessageType::Publish,
            1 => MessageType::Signal,
            2 => MessageType::Objects,
            3 => MessageType::Action,
            4 => MessageType::Presence,
            other => MessageType::Unknown(other),
        }
    }
}

/// One parsed-but-undecoded subscribe message, queued FIFO on the
/// `Context` and drained one at a time via `get()` (§3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub message_type: MessageType,
    /// Wildcard channel or channel-group this message actually matched.
    pub route: Option<String>,
    /// The channel the message was published on.
    pub channel: String,
    /// Raw JSON payload, not decoded (§4.6, §9).
    pub payload: String,
    /// Raw JSON metadata, not decoded.
    pub metadata: Option<String>,
    pub timetoken: Timetoken,
    pub publisher: Option<String>,
}
