//! Strict percent-encoding for PubNub URL path/query components.
//!
//! §6 of the core spec requires that any character outside
//! `A–Z a–z 0–9 . - _ ~` be percent-encoded — the conventional "strict"
//! reserved set (narrower than `percent_encoding::NON_ALPHANUMERIC`,
//! which would also encode `.`, `-`, `_` and `~`).

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC};

/// Everything `NON_ALPHANUMERIC` encodes, minus the four characters the
/// wire protocol allows unescaped.
const STRICT_RESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'.')
    .remove(b'-')
    .remove(b'_')
    .remove(b'~');

/// Percent-encode a single path segment (channel name, message body,
/// auth key, …) per the reserved set above.
pub fn encode(component: &str) -> String {
    percent_encoding::utf8_percent_encode(component, STRICT_RESERVED).to_string()
}

/// Percent-encode and join a list of channel/channel-group names with
/// `,` (PubNub's conventional comma-separated list, itself left
/// unescaped as `%2C` is never produced since `,` is already outside
/// the safe set — each member is encoded independently).
pub fn encode_list<I, S>(items: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items
        .into_iter()
        .map(|item| encode(item.as_ref()))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaves_unreserved_untouched() {
        assert_eq!(encode("hello_world.channel-1~2"), "hello_world.channel-1~2");
    }

    #[test]
    fn encodes_reserved_characters() {
        assert_eq!(encode("a/b c"), "a%2Fb%20c");
        assert_eq!(encode("chan,group"), "chan%2Cgroup");
    }

    #[test]
    fn encode_list_joins_with_comma() {
        assert_eq!(encode_list(["ch one", "ch,two"]), "ch%20one,ch%2Ctwo");
    }
}
