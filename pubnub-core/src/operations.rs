//! §6 URL builders, one per operation kind. Each returns the
//! `path?query` half of the request line; `http::format_request` wraps
//! it with the method/host/headers. Percent-encoding goes through
//! `pubnub_util::url_encode` using the strict reserved set (§6, §8
//! property 7).

use pubnub_util::{signature, url_encode};

use crate::message::Timetoken;

/// Every transaction kind the Context can dispatch (§3 "current
/// transaction: kind").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationKind {
    Publish,
    Subscribe,
    History(HistoryKind),
    Time,
    HereNow,
    WhereNow,
    SetState,
    GrantToken,
    RevokeToken,
}

/// Open question (a): "advanced history" and "fetch history" unified
/// into one `history` operation kind rather than two operations, each
/// building its own real endpoint shape: `/v2/history/...` with
/// `count`/`include_token` for advanced history, `/v3/history/...`
/// with `max` for fetch history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryKind {
    Advanced,
    Fetch,
}

#[derive(Debug, Clone)]
pub struct Keys {
    pub publish_key: String,
    pub subscribe_key: String,
    pub secret_key: Option<String>,
    pub auth_token: Option<String>,
    pub user_id: Option<String>,
}

/// `/publish/<pub_key>/<sub_key>/0/<channel>/0/<url-encoded-message>?…`
pub fn publish_url(keys: &Keys, channel: &str, message: &str, metadata: Option<&str>) -> String {
    let mut path = format!(
        "/publish/{}/{}/0/{}/0/{}",
        url_encode::encode(&keys.publish_key),
        url_encode::encode(&keys.subscribe_key),
        url_encode::encode(channel),
        url_encode::encode(message),
    );
    let mut query = common_query(keys);
    if let Some(meta) = metadata {
        query.push(format!("meta={}", url_encode::encode(meta)));
    }
    append_query(&mut path, query);
    path
}

/// `/v2/subscribe/<sub_key>/<channels>/0?tt=<timetoken>&tr=<region>&…`
pub fn subscribe_url(
    keys: &Keys,
    channels: &[String],
    groups: &[String],
    timetoken: &Timetoken,
) -> String {
    let channel_list = if channels.is_empty() {
        ",".to_string()
    } else {
        url_encode::encode_list(channels)
    };
    let mut path = format!(
        "/v2/subscribe/{}/{}/0",
        url_encode::encode(&keys.subscribe_key),
        channel_list
    );
    let mut query = common_query(keys);
    query.push(format!("tt={}", url_encode::encode(&timetoken.t)));
    query.push(format!("tr={}", url_encode::encode(&timetoken.r)));
    if !groups.is_empty() {
        query.push(format!("channel-group={}", url_encode::encode_list(groups)));
    }
    append_query(&mut path, query);
    path
}

/// Advanced history (`/v2/history/...`) takes a plain message count and
/// an `include_token` flag; fetch history (`/v3/history/...`) is the
/// distinct message-actions-aware endpoint that takes `max` instead and
/// always returns actions/metadata, so it carries no `include_token`.
pub fn history_url(keys: &Keys, kind: &HistoryKind, channel: &str, count: u32, include_token: bool) -> String {
    let mut query = common_query(keys);
    let mut path = match kind {
        HistoryKind::Advanced => {
            let path = format!(
                "/v2/history/sub-key/{}/channel/{}",
                url_encode::encode(&keys.subscribe_key),
                url_encode::encode(channel)
            );
            query.push(format!("count={}", count));
            query.push(format!("include_token={}", include_token));
            path
        }
        HistoryKind::Fetch => {
            let path = format!(
                "/v3/history/sub-key/{}/channel/{}",
                url_encode::encode(&keys.subscribe_key),
                url_encode::encode(channel)
            );
            query.push(format!("max={}", count));
            path
        }
    };
    append_query(&mut path, query);
    path
}

/// `/time/0`
pub fn time_url() -> String {
    "/time/0".to_string()
}

/// `/v2/presence/sub-key/<sub_key>/channel/<channel>/here_now`
pub fn here_now_url(keys: &Keys, channel: &str) -> String {
    let mut path = format!(
        "/v2/presence/sub-key/{}/channel/{}/here_now",
        url_encode::encode(&keys.subscribe_key),
        url_encode::encode(channel)
    );
    append_query(&mut path, common_query(keys));
    path
}

/// `/v2/presence/sub-key/<sub_key>/uuid/<user_id>`
pub fn where_now_url(keys: &Keys) -> String {
    let user_id = keys.user_id.clone().unwrap_or_default();
    let mut path = format!(
        "/v2/presence/sub-key/{}/uuid/{}",
        url_encode::encode(&keys.subscribe_key),
        url_encode::encode(&user_id)
    );
    append_query(&mut path, common_query(keys));
    path
}

/// `/v2/presence/sub-key/<sub_key>/channel/<channel>/uuid/<user_id>/data`
pub fn set_state_url(keys: &Keys, channel: &str, state_json: &str) -> String {
    let user_id = keys.user_id.clone().unwrap_or_default();
    let mut path = format!(
        "/v2/presence/sub-key/{}/channel/{}/uuid/{}/data",
        url_encode::encode(&keys.subscribe_key),
        url_encode::encode(channel),
        url_encode::encode(&user_id)
    );
    let mut query = common_query(keys);
    query.push(format!("state={}", url_encode::encode(state_json)));
    append_query(&mut path, query);
    path
}

/// Administrative endpoints (grant/revoke-token) are signed with the
/// secret key (§6): the signature covers method, pub key, `/v3/pam`
/// path, and the sorted query string, per PubNub's PAM v3 convention.
pub fn grant_token_url(keys: &Keys, permissions_json: &str, ttl_minutes: u32) -> String {
    signed_pam_url(keys, "/v3/pam", &format!("permissions={}&ttl={}", url_encode::encode(permissions_json), ttl_minutes))
}

pub fn revoke_token_url(keys: &Keys, token: &str) -> String {
    signed_pam_url(keys, &format!("/v3/pam/token/{}", url_encode::encode(token)), "")
}

fn signed_pam_url(keys: &Keys, path: &str, extra_query: &str) -> String {
    let mut query = common_query(keys);
    if !extra_query.is_empty() {
        query.push(extra_query.to_string());
    }
    query.sort();
    let query_string = query.join("&");
    let secret_key = keys.secret_key.as_deref().unwrap_or_default();
    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        "GET", keys.publish_key, path, query_string
    );
    let raw_signature = signature::sign(secret_key, &string_to_sign);
    let mut full_path = format!("{}?{}", path, query_string);
    full_path.push_str(&format!("&signature=v2.{}", signature::to_v2_signature(&raw_signature)));
    full_path
}

fn common_query(keys: &Keys) -> Vec<String> {
    let mut query = vec!["pnsdk=PubNub-Rust%2F0.1.0".to_string()];
    if let Some(auth) = &keys.auth_token {
        query.push(format!("auth={}", url_encode::encode(auth)));
    }
    if let Some(user_id) = &keys.user_id {
        query.push(format!("uuid={}", url_encode::encode(user_id)));
    }
    query
}

fn append_query(path: &mut String, query: Vec<String>) {
    if !query.is_empty() {
        path.push('?');
        path.push_str(&query.join("&"));
    }
}
