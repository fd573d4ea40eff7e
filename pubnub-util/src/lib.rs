//! # PubNub core utils
//!
//! Small, dependency-light helpers shared by `pubnub-core` that have no
//! knowledge of the context state machine: strict URL encoding of the
//! wire protocol's path/query components (§6 of the core spec) and PAM
//! request signing for administrative endpoints (grant-token,
//! revoke-token, and friends).

#[cfg(feature = "url-encoded-list")]
pub mod url_encode;

#[cfg(feature = "pam_signature")]
pub mod signature;
