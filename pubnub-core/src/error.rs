//! §7's error taxonomy, as one `thiserror`-derived enum the way the
//! teacher's `pubnub::Error` in `src/lib.rs` wraps lower-level errors.

use thiserror::Error;

/// Outcome of a transaction. `Ok`/`Started`/`Cancelled`/`InProgress`
/// are non-error control states; everything else is a terminal
/// failure class from §7.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResultCode {
    /// Transaction completed and the envelope parsed successfully.
    #[error("ok")]
    Ok,
    /// Non-blocking/callback transaction has been kicked off but has
    /// not reached a terminal stage yet. Never returned by the
    /// blocking `await_result` API (§9, open question (c)).
    #[error("started")]
    Started,
    /// A transaction was already in flight on this context (§3
    /// invariant: at most one transaction at a time).
    #[error("a transaction is already in progress on this context")]
    InProgress,
    /// `cancel()` was observed before the transaction reached a
    /// terminal stage.
    #[error("cancelled")]
    Cancelled,

    /// DNS resolution exhausted retries and server rotation.
    #[error("dns resolution failed")]
    DnsError,
    /// TCP connect failed on every cached address.
    #[error("connect failed")]
    ConnectError,
    /// The wait-connect timer fired before a TCP connection completed.
    #[error("connect timed out")]
    ConnectionTimeout,
    /// A socket-level I/O error occurred after connecting.
    #[error("io error: {0}")]
    IoError(String),
    /// The TLS handshake failed.
    #[error("tls error: {0}")]
    TlsError(String),
    /// The transaction timer fired.
    #[error("transaction timed out")]
    Timeout,

    /// A non-2xx/3xx HTTP status was returned; the code is retained.
    #[error("http error {0}")]
    HttpError(u16),
    /// The response exceeded `PUBNUB_REPLY_MAXLEN`.
    #[error("reply too big")]
    ReplyTooBig,
    /// The response body did not match any recognized envelope shape.
    #[error("format error")]
    FormatError,

    /// Server-side publish rejection; `last_publish_result` carries
    /// the description.
    #[error("publish failed")]
    PublishFailed,
    /// Payload decryption failed (surfaced per-message on subscribe,
    /// does not abort the transaction).
    #[error("decrypt error")]
    DecryptError,
    /// A channel or channel-group name failed validation.
    #[error("invalid channel")]
    InvalidChannel,
    /// A required parameter was missing or malformed.
    #[error("invalid parameters")]
    InvalidParameters,
    /// The server rejected the request for lack of authorization.
    #[error("authorization error")]
    AuthorizationError,

    /// Allocation failure (bounded buffers only; §3 invariant).
    #[error("out of memory")]
    OutOfMemory,
    /// The static context pool (`PUBNUB_CTX_MAX`) is exhausted.
    #[error("context pool exhausted")]
    ContextPoolExhausted,
}

impl ResultCode {
    /// True for the three non-terminal/control states.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ResultCode::Started | ResultCode::InProgress)
    }
}
