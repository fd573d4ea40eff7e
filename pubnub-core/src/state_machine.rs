//! L7 — Context State Machine (§3, §4.7).
//!
//! `Context` is generic over its three socket-adjacent collaborators
//! (`Resolver`, `Transport`, `Clock`) — callers substitute mocks for
//! testing or a platform-specific implementation, while `pubnub-core`
//! ships the `UdpResolver`/`TcpTransport`/`SystemClock` defaults
//! directly (see `DESIGN.md` for why an async transport crate isn't
//! used here).

use std::collections::VecDeque;
use std::time::Duration;

use crate::clock::{Clock, TimerExpiry, TimerQueue};
use crate::crypto::{CryptoModule, Prng};
use crate::dns::{AddressCache, Resolver};
use crate::error::ResultCode;
use crate::http::{self, ResponseReader};
use crate::message::{Message, Timetoken};
use crate::operations::{self, HistoryKind, Keys, OperationKind};
use crate::parser;
use crate::transport::{IoOutcome, Transport};
use crate::PubnubConfig;

/// §4.7's per-transaction stage. `TlsHandshake` is folded into
/// `Connecting` for `TcpTransport` (whose `connect` performs the whole
/// handshake synchronously); it is kept as a distinct variant so a
/// `Transport` that surfaces a separate handshake step still fits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Resolving,
    Connecting { address_index: usize },
    TlsHandshake,
    Sending,
    Receiving,
    Parsing,
    Done,
    Cancelled,
    Failed(ResultCode),
}

impl Stage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Done | Stage::Cancelled | Stage::Failed(_))
    }
}

/// One in-flight transaction's working state (§3 "current
/// transaction").
#[derive(Debug)]
struct Transaction {
    kind: OperationKind,
    stage: Stage,
    request: Vec<u8>,
    send_offset: usize,
    response_reader: ResponseReader,
    last_http_code: Option<u16>,
}

/// §6 `PUBNUB_USE_IPV6`/TLS/origin-level settings that do not change
/// per transaction, split out from `PubnubConfig`'s tunables for
/// readability.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub origin: String,
    pub port: u16,
    pub use_tls: bool,
}

/// The per-connection context (§3). Owns exactly one in-flight
/// transaction, the subscribe cursor, the channel/group list, and the
/// injected collaborators.
#[derive(Debug)]
pub struct Context<R: Resolver, T: Transport, Clk: Clock> {
    pub keys: Keys,
    pub endpoint: Endpoint,
    pub config: PubnubConfig,
    pub crypto: CryptoModule,

    timetoken: Timetoken,
    channels: Vec<String>,
    groups: Vec<String>,
    last_subscribe_ok: bool,

    messages: VecDeque<Message>,
    address_cache: AddressCache,
    last_result: Option<ResultCode>,
    last_response_body: String,

    transaction: Option<Transaction>,
    timers: TimerQueue,

    resolver: R,
    transport: T,
    clock: Clk,
    prng: Box<dyn Prng>,
}

impl<R: Resolver, T: Transport, Clk: Clock> Context<R, T, Clk> {
    pub fn new(mut keys: Keys, endpoint: Endpoint, config: PubnubConfig, resolver: R, transport: T, clock: Clk, prng: Box<dyn Prng>) -> Self {
        if keys.user_id.is_none() {
            keys.user_id = Some(uuid::Uuid::new_v4().to_string());
        }
        Context {
            keys,
            endpoint,
            config,
            crypto: CryptoModule::None,
            timetoken: Timetoken::default(),
            channels: Vec::new(),
            groups: Vec::new(),
            last_subscribe_ok: true,
            messages: VecDeque::new(),
            address_cache: AddressCache::default(),
            last_result: None,
            last_response_body: String::new(),
            transaction: None,
            timers: TimerQueue::default(),
            resolver,
            transport,
            clock,
            prng,
        }
    }

    pub fn timetoken(&self) -> &Timetoken {
        &self.timetoken
    }

    pub fn last_result(&self) -> Option<ResultCode> {
        self.last_result.clone()
    }

    pub fn last_response_body(&self) -> &str {
        &self.last_response_body
    }

    /// Drain the next queued subscribe message, FIFO (§3, GLOSSARY).
    pub fn get(&mut self) -> Option<Message> {
        self.messages.pop_front()
    }

    pub fn is_idle(&self) -> bool {
        self.transaction.is_none()
    }

    // ---- operation starters -------------------------------------------

    pub fn publish(&mut self, channel: &str, message: &str, metadata: Option<&str>) -> Result<(), ResultCode> {
        let encrypted;
        let payload = if matches!(self.crypto, CryptoModule::None) {
            message
        } else {
            encrypted = self.crypto.encrypt(message, self.prng.as_mut())?;
            &encrypted
        };
        let path = operations::publish_url(&self.keys, channel, payload, metadata);
        self.start_transaction(OperationKind::Publish, path)
    }

    pub fn subscribe(&mut self, channels: &[String], groups: &[String]) -> Result<(), ResultCode> {
        if !channels.is_empty() {
            self.channels = channels.to_vec();
        }
        if !groups.is_empty() {
            self.groups = groups.to_vec();
        }
        let path = operations::subscribe_url(&self.keys, &self.channels, &self.groups, &self.timetoken);
        self.start_transaction(OperationKind::Subscribe, path)
    }

    pub fn history(&mut self, kind: HistoryKind, channel: &str, count: u32, include_token: bool) -> Result<(), ResultCode> {
        let path = operations::history_url(&self.keys, &kind, channel, count, include_token);
        self.start_transaction(OperationKind::History(kind), path)
    }

    pub fn time(&mut self) -> Result<(), ResultCode> {
        self.start_transaction(OperationKind::Time, operations::time_url())
    }

    pub fn here_now(&mut self, channel: &str) -> Result<(), ResultCode> {
        let path = operations::here_now_url(&self.keys, channel);
        self.start_transaction(OperationKind::HereNow, path)
    }

    pub fn where_now(&mut self) -> Result<(), ResultCode> {
        let path = operations::where_now_url(&self.keys);
        self.start_transaction(OperationKind::WhereNow, path)
    }

    pub fn set_state(&mut self, channel: &str, state_json: &str) -> Result<(), ResultCode> {
        let path = operations::set_state_url(&self.keys, channel, state_json);
        self.start_transaction(OperationKind::SetState, path)
    }

    pub fn grant_token(&mut self, permissions_json: &str, ttl_minutes: u32) -> Result<(), ResultCode> {
        let path = operations::grant_token_url(&self.keys, permissions_json, ttl_minutes);
        self.start_transaction(OperationKind::GrantToken, path)
    }

    pub fn revoke_token(&mut self, token: &str) -> Result<(), ResultCode> {
        let path = operations::revoke_token_url(&self.keys, token);
        self.start_transaction(OperationKind::RevokeToken, path)
    }

    /// §8 property 1: a second transaction while one is in flight is
    /// rejected without mutating state.
    fn start_transaction(&mut self, kind: OperationKind, path_and_query: String) -> Result<(), ResultCode> {
        if self.transaction.is_some() {
            return Err(ResultCode::InProgress);
        }

        let request = http::format_request(&self.endpoint.origin, &path_and_query, self.config.receive_gzip_response, self.config.buf_maxlen)
            .ok_or(ResultCode::OutOfMemory)?;

        let now = self.clock.now_ms();
        self.timers.arm_transaction(now, self.config.transaction_timer_ms(None));

        let stage = if self.address_cache.is_empty() {
            Stage::Resolving
        } else {
            Stage::Connecting { address_index: 0 }
        };
        if matches!(stage, Stage::Connecting { .. }) {
            self.timers.arm_wait_connect(now, self.config.wait_connect_timer_ms(None));
        }

        self.transaction = Some(Transaction {
            kind,
            stage,
            request,
            send_offset: 0,
            response_reader: ResponseReader::new(self.config.reply_maxlen),
            last_http_code: None,
        });
        Ok(())
    }

    // ---- cancellation ---------------------------------------------------

    /// Always safe to call, idempotent (§4.7).
    pub fn cancel(&mut self) {
        if self.transaction.is_none() {
            return;
        }
        self.transport.close();
        self.timers.disarm_all();
        self.finish(Stage::Cancelled, ResultCode::Cancelled);
    }

    // ---- I/O facades ------------------------------------------------

    /// Blocking facade: runs the machine to a terminal stage. Never
    /// returns `started` (open question (c)).
    pub fn await_result(&mut self) -> ResultCode {
        loop {
            self.step();
            if let Some(result) = self.terminal_result() {
                return result;
            }
        }
    }

    /// Non-blocking facade: advances one quantum and reports
    /// `started` until a terminal stage is reached.
    pub fn poll(&mut self) -> ResultCode {
        if self.transaction.is_none() {
            return self.last_result.clone().unwrap_or(ResultCode::Ok);
        }
        self.step();
        self.terminal_result().unwrap_or(ResultCode::Started)
    }

    /// Callback facade: drives to completion, then invokes `callback`
    /// exactly once with the terminal result (§4.7: "the call must not
    /// itself start another transaction on the same context
    /// synchronously" — enforced simply by `callback` taking the
    /// result by value after the context has already gone idle).
    pub fn drive_with_callback<F: FnOnce(ResultCode)>(&mut self, callback: F) {
        let result = self.await_result();
        callback(result);
    }

    fn terminal_result(&self) -> Option<ResultCode> {
        match &self.transaction {
            Some(t) if t.stage.is_terminal() => self.last_result.clone(),
            None => self.last_result.clone(),
            _ => None,
        }
    }

    // ---- the inner step function --------------------------------------

    /// Advance the state machine by one quantum. Checks timers first
    /// (§4.1: either timer firing forces an orderly transition to a
    /// failed/timeout stage), then drives whatever the current stage
    /// allows without blocking past a single `WouldBlock`.
    fn step(&mut self) {
        let transaction = match &mut self.transaction {
            Some(t) => t,
            None => return,
        };
        if transaction.stage.is_terminal() {
            return;
        }

        let now = self.clock.now_ms();
        if let Some(expiry) = self.timers.check(now) {
            match expiry {
                TimerExpiry::TransactionTimer => {
                    self.transport.close();
                    self.timers.disarm_all();
                    self.finish(Stage::Failed(ResultCode::Timeout), ResultCode::Timeout);
                }
                TimerExpiry::WaitConnectTimer => self.advance_past_connect_timeout(),
            }
            return;
        }

        match transaction.stage.clone() {
            Stage::Resolving => self.step_resolving(),
            Stage::Connecting { address_index } => self.step_connecting(address_index),
            Stage::TlsHandshake => {
                let transaction = self.transaction.as_mut().unwrap();
                transaction.stage = Stage::Sending;
            }
            Stage::Sending => self.step_sending(),
            Stage::Receiving => self.step_receiving(),
            Stage::Parsing => self.step_parsing(),
            Stage::Idle | Stage::Done | Stage::Cancelled | Stage::Failed(_) => {}
        }
    }

    fn step_resolving(&mut self) {
        match self.resolver.resolve(&self.endpoint.origin, &self.config) {
            Ok(cache) => {
                self.address_cache = cache;
                let now = self.clock.now_ms();
                self.timers.arm_wait_connect(now, self.config.wait_connect_timer_ms(None));
                let transaction = self.transaction.as_mut().unwrap();
                transaction.stage = Stage::Connecting { address_index: 0 };
            }
            Err(code) => self.finish(Stage::Failed(code.clone()), code),
        }
    }

    fn step_connecting(&mut self, address_index: usize) {
        let addresses = self.address_cache.as_slice().to_vec();
        if address_index >= addresses.len() {
            self.finish(Stage::Failed(ResultCode::ConnectError), ResultCode::ConnectError);
            return;
        }

        let addr = std::net::SocketAddr::new(addresses[address_index], self.endpoint.port);
        self.transport.close();
        let wait = Duration::from_millis(self.config.wait_connect_timer_ms(None));
        match self.transport.connect(addr, &self.endpoint.origin, self.endpoint.use_tls, wait) {
            Ok(IoOutcome::Done(())) => {
                self.timers.disarm_wait_connect();
                let transaction = self.transaction.as_mut().unwrap();
                transaction.stage = Stage::Sending;
            }
            Ok(IoOutcome::WouldBlock) => {}
            Err(code) => {
                if !self.config.use_multiple_addresses || address_index + 1 >= addresses.len() {
                    self.timers.disarm_wait_connect();
                    self.finish(Stage::Failed(code.clone()), code);
                } else {
                    self.advance_to_next_address(address_index + 1);
                }
            }
        }
    }

    /// §4.7: "on [wait-connect] expiry, advance to the next address; on
    /// exhaustion, `failed(connect-timeout)`" — each address gets its
    /// own full wait-connect budget, so the timer is re-armed here
    /// rather than left at its original, now-stale deadline.
    fn advance_to_next_address(&mut self, next_index: usize) {
        let now = self.clock.now_ms();
        self.timers.arm_wait_connect(now, self.config.wait_connect_timer_ms(None));
        let transaction = self.transaction.as_mut().unwrap();
        transaction.stage = Stage::Connecting {
            address_index: next_index,
        };
    }

    /// A non-blocking transport's connect may still be pending when the
    /// wait-connect timer fires; mirror `step_connecting`'s own
    /// exhaustion logic rather than failing outright.
    fn advance_past_connect_timeout(&mut self) {
        self.transport.close();
        let address_index = match self.transaction.as_ref().map(|t| t.stage.clone()) {
            Some(Stage::Connecting { address_index }) => address_index,
            _ => {
                self.timers.disarm_all();
                self.finish(Stage::Failed(ResultCode::ConnectionTimeout), ResultCode::ConnectionTimeout);
                return;
            }
        };
        let addresses_len = self.address_cache.as_slice().len();
        if !self.config.use_multiple_addresses || address_index + 1 >= addresses_len {
            self.timers.disarm_all();
            self.finish(Stage::Failed(ResultCode::ConnectionTimeout), ResultCode::ConnectionTimeout);
        } else {
            self.advance_to_next_address(address_index + 1);
        }
    }

    fn step_sending(&mut self) {
        let transaction = self.transaction.as_mut().unwrap();
        let remaining = &transaction.request[transaction.send_offset..];
        match self.transport.send(remaining) {
            Ok(IoOutcome::Done(n)) => {
                transaction.send_offset += n;
                if transaction.send_offset >= transaction.request.len() {
                    transaction.stage = Stage::Receiving;
                }
            }
            Ok(IoOutcome::WouldBlock) => {}
            Err(_) => self.finish(Stage::Failed(ResultCode::IoError("send failed".to_string())), ResultCode::IoError("send failed".to_string())),
        }
    }

    fn step_receiving(&mut self) {
        let mut buf = [0u8; 4096];
        let recv_outcome = self.transport.recv(&mut buf);
        let transaction = self.transaction.as_mut().unwrap();
        match recv_outcome {
            Ok(IoOutcome::Done(0)) => match transaction.response_reader.finish() {
                Ok(response) => {
                    transaction.last_http_code = Some(response.status);
                    self.last_response_body = response.body;
                    transaction.stage = Stage::Parsing;
                }
                Err(code) => {
                    let code = Self::reply_too_big_is_format_error(code);
                    let t = self.transaction.as_mut().unwrap();
                    t.stage = Stage::Failed(code.clone());
                    self.finish(Stage::Failed(code.clone()), code);
                }
            },
            Ok(IoOutcome::Done(n)) => match transaction.response_reader.feed(&buf[..n]) {
                Ok(Some(response)) => {
                    transaction.last_http_code = Some(response.status);
                    self.last_response_body = response.body;
                    transaction.stage = Stage::Parsing;
                }
                Ok(None) => {}
                Err(code) => {
                    let code = Self::reply_too_big_is_format_error(code);
                    self.finish(Stage::Failed(code.clone()), code);
                }
            },
            Ok(IoOutcome::WouldBlock) => {}
            Err(_) => self.finish(Stage::Failed(ResultCode::IoError("recv failed".to_string())), ResultCode::IoError("recv failed".to_string())),
        }
    }

    fn step_parsing(&mut self) {
        let kind = match &self.transaction {
            Some(t) => t.kind.clone(),
            None => return,
        };
        let http_code = self.transaction.as_ref().and_then(|t| t.last_http_code).unwrap_or(0);
        if !(200..300).contains(&http_code) {
            self.finish(Stage::Failed(ResultCode::HttpError(http_code)), ResultCode::HttpError(http_code));
            return;
        }

        let body = self.last_response_body.clone();
        let outcome = match &kind {
            OperationKind::Publish => self.parse_publish_outcome(&body),
            OperationKind::Subscribe => self.parse_subscribe_outcome(&body),
            OperationKind::History(_) => parser::parse_history(&body).map(|_| ResultCode::Ok),
            OperationKind::Time => parser::parse_time(&body).map(|_| ResultCode::Ok),
            OperationKind::HereNow | OperationKind::WhereNow | OperationKind::SetState => {
                parser::parse_presence(&body).map(|_| ResultCode::Ok)
            }
            OperationKind::GrantToken | OperationKind::RevokeToken => match parser::parse_token(&body) {
                Ok(parser::TokenResult::Token(_)) => Ok(ResultCode::Ok),
                Ok(parser::TokenResult::Error(_)) => Ok(ResultCode::AuthorizationError),
                Err(e) => Err(e),
            },
        };

        match outcome {
            Ok(code) => self.finish(Stage::Done, code),
            Err(code) => self.finish(Stage::Failed(code.clone()), code),
        }
    }

    fn parse_publish_outcome(&mut self, body: &str) -> Result<ResultCode, ResultCode> {
        let result = parser::parse_publish(body)?;
        self.last_response_body = result.description.clone();
        if result.ok {
            Ok(ResultCode::Ok)
        } else {
            Ok(ResultCode::PublishFailed)
        }
    }

    /// §4.7's subscribe special case: the new `(timetoken, region)` is
    /// always adopted on a successful parse. What `PUBNUB_MISSMSG_OK`
    /// actually gates is whether this response's messages are queued —
    /// when it's set and the previous subscribe failed, this response
    /// is treated as a fresh handshake resyncing the cursor, and its
    /// messages are discarded as already-lost rather than delivered
    /// out of sequence.
    fn parse_subscribe_outcome(&mut self, body: &str) -> Result<ResultCode, ResultCode> {
        let result = parser::parse_subscribe(body)?;

        let resuming_after_gap = self.config.missmsg_ok && !self.last_subscribe_ok;
        self.timetoken = result.timetoken;

        if !resuming_after_gap {
            for mut message in result.messages {
                if !matches!(self.crypto, CryptoModule::None) {
                    match self.crypto.decrypt(&message.payload) {
                        Ok(plain) => message.payload = plain,
                        Err(_) => {
                            // §4.5: decrypt failures are surfaced per-message,
                            // not fatal to the transaction.
                            log::error!("failed to decrypt message on channel {}", message.channel);
                        }
                    }
                }
                self.messages.push_back(message);
            }
        }

        self.last_subscribe_ok = true;
        Ok(ResultCode::Ok)
    }

    /// §7: an oversized reply discards the body and is reported as
    /// `format-error`, not the internal `reply-too-big` the HTTP engine
    /// uses to stop buffering.
    fn reply_too_big_is_format_error(code: ResultCode) -> ResultCode {
        match code {
            ResultCode::ReplyTooBig => ResultCode::FormatError,
            other => other,
        }
    }

    fn finish(&mut self, stage: Stage, result: ResultCode) {
        if let Some(t) = self.transaction.as_mut() {
            t.stage = stage;
        }
        if matches!(result, ResultCode::Timeout | ResultCode::ConnectionTimeout | ResultCode::DnsError | ResultCode::ConnectError | ResultCode::IoError(_) | ResultCode::TlsError(_) | ResultCode::FormatError | ResultCode::ReplyTooBig)
            && matches!(self.transaction.as_ref().map(|t| &t.kind), Some(OperationKind::Subscribe))
        {
            self.last_subscribe_ok = false;
        }
        self.last_result = Some(result);
        self.transport.close();
        self.timers.disarm_all();
        self.transaction = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::crypto::OsPrng;
    use crate::dns::AddressCache as Cache;
    use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};

    #[derive(Debug)]
    struct StaticResolver {
        addr: Ipv4Addr,
    }

    /// Two-address resolver for E5: both IPs share the `Endpoint`'s
    /// port (`step_connecting` always dials `(address, endpoint.port)`),
    /// so both must be bound to the same port number.
    #[derive(Debug)]
    struct TwoAddressResolver {
        first: Ipv4Addr,
        second: Ipv4Addr,
    }

    impl Resolver for TwoAddressResolver {
        fn resolve(&self, _hostname: &str, _config: &PubnubConfig) -> Result<Cache, ResultCode> {
            Ok(Cache::new(vec![], vec![self.first, self.second]))
        }
    }

    /// Keeps a listener's accept backlog saturated with connections
    /// nobody accepts, so a later connect to it blocks for the full
    /// `wait_connect_timeout` instead of completing or being refused —
    /// deterministic locally, unlike relying on an unroutable address
    /// being silently dropped by the network.
    struct HungListener {
        _listener: TcpListener,
        _conns: Vec<TcpStream>,
    }

    fn hung_listener(bind_addr: &str) -> (SocketAddr, HungListener) {
        let listener = TcpListener::bind(bind_addr).unwrap();
        let addr = listener.local_addr().unwrap();
        let mut conns = Vec::new();
        while let Ok(s) = TcpStream::connect_timeout(&addr, Duration::from_millis(200)) {
            conns.push(s);
        }
        (addr, HungListener { _listener: listener, _conns: conns })
    }

    impl Resolver for StaticResolver {
        fn resolve(&self, _hostname: &str, _config: &PubnubConfig) -> Result<Cache, ResultCode> {
            Ok(Cache::new(vec![], vec![self.addr]))
        }
    }

    fn keys() -> Keys {
        Keys {
            publish_key: "demo".to_string(),
            subscribe_key: "demo".to_string(),
            secret_key: None,
            auth_token: None,
            user_id: None,
        }
    }

    fn spawn_fixed_response(body: &'static str, status: u16) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            use std::io::{Read, Write};
            if let Ok((mut sock, _)) = listener.accept() {
                let mut buf = [0u8; 1024];
                let _ = sock.read(&mut buf);
                let response = format!(
                    "HTTP/1.1 {} OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = sock.write_all(response.as_bytes());
            }
        });
        addr
    }

    fn test_context(addr: std::net::SocketAddr) -> Context<StaticResolver, crate::transport::TcpTransport, SystemClock> {
        let endpoint = Endpoint {
            origin: "127.0.0.1".to_string(),
            port: addr.port(),
            use_tls: false,
        };
        let config = PubnubConfig {
            dns_servers: vec!["127.0.0.1".to_string()],
            ..PubnubConfig::default()
        };
        Context::new(
            keys(),
            endpoint,
            config,
            StaticResolver {
                addr: match addr.ip() {
                    std::net::IpAddr::V4(v4) => v4,
                    _ => unreachable!(),
                },
            },
            crate::transport::TcpTransport::default(),
            SystemClock::default(),
            Box::new(OsPrng),
        )
    }

    #[test]
    fn e1_publish_ok() {
        let addr = spawn_fixed_response(r#"[1,"Sent","17000000000000000"]"#, 200);
        let mut ctx = test_context(addr);
        ctx.publish("hello_world", "\"hi\"", None).unwrap();
        let result = ctx.await_result();
        assert_eq!(result, ResultCode::Ok);
        assert_eq!(ctx.last_response_body(), "Sent");
    }

    #[test]
    fn e2_publish_failed() {
        let addr = spawn_fixed_response(r#"[0,"Invalid","0"]"#, 200);
        let mut ctx = test_context(addr);
        ctx.publish("hello_world", "\"hi\"", None).unwrap();
        let result = ctx.await_result();
        assert_eq!(result, ResultCode::PublishFailed);
        assert_eq!(ctx.last_response_body(), "Invalid");
    }

    #[test]
    fn e3_subscribe_handshake_then_message() {
        let addr = spawn_fixed_response(r#"{"t":{"t":"16000","r":"1"},"m":[]}"#, 200);
        let mut ctx = test_context(addr);
        ctx.subscribe(&["hello_world".to_string()], &[]).unwrap();
        let result = ctx.await_result();
        assert_eq!(result, ResultCode::Ok);
        assert_eq!(ctx.timetoken().t, "16000");
        assert!(ctx.get().is_none());
    }

    #[test]
    fn undecryptable_message_is_logged_and_skipped() {
        let _ = env_logger::Builder::from_env(env_logger::Env::default()).is_test(true).try_init();

        let addr = spawn_fixed_response(r#"{"t":{"t":"16000","r":"1"},"m":[{"c":"hello_world","d":"\"not base64!!\""}]}"#, 200);
        let mut ctx = test_context(addr);
        ctx.crypto = CryptoModule::AesCbc {
            cipher_key: "enigma".to_string(),
        };
        ctx.subscribe(&["hello_world".to_string()], &[]).unwrap();
        let result = ctx.await_result();
        assert_eq!(result, ResultCode::Ok);
        let message = ctx.get().expect("message still delivered despite decrypt failure");
        assert!(
            message.payload.contains("not base64!!"),
            "undecrypted payload should pass through as-is, got {}",
            message.payload
        );
    }

    #[test]
    fn second_transaction_while_in_flight_is_rejected() {
        let addr = spawn_fixed_response(r#"[1,"Sent","0"]"#, 200);
        let mut ctx = test_context(addr);
        ctx.publish("a", "\"1\"", None).unwrap();
        let result = ctx.publish("a", "\"2\"", None);
        assert_eq!(result.unwrap_err(), ResultCode::InProgress);
        ctx.await_result();
    }

    #[test]
    fn cancel_mid_transaction_is_terminal_and_idempotent() {
        // Bind but never accept: the transaction will sit in `Connecting`/`Sending`.
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::mem::forget(listener);
        let mut ctx = test_context(addr);
        ctx.publish("a", "\"1\"", None).unwrap();
        ctx.cancel();
        assert_eq!(ctx.last_result(), Some(ResultCode::Cancelled));
        ctx.cancel();
        assert_eq!(ctx.last_result(), Some(ResultCode::Cancelled));
    }

    fn fast_timeout_config() -> PubnubConfig {
        PubnubConfig {
            dns_servers: vec!["127.0.0.1".to_string()],
            default_wait_connect_timer_ms: 200,
            min_wait_connect_timer_ms: 100,
            ..PubnubConfig::default()
        }
    }

    #[test]
    fn e5_connect_timeout_then_recovery() {
        // Working server picks the shared port first; the hung listener
        // then binds that same port on a different loopback address.
        let work_addr = spawn_fixed_response(r#"[1,"Sent","0"]"#, 200);
        let port = work_addr.port();
        let (hung_addr, _hung) = hung_listener(&format!("127.0.0.3:{}", port));

        let endpoint = Endpoint {
            origin: "example.com".to_string(),
            port,
            use_tls: false,
        };
        let mut ctx = Context::new(
            keys(),
            endpoint,
            fast_timeout_config(),
            TwoAddressResolver {
                first: match hung_addr.ip() {
                    std::net::IpAddr::V4(v4) => v4,
                    _ => unreachable!(),
                },
                second: match work_addr.ip() {
                    std::net::IpAddr::V4(v4) => v4,
                    _ => unreachable!(),
                },
            },
            crate::transport::TcpTransport::default(),
            SystemClock::default(),
            Box::new(OsPrng),
        );
        ctx.publish("a", "\"1\"", None).unwrap();
        let result = ctx.await_result();
        assert_eq!(result, ResultCode::Ok);
    }

    #[test]
    fn e5_connect_timeout_on_both_addresses_is_connection_timeout() {
        let (addr_a, _hung_a) = hung_listener("127.0.0.4:0");
        let port = addr_a.port();
        let (addr_b, _hung_b) = hung_listener(&format!("127.0.0.5:{}", port));

        let endpoint = Endpoint {
            origin: "example.com".to_string(),
            port,
            use_tls: false,
        };
        let mut ctx = Context::new(
            keys(),
            endpoint,
            fast_timeout_config(),
            TwoAddressResolver {
                first: match addr_a.ip() {
                    std::net::IpAddr::V4(v4) => v4,
                    _ => unreachable!(),
                },
                second: match addr_b.ip() {
                    std::net::IpAddr::V4(v4) => v4,
                    _ => unreachable!(),
                },
            },
            crate::transport::TcpTransport::default(),
            SystemClock::default(),
            Box::new(OsPrng),
        );
        ctx.publish("a", "\"1\"", None).unwrap();
        let result = ctx.await_result();
        assert_eq!(result, ResultCode::ConnectionTimeout);
    }

    #[test]
    fn e4_reply_too_big_is_reported_as_format_error() {
        let oversized_body = "x".repeat(PubnubConfig::default().reply_maxlen + 1);
        let addr = spawn_fixed_response(Box::leak(oversized_body.into_boxed_str()), 200);
        let mut ctx = test_context(addr);
        ctx.publish("a", "\"1\"", None).unwrap();
        let result = ctx.await_result();
        assert_eq!(result, ResultCode::FormatError);
        assert!(ctx.is_idle());
        assert!(ctx.get().is_none());
    }

    #[test]
    fn http_error_status_is_reported() {
        let addr = spawn_fixed_response("not found", 404);
        let mut ctx = test_context(addr);
        ctx.publish("a", "\"1\"", None).unwrap();
        let result = ctx.await_result();
        assert_eq!(result, ResultCode::HttpError(404));
    }

    mockall::mock! {
        Res {}

        impl std::fmt::Debug for Res {
            fn fmt<'a>(&self, f: &mut std::fmt::Formatter<'a>) -> std::fmt::Result;
        }

        impl Resolver for Res {
            fn resolve(&self, hostname: &str, config: &PubnubConfig) -> Result<Cache, ResultCode>;
        }
    }

    #[test]
    fn resolver_failure_surfaces_as_dns_error() {
        let mut resolver = MockRes::new();
        resolver.expect_resolve().returning(|_, _| Err(ResultCode::DnsError));

        let endpoint = Endpoint {
            origin: "example.com".to_string(),
            port: 443,
            use_tls: true,
        };
        let mut ctx = Context::new(
            keys(),
            endpoint,
            PubnubConfig::default(),
            resolver,
            crate::transport::TcpTransport::default(),
            SystemClock::default(),
            Box::new(OsPrng),
        );
        ctx.publish("hello_world", "\"hi\"", None).unwrap();
        assert_eq!(ctx.await_result(), ResultCode::DnsError);
    }
}
