//! Configuration options enumerated in §6. Defaults match
//! `original_source/core/test/pubnub_config.h`.

/// Every named tunable collected into one struct with sane defaults,
/// overridable piecemeal.
#[derive(Clone, Debug)]
pub struct PubnubConfig {
    /// `PUBNUB_CTX_MAX` — size of the static context pool.
    pub ctx_max: usize,
    /// `PUBNUB_BUF_MAXLEN` — send-buffer cap, in bytes.
    pub buf_maxlen: usize,
    /// `PUBNUB_REPLY_MAXLEN` — receive-buffer cap, in bytes.
    pub reply_maxlen: usize,
    /// `PUBNUB_MISSMSG_OK` — accept a fresh handshake timetoken after a
    /// failed subscribe, at the cost of losing in-flight messages.
    pub missmsg_ok: bool,
    /// `PUBNUB_ORIGIN` — default origin hostname.
    pub origin: String,
    /// Whether to connect over TLS.
    pub use_tls: bool,
    /// `PUBNUB_USE_IPV6` — enable AAAA lookups and IPv6 connects.
    pub use_ipv6: bool,
    /// `PUBNUB_USE_MULTIPLE_ADDRESSES` — try more than one cached
    /// address on connect failure.
    pub use_multiple_addresses: bool,
    /// `PUBNUB_MAX_IPV4_ADDRESSES`
    pub max_ipv4_addresses: usize,
    /// `PUBNUB_MAX_IPV6_ADDRESSES`
    pub max_ipv6_addresses: usize,
    /// `PUBNUB_RECEIVE_GZIP_RESPONSE` — request and decode gzip.
    pub receive_gzip_response: bool,
    /// `PUBNUB_DEFAULT_TRANSACTION_TIMER`, in milliseconds.
    pub default_transaction_timer_ms: u64,
    /// `PUBNUB_MIN_TRANSACTION_TIMER`, in milliseconds.
    pub min_transaction_timer_ms: u64,
    /// `PUBNUB_DEFAULT_WAIT_CONNECT_TIMER`, in milliseconds.
    pub default_wait_connect_timer_ms: u64,
    /// `PUBNUB_MIN_WAIT_CONNECT_TIMER`, in milliseconds.
    pub min_wait_connect_timer_ms: u64,
    /// `PUBNUB_MAX_DNS_QUERIES` — retransmits per DNS server.
    pub max_dns_queries: u32,
    /// `PUBNUB_MAX_DNS_ROTATION` — DNS server rotations.
    pub max_dns_rotation: u32,
    /// `PUBNUB_DEFAULT_DNS_SERVER` and any additional configured
    /// servers, tried in order and rotated through on failure.
    pub dns_servers: Vec<String>,
    /// `PUBNUB_RAND_INIT_VECTOR` — reseed the PRNG per context.
    pub rand_init_vector: bool,
}

impl Default for PubnubConfig {
    fn default() -> Self {
        PubnubConfig {
            ctx_max: 4,
            buf_maxlen: 256,
            reply_maxlen: 1024,
            missmsg_ok: false,
            origin: "pubsub.pubnub.com".to_string(),
            use_tls: true,
            use_ipv6: false,
            use_multiple_addresses: true,
            max_ipv4_addresses: 2,
            max_ipv6_addresses: 2,
            receive_gzip_response: false,
            default_transaction_timer_ms: 310_000,
            min_transaction_timer_ms: 200,
            default_wait_connect_timer_ms: 10_000,
            min_wait_connect_timer_ms: 5_000,
            max_dns_queries: 3,
            max_dns_rotation: 3,
            dns_servers: vec!["8.8.8.8".to_string()],
            rand_init_vector: true,
        }
    }
}

impl PubnubConfig {
    /// Clamp a requested transaction timer to the configured minimum.
    pub fn transaction_timer_ms(&self, requested: Option<u64>) -> u64 {
        requested
            .unwrap_or(self.default_transaction_timer_ms)
            .max(self.min_transaction_timer_ms)
    }

    /// Clamp a requested wait-connect timer to the configured minimum.
    pub fn wait_connect_timer_ms(&self, requested: Option<u64>) -> u64 {
        requested
            .unwrap_or(self.default_wait_connect_timer_ms)
            .max(self.min_wait_connect_timer_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_c_core() {
        let cfg = PubnubConfig::default();
        assert_eq!(cfg.ctx_max, 4);
        assert_eq!(cfg.buf_maxlen, 256);
        assert_eq!(cfg.reply_maxlen, 1024);
        assert_eq!(cfg.default_transaction_timer_ms, 310_000);
        assert_eq!(cfg.default_wait_connect_timer_ms, 10_000);
        assert_eq!(cfg.max_dns_queries, 3);
        assert_eq!(cfg.max_dns_rotation, 3);
    }

    #[test]
    fn timers_are_clamped_to_minimum() {
        let cfg = PubnubConfig::default();
        assert_eq!(cfg.transaction_timer_ms(Some(1)), cfg.min_transaction_timer_ms);
        assert_eq!(
            cfg.wait_connect_timer_ms(Some(1)),
            cfg.min_wait_connect_timer_ms
        );
    }
}
