//! L2 — DNS Resolver (§4.2).
//!
//! Wire message encode/decode is delegated to `hickory-proto` (the
//! dedicated DNS crate in the retrieval pack); the retry/rotation
//! control flow and the per-context address cache are bespoke and
//! synchronous, grounded on
//! `examples/other_examples/..._dns-mod.rs.rs` and
//! `..._dns_resolver-dns_tcp.rs.rs` (resolver module shape: cached
//! address list + round-robin index).

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::str::FromStr;
use std::time::Duration;

use hickory_proto::op::{Message, MessageType as DnsMessageType, OpCode, Query};
use hickory_proto::rr::{DNSClass, Name, RData, RecordType};
use hickory_proto::serialize::binary::{BinEncodable, BinEncoder};

use crate::config::PubnubConfig;
use crate::error::ResultCode;

/// Up to `PUBNUB_MAX_IPV4_ADDRESSES`/`PUBNUB_MAX_IPV6_ADDRESSES`
/// addresses from the last lookup, cached on the `Context` and reused
/// by multi-address connect (§4.3). IPv6 addresses are listed first
/// when enabled, matching the transport's "IPv6 first when enabled"
/// interleaving rule.
#[derive(Debug, Clone, Default)]
pub struct AddressCache {
    addresses: Vec<IpAddr>,
    next: usize,
}

impl AddressCache {
    pub fn new(ipv6: Vec<Ipv6Addr>, ipv4: Vec<Ipv4Addr>) -> Self {
        let mut addresses: Vec<IpAddr> = ipv6.into_iter().map(IpAddr::V6).collect();
        addresses.extend(ipv4.into_iter().map(IpAddr::V4));
        AddressCache { addresses, next: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn as_slice(&self) -> &[IpAddr] {
        &self.addresses
    }

    /// Round-robin over the cached addresses, used when a fresh
    /// transaction short-circuits `resolving` straight to `connecting`
    /// (§4.7).
    pub fn next_address(&mut self) -> Option<IpAddr> {
        if self.addresses.is_empty() {
            return None;
        }
        let addr = self.addresses[self.next % self.addresses.len()];
        self.next += 1;
        Some(addr)
    }
}

/// DNS resolution collaborator (§6).
pub trait Resolver: std::fmt::Debug {
    fn resolve(&self, hostname: &str, config: &PubnubConfig) -> Result<AddressCache, ResultCode>;
}

/// Default synchronous UDP resolver: one query per record type desired
/// (A, and AAAA when `use_ipv6`), retried `max_dns_queries` times per
/// server, rotating through `dns_servers` up to `max_dns_rotation`
/// times (§4.2, §8 property 8).
#[derive(Debug, Default)]
pub struct UdpResolver {
    pub query_timeout: Duration,
}

impl UdpResolver {
    pub fn new() -> Self {
        UdpResolver {
            query_timeout: Duration::from_millis(500),
        }
    }
}

impl Resolver for UdpResolver {
    fn resolve(&self, hostname: &str, config: &PubnubConfig) -> Result<AddressCache, ResultCode> {
        let name = Name::from_str(&format!("{}.", hostname.trim_end_matches('.')))
            .map_err(|_| ResultCode::DnsError)?;

        let mut ipv4 = Vec::new();
        let mut ipv6 = Vec::new();
        let mut any_success = false;

        for rotation in 0..config.max_dns_rotation.max(1) {
            let server = match config.dns_servers.get(rotation as usize % config.dns_servers.len().max(1)) {
                Some(s) => s.as_str(),
                None => break,
            };

            if let Ok(addrs) = self.query_one(server, &name, RecordType::A, config.max_dns_queries) {
                ipv4 = addrs.into_iter().filter_map(|a| match a {
                    IpAddr::V4(v4) => Some(v4),
                    _ => None,
                }).take(config.max_ipv4_addresses).collect();
                if !ipv4.is_empty() {
                    any_success = true;
                }
            }

            if config.use_ipv6 {
                if let Ok(addrs) = self.query_one(server, &name, RecordType::AAAA, config.max_dns_queries) {
                    ipv6 = addrs.into_iter().filter_map(|a| match a {
                        IpAddr::V6(v6) => Some(v6),
                        _ => None,
                    }).take(config.max_ipv6_addresses).collect();
                    if !ipv6.is_empty() {
                        any_success = true;
                    }
                }
            }

            if any_success {
                break;
            }
        }

        if !any_success {
            return Err(ResultCode::DnsError);
        }

        Ok(AddressCache::new(ipv6, ipv4))
    }
}

impl UdpResolver {
    /// Send a query for `record_type` to `server`, retransmitting up
    /// to `max_queries` times on timeout. Returns every address found
    /// in the response (partial success, e.g. zero AAAA records but a
    /// valid response, is handled by the caller — this only errors on
    /// total failure to get any reply).
    fn query_one(
        &self,
        server: &str,
        name: &Name,
        record_type: RecordType,
        max_queries: u32,
    ) -> Result<Vec<IpAddr>, ResultCode> {
        let server_addr: SocketAddr = format!("{}:53", server).parse().map_err(|_| ResultCode::DnsError)?;
        self.query_one_at(server_addr, name, record_type, max_queries)
    }

    fn query_one_at(
        &self,
        server_addr: SocketAddr,
        name: &Name,
        record_type: RecordType,
        max_queries: u32,
    ) -> Result<Vec<IpAddr>, ResultCode> {
        let socket = UdpSocket::bind("0.0.0.0:0").map_err(|_| ResultCode::DnsError)?;
        socket
            .set_read_timeout(Some(self.query_timeout))
            .map_err(|_| ResultCode::DnsError)?;

        let request = build_query(name, record_type);
        let mut buf = [0u8; 512];

        for _ in 0..max_queries.max(1) {
            if socket.send_to(&request, server_addr).is_err() {
                continue;
            }
            match socket.recv_from(&mut buf) {
                Ok((len, _)) => {
                    if let Ok(message) = Message::from_vec(&buf[..len]) {
                        return Ok(extract_addresses(&message));
                    }
                }
                Err(_) => continue,
            }
        }

        Err(ResultCode::DnsError)
    }
}

fn build_query(name: &Name, record_type: RecordType) -> Vec<u8> {
    let mut message = Message::new();
    message.set_id(rand::random());
    message.set_message_type(DnsMessageType::Query);
    message.set_op_code(OpCode::Query);
    message.set_recursion_desired(true);

    let mut query = Query::new();
    query.set_name(name.clone());
    query.set_query_type(record_type);
    query.set_query_class(DNSClass::IN);
    message.add_query(query);

    let mut buf = Vec::new();
    {
        let mut encoder = BinEncoder::new(&mut buf);
        let _ = message.emit(&mut encoder);
    }
    buf
}

fn extract_addresses(message: &Message) -> Vec<IpAddr> {
    message
        .answers()
        .iter()
        .filter_map(|record| match record.data() {
            Some(RData::A(addr)) => Some(IpAddr::V4(addr.0)),
            Some(RData::AAAA(addr)) => Some(IpAddr::V6(addr.0)),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_cache_round_robins() {
        let mut cache = AddressCache::new(vec![], vec![Ipv4Addr::new(1, 1, 1, 1), Ipv4Addr::new(2, 2, 2, 2)]);
        let a = cache.next_address().unwrap();
        let b = cache.next_address().unwrap();
        let c = cache.next_address().unwrap();
        assert_ne!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn address_cache_lists_ipv6_first() {
        let cache = AddressCache::new(vec![Ipv6Addr::LOCALHOST], vec![Ipv4Addr::new(1, 1, 1, 1)]);
        assert!(matches!(cache.as_slice()[0], IpAddr::V6(_)));
    }

    #[test]
    fn empty_cache_yields_no_address() {
        let mut cache = AddressCache::default();
        assert!(cache.is_empty());
        assert_eq!(cache.next_address(), None);
    }

    /// §8 property 8: a server that drops every query causes exactly
    /// `max_dns_queries` datagrams per server before giving up on it,
    /// and `dns-error` once every server in the rotation has been
    /// exhausted that way.
    #[test]
    fn exhausts_retries_and_rotation_against_a_black_hole() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let max_queries = 2u32;

        // A bound-but-silent socket: every datagram sent to it is
        // received and counted, but never answered — exactly "a
        // server that drops every query".
        let listener = UdpSocket::bind("127.0.0.1:0").unwrap();
        let server_addr = listener.local_addr().unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        let stop = Arc::new(AtomicUsize::new(0));
        let (counter_thread, stop_thread) = (counter.clone(), stop.clone());
        listener.set_read_timeout(Some(Duration::from_millis(10))).unwrap();
        let handle = std::thread::spawn(move || {
            let mut buf = [0u8; 512];
            while stop_thread.load(Ordering::SeqCst) == 0 {
                if listener.recv_from(&mut buf).is_ok() {
                    counter_thread.fetch_add(1, Ordering::SeqCst);
                }
            }
        });

        let resolver = UdpResolver {
            query_timeout: Duration::from_millis(30),
        };
        let name = Name::from_str("example.com.").unwrap();
        let result = resolver.query_one_at(server_addr, &name, RecordType::A, max_queries);

        stop.store(1, Ordering::SeqCst);
        let _ = handle.join();

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), max_queries as usize);
    }

    #[test]
    fn resolve_yields_dns_error_when_every_rotation_fails() {
        let resolver = UdpResolver {
            query_timeout: Duration::from_millis(30),
        };
        let config = PubnubConfig {
            max_dns_queries: 1,
            max_dns_rotation: 2,
            // TEST-NET-1 (RFC 5737): routable-looking, guaranteed silent.
            dns_servers: vec!["192.0.2.1".to_string(), "192.0.2.2".to_string()],
            ..PubnubConfig::default()
        };
        let result = resolver.resolve("example.com", &config);
        assert_eq!(result.unwrap_err(), ResultCode::DnsError);
    }
}
