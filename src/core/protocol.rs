//! Message tags and wire formats shared by every component.
//!
//! Two textual protocols live here: the JSON request/response messages
//! carried over TCP (bootstrap registration and file transfer), and the
//! line-oriented `HELLO:`/`GOODBYE:` heartbeats carried over UDP
//! multicast. This module holds definitions only; all I/O lives in
//! `network` and `transfer`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Liveness announcement prefix, broadcast every heartbeat interval.
pub const HELLO_PREFIX: &str = "HELLO:";
/// Departure announcement prefix, sent once on shutdown.
pub const GOODBYE_PREFIX: &str = "GOODBYE:";

/// Transfer search replies.
pub const FOUND: &str = "FOUND";
pub const NOT_FOUND: &str = "NOT_FOUND";

/// Every transfer error reply starts with this marker so the download
/// client can detect a failure mid-stream.
pub const ERROR_PREFIX: &str = "ERROR";
pub const ERROR_FILE_NOT_FOUND: &str = "ERROR: File not found.";
pub const ERROR_AUTH_FAILED: &str = "ERROR: Authentication failed.";
pub const ERROR_UNKNOWN_REQUEST: &str = "ERROR: Unknown request.";

/// File bytes are streamed in blocks of this size.
pub const CHUNK_SIZE: usize = 4096;

/// Identity of a peer: exact (host, port) match, no DNS resolution,
/// no normalization. Serializes as the `[ip, port]` pair the bootstrap
/// node list uses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "(String, u16)", into = "(String, u16)")]
pub struct PeerAddress {
    pub host: String,
    pub port: u16,
}

impl PeerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse `host:port`; the port is whatever follows the last colon.
    pub fn parse(s: &str) -> Option<Self> {
        let (host, port) = s.rsplit_once(':')?;
        if host.is_empty() {
            return None;
        }
        let port = port.parse().ok()?;
        Some(Self::new(host, port))
    }
}

impl From<(String, u16)> for PeerAddress {
    fn from((host, port): (String, u16)) -> Self {
        Self { host, port }
    }
}

impl From<PeerAddress> for (String, u16) {
    fn from(addr: PeerAddress) -> Self {
        (addr.host, addr.port)
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A request decoded once at the protocol boundary. The `type` field of
/// the JSON payload selects the variant; handling is exhaustive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Request {
    /// Bootstrap registration: announce (ip, port), get the full registry back.
    Register { ip: String, port: u16 },
    /// Does `filename` exist in the remote share directory?
    Search { filename: String, secret: String },
    /// Stream the bytes of `filename`.
    Download { filename: String, secret: String },
}

/// Bootstrap reply: the full current registry, requester included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterReply {
    pub nodes: Vec<PeerAddress>,
}

/// A parsed multicast datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Heartbeat {
    Hello(PeerAddress),
    Goodbye(PeerAddress),
}

impl Heartbeat {
    /// Parse a datagram. Anything without a known prefix or with a
    /// malformed `host:port` payload yields `None` and is dropped by
    /// the listener.
    pub fn parse(msg: &str) -> Option<Self> {
        if let Some(rest) = msg.strip_prefix(HELLO_PREFIX) {
            PeerAddress::parse(rest).map(Heartbeat::Hello)
        } else if let Some(rest) = msg.strip_prefix(GOODBYE_PREFIX) {
            PeerAddress::parse(rest).map(Heartbeat::Goodbye)
        } else {
            None
        }
    }

    pub fn addr(&self) -> &PeerAddress {
        match self {
            Heartbeat::Hello(addr) | Heartbeat::Goodbye(addr) => addr,
        }
    }
}

impl fmt::Display for Heartbeat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Heartbeat::Hello(addr) => write!(f, "{}{}", HELLO_PREFIX, addr),
            Heartbeat::Goodbye(addr) => write!(f, "{}{}", GOODBYE_PREFIX, addr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat_round_trip() {
        let addr = PeerAddress::new("127.0.0.1", 9001);
        let hello = Heartbeat::Hello(addr.clone());
        assert_eq!(hello.to_string(), "HELLO:127.0.0.1:9001");
        assert_eq!(Heartbeat::parse("HELLO:127.0.0.1:9001"), Some(hello));

        let goodbye = Heartbeat::Goodbye(addr);
        assert_eq!(goodbye.to_string(), "GOODBYE:127.0.0.1:9001");
        assert_eq!(Heartbeat::parse("GOODBYE:127.0.0.1:9001"), Some(goodbye));
    }

    #[test]
    fn test_heartbeat_rejects_garbage() {
        assert_eq!(Heartbeat::parse(""), None);
        assert_eq!(Heartbeat::parse("PING:127.0.0.1:9001"), None);
        assert_eq!(Heartbeat::parse("HELLO:127.0.0.1"), None);
        assert_eq!(Heartbeat::parse("HELLO:127.0.0.1:notaport"), None);
        assert_eq!(Heartbeat::parse("HELLO::9001"), None);
        assert_eq!(Heartbeat::parse("hello:127.0.0.1:9001"), None);
    }

    #[test]
    fn test_request_decodes_by_type_tag() {
        let req: Request =
            serde_json::from_str(r#"{"type":"register","ip":"10.0.0.5","port":9000}"#).unwrap();
        assert!(matches!(req, Request::Register { ref ip, port: 9000 } if ip == "10.0.0.5"));

        let req: Request =
            serde_json::from_str(r#"{"type":"search","filename":"a.txt","secret":"s"}"#).unwrap();
        assert!(matches!(req, Request::Search { ref filename, .. } if filename == "a.txt"));

        assert!(serde_json::from_str::<Request>(r#"{"type":"steal","filename":"a"}"#).is_err());
    }

    #[test]
    fn test_peer_address_serializes_as_pair() {
        let reply = RegisterReply {
            nodes: vec![
                PeerAddress::new("127.0.0.1", 9001),
                PeerAddress::new("127.0.0.1", 9002),
            ],
        };
        let json = serde_json::to_string(&reply).unwrap();
        assert_eq!(json, r#"{"nodes":[["127.0.0.1",9001],["127.0.0.1",9002]]}"#);

        let back: RegisterReply = serde_json::from_str(&json).unwrap();
        assert_eq!(back.nodes, reply.nodes);
    }
}
