//! Peer addressing: host + port identity, used as a map/set key across the protocol.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};

/// Network identity of a peer: the host and the port its listener is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerAddr {
    pub host: IpAddr,
    pub port: u16,
}

impl PeerAddr {
    pub fn new(host: IpAddr, port: u16) -> Self {
        Self { host, port }
    }

    /// Socket address to dial this peer's listener.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl From<SocketAddr> for PeerAddr {
    fn from(addr: SocketAddr) -> Self {
        Self {
            host: addr.ip(),
            port: addr.port(),
        }
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn display_and_socket_addr() {
        let addr = PeerAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9001);
        assert_eq!(addr.to_string(), "127.0.0.1:9001");
        assert_eq!(PeerAddr::from(addr.socket_addr()), addr);
    }
}
