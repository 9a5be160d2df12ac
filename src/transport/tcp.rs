//! TCP connection to a node.
//!
//! # Example
//!
//! ```ignore
//! use fcp_client::transport::{connect_tcp, NodeAddress};
//!
//! let node: NodeAddress = "localhost:9481".parse()?;
//! let stream = connect_tcp(&node, Some(65535)).await?;
//! ```

use std::fmt;
use std::str::FromStr;

use tokio::net::{lookup_host, TcpSocket, TcpStream};

use crate::error::{FcpError, Result};

/// Default FCP port of a node.
pub const DEFAULT_FCP_PORT: u16 = 9481;

/// Default host of a node.
pub const DEFAULT_HOST: &str = "localhost";

/// Receive buffer size requested for node sockets.
pub const DEFAULT_RECEIVE_BUFFER_SIZE: u32 = 65535;

/// Host and port of a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeAddress {
    host: String,
    port: u16,
}

impl NodeAddress {
    /// Create a node address.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Get the host name.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Get the port.
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Default for NodeAddress {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_FCP_PORT)
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for NodeAddress {
    type Err = String;

    /// Parse `host:port` or a bare `host` (default port).
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse()
                    .map_err(|_| format!("invalid port in node address: {s}"))?;
                if host.is_empty() {
                    return Err(format!("missing host in node address: {s}"));
                }
                Ok(Self::new(host, port))
            }
            None if !s.is_empty() => Ok(Self::new(s, DEFAULT_FCP_PORT)),
            None => Err("empty node address".to_string()),
        }
    }
}

/// Open a TCP stream to the node.
///
/// Every resolved address is tried in turn.
///
/// # Errors
///
/// Returns `Connect` with the last socket error if no address accepted the
/// connection.
pub async fn connect_tcp(node: &NodeAddress, receive_buffer_size: Option<u32>) -> Result<TcpStream> {
    let connect_error = |source| FcpError::Connect {
        target: node.to_string(),
        source,
    };

    let addrs = lookup_host((node.host(), node.port()))
        .await
        .map_err(connect_error)?;

    let mut last_error =
        std::io::Error::new(std::io::ErrorKind::NotFound, "host resolved to no addresses");

    for addr in addrs {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        };
        let socket = match socket {
            Ok(socket) => socket,
            Err(e) => {
                last_error = e;
                continue;
            }
        };

        if let Some(size) = receive_buffer_size {
            if let Err(e) = socket.set_recv_buffer_size(size) {
                tracing::debug!("Could not set receive buffer size on {}: {}", addr, e);
            }
        }

        match socket.connect(addr).await {
            Ok(stream) => {
                tracing::debug!("Connected to node at {}", addr);
                return Ok(stream);
            }
            Err(e) => {
                tracing::debug!("Connecting to {} failed: {}", addr, e);
                last_error = e;
            }
        }
    }

    Err(connect_error(last_error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_node_address_parse() {
        let node: NodeAddress = "127.0.0.1:9482".parse().unwrap();
        assert_eq!(node.host(), "127.0.0.1");
        assert_eq!(node.port(), 9482);

        let node: NodeAddress = "fred.local".parse().unwrap();
        assert_eq!(node.port(), DEFAULT_FCP_PORT);

        assert!("host:notaport".parse::<NodeAddress>().is_err());
        assert!(":9481".parse::<NodeAddress>().is_err());
        assert!("".parse::<NodeAddress>().is_err());
    }

    #[test]
    fn test_node_address_display_and_default() {
        assert_eq!(NodeAddress::default().to_string(), "localhost:9481");
        assert_eq!(NodeAddress::new("node", 1).to_string(), "node:1");
    }

    #[tokio::test]
    async fn test_connect_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let node = NodeAddress::new("127.0.0.1", port);
        let (stream, accepted) = tokio::join!(
            connect_tcp(&node, Some(DEFAULT_RECEIVE_BUFFER_SIZE)),
            listener.accept()
        );

        assert!(stream.is_ok());
        assert!(accepted.is_ok());
    }

    #[tokio::test]
    async fn test_connect_tcp_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let node = NodeAddress::new("127.0.0.1", port);
        match connect_tcp(&node, None).await {
            Err(FcpError::Connect { target, .. }) => assert_eq!(target, node.to_string()),
            other => panic!("expected connect error, got {other:?}"),
        }
    }
}
