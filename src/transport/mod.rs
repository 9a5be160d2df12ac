//! Transport module - opening the duplex stream to a node.
//!
//! Sessions accept any `AsyncRead + AsyncWrite` stream; this module provides
//! the TCP connection used by [`Session::connect`](crate::Session::connect).

mod tcp;

pub use tcp::{
    connect_tcp, NodeAddress, DEFAULT_FCP_PORT, DEFAULT_HOST, DEFAULT_RECEIVE_BUFFER_SIZE,
};
