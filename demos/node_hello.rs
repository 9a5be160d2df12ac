//! Node Hello - connect, print the handshake reply, disconnect.
//!
//! This example demonstrates:
//! - Building a session with the fluent builder
//! - Connecting to a node over TCP with a bounded handshake wait
//! - Reading the fields of the node's `NodeHello`
//!
//! # Running
//!
//! ```text
//! cargo run --example node_hello -- localhost:9481
//! ```

use std::time::Duration;

use fcp_client::{NodeAddress, Session};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let node: NodeAddress = match std::env::args().nth(1) {
        Some(arg) => arg.parse()?,
        None => NodeAddress::default(),
    };

    let session = Session::builder()
        .client_name("node-hello-demo")
        .handshake_timeout(Duration::from_secs(5))
        .build();

    if !session.connect(&node).await? {
        eprintln!("{} did not answer the handshake", node);
        session.disconnect();
        return Ok(());
    }

    if let Some(hello) = session.node_hello() {
        println!("Connected to {}", node);
        for (key, value) in hello.fields().iter() {
            println!("  {key} = {value}");
        }
    }

    session.disconnect();
    Ok(())
}
