//! Put Data - insert a small file and follow its progress.
//!
//! This example demonstrates:
//! - Implementing a listener that reacts to node messages and termination
//! - Sending a command with a binary payload streamed from a file
//! - Disconnecting from inside a listener when the request finishes
//!
//! # Running
//!
//! ```text
//! cargo run --example put_data -- ./some-file.txt
//! ```

use fcp_client::{Command, ConnectionListener, Message, NodeAddress, Session};
use tokio::sync::mpsc;

const IDENTIFIER: &str = "put-demo";

/// Follows one insert and reports its outcome.
struct PutWatcher {
    // `None` means the connection closed first
    outcome: mpsc::UnboundedSender<Option<String>>,
}

impl ConnectionListener for PutWatcher {
    fn message_received(&self, session: &Session, message: &Message) {
        if message.identifier() != Some(IDENTIFIER) {
            return;
        }
        match message.name() {
            "SimpleProgress" => println!(
                "progress: {}/{} blocks",
                message.get("Succeeded").unwrap_or("?"),
                message.get("Total").unwrap_or("?")
            ),
            "PutSuccessful" => {
                let uri = message.get("URI").unwrap_or_default().to_string();
                self.outcome.send(Some(uri)).ok();
                session.disconnect();
            }
            "PutFailed" | "ProtocolError" => {
                eprintln!("failed: {}", message.get("CodeDescription").unwrap_or("?"));
                session.disconnect();
            }
            _ => {}
        }
    }

    fn connection_terminated(&self, _session: &Session) {
        self.outcome.send(None).ok();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args().nth(1).ok_or("usage: put_data <file>")?;
    let file = tokio::fs::File::open(&path).await?;
    let length = file.metadata().await?.len();

    let (outcome, mut outcome_rx) = mpsc::unbounded_channel();
    let session = Session::builder()
        .client_name("put-data-demo")
        .listener(PutWatcher { outcome })
        .build();

    if !session.connect(&NodeAddress::default()).await? {
        session.disconnect();
        return Err("node did not answer the handshake".into());
    }

    let put = Command::builder("ClientPut")
        .identifier(IDENTIFIER)
        .field("URI", "CHK@")
        .field("Verbosity", "1")
        .field("UploadFrom", "direct")
        .payload(file, length)
        .build();
    session.execute(put).await?;

    match outcome_rx.recv().await.flatten() {
        Some(uri) => println!("inserted at {uri}"),
        None => println!("connection closed before the insert finished"),
    }

    session.disconnect();
    Ok(())
}
