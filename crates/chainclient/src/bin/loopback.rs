//! Runs the client against a scripted in-process service, or over TCP when an
//! address is given:
//!
//! ```text
//! chain-loopback                 # scripted service
//! chain-loopback 127.0.0.1:9091  # fetch the last height from a peer speaking StreamTransport framing
//! ```
//!
//! The TCP mode uses [`StreamTransport`]'s length-prefixed framing, not the
//! service's own socket protocol, so the peer has to speak that framing too.
//!
//! Set `RUST_LOG=chainclient=debug` to watch requests being correlated.

use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use chainclient::ChannelTransport;
use chainclient::Client;
use chainclient::ClientSettings;
use chainclient::ErrorCode;
use chainclient::StreamTransport;
use chainclient::Transport;
use chainclient::query;
use chainwire::encode_response;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Answers the handful of commands the demo issues.
async fn scripted_service(service: ChannelTransport) {
    while let Ok(Some(request)) = service.recv().await {
        let Some(id) = request
            .get(1)
            .and_then(|id| <[u8; 4]>::try_from(id.as_slice()).ok())
            .map(u32::from_le_bytes)
        else {
            continue;
        };
        let command = request.first().cloned().unwrap_or_default();

        let frames = match command.as_slice() {
            query::FETCH_LAST_HEIGHT => vec![encode_response(&command, id, None, &1000u32.to_le_bytes())],
            query::FETCH_BLOCK_TRANSACTION_HASHES => {
                let hashes = [[0xaa; 32], [0xbb; 32]].concat();
                vec![encode_response(&command, id, None, &hashes)]
            }
            query::SUBSCRIBE_ADDRESS => vec![
                encode_response(&command, id, None, b""),
                encode_response(&command, id, None, b"first notification"),
                encode_response(&command, id, None, b"second notification"),
            ],
            query::UNSUBSCRIBE_ADDRESS => vec![encode_response(&command, id, None, b"")],
            _ => vec![encode_response(&command, id, Some(ErrorCode::NotFound), b"")],
        };

        for frame in frames {
            if service.send(frame).await.is_err() {
                return;
            }
        }
    }
}

async fn run_scripted() -> Result<()> {
    let (client_end, service_end) = ChannelTransport::pair();
    tokio::spawn(scripted_service(service_end));

    let client = Client::new(client_end, ClientSettings::new().with_timeout(Duration::from_secs(2)));

    let (error, height) = client.last_height().await?;
    info!(?error, ?height, "last height");

    let (error, hashes) = client.block_transaction_hashes(200_000).await?;
    let hashes: Vec<String> = hashes.unwrap_or_default().iter().map(hex::encode).collect();
    info!(?error, ?hashes, "block transaction hashes");

    let (error, subscription) = client.subscribe_address(&[0x11; 20]).await?;
    let mut subscription = subscription.with_context(|| format!("subscription refused: {:?}", error))?;
    for _ in 0..2 {
        if let Some(push) = subscription.next().await {
            info!(id = subscription.id(), push = %String::from_utf8_lossy(&push), "notification");
        }
    }

    let (error, _) = client.unsubscribe_address(&[0x11; 20]).await?;
    info!(?error, "unsubscribed");
    client.cancel_subscription(subscription.id());

    let abandoned = client.stop().await;
    info!(abandoned, "done");
    Ok(())
}

async fn run_remote(addr: &str) -> Result<()> {
    let transport = StreamTransport::connect(addr)
        .await
        .with_context(|| format!("connecting to {}", addr))?;
    let client = Client::new(transport, ClientSettings::default());

    let (error, height) = client.last_height().await?;
    info!(?error, ?height, "last height");

    client.stop().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match std::env::args().nth(1) {
        Some(addr) => run_remote(&addr).await,
        None => run_scripted().await,
    }
}
