pub mod config;
pub mod directory;
pub mod server;
pub mod shell;
pub mod statistics;

use std::sync::Arc;

use anyhow::Result;
use tokio::net::UdpSocket;

use codec::crypto::KeyChain;
use service::{Assembler, NodeClass};

use self::{config::Config, server::Peer};

#[rustfmt::skip]
static SOFTWARE: &str = concat!(
    "skymesh.",
    env!("CARGO_PKG_VERSION")
);

/// Runs one peer on an already-bound socket until the operator quits.
///
/// Split out of `main` (which only parses flags and binds) so tests can
/// drive a whole peer in-process.
pub async fn startup(config: Arc<Config>, socket: UdpSocket) -> Result<()> {
    log::info!(
        "{} starting: name={}, class={}",
        SOFTWARE,
        config.name,
        config.class
    );

    let keys = KeyChain::generate()?;
    let assembler = Assembler::new(config.settings.scratch_dir.clone())?;
    let peer = Peer::new(config.clone(), socket, keys.public_key_pem().to_string());

    // A dead directory at startup is not fatal: the poll loop re-registers
    // as soon as a snapshot arrives without this peer's record.
    if let Err(e) = peer.register().await {
        log::warn!("initial registration failed: {:#}", e);
    }

    match peer.refresh_membership().await {
        Ok(count) => log::info!("initial snapshot: records={}", count),
        Err(e) => log::warn!("initial membership pull failed: {:#}", e),
    }

    let mut tasks = vec![
        tokio::spawn(peer.clone().receive_loop(assembler)),
        tokio::spawn(peer.clone().poll_loop()),
    ];

    if config.class == NodeClass::Satellite {
        tasks.push(tokio::spawn(peer.clone().mobility_loop()));
    }

    log::info!(
        "peer ready for datagram traffic: addr={}:{}",
        config.ip,
        config.port
    );

    shell::run(peer.clone()).await?;

    peer.shutdown();
    for task in tasks {
        task.abort();
    }

    if let Err(e) = peer.deregister().await {
        log::warn!("deregister on shutdown failed: {:#}", e);
    }

    log::info!("goodbye");
    Ok(())
}
