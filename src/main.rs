#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::{process::exit, sync::Arc};

use tokio::net::UdpSocket;

use skymesh::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e:#}");
            exit(1);
        }
    };

    simple_logger::init_with_level(config.settings.log.level.as_level())?;

    // Bind before anything else touches the network: a taken port or a
    // foreign address is unrecoverable and gets its own exit code.
    let socket = match UdpSocket::bind((config.ip, config.port)).await {
        Ok(socket) => socket,
        Err(e) => {
            log::error!("failed to bind {}:{}: {:?}", config.ip, config.port, e);
            exit(4);
        }
    };

    skymesh::startup(Arc::new(config), socket).await
}
