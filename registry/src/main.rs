use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    process::exit,
    sync::Arc,
};

use anyhow::Result;
use clap::Parser;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
};

use service::{Registry, Request, Response};

#[derive(Parser, Debug)]
#[command(
    about = env!("CARGO_PKG_DESCRIPTION"),
    version = env!("CARGO_PKG_VERSION"),
)]
struct Cli {
    /// `<port>` to listen on all interfaces, or `<ip> <port>` to bind a
    /// specific IPv4 address.
    ///
    /// Example: skymesh-registry 127.0.0.1 5001
    #[arg(num_args = 1..=2, required = true)]
    listen: Vec<String>,
}

impl Cli {
    fn listen_addr(&self) -> Result<SocketAddr> {
        Ok(match self.listen.as_slice() {
            [port] => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port.parse()?),
            [ip, port] => SocketAddr::new(IpAddr::V4(ip.parse()?), port.parse()?),
            _ => unreachable!("clap bounds the argument count"),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    simple_logger::init_with_level(log::Level::Info)?;

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            exit(match e.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => 0,
                _ => 1,
            });
        }
    };

    let listen = match cli.listen_addr() {
        Ok(listen) => listen,
        Err(e) => {
            log::error!("invalid listen address: {:?}", e);
            exit(1);
        }
    };

    let registry = Arc::new(Registry::default());
    let listener = TcpListener::bind(listen).await?;

    log::info!("registry listening: addr={}", listen);

    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                log::warn!("accept error: {:?}", e);
                continue;
            }
        };

        let registry = registry.clone();
        tokio::spawn(async move {
            if let Err(e) = serve(stream, &registry).await {
                log::warn!("client error: addr={}, error={:?}", addr, e);
            }
        });
    }
}

/// Serves one client: a JSON request object per line, one JSON response
/// line each, until the peer closes the connection.
async fn serve(stream: TcpStream, registry: &Registry) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => dispatch(request, registry),
            Err(e) => {
                log::warn!("invalid request: {:?}", e);
                Response::Error {
                    error: "invalid request".to_string(),
                }
            }
        };

        let mut payload = serde_json::to_string(&response)?;
        payload.push('\n');
        writer.write_all(payload.as_bytes()).await?;
    }

    Ok(())
}

/// Applies one action. Updating or deregistering an absent name is a soft
/// success: the condition is only worth a log line, and the peer will
/// re-register on its next cycle anyway.
fn dispatch(request: Request, registry: &Registry) -> Response {
    match request {
        Request::Register { node } => {
            log::info!(
                "register: class={}, name={}, addr={}:{}, position=[{}, {}]",
                node.class,
                node.name,
                node.ip,
                node.port,
                node.x,
                node.y
            );

            let name = node.name.clone();
            registry.register(node);

            Response::Message {
                message: format!("node {name} registered"),
            }
        }
        Request::Update { node } => {
            log::debug!(
                "update: name={}, position=[{}, {}]",
                node.name,
                node.x,
                node.y
            );

            let name = node.name.clone();
            if !registry.update(node) {
                log::warn!("update for unknown node: name={}", name);
            }

            Response::Message {
                message: format!("node {name} updated"),
            }
        }
        Request::Deregister { name } => {
            log::info!("deregister: name={}", name.trim());

            if !registry.deregister(&name) {
                log::warn!("deregister for unknown node: name={}", name.trim());
            }

            Response::Message {
                message: format!("node {} deregistered", name.trim()),
            }
        }
        Request::List => {
            log::debug!("list: records={}", registry.len());

            Response::Nodes(registry.list())
        }
    }
}
