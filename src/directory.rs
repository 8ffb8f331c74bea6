use std::{net::SocketAddr, time::Duration};

use anyhow::{Context, Result, anyhow};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::TcpStream,
    time::timeout,
};

use service::{Node, Request, Response};

use crate::config::Config;

/// Control-plane client for the membership directory.
///
/// Every call is one short-lived TCP exchange: a JSON request line, a JSON
/// response line. Connects are bounded by one timeout and the whole
/// exchange by another; a failure is handed back to the caller, which logs
/// it and keeps working from its last snapshot.
#[derive(Clone)]
pub struct DirectoryClient {
    registry: SocketAddr,
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl DirectoryClient {
    pub fn new(config: &Config) -> Self {
        Self {
            registry: config.settings.registry,
            connect_timeout: config.connect_timeout(),
            request_timeout: config.request_timeout(),
        }
    }

    /// Announce this peer, creating or superseding its record.
    pub async fn register(&self, node: Node) -> Result<()> {
        self.expect_message(Request::Register { node }).await
    }

    /// Push new attributes (position, mostly) for an existing record.
    pub async fn update(&self, node: Node) -> Result<()> {
        self.expect_message(Request::Update { node }).await
    }

    /// Withdraw this peer's record on clean shutdown.
    pub async fn deregister(&self, name: &str) -> Result<()> {
        self.expect_message(Request::Deregister {
            name: name.to_string(),
        })
        .await
    }

    /// The directory's current record set.
    pub async fn list(&self) -> Result<Vec<Node>> {
        match self.call(&Request::List).await? {
            Response::Nodes(nodes) => Ok(nodes),
            Response::Error { error } => Err(anyhow!("directory refused list: {error}")),
            Response::Message { .. } => Err(anyhow!("directory answered list with a message")),
        }
    }

    async fn expect_message(&self, request: Request) -> Result<()> {
        match self.call(&request).await? {
            Response::Message { .. } => Ok(()),
            Response::Error { error } => Err(anyhow!("directory refused request: {error}")),
            Response::Nodes(_) => Err(anyhow!("directory answered with a record list")),
        }
    }

    async fn call(&self, request: &Request) -> Result<Response> {
        let stream = timeout(self.connect_timeout, TcpStream::connect(self.registry))
            .await
            .context("directory connect timed out")?
            .context("directory unreachable")?;

        timeout(self.request_timeout, exchange(stream, request))
            .await
            .context("directory request timed out")?
    }
}

async fn exchange(stream: TcpStream, request: &Request) -> Result<Response> {
    let (reader, mut writer) = stream.into_split();

    let mut payload = serde_json::to_string(request)?;
    payload.push('\n');
    writer.write_all(payload.as_bytes()).await?;

    let line = BufReader::new(reader)
        .lines()
        .next_line()
        .await?
        .ok_or_else(|| anyhow!("directory closed the connection"))?;

    serde_json::from_str(&line).context("undecodable directory response")
}
