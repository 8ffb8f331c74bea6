// Each integration test binary compiles this module and uses its own
// subset of the helpers.
#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Result;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::TcpListener,
    time::sleep,
};

use service::{Registry, Request, Response};

/// A minimal in-process directory speaking the line protocol, backed by
/// the same `Registry` collection the real server binary uses.
pub async fn spawn_directory() -> Result<(SocketAddr, Arc<Registry>)> {
    let registry = Arc::new(Registry::default());
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let state = registry.clone();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };

            let registry = state.clone();
            tokio::spawn(async move {
                let (reader, mut writer) = stream.into_split();
                let mut lines = BufReader::new(reader).lines();

                while let Ok(Some(line)) = lines.next_line().await {
                    let response = match serde_json::from_str::<Request>(&line) {
                        Ok(Request::Register { node }) => {
                            registry.register(node);
                            Response::Message {
                                message: "registered".to_string(),
                            }
                        }
                        Ok(Request::Update { node }) => {
                            registry.update(node);
                            Response::Message {
                                message: "updated".to_string(),
                            }
                        }
                        Ok(Request::Deregister { name }) => {
                            registry.deregister(&name);
                            Response::Message {
                                message: "deregistered".to_string(),
                            }
                        }
                        Ok(Request::List) => Response::Nodes(registry.list()),
                        Err(_) => Response::Error {
                            error: "invalid request".to_string(),
                        },
                    };

                    let mut payload = serde_json::to_string(&response).unwrap();
                    payload.push('\n');
                    if writer.write_all(payload.as_bytes()).await.is_err() {
                        break;
                    }
                }
            });
        }
    });

    Ok((addr, registry))
}

pub async fn wait_for(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let started = tokio::time::Instant::now();

    while started.elapsed() < deadline {
        if condition() {
            return true;
        }

        sleep(Duration::from_millis(20)).await;
    }

    condition()
}
