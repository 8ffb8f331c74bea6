use std::{
    io::Write,
    sync::Arc,
};

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin, stdin};

use crate::server::Peer;

const COMMANDS: &str = "\
Available commands:
  message  - send a text message to a named peer
  file     - send a local file to a named peer
  list     - print the cached fleet membership
  stats    - print traffic counters
  help     - print this list
  q        - deregister and quit";

/// Interactive command driver.
///
/// Reads commands from standard input until `q` or end-of-file. Every
/// outcome is a single line: either a confirmation or the reason the
/// operation was refused.
pub async fn run(peer: Arc<Peer>) -> Result<()> {
    let mut lines = BufReader::new(stdin()).lines();

    println!("{COMMANDS}");

    loop {
        let Some(line) = ask(&mut lines, &format!("{}> ", peer.name())).await? else {
            break;
        };

        match line.as_str() {
            "" => continue,
            "message" => {
                let Some(target) = ask(&mut lines, "target name: ").await? else {
                    break;
                };
                let Some(text) = ask(&mut lines, "message: ").await? else {
                    break;
                };

                if text.is_empty() {
                    println!("refusing to send an empty message");
                    continue;
                }

                match peer.send_message(&target, &text).await {
                    Ok(()) => println!("message handed to the mesh"),
                    Err(e) => println!("send failed: {e:#}"),
                }
            }
            "file" => {
                let Some(target) = ask(&mut lines, "target name: ").await? else {
                    break;
                };
                let Some(path) = ask(&mut lines, "file path: ").await? else {
                    break;
                };

                match peer.send_file(&target, &path).await {
                    Ok(()) => println!("file handed to the mesh"),
                    Err(e) => println!("transfer failed: {e:#}"),
                }
            }
            "list" => {
                let table = peer.router().table();

                if table.nodes().is_empty() {
                    println!("the cached snapshot is empty");
                    continue;
                }

                for node in table.nodes() {
                    println!(
                        "{} {} ({}:{}) [{}, {}]",
                        node.class, node.name, node.ip, node.port, node.x, node.y
                    );
                }
            }
            "stats" => {
                let counts = peer.statistics().snapshot();

                println!(
                    "received={} sent={} forwarded={} dropped={}",
                    counts.received_pkts,
                    counts.sent_pkts,
                    counts.forwarded_pkts,
                    counts.dropped_pkts
                );
            }
            "help" => println!("{COMMANDS}"),
            "q" => break,
            other => {
                println!("unknown command: {other}");
                println!("{COMMANDS}");
            }
        }
    }

    Ok(())
}

/// Prints a prompt and reads one trimmed line; `None` means stdin closed.
async fn ask(lines: &mut Lines<BufReader<Stdin>>, label: &str) -> Result<Option<String>> {
    print!("{label}");
    std::io::stdout().flush()?;

    Ok(lines
        .next_line()
        .await?
        .map(|line| line.trim().to_string()))
}
