use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use anyhow::{Context, Result, anyhow};
use bytes::BytesMut;
use parking_lot::Mutex;
use tokio::{io::AsyncReadExt, net::UdpSocket, time::sleep};

use codec::{Endpoint, MAX_PAYLOAD, PACKET_SIZE, Packet, PacketKind};
use service::{Assembler, Node, Router, round2};

use crate::{
    config::Config,
    directory::DirectoryClient,
    statistics::{Statistics, Stats},
};

/// The peer runtime: one bound UDP socket, the routing state derived from
/// the directory, and the long-lived loops keeping both fresh.
///
/// The receiver owns the reassembly buffer outright; the routing state is
/// shared through the copy-on-write [`Router`] handle, written by the
/// poller and read by the forwarding path and the command driver.
pub struct Peer {
    config: Arc<Config>,
    socket: Arc<UdpSocket>,
    router: Router,
    directory: DirectoryClient,
    statistics: Statistics,
    position: Mutex<(f64, f64)>,
    public_key: String,
    running: AtomicBool,
}

impl Peer {
    pub fn new(config: Arc<Config>, socket: UdpSocket, public_key: String) -> Arc<Self> {
        Arc::new(Self {
            directory: DirectoryClient::new(&config),
            socket: Arc::new(socket),
            router: Router::default(),
            statistics: Statistics::default(),
            position: Mutex::new((config.x, config.y)),
            running: AtomicBool::new(true),
            public_key,
            config,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    /// The identity this peer stamps into frame headers, and the test every
    /// inbound frame is matched against for local delivery.
    pub fn local_endpoint(&self) -> Endpoint {
        Endpoint::new(self.config.ip, self.config.port)
    }

    /// This peer's directory record at its current position.
    pub fn local_node(&self) -> Node {
        let position = self.position.lock();

        Node {
            class: self.config.class,
            name: self.config.name.clone(),
            ip: self.config.ip,
            port: self.config.port,
            x: position.0,
            y: position.1,
            public_key: self.public_key.clone(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Asks every loop to exit at its next suspension point.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    pub async fn register(&self) -> Result<()> {
        self.directory.register(self.local_node()).await
    }

    pub async fn deregister(&self) -> Result<()> {
        self.directory.deregister(&self.config.name).await
    }

    /// One membership pull: fetch the record set and atomically swap in a
    /// routing table built from it.
    pub async fn refresh_membership(&self) -> Result<usize> {
        let nodes = self.directory.list().await?;
        let count = nodes.len();

        self.router.update(nodes, &self.config.name);
        Ok(count)
    }

    /// Rebuilds routes from the current snapshot without touching the
    /// directory. Run before every origination so a send never uses hops
    /// older than the latest membership.
    fn recompute_routes(&self) {
        let nodes = self.router.table().nodes().to_vec();
        self.router.update(nodes, &self.config.name);
    }

    /// Drains the UDP socket until shutdown. All inbound errors are local:
    /// an undecodable or tampered frame is counted and dropped, and the
    /// loop keeps reading.
    pub async fn receive_loop(self: Arc<Self>, mut assembler: Assembler) {
        // One extra byte so an oversized datagram reads as a wrong-length
        // frame instead of silently truncating to PACKET_SIZE.
        let mut buf = vec![0u8; PACKET_SIZE + 1];

        while self.is_running() {
            let (size, addr) = match self.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    log::warn!("socket receive error: {:?}", e);
                    continue;
                }
            };

            log::trace!("datagram received: size={}, from={}", size, addr);

            let packet = match Packet::decode(&buf[..size]) {
                Ok(packet) => packet,
                Err(e) => {
                    self.statistics.add(Stats::DroppedPkts(1));
                    log::trace!("dropped undecodable datagram: from={}, reason={}", addr, e);
                    continue;
                }
            };

            if !packet.verify() {
                self.statistics.add(Stats::DroppedPkts(1));
                log::trace!("dropped tampered datagram: from={}", addr);
                continue;
            }

            if packet.target == self.local_endpoint() {
                self.deliver(&packet, &mut assembler);
            } else {
                self.forward(&packet).await;
            }

            assembler.purge(self.config.assembly_ttl());
        }
    }

    /// Surfaces a frame addressed to this peer.
    fn deliver(&self, packet: &Packet, assembler: &mut Assembler) {
        self.statistics.add(Stats::ReceivedPkts(1));

        match packet.kind {
            PacketKind::Text => {
                let text = String::from_utf8_lossy(trim_padding(packet.payload())).into_owned();

                log::info!("message received: from={}", packet.source);
                println!("\n[message] {}: {}", packet.source, text);
            }
            PacketKind::File => {
                log::info!(
                    "file fragment received: from={}, fragment={}/{}",
                    packet.source,
                    packet.fragment_number,
                    packet.fragment_count
                );

                match assembler.accept(packet) {
                    Ok(Some(path)) => {
                        log::info!("file complete: from={}, path={:?}", packet.source, path);
                        println!("\n[file] {} complete: {}", packet.source, path.display());
                    }
                    Ok(None) => {}
                    Err(e) => {
                        log::error!("reassembly failed: from={}, error={:?}", packet.source, e);
                    }
                }
            }
        }
    }

    /// Relays a transit frame towards its destination, unchanged. A frame
    /// whose destination is unknown or unreachable is dropped here; there
    /// is no negative feedback to the origin on the datagram plane.
    async fn forward(&self, packet: &Packet) {
        let table = self.router.table();

        let hop = match table.next_hop_to(&packet.target) {
            Ok(hop) => hop,
            Err(e) => {
                self.statistics.add(Stats::DroppedPkts(1));
                log::warn!("transit frame dropped: target={}, reason={}", packet.target, e);
                return;
            }
        };

        log::debug!(
            "forwarding: source={}, target={}, via={}",
            packet.source,
            packet.target,
            hop.name
        );

        match self.transmit(packet, hop.socket_addr()).await {
            Ok(()) => self.statistics.add(Stats::ForwardedPkts(1)),
            Err(e) => log::warn!("forwarding failed: target={}, error={:#}", packet.target, e),
        }
    }

    /// Encodes and emits one frame. Anything short of a full datagram on
    /// the wire is an error; UDP never delivers partial frames, so a short
    /// write here means the local stack refused the size.
    async fn transmit(&self, packet: &Packet, to: SocketAddr) -> Result<()> {
        let mut bytes = BytesMut::with_capacity(PACKET_SIZE);
        packet.encode(&mut bytes);

        let sent = self.socket.send_to(&bytes, to).await?;
        if sent != PACKET_SIZE {
            return Err(anyhow!("partial datagram write: {sent} of {PACKET_SIZE} bytes"));
        }

        self.statistics.add(Stats::SentPkts(1));
        Ok(())
    }

    /// Originates one TEXT frame towards `target`.
    pub async fn send_message(&self, target: &str, text: &str) -> Result<()> {
        if text.len() > MAX_PAYLOAD {
            return Err(anyhow!(
                "message is {} bytes, the payload region holds {MAX_PAYLOAD}",
                text.len()
            ));
        }

        self.recompute_routes();
        let table = self.router.table();

        let target_endpoint = table
            .get(target)
            .map(|node| node.endpoint())
            .ok_or_else(|| anyhow!("unknown target: {target}"))?;
        let hop = table
            .next_hop(target)
            .map_err(|e| anyhow!("no route to {target}: {e}"))?;

        let mut packet = Packet::new(
            self.local_endpoint(),
            target_endpoint,
            PacketKind::Text,
            text.as_bytes(),
        )?;
        packet.seal();

        self.transmit(&packet, hop.socket_addr()).await?;
        log::info!("message sent: target={}, via={}", target, hop.name);

        Ok(())
    }

    /// Originates one file transfer towards `target`: fixed-width FILE
    /// fragments in fragment-number order, paced so the local socket
    /// buffer is never overrun. The next hop is re-resolved per fragment,
    /// so a topology change mid-transfer redirects the tail.
    pub async fn send_file(&self, target: &str, path: &str) -> Result<()> {
        self.recompute_routes();

        let target_endpoint = self
            .router
            .table()
            .get(target)
            .map(|node| node.endpoint())
            .ok_or_else(|| anyhow!("unknown target: {target}"))?;

        let mut file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("cannot open {path}"))?;
        let size = file.metadata().await?.len();

        let count = size.div_ceil(MAX_PAYLOAD as u64);
        if count > u16::MAX as u64 {
            return Err(anyhow!(
                "{path} needs {count} fragments, the frame header caps at {}",
                u16::MAX
            ));
        }

        if count == 0 {
            log::info!("file is empty, nothing to transfer: path={}", path);
            return Ok(());
        }

        log::info!(
            "file transfer started: target={}, size={}, fragments={}",
            target,
            size,
            count
        );

        let mut chunk = vec![0u8; MAX_PAYLOAD];
        for number in 1..=count as u16 {
            let used = read_up_to(&mut file, &mut chunk).await?;

            let table = self.router.table();
            let hop = table
                .next_hop(target)
                .map_err(|e| anyhow!("no route to {target}: {e}"))?;

            let mut packet = Packet::new(
                self.local_endpoint(),
                target_endpoint,
                PacketKind::File,
                &chunk[..used],
            )?;
            packet.fragment_number = number;
            packet.fragment_count = count as u16;
            packet.seal();

            self.transmit(&packet, hop.socket_addr()).await?;
            log::debug!("fragment sent: {}/{}, via={}", number, count, hop.name);

            sleep(self.config.fragment_interval()).await;
        }

        log::info!("file transfer finished: target={}, fragments={}", target, count);
        Ok(())
    }

    /// Periodic membership pull. A directory outage is survivable: the
    /// peer keeps forwarding on its last snapshot until the next pull
    /// succeeds.
    pub async fn poll_loop(self: Arc<Self>) {
        while self.is_running() {
            match self.refresh_membership().await {
                Ok(count) => {
                    log::debug!("membership refreshed: records={}", count);

                    // A directory restart loses every record; put ours back
                    // the moment the snapshot stops containing it.
                    if self.router.table().get(&self.config.name).is_none() {
                        log::info!("record missing, re-registering: name={}", self.config.name);

                        if let Err(e) = self.register().await {
                            log::warn!("re-registration failed: {:#}", e);
                        }
                    }
                }
                Err(e) => log::warn!("membership pull failed, snapshot kept: {:#}", e),
            }

            sleep(self.config.poll_interval()).await;
        }
    }

    /// Periodic mobility tick, satellites only: advance the position along
    /// the drift vector and push the new coordinates to the directory.
    pub async fn mobility_loop(self: Arc<Self>) {
        let drift = self.config.settings.drift;

        while self.is_running() {
            sleep(self.config.move_interval()).await;
            if !self.is_running() {
                break;
            }

            let node = {
                let mut position = self.position.lock();
                position.0 = round2(position.0 + drift.x);
                position.1 = round2(position.1 + drift.y);
                drop(position);

                self.local_node()
            };

            log::info!(
                "position advanced: name={}, position=[{}, {}]",
                node.name,
                node.x,
                node.y
            );

            if let Err(e) = self.directory.update(node).await {
                log::warn!("position update failed: {:#}", e);
            }
        }
    }
}

/// The useful prefix of a padded payload region.
fn trim_padding(payload: &[u8]) -> &[u8] {
    let end = payload
        .iter()
        .rposition(|byte| *byte != 0)
        .map_or(0, |index| index + 1);

    &payload[..end]
}

/// Reads until `buf` is full or the file ends; plain `read` may return
/// short chunks well before either.
async fn read_up_to(file: &mut tokio::fs::File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut used = 0;

    while used < buf.len() {
        let n = file.read(&mut buf[used..]).await?;
        if n == 0 {
            break;
        }

        used += n;
    }

    Ok(used)
}
