use std::{
    fs::{self, File},
    io::{self, Write},
    path::PathBuf,
    time::{Duration, Instant},
};

use ahash::{HashMap, HashMapExt, HashSet, HashSetExt};
use codec::{Endpoint, MAX_PAYLOAD, Packet};

/// One partially received file transfer, keyed by its origin identity.
struct Transfer {
    fragments: HashSet<u16>,
    expected: u16,
    last_seen: Instant,
}

/// Reassembles fragmented file transfers.
///
/// Each inbound FILE frame is parked as a scratch artefact named
/// `<originAddr>_<originPort>_<fragmentNumber>` under the scratch
/// directory. Once every fragment of a transfer is present the artefacts
/// are concatenated in fragment order into `final_<originAddr>_<originPort>`
/// and removed. Frames for one origin may arrive in any order; nothing is
/// produced while a fragment is missing.
///
/// Origins that go quiet mid-transfer are reaped by [`Assembler::purge`] so
/// the scratch directory cannot grow without bound.
pub struct Assembler {
    dir: PathBuf,
    pending: HashMap<Endpoint, Transfer>,
}

impl Assembler {
    pub fn new(dir: PathBuf) -> io::Result<Self> {
        fs::create_dir_all(&dir)?;

        Ok(Self {
            dir,
            pending: HashMap::new(),
        })
    }

    fn fragment_path(&self, origin: &Endpoint, number: u16) -> PathBuf {
        self.dir.join(format!(
            "{}_{}_{}",
            u32::from(origin.address),
            origin.port,
            number
        ))
    }

    fn final_path(&self, origin: &Endpoint) -> PathBuf {
        self.dir
            .join(format!("final_{}_{}", u32::from(origin.address), origin.port))
    }

    /// Parks one FILE fragment; returns the final artefact path when this
    /// fragment completed the transfer.
    pub fn accept(&mut self, packet: &Packet) -> io::Result<Option<PathBuf>> {
        let origin = packet.source;

        fs::write(
            self.fragment_path(&origin, packet.fragment_number),
            packet.payload(),
        )?;

        let complete = {
            let transfer = self.pending.entry(origin).or_insert_with(|| Transfer {
                fragments: HashSet::new(),
                expected: packet.fragment_count,
                last_seen: Instant::now(),
            });

            transfer.expected = packet.fragment_count;
            transfer.last_seen = Instant::now();
            transfer.fragments.insert(packet.fragment_number);

            (1..=transfer.expected).all(|number| transfer.fragments.contains(&number))
        };

        if !complete {
            return Ok(None);
        }

        let path = self.finalize(&origin, packet.fragment_count)?;
        self.pending.remove(&origin);

        Ok(Some(path))
    }

    fn finalize(&self, origin: &Endpoint, count: u16) -> io::Result<PathBuf> {
        let final_path = self.final_path(origin);
        let mut output = File::create(&final_path)?;

        for number in 1..=count {
            let mut bytes = fs::read(self.fragment_path(origin, number))?;

            // The wire format carries no payload length; whatever trails
            // the useful content of the last fragment is NUL padding.
            if number == count {
                while bytes.last() == Some(&0) {
                    bytes.pop();
                }
            }

            output.write_all(&bytes)?;
        }

        output.flush()?;

        for number in 1..=count {
            let _ = fs::remove_file(self.fragment_path(origin, number));
        }

        Ok(final_path)
    }

    /// Drops transfers that have been idle longer than `max_idle`, scratch
    /// artefacts included.
    pub fn purge(&mut self, max_idle: Duration) {
        let stale: Vec<Endpoint> = self
            .pending
            .iter()
            .filter(|(_, transfer)| transfer.last_seen.elapsed() > max_idle)
            .map(|(origin, _)| *origin)
            .collect();

        for origin in stale {
            if let Some(transfer) = self.pending.remove(&origin) {
                for number in transfer.fragments {
                    let _ = fs::remove_file(self.fragment_path(&origin, number));
                }
            }
        }
    }

    /// Number of transfers still waiting for fragments.
    pub fn pending_transfers(&self) -> usize {
        self.pending.len()
    }

    /// How many fragments a complete message of `size` bytes needs.
    pub fn fragment_count(size: u64) -> u64 {
        size.div_ceil(MAX_PAYLOAD as u64)
    }
}
