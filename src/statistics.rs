use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

/// The type of information passed to the traffic counters.
#[derive(Debug, Clone, Copy)]
pub enum Stats {
    ReceivedPkts(usize),
    SentPkts(usize),
    ForwardedPkts(usize),
    DroppedPkts(usize),
}

pub trait Number {
    fn add(&self, value: usize);
    fn get(&self) -> usize;
}

#[derive(Default)]
pub struct Count(AtomicUsize);

impl Number for Count {
    fn add(&self, value: usize) {
        self.0.fetch_add(value, Ordering::Relaxed);
    }

    fn get(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }
}

/// Peer traffic counters.
///
/// Received counts only frames delivered to this peer; transit frames show
/// up under forwarded. Every datagram the engine refuses (bad size, bad
/// version, bad checksum, no route) lands in dropped.
#[derive(Default)]
pub struct Counts<T> {
    pub received_pkts: T,
    pub sent_pkts: T,
    pub forwarded_pkts: T,
    pub dropped_pkts: T,
}

impl<T: Number> Counts<T> {
    /// # Example
    ///
    /// ```
    /// use skymesh::statistics::*;
    ///
    /// let counts = Counts::<Count>::default();
    ///
    /// counts.add(&Stats::ReceivedPkts(1));
    /// assert_eq!(counts.received_pkts.get(), 1);
    ///
    /// counts.add(&Stats::DroppedPkts(2));
    /// assert_eq!(counts.dropped_pkts.get(), 2);
    /// ```
    pub fn add(&self, payload: &Stats) {
        match payload {
            Stats::ReceivedPkts(v) => self.received_pkts.add(*v),
            Stats::SentPkts(v) => self.sent_pkts.add(*v),
            Stats::ForwardedPkts(v) => self.forwarded_pkts.add(*v),
            Stats::DroppedPkts(v) => self.dropped_pkts.add(*v),
        }
    }
}

/// Shared handle over one peer's counters.
///
/// # Example
///
/// ```
/// use skymesh::statistics::*;
///
/// let statistics = Statistics::default();
///
/// statistics.add(Stats::SentPkts(1));
/// statistics.add(Stats::SentPkts(1));
///
/// assert_eq!(statistics.snapshot().sent_pkts, 2);
/// ```
#[derive(Clone, Default)]
pub struct Statistics(Arc<Counts<Count>>);

impl Statistics {
    pub fn add(&self, payload: Stats) {
        self.0.add(&payload);
    }

    /// A point-in-time copy of all counters.
    pub fn snapshot(&self) -> Counts<usize> {
        Counts {
            received_pkts: self.0.received_pkts.get(),
            sent_pkts: self.0.sent_pkts.get(),
            forwarded_pkts: self.0.forwarded_pkts.get(),
            dropped_pkts: self.0.dropped_pkts.get(),
        }
    }
}
