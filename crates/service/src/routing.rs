use std::sync::Arc;

use codec::Endpoint;
use parking_lot::RwLock;

use crate::node::{Node, NodeClass};

/// Flat surcharge on any link touching a ground station. Satellites form
/// the backbone; this keeps multi-hop detours through ground peers out of
/// the shortest paths.
pub const GROUND_ACCESS_PENALTY: f64 = 1000.0;

/// Cost beyond which a link is considered degraded and grows quadratically.
pub const LONG_LINK_THRESHOLD: f64 = 500.0;

#[derive(Debug, PartialEq, Eq)]
pub enum RouteError {
    UnknownTarget,
    NoRoute,
}

impl std::error::Error for RouteError {}

impl std::fmt::Display for RouteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Link cost between two fleet members.
///
/// Euclidean distance, with the class rules layered on top: direct
/// ground-to-ground links are forbidden outright, touching a ground
/// station costs [`GROUND_ACCESS_PENALTY`] extra, and anything past
/// [`LONG_LINK_THRESHOLD`] is penalized quadratically.
fn link_cost(a: &Node, b: &Node) -> f64 {
    if a.class == NodeClass::Ground && b.class == NodeClass::Ground {
        return f64::INFINITY;
    }

    let mut cost = ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt();
    if a.class == NodeClass::Ground || b.class == NodeClass::Ground {
        cost += GROUND_ACCESS_PENALTY;
    }

    if cost > LONG_LINK_THRESHOLD {
        cost = LONG_LINK_THRESHOLD + (cost - LONG_LINK_THRESHOLD).powi(2);
    }

    cost
}

/// Single-source shortest paths over the weight matrix, recording for every
/// reachable destination the neighbour of `src` on the best path.
///
/// Forwarding needs the first hop, not the predecessor: when an edge is
/// relaxed directly from the source the hop is the neighbour itself, and
/// every relaxation through `u` inherits the hop that reached `u`. Strict
/// comparisons keep the lower index on equal cost.
fn dijkstra(weights: &[Vec<f64>], src: usize) -> Vec<Option<usize>> {
    let n = weights.len();
    let mut dist = vec![f64::INFINITY; n];
    let mut visited = vec![false; n];
    let mut first_hop = vec![None; n];

    dist[src] = 0.0;

    for _ in 0..n {
        let mut current = None;
        let mut best = f64::INFINITY;
        for (index, d) in dist.iter().enumerate() {
            if !visited[index] && *d < best {
                best = *d;
                current = Some(index);
            }
        }

        let Some(u) = current else {
            break;
        };

        visited[u] = true;

        for v in 0..n {
            if visited[v] || !weights[u][v].is_finite() {
                continue;
            }

            let candidate = dist[u] + weights[u][v];
            if candidate < dist[v] {
                dist[v] = candidate;
                first_hop[v] = if u == src { Some(v) } else { first_hop[u] };
            }
        }
    }

    first_hop
}

/// One atomically built routing state: the membership snapshot it was
/// derived from, the symmetric weight matrix over snapshot indices, and the
/// first-hop choice per destination.
pub struct RoutingTable {
    nodes: Vec<Node>,
    weights: Vec<Vec<f64>>,
    first_hop: Vec<Option<usize>>,
    local: Option<usize>,
}

impl RoutingTable {
    /// Builds the complete table from one membership snapshot, rooted at
    /// the peer named `local_name`. A snapshot that does not contain the
    /// local peer yields a table with no routes at all.
    pub fn compute(nodes: Vec<Node>, local_name: &str) -> Self {
        let n = nodes.len();

        let mut weights = vec![vec![f64::INFINITY; n]; n];
        for i in 0..n {
            for j in (i + 1)..n {
                let cost = link_cost(&nodes[i], &nodes[j]);
                weights[i][j] = cost;
                weights[j][i] = cost;
            }
        }

        let local = nodes.iter().position(|node| node.name == local_name);
        let first_hop = match local {
            Some(src) => dijkstra(&weights, src),
            None => vec![None; n],
        };

        Self {
            nodes,
            weights,
            first_hop,
            local,
        }
    }

    /// The snapshot this table was built from, in snapshot-index order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn get(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.name == name)
    }

    /// Reverse lookup: the member owning a datagram-plane identity.
    pub fn find_by_endpoint(&self, endpoint: &Endpoint) -> Option<&Node> {
        self.nodes.iter().find(|node| node.endpoint() == *endpoint)
    }

    pub fn local_index(&self) -> Option<usize> {
        self.local
    }

    pub fn weight(&self, i: usize, j: usize) -> f64 {
        self.weights[i][j]
    }

    /// The neighbour to hand a message for `target` to.
    ///
    /// `UnknownTarget` if the name is not in the snapshot, `NoRoute` if the
    /// target exists but no admissible path reaches it (that includes the
    /// local peer itself).
    pub fn next_hop(&self, target: &str) -> Result<&Node, RouteError> {
        let index = self
            .nodes
            .iter()
            .position(|node| node.name == target)
            .ok_or(RouteError::UnknownTarget)?;

        self.first_hop[index]
            .map(|hop| &self.nodes[hop])
            .ok_or(RouteError::NoRoute)
    }

    /// Next hop for a transit frame, keyed by the destination identity the
    /// frame carries.
    pub fn next_hop_to(&self, endpoint: &Endpoint) -> Result<&Node, RouteError> {
        let target = self
            .find_by_endpoint(endpoint)
            .ok_or(RouteError::UnknownTarget)?;

        self.next_hop(&target.name)
    }
}

/// Copy-on-write handle over the routing state.
///
/// The poller builds a fresh [`RoutingTable`] and swaps it in whole, so the
/// forwarding hot path takes a read lock only long enough to clone an
/// `Arc` and can never observe a half-updated snapshot/weights/hops triple.
#[derive(Clone)]
pub struct Router(Arc<RwLock<Arc<RoutingTable>>>);

impl Default for Router {
    fn default() -> Self {
        Self(Arc::new(RwLock::new(Arc::new(RoutingTable::compute(
            Vec::new(),
            "",
        )))))
    }
}

impl Router {
    /// Replaces the routing state with one built from a fresh snapshot.
    pub fn update(&self, nodes: Vec<Node>, local_name: &str) {
        let table = Arc::new(RoutingTable::compute(nodes, local_name));
        *self.0.write() = table;
    }

    /// The current table; holders keep a coherent view for as long as they
    /// keep the `Arc`, regardless of concurrent updates.
    pub fn table(&self) -> Arc<RoutingTable> {
        self.0.read().clone()
    }
}
