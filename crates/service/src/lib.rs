//! ## Fleet service plane
//!
//! Everything a peer keeps between datagrams lives here: the membership
//! records it mirrors from the directory, the shortest-path routing state
//! rebuilt on every poll, the reassembly buffer for in-flight file
//! transfers, and the directory action semantics shared by the registry
//! server and the peer-side client.
//!
//! The crate is transport-free on purpose: sockets, timers and logging stay
//! in the binaries, which keeps all of the stateful logic synchronous and
//! directly testable.

pub mod assembly;
pub mod directory;
pub mod node;
pub mod routing;

pub use self::{
    assembly::Assembler,
    directory::{Registry, Request, Response},
    node::{Node, NodeClass, round2},
    routing::{RouteError, Router, RoutingTable},
};
