use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use codec::Endpoint;
use serde::{Deserialize, Serialize};

/// Fleet membership class.
///
/// Ground stations are stationary edge endpoints; satellites move on a
/// fixed per-tick vector and form the relay backbone. The class drives the
/// routing weight model and nothing else, so it is a plain tagged variant
/// rather than a trait object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeClass {
    #[serde(rename = "Ground", alias = "ground")]
    Ground,
    #[serde(rename = "Satellite", alias = "satellite")]
    Satellite,
}

impl std::fmt::Display for NodeClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ground => write!(f, "Ground"),
            Self::Satellite => write!(f, "Satellite"),
        }
    }
}

/// One fleet member, as stored by the directory and mirrored by every peer.
///
/// The logical name is the identity: re-registering a name replaces the
/// rest of the record. `(ip, port)` is routing metadata and may change.
/// Field names follow the directory wire contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(rename = "type")]
    pub class: NodeClass,
    pub name: String,
    pub ip: Ipv4Addr,
    pub port: u16,
    pub x: f64,
    pub y: f64,
    #[serde(rename = "publicKey", default)]
    pub public_key: String,
}

impl Node {
    /// The identity this node has on the datagram plane.
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.ip, self.port)
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.ip, self.port))
    }

    pub fn is_satellite(&self) -> bool {
        self.class == NodeClass::Satellite
    }

    /// One mobility tick: shift the position and requantize.
    ///
    /// # Test
    ///
    /// ```
    /// use skymesh_service::{Node, NodeClass};
    ///
    /// let mut node = Node {
    ///     class: NodeClass::Satellite,
    ///     name: "sat-1".to_string(),
    ///     ip: "127.0.0.1".parse().unwrap(),
    ///     port: 4000,
    ///     x: 1.0,
    ///     y: 2.0,
    ///     public_key: String::new(),
    /// };
    ///
    /// node.advance(0.05, 0.075);
    /// assert_eq!((node.x, node.y), (1.05, 2.08));
    /// ```
    pub fn advance(&mut self, dx: f64, dy: f64) {
        self.x = round2(self.x + dx);
        self.y = round2(self.y + dy);
    }
}

/// Quantizes a coordinate to two decimals, the precision the directory
/// stores and the weight model consumes.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
