//! Static node → output policy table.

use serde::{Deserialize, Serialize};
use waypoint_core::NodeId;

/// How a node's text reaches the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StreamMode {
    /// Every increment becomes a `message{is_stream:true}` as it is produced.
    Stream,
    /// Output is held until the node completes, then released as one
    /// terminal message and/or one control.
    Buffer,
}

pub struct StreamPolicy;

impl StreamPolicy {
    pub fn mode(node: NodeId) -> StreamMode {
        match node {
            NodeId::SideChat | NodeId::CheckWeather | NodeId::Guide | NodeId::Summary => {
                StreamMode::Stream
            }
            NodeId::IntentRouter
            | NodeId::Collect
            | NodeId::Plan
            | NodeId::SearchFlight
            | NodeId::SelectFlight
            | NodeId::PayFlight
            | NodeId::SearchHotel
            | NodeId::SelectHotel
            | NodeId::PayHotel
            | NodeId::Sentinel
            | NodeId::Block => StreamMode::Buffer,
        }
    }

    /// The full table, in catalog order.
    pub fn table() -> Vec<(NodeId, StreamMode)> {
        NodeId::ALL.iter().map(|&n| (n, Self::mode(n))).collect()
    }
}
