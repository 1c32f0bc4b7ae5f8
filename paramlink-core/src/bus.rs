//! Message bus abstraction and the parameter message surface.
//!
//! The dispatch layer underneath is an external collaborator: it
//! delivers one message at a time, in FIFO order, to whoever the
//! destination address names. Only its send contract is modeled here;
//! tests drive the protocol with a simple queue.

use heapless::Vec;
use paramlink_proto::ParamOp;

/// Maximum textual payload carried by one parameter message chunk.
pub const CHUNK_LEN: usize = 200;

/// Owned payload of one parameter message.
pub type Payload = Vec<u8, CHUNK_LEN>;

/// Address of one node on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NodeAddr(pub u8);

/// Destination address reaching every node.
pub const BROADCAST: NodeAddr = NodeAddr(0xFF);

/// A parameter message: operation, chunk sequencing, and payload.
///
/// Used both on the external surface ([`Message::Param`]) and for the
/// coordinator's internal traffic with its handlers
/// ([`Message::ParamFc`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamMsg {
    pub from: NodeAddr,
    pub to: NodeAddr,
    pub op: ParamOp,
    /// Chunk ordinal within a multi-chunk transfer.
    pub sequence: u8,
    /// Marks the final chunk of a transfer.
    pub last_in_sequence: bool,
    pub payload: Payload,
}

impl ParamMsg {
    /// A payload-less message used for requests and flow signals.
    #[must_use]
    pub fn signal(from: NodeAddr, to: NodeAddr, op: ParamOp) -> Self {
        Self {
            from,
            to,
            op,
            sequence: 0,
            last_in_sequence: false,
            payload: Payload::new(),
        }
    }
}

/// Every message the parameter subsystem sends or receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Coordinator startup broadcast asking who owns parameters.
    DiscoveryRequest { from: NodeAddr, to: NodeAddr },
    /// A handler announcing itself to the coordinator.
    DiscoveryReply { from: NodeAddr, to: NodeAddr },
    /// External surface: requests addressed to the coordinator and
    /// chunks forwarded to an originator.
    Param(ParamMsg),
    /// Internal coordinator <-> handler traffic.
    ParamFc(ParamMsg),
}

impl Message {
    #[must_use]
    pub fn source(&self) -> NodeAddr {
        match self {
            Self::DiscoveryRequest { from, .. } | Self::DiscoveryReply { from, .. } => *from,
            Self::Param(p) | Self::ParamFc(p) => p.from,
        }
    }

    #[must_use]
    pub fn destination(&self) -> NodeAddr {
        match self {
            Self::DiscoveryRequest { to, .. } | Self::DiscoveryReply { to, .. } => *to,
            Self::Param(p) | Self::ParamFc(p) => p.to,
        }
    }
}

/// Outgoing half of the dispatch collaborator.
///
/// Sending never blocks; delivery happens when the dispatcher hands
/// queued messages to their destinations, one at a time.
pub trait MessageBus {
    fn send(&mut self, msg: Message);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_addressing() {
        let msg = Message::DiscoveryRequest {
            from: NodeAddr(1),
            to: BROADCAST,
        };
        assert_eq!(msg.source(), NodeAddr(1));
        assert_eq!(msg.destination(), BROADCAST);

        let msg = Message::Param(ParamMsg::signal(NodeAddr(2), NodeAddr(3), ParamOp::Get));
        assert_eq!(msg.source(), NodeAddr(2));
        assert_eq!(msg.destination(), NodeAddr(3));
    }

    #[test]
    fn test_signal_is_empty() {
        let msg = ParamMsg::signal(NodeAddr(1), NodeAddr(2), ParamOp::Save);
        assert!(msg.payload.is_empty());
        assert!(!msg.last_in_sequence);
        assert_eq!(msg.sequence, 0);
    }
}
