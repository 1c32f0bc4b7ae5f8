//! Per-node parameter handler.
//!
//! A handler owns exactly one [`ParamTree`] and answers the
//! coordinator's internal traffic: discovery challenges, chunked
//! Get/Save dump requests, and Set fan-out. It keeps one dump cursor
//! per transfer kind, so a Get and a Save can be paused through it
//! independently, plus a one-node apply cursor that lets Set payloads
//! continuing a previous chunk resume mid-walk.

use log::{debug, warn};

use paramlink_proto::ParamOp;
use paramlink_tree::{DumpCursor, DumpStatus, NodeId, ParamTree};

use crate::bus::{Message, MessageBus, NodeAddr, ParamMsg, Payload, BROADCAST, CHUNK_LEN};

/// Which paused traversal a dump step advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DumpKind {
    Get,
    Save,
}

/// One chunk produced by [`ParamHandler::dump_step`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpChunk {
    pub payload: Payload,
    /// Handler-local chunk ordinal (the coordinator relabels chunks
    /// with its own global sequence when forwarding).
    pub sequence: u8,
    /// Whether this chunk completed the handler's subtree.
    pub last: bool,
}

/// A node owning one parameter tree, addressable by the coordinator.
pub struct ParamHandler<'a> {
    addr: NodeAddr,
    tree: ParamTree<'a>,
    get_cursor: DumpCursor,
    save_cursor: DumpCursor,
    /// Where the previous Set chunk's walk stopped, if mid-subtree.
    apply_resume: Option<NodeId>,
}

impl<'a> ParamHandler<'a> {
    #[must_use]
    pub fn new(addr: NodeAddr, tree: ParamTree<'a>) -> Self {
        Self {
            addr,
            tree,
            get_cursor: DumpCursor::new(),
            save_cursor: DumpCursor::new(),
            apply_resume: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn addr(&self) -> NodeAddr {
        self.addr
    }

    #[must_use]
    pub fn tree(&self) -> &ParamTree<'a> {
        &self.tree
    }

    #[must_use]
    pub fn tree_mut(&mut self) -> &mut ParamTree<'a> {
        &mut self.tree
    }

    /// Produce the next dump chunk of this handler's subtree.
    pub fn dump_step(&mut self, kind: DumpKind) -> DumpChunk {
        let cursor = match kind {
            DumpKind::Get => &mut self.get_cursor,
            DumpKind::Save => &mut self.save_cursor,
        };
        let sequence = cursor.sequence();
        let mut buf = [0u8; CHUNK_LEN];
        let (len, status) = self.tree.dump_chunk(cursor, &mut buf);
        let mut payload = Payload::new();
        // Cannot fail: the scratch buffer is exactly the payload capacity.
        let _ = payload.extend_from_slice(&buf[..len]);
        DumpChunk {
            payload,
            sequence,
            last: status == DumpStatus::Done,
        }
    }

    /// Apply one Set payload against the owned tree.
    ///
    /// A `/`-rooted payload is searched for this tree's subtree
    /// ([`ParamTree::find_root`]); anything else is treated as the
    /// continuation of the previous chunk's walk and resumes from the
    /// remembered node, or is ignored when no walk is pending (it
    /// belongs to another tree). Failures leave earlier updates of the
    /// same payload applied.
    ///
    /// Returns whether any walk ran to the end of the payload.
    pub fn apply_payload(&mut self, payload: &[u8]) -> bool {
        if payload.first() == Some(&b'/') {
            let Some(offset) = self.tree.find_root(payload) else {
                // Another tree's subtree; forget any stale walk.
                self.apply_resume = None;
                return false;
            };
            match self.tree.set_from_path(&payload[offset..]) {
                Ok(end) => {
                    self.apply_resume = Some(end);
                    true
                }
                Err(e) => {
                    // Expected when a combined buffer continues with a
                    // neighboring tree; earlier updates stand.
                    debug!("set walk stopped: {e}");
                    self.apply_resume = None;
                    false
                }
            }
        } else if let Some(node) = self.apply_resume {
            match self.tree.apply_continuation(node, payload) {
                Ok(end) => {
                    self.apply_resume = Some(end);
                    true
                }
                Err(e) => {
                    warn!("set continuation failed: {e}");
                    self.apply_resume = None;
                    false
                }
            }
        } else {
            debug!("ignoring continuation chunk for another tree");
            false
        }
    }

    /// Dispatch one delivered message.
    pub fn handle(&mut self, msg: &Message, bus: &mut dyn MessageBus) {
        match msg {
            Message::DiscoveryRequest { from, to } => {
                // Only broadcast challenges are answered, and never our own.
                if *to == BROADCAST && *from != self.addr {
                    bus.send(Message::DiscoveryReply {
                        from: self.addr,
                        to: *from,
                    });
                }
            }
            Message::ParamFc(p) if p.to == self.addr => self.handle_internal(p, bus),
            _ => {}
        }
    }

    fn handle_internal(&mut self, p: &ParamMsg, bus: &mut dyn MessageBus) {
        match p.op {
            ParamOp::Set => {
                self.apply_payload(&p.payload);
                // Minimal signal back to the coordinator, flow accounting only.
                bus.send(Message::ParamFc(ParamMsg::signal(
                    self.addr,
                    p.from,
                    ParamOp::Set,
                )));
            }
            ParamOp::Get | ParamOp::Save => {
                let kind = if p.op == ParamOp::Get {
                    DumpKind::Get
                } else {
                    DumpKind::Save
                };
                let chunk = self.dump_step(kind);
                debug!(
                    "dump chunk {} ({} bytes, last: {})",
                    chunk.sequence,
                    chunk.payload.len(),
                    chunk.last
                );
                bus.send(Message::ParamFc(ParamMsg {
                    from: self.addr,
                    to: p.from,
                    op: p.op,
                    sequence: chunk.sequence,
                    last_in_sequence: chunk.last,
                    payload: chunk.payload,
                }));
            }
            ParamOp::Load | ParamOp::Error => {}
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use std::vec::Vec;

    use super::*;
    use core::cell::Cell;
    use paramlink_tree::{Access, ValueRef};

    struct VecBus(Vec<Message>);

    impl MessageBus for VecBus {
        fn send(&mut self, msg: Message) {
            self.0.push(msg);
        }
    }

    fn handler<'a>(addr: u8, v: &'a Cell<i32>) -> ParamHandler<'a> {
        let mut tree = ParamTree::new("nav", 1).unwrap();
        tree.add_child(tree.root(), "speed", ValueRef::I32(v), Access::ReadWrite, 0)
            .unwrap();
        ParamHandler::new(NodeAddr(addr), tree)
    }

    #[test]
    fn test_answers_broadcast_challenge_only() {
        let v = Cell::new(0);
        let mut h = handler(2, &v);
        let mut bus = VecBus(Vec::new());

        h.handle(
            &Message::DiscoveryRequest {
                from: NodeAddr(1),
                to: BROADCAST,
            },
            &mut bus,
        );
        assert_eq!(
            bus.0,
            [Message::DiscoveryReply {
                from: NodeAddr(2),
                to: NodeAddr(1),
            }]
        );

        // Directly addressed challenges and our own broadcast are ignored.
        bus.0.clear();
        h.handle(
            &Message::DiscoveryRequest {
                from: NodeAddr(1),
                to: NodeAddr(2),
            },
            &mut bus,
        );
        h.handle(
            &Message::DiscoveryRequest {
                from: NodeAddr(2),
                to: BROADCAST,
            },
            &mut bus,
        );
        assert!(bus.0.is_empty());
    }

    #[test]
    fn test_get_request_yields_chunk_with_last_flag() {
        let v = Cell::new(42);
        let mut h = handler(2, &v);
        let mut bus = VecBus(Vec::new());

        h.handle(
            &Message::ParamFc(ParamMsg::signal(NodeAddr(1), NodeAddr(2), ParamOp::Get)),
            &mut bus,
        );
        let Message::ParamFc(reply) = &bus.0[0] else {
            panic!("expected ParamFc reply");
        };
        assert_eq!(reply.to, NodeAddr(1));
        assert_eq!(reply.op, ParamOp::Get);
        assert!(reply.last_in_sequence);
        assert_eq!(&reply.payload[..], b"/nav<0>/speed<6>[42]/../");
    }

    #[test]
    fn test_set_applies_and_signals() {
        let v = Cell::new(0);
        let mut h = handler(2, &v);
        let mut bus = VecBus(Vec::new());

        let mut msg = ParamMsg::signal(NodeAddr(1), NodeAddr(2), ParamOp::Set);
        msg.payload
            .extend_from_slice(b"/nav<0>/speed<6>[9]/../")
            .unwrap();
        h.handle(&Message::ParamFc(msg), &mut bus);

        assert_eq!(v.get(), 9);
        assert_eq!(
            bus.0,
            [Message::ParamFc(ParamMsg::signal(
                NodeAddr(2),
                NodeAddr(1),
                ParamOp::Set,
            ))]
        );
    }

    #[test]
    fn test_set_for_other_tree_is_ignored() {
        let v = Cell::new(5);
        let mut h = handler(2, &v);
        assert!(!h.apply_payload(b"/other<0>/speed<6>[1]/../../"));
        assert_eq!(v.get(), 5);
        // A continuation with no pending walk is ignored too.
        assert!(!h.apply_payload(b"speed<6>[1]/../"));
        assert_eq!(v.get(), 5);
    }

    #[test]
    fn test_get_and_save_cursors_are_independent() {
        let v = Cell::new(1);
        let mut h = handler(2, &v);
        let get0 = h.dump_step(DumpKind::Get);
        let save0 = h.dump_step(DumpKind::Save);
        assert!(get0.last && save0.last);
        assert_eq!(get0.payload, save0.payload);
    }
}
