//! Coordinator: discovery, and Get/Set/Save/Load orchestration across
//! every parameter tree in the system.
//!
//! The coordinator owns a local tree (wrapped in a [`ParamHandler`])
//! and a registry of remote handlers found at startup. It is the only
//! externally addressable entry point: originators talk to it, and it
//! fans work out over the internal `ParamFc` traffic, relabelling every
//! forwarded chunk with one global sequence number.
//!
//! A single busy flag serializes transfers at the granularity of one
//! multi-chunk exchange across the whole distributed tree. There is no
//! timeout: an originator that stops requesting Get chunks, or a
//! handler that never answers during Save, leaves the coordinator busy
//! forever. That gap is inherited from the transport assumptions and
//! deliberately not papered over here.

use log::{debug, error, info, warn};

use paramlink_proto::{encode_frame, max_encoded_len, ParamFrame, ParamOp, SlipDecoder, SlipProgress, FRAME_HEADER_LEN};
use paramlink_tree::ParamTree;

use crate::bus::{Message, MessageBus, NodeAddr, ParamMsg, Payload, BROADCAST, CHUNK_LEN};
use crate::handler::{DumpKind, ParamHandler};
use crate::memory::ParamMemory;

/// Capacity of the handler registry. Exceeding it is a configuration
/// bug, not a runtime condition.
pub const MAX_HANDLERS: usize = 8;

/// Largest serialized frame (header + one chunk payload).
pub const FRAME_BUF_LEN: usize = FRAME_HEADER_LEN + CHUNK_LEN;

/// Decoder capacity: unescaped frame body including the CRC trailer.
pub const SLIP_BODY_LEN: usize = FRAME_BUF_LEN + 2;

/// Worst-case on-wire frame length.
pub const SLIP_WIRE_LEN: usize = max_encoded_len(FRAME_BUF_LEN);

/// Unused byte left between consecutive persisted frames.
const FRAME_GAP: u32 = 1;

/// Kind of the multi-chunk transfer in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferKind {
    Get,
    Save,
}

/// State of the one transfer the coordinator allows in flight.
#[derive(Debug, Clone, Copy)]
struct ActiveTransfer {
    kind: TransferKind,
    originator: NodeAddr,
    /// 0 is the local tree; `i >= 1` addresses `registry[i - 1]`.
    active_index: usize,
    /// Global sequence number for the next forwarded chunk.
    sequence: u8,
}

/// The node that discovers and orchestrates remote parameter handlers.
pub struct Coordinator<'a, M: ParamMemory> {
    local: ParamHandler<'a>,
    registry: heapless::Vec<NodeAddr, MAX_HANDLERS>,
    active: Option<ActiveTransfer>,
    memory: M,
    save_base: u32,
    write_addr: u32,
    decoder: SlipDecoder<SLIP_BODY_LEN>,
}

impl<'a, M: ParamMemory> Coordinator<'a, M> {
    /// Create a coordinator owning `tree`, persisting at `save_base`.
    #[must_use]
    pub fn new(addr: NodeAddr, tree: ParamTree<'a>, memory: M, save_base: u32) -> Self {
        Self {
            local: ParamHandler::new(addr, tree),
            registry: heapless::Vec::new(),
            active: None,
            memory,
            save_base,
            write_addr: save_base,
            decoder: SlipDecoder::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn addr(&self) -> NodeAddr {
        self.local.addr()
    }

    /// The coordinator's own tree.
    #[must_use]
    pub fn tree(&self) -> &ParamTree<'a> {
        self.local.tree()
    }

    /// Remote handlers in discovery order.
    #[must_use]
    pub fn registry(&self) -> &[NodeAddr] {
        &self.registry
    }

    /// Whether a multi-chunk transfer is in flight.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.active.is_some()
    }

    /// The persistence backend (exposed for inspection in tests/tools).
    #[must_use]
    pub fn memory_mut(&mut self) -> &mut M {
        &mut self.memory
    }

    /// Broadcast the capability challenge. Replies trickle in through
    /// [`handle`](Self::handle) and fill the registry in arrival order.
    pub fn start_discovery(&mut self, bus: &mut dyn MessageBus) {
        info!("discovering parameter handlers");
        bus.send(Message::DiscoveryRequest {
            from: self.addr(),
            to: BROADCAST,
        });
    }

    /// Dispatch one delivered message.
    pub fn handle(&mut self, msg: &Message, bus: &mut dyn MessageBus) {
        match msg {
            Message::DiscoveryReply { from, to } if *to == self.addr() => {
                self.register_handler(*from);
            }
            Message::Param(p) if p.to == self.addr() => self.handle_request(p, bus),
            Message::ParamFc(p) if p.to == self.addr() => self.handle_reply(p, bus),
            _ => {}
        }
    }

    fn register_handler(&mut self, addr: NodeAddr) {
        if self.registry.contains(&addr) {
            return;
        }
        if self.registry.push(addr).is_err() {
            // A fixed deployment grew past MAX_HANDLERS; no runtime
            // recovery is meaningful.
            panic!("parameter handler registry overflow");
        }
        info!("registered parameter handler {}", addr.0);
    }

    /// Externally addressed requests: Get/Set/Save/Load.
    fn handle_request(&mut self, p: &ParamMsg, bus: &mut dyn MessageBus) {
        match p.op {
            ParamOp::Get => self.on_get(p, bus),
            ParamOp::Set => self.on_set(p, bus),
            ParamOp::Save => self.on_save(p, bus),
            ParamOp::Load => self.on_load(p, bus),
            ParamOp::Error => {}
        }
    }

    /// Replies from remote handlers over the internal surface.
    fn handle_reply(&mut self, p: &ParamMsg, bus: &mut dyn MessageBus) {
        match p.op {
            ParamOp::Get => self.on_get_reply(p, bus),
            ParamOp::Save => self.on_save_reply(p, bus),
            // Set replies are flow-accounting signals only.
            ParamOp::Set => debug!("set applied by handler {}", p.from.0),
            ParamOp::Load | ParamOp::Error => {}
        }
    }

    /// Reject `p` with an error reply if a transfer is in flight and
    /// this request neither continues it nor originates from the
    /// coordinator itself (the Load replay).
    fn reject_if_busy(&mut self, p: &ParamMsg, bus: &mut dyn MessageBus) -> bool {
        let Some(t) = self.active else {
            return false;
        };
        if p.from == self.addr() {
            return false;
        }
        if t.kind == TransferKind::Get && p.op == ParamOp::Get && p.from == t.originator {
            return false;
        }
        warn!("transfer busy, rejecting {:?} from {}", p.op, p.from.0);
        bus.send(Message::Param(ParamMsg::signal(
            self.addr(),
            p.from,
            ParamOp::Error,
        )));
        true
    }

    fn on_get(&mut self, p: &ParamMsg, bus: &mut dyn MessageBus) {
        if self.reject_if_busy(p, bus) {
            return;
        }
        let mut t = match self.active {
            Some(t) => t,
            None => {
                info!("get transfer started for {}", p.from.0);
                ActiveTransfer {
                    kind: TransferKind::Get,
                    originator: p.from,
                    active_index: 0,
                    sequence: 0,
                }
            }
        };

        if t.active_index == 0 {
            // Local tree dumps first, one chunk per request.
            let chunk = self.local.dump_step(DumpKind::Get);
            let last = chunk.last && self.registry.is_empty();
            bus.send(Message::Param(ParamMsg {
                from: self.addr(),
                to: t.originator,
                op: ParamOp::Set,
                sequence: t.sequence,
                last_in_sequence: last,
                payload: chunk.payload,
            }));
            t.sequence = t.sequence.wrapping_add(1);
            if last {
                info!("get transfer complete");
                self.active = None;
                return;
            }
            if chunk.last {
                t.active_index = 1;
            }
            self.active = Some(t);
        } else {
            // The originator's next request pulls from the active handler.
            self.active = Some(t);
            self.request_chunk(ParamOp::Get, t.active_index, bus);
        }
    }

    fn on_get_reply(&mut self, p: &ParamMsg, bus: &mut dyn MessageBus) {
        let Some(mut t) = self.active else {
            warn!("stray get chunk from {}", p.from.0);
            return;
        };
        if t.kind != TransferKind::Get {
            warn!("get chunk from {} during save", p.from.0);
            return;
        }

        let final_handler = t.active_index == self.registry.len();
        if p.payload.is_empty() && p.last_in_sequence && !final_handler {
            // An empty subtree contributes no chunks; move on.
            t.active_index += 1;
            self.active = Some(t);
            self.request_chunk(ParamOp::Get, t.active_index, bus);
            return;
        }

        // Relabel with the global sequence and forward unmodified.
        let last = p.last_in_sequence && final_handler;
        bus.send(Message::Param(ParamMsg {
            from: self.addr(),
            to: t.originator,
            op: ParamOp::Set,
            sequence: t.sequence,
            last_in_sequence: last,
            payload: p.payload.clone(),
        }));
        t.sequence = t.sequence.wrapping_add(1);

        if last {
            info!("get transfer complete");
            self.active = None;
        } else {
            if p.last_in_sequence {
                t.active_index += 1;
            }
            self.active = Some(t);
        }
    }

    fn on_set(&mut self, p: &ParamMsg, bus: &mut dyn MessageBus) {
        if self.reject_if_busy(p, bus) {
            return;
        }
        debug!("set: {} bytes from {}", p.payload.len(), p.from.0);
        self.local.apply_payload(&p.payload);
        // Forward the identical buffer; every handler extracts its own
        // subtree.
        for &handler in &self.registry {
            bus.send(Message::ParamFc(ParamMsg {
                from: self.local.addr(),
                to: handler,
                op: ParamOp::Set,
                sequence: p.sequence,
                last_in_sequence: p.last_in_sequence,
                payload: p.payload.clone(),
            }));
        }
    }

    fn on_save(&mut self, p: &ParamMsg, bus: &mut dyn MessageBus) {
        if self.reject_if_busy(p, bus) {
            return;
        }
        info!("save transfer started for {}", p.from.0);
        self.write_addr = self.save_base;
        let mut t = ActiveTransfer {
            kind: TransferKind::Save,
            originator: p.from,
            active_index: 0,
            sequence: 0,
        };

        // Memory writes need no flow control, so the local tree is
        // framed in one synchronous pass.
        loop {
            let chunk = self.local.dump_step(DumpKind::Save);
            let last = chunk.last && self.registry.is_empty();
            if !self.write_frame(&chunk.payload, t.sequence, last) {
                self.active = None;
                return;
            }
            t.sequence = t.sequence.wrapping_add(1);
            if chunk.last {
                break;
            }
        }

        if self.registry.is_empty() {
            self.write_addr = self.save_base;
            info!("save transfer complete");
            return;
        }
        t.active_index = 1;
        self.active = Some(t);
        self.request_chunk(ParamOp::Save, t.active_index, bus);
    }

    fn on_save_reply(&mut self, p: &ParamMsg, bus: &mut dyn MessageBus) {
        let Some(mut t) = self.active else {
            warn!("stray save chunk from {}", p.from.0);
            return;
        };
        if t.kind != TransferKind::Save {
            warn!("save chunk from {} during get", p.from.0);
            return;
        }

        let final_handler = t.active_index == self.registry.len();
        if p.payload.is_empty() && p.last_in_sequence && !final_handler {
            t.active_index += 1;
            self.active = Some(t);
            self.request_chunk(ParamOp::Save, t.active_index, bus);
            return;
        }

        let last = p.last_in_sequence && final_handler;
        if !self.write_frame(&p.payload, t.sequence, last) {
            self.active = None;
            return;
        }
        t.sequence = t.sequence.wrapping_add(1);

        if last {
            self.write_addr = self.save_base;
            info!("save transfer complete");
            self.active = None;
            return;
        }
        if p.last_in_sequence {
            t.active_index += 1;
        }
        self.active = Some(t);
        self.request_chunk(ParamOp::Save, t.active_index, bus);
    }

    /// Serialize, SLIP-wrap and persist one chunk at the write cursor.
    fn write_frame(&mut self, payload: &[u8], sequence: u8, last: bool) -> bool {
        let frame = ParamFrame {
            op: ParamOp::Set,
            sequence,
            last_in_sequence: last,
            payload,
        };
        let mut raw = [0u8; FRAME_BUF_LEN];
        let Ok(raw_len) = frame.encode(&mut raw) else {
            error!("save aborted: frame encoding failed");
            return false;
        };
        let mut wire = [0u8; SLIP_WIRE_LEN];
        let Ok(wire_len) = encode_frame(&raw[..raw_len], &mut wire) else {
            error!("save aborted: frame framing failed");
            return false;
        };
        if let Err(e) = self.memory.write(self.write_addr, &wire[..wire_len]) {
            error!("save aborted: memory write at {}: {e}", self.write_addr);
            return false;
        }
        debug!("saved frame {sequence}: {wire_len} bytes at {}", self.write_addr);
        self.write_addr += wire_len as u32 + FRAME_GAP;
        true
    }

    fn request_chunk(&mut self, op: ParamOp, active_index: usize, bus: &mut dyn MessageBus) {
        let target = self.registry[active_index - 1];
        bus.send(Message::ParamFc(ParamMsg::signal(self.addr(), target, op)));
    }

    /// Replay the persisted frames as self-addressed Set requests.
    ///
    /// Runs synchronously: bytes are read back one at a time through
    /// the shared SLIP parser until the frame marked last-in-sequence
    /// has been injected, or a read/CRC/sequence error aborts the load.
    /// Frames injected before an abort remain applied.
    fn on_load(&mut self, p: &ParamMsg, bus: &mut dyn MessageBus) {
        if self.reject_if_busy(p, bus) {
            return;
        }
        info!("load started");
        self.decoder.reset();
        let mut addr = self.save_base;
        let mut expected: u8 = 0;

        loop {
            let frame_start = addr;
            loop {
                let mut byte = [0u8; 1];
                if let Err(e) = self.memory.read(addr, &mut byte) {
                    error!("load aborted: memory read at {addr}: {e}");
                    return;
                }
                addr += 1;
                if (addr - frame_start) as usize > SLIP_WIRE_LEN + 1 {
                    error!("load aborted: no frame within {} bytes", SLIP_WIRE_LEN);
                    return;
                }
                match self.decoder.push(byte[0]) {
                    Ok(SlipProgress::Pending) => {}
                    Ok(SlipProgress::Complete) => break,
                    Err(e) => {
                        error!("load aborted: {e}");
                        return;
                    }
                }
            }

            let (sequence, last, payload) = {
                let frame = match ParamFrame::decode(self.decoder.payload()) {
                    Ok(frame) => frame,
                    Err(e) => {
                        error!("load aborted: bad frame: {e}");
                        return;
                    }
                };
                let mut payload = Payload::new();
                if payload.extend_from_slice(frame.payload).is_err() {
                    error!("load aborted: frame payload too large");
                    return;
                }
                (frame.sequence, frame.last_in_sequence, payload)
            };

            if sequence != expected {
                error!("load aborted: frame {sequence}, expected {expected}");
                return;
            }
            expected = expected.wrapping_add(1);

            // Re-enter the message system exactly like an external Set.
            bus.send(Message::Param(ParamMsg {
                from: self.addr(),
                to: self.addr(),
                op: ParamOp::Set,
                sequence,
                last_in_sequence: last,
                payload,
            }));

            if last {
                break;
            }
        }
        info!("load complete: {expected} frames replayed");
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use std::vec::Vec;

    use super::*;
    use crate::memory::RamParamMemory;
    use paramlink_tree::ParamTree;

    struct VecBus(Vec<Message>);

    impl MessageBus for VecBus {
        fn send(&mut self, msg: Message) {
            self.0.push(msg);
        }
    }

    fn coordinator() -> Coordinator<'static, RamParamMemory<1024>> {
        let tree = ParamTree::new("fc", 1).unwrap();
        Coordinator::new(NodeAddr(1), tree, RamParamMemory::new(), 0)
    }

    #[test]
    fn test_discovery_ignores_duplicates() {
        let mut coord = coordinator();
        let mut bus = VecBus(Vec::new());
        for _ in 0..3 {
            coord.handle(
                &Message::DiscoveryReply {
                    from: NodeAddr(2),
                    to: NodeAddr(1),
                },
                &mut bus,
            );
        }
        assert_eq!(coord.registry(), &[NodeAddr(2)]);
    }

    #[test]
    #[should_panic(expected = "registry overflow")]
    fn test_registry_overflow_is_fatal() {
        let mut coord = coordinator();
        let mut bus = VecBus(Vec::new());
        for n in 0..=MAX_HANDLERS as u8 {
            coord.handle(
                &Message::DiscoveryReply {
                    from: NodeAddr(10 + n),
                    to: NodeAddr(1),
                },
                &mut bus,
            );
        }
    }
}
