//! Master/slave orchestration for distributed parameter trees.
//!
//! A flight controller's configuration can span several independently
//! owned parameter trees: one on the coordinator, more behind remote
//! handlers on other boards or tasks. This crate ties them together
//! over a message-oriented transport:
//!
//! - [`ParamHandler`] — owns one tree, answers discovery and chunked
//!   dump/set traffic
//! - [`Coordinator`] — discovers handlers, serializes Get/Set/Save/Load
//!   across all of them, and persists/replays the combined tree through
//!   SLIP frames in non-volatile memory
//! - [`MessageBus`] / [`ParamMemory`] — the two external collaborators,
//!   modeled as traits ([`RamParamMemory`] backs host tests)
//!
//! # Transfer model
//!
//! Everything is synchronous and single-threaded: each operation runs
//! inside one bus callback and yields before the next message is
//! delivered. One busy flag on the coordinator serializes transfers at
//! the granularity of a whole multi-chunk exchange; while it is set,
//! externally originated requests get an explicit error reply. An
//! originator that abandons an exchange mid-transfer leaves the
//! coordinator busy forever — there is no timeout.
//!
//! Set application is not transactional: a failing walk keeps every
//! update applied before the failure, and an aborted Load keeps every
//! frame already replayed. Callers must not assume atomicity.
//!
//! # Features
//!
//! - **`std`**: Enable standard library support (for host testing)
//! - **`defmt`**: Enable defmt formatting (for embedded logging)
//!
//! # No-std support
//!
//! This crate is `#![no_std]` by default and uses no heap allocations.
//! Protocol events are logged through the `log` facade.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "std")]
extern crate std;

pub mod bus;
pub mod coordinator;
pub mod handler;
pub mod memory;

// Re-export main types at crate root for convenience
pub use bus::{Message, MessageBus, NodeAddr, ParamMsg, Payload, BROADCAST, CHUNK_LEN};
pub use coordinator::{Coordinator, TransferKind, MAX_HANDLERS};
pub use handler::{DumpChunk, DumpKind, ParamHandler};
pub use memory::{MemoryError, ParamMemory, RamParamMemory};

// The operation enum lives with the wire codec but is part of the bus
// surface too.
pub use paramlink_proto::ParamOp;
