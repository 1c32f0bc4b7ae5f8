//! Hierarchical parameter tree with a bit-exact text codec and a
//! resumable dump.
//!
//! This crate is the in-memory side of the parameter backbone:
//!
//! - **Data model**: [`ParamTree`] / [`ParamNode`] — an arena-backed
//!   tree of named, typed parameters whose values live in caller-owned
//!   [`Cell`](core::cell::Cell) storage borrowed through [`ValueRef`]
//! - **Path codec**: [`encode_node`], [`encode_path_to_root`],
//!   [`parse_token`] — the `name<T>[V]` grammar shared by every tree
//!   interaction
//! - **Resumable dump**: [`DumpCursor`] + [`ParamTree::dump_chunk`] —
//!   stream an arbitrarily large tree through a small fixed buffer,
//!   with chunk concatenation bit-identical to one uninterrupted dump
//! - **Application**: [`ParamTree::set_from_path`],
//!   [`ParamTree::apply_continuation`], [`ParamTree::find_root`] —
//!   non-transactional Set walks and multi-root extraction
//!
//! # Path grammar
//!
//! ```text
//! path  := "/" token ("/" token)*
//! token := ".." | name ["<" digits ">"] ["[" ["-"] digits "]"]
//! ```
//!
//! # Example
//!
//! ```
//! use core::cell::Cell;
//! use paramlink_tree::{Access, DumpCursor, DumpStatus, ParamTree, ValueRef};
//!
//! let kp = Cell::new(55i32);
//! let mut tree = ParamTree::new("root", 1).unwrap();
//! let rate = tree
//!     .add_child(tree.root(), "rate", ValueRef::None, Access::ReadOnly, 1)
//!     .unwrap();
//! tree.add_child(rate, "Kp", ValueRef::I32(&kp), Access::ReadWrite, 0)
//!     .unwrap();
//!
//! // Dump the whole tree in one chunk.
//! let mut cursor = DumpCursor::new();
//! let mut buf = [0u8; 128];
//! let (len, status) = tree.dump_chunk(&mut cursor, &mut buf);
//! assert_eq!(status, DumpStatus::Done);
//! assert_eq!(&buf[..len], b"/root<0>/rate<0>/Kp<6>[55]/../../");
//!
//! // Write through the same grammar.
//! tree.set_from_path(b"/root/rate/Kp[60]/").unwrap();
//! assert_eq!(kp.get(), 60);
//! ```
//!
//! # Features
//!
//! - **`std`**: Enable standard library support (for host testing)
//! - **`defmt`**: Enable defmt formatting (for embedded logging)
//!
//! # No-std support
//!
//! This crate is `#![no_std]` by default and uses no heap allocations;
//! all capacities are fixed at compile time.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "std")]
extern crate std;

pub mod apply;
pub mod dump;
mod fmt;
pub mod node;
pub mod path;

// Re-export main types at crate root for convenience
pub use apply::ApplyError;
pub use dump::{DumpCursor, DumpStatus};
pub use node::{
    Access, NodeId, ParamNode, ParamTree, TreeError, ValueRef, ValueType, MAX_CHILDREN, MAX_DEPTH,
    MAX_NAME_LEN, MAX_NODES,
};
pub use path::{
    encode_node, encode_path_to_root, parse_token, PathError, PathToken, Tokens, MAX_TOKEN_LEN,
};
