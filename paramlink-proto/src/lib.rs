//! Wire codecs for the parameter link: CRC-16, SLIP framing, and the
//! parameter frame header.
//!
//! This crate provides everything needed to move parameter data over a
//! byte-oriented medium or in and out of non-volatile memory:
//!
//! - **Checksums**: [`calculate_crc16`] / [`Crc16Digest`] —
//!   CRC-16/CCITT (poly 0x1021, init 0xFFFF)
//! - **Framing**: [`encode_frame`] / [`SlipDecoder`] — self-delimiting
//!   SLIP frames with the CRC embedded before escaping
//! - **Frame header**: [`ParamFrame`] — operation, sequence number,
//!   last-in-sequence marker and payload length in a fixed 5-byte
//!   header
//!
//! # Frame format
//!
//! ```text
//! 0x7E <header + payload + CRC16, escaped> 0x7E
//! ```
//!
//! Escape pairs: `0x7E -> 0x7D 0x5E`, `0x7D -> 0x7D 0x5D`. The CRC is
//! computed over the unescaped header + payload and appended
//! big-endian.
//!
//! # Example
//!
//! ```
//! use paramlink_proto::{encode_frame, ParamFrame, ParamOp, SlipDecoder, SlipProgress};
//!
//! // Frame up a Set payload for persistence.
//! let frame = ParamFrame {
//!     op: ParamOp::Set,
//!     sequence: 0,
//!     last_in_sequence: true,
//!     payload: b"/root<0>/",
//! };
//! let mut raw = [0u8; 64];
//! let raw_len = frame.encode(&mut raw).unwrap();
//!
//! let mut wire = [0u8; 64];
//! let wire_len = encode_frame(&raw[..raw_len], &mut wire).unwrap();
//!
//! // Read it back one byte at a time.
//! let mut decoder: SlipDecoder<64> = SlipDecoder::new();
//! for &b in &wire[..wire_len - 1] {
//!     assert_eq!(decoder.push(b).unwrap(), SlipProgress::Pending);
//! }
//! assert_eq!(decoder.push(wire[wire_len - 1]).unwrap(), SlipProgress::Complete);
//! let decoded = ParamFrame::decode(decoder.payload()).unwrap();
//! assert_eq!(decoded.payload, b"/root<0>/");
//! ```
//!
//! # Features
//!
//! - **`std`**: Enable standard library support (for host testing)
//! - **`defmt`**: Enable defmt formatting (for embedded logging)
//!
//! # No-std support
//!
//! This crate is `#![no_std]` by default and uses no heap allocations.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "std")]
extern crate std;

pub mod crc;
pub mod frame;
pub mod slip;

// Re-export main types at crate root for convenience
pub use crc::{calculate_crc16, Crc16Digest};
pub use frame::{FrameError, ParamFrame, ParamOp, FRAME_HEADER_LEN};
pub use slip::{
    encode_frame, max_encoded_len, SlipDecoder, SlipEncoder, SlipError, SlipProgress,
    BOUNDARY_REPLACEMENT, CONTROL_ESCAPE, ESCAPE_REPLACEMENT, FRAME_BOUNDARY,
};
