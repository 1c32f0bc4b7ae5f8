//! Textual path codec for the parameter tree.
//!
//! Every interaction with a tree travels as ASCII text in this grammar:
//!
//! ```text
//! path  := "/" token ("/" token)*
//! token := ".." | name ["<" digits ">"] ["[" ["-"] digits "]"]
//! ```
//!
//! `/` separates tokens, `..` pops to the parent, `<T>` is the value
//! type tag and `[V]` the value as a decimal integer. A node with no
//! value encodes as `name<0>`, a valued node as `name<T>[V]`. A full
//! subtree dump of `root(param1) -> {param11, param12}` (all zeroed
//! Int32) reads:
//!
//! ```text
//! /root<0>/param1<6>[0]/param11<6>[0]/../param12<6>[0]/../../
//! ```

use crate::fmt::{parse_value, write_value, MAX_VALUE_DIGITS};
use crate::node::{ParamNode, ParamTree, ValueType, MAX_DEPTH, MAX_NAME_LEN};

/// Longest encoded token including its trailing separator:
/// `name<T>[V]/`.
pub const MAX_TOKEN_LEN: usize = MAX_NAME_LEN + 3 + 2 + MAX_VALUE_DIGITS + 1;

/// Error type for path encoding and parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PathError {
    /// The output buffer cannot hold the encoding.
    BufferTooSmall,
    /// The token does not match the path grammar.
    Malformed,
}

impl core::fmt::Display for PathError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::BufferTooSmall => write!(f, "output buffer too small"),
            Self::Malformed => write!(f, "malformed path token"),
        }
    }
}

/// Encode one node as `name<T>` or `name<T>[V]`.
///
/// Returns the number of bytes written.
///
/// # Errors
///
/// Returns [`PathError::BufferTooSmall`] if `out` cannot hold the
/// encoding.
pub fn encode_node(node: &ParamNode<'_>, out: &mut [u8]) -> Result<usize, PathError> {
    let mut pos = 0;
    append(out, &mut pos, node.name().as_bytes())?;
    append(out, &mut pos, b"<")?;
    append(out, &mut pos, &[b'0' + node.value_type().tag()])?;
    append(out, &mut pos, b">")?;
    if node.value_type() != ValueType::NoType {
        // Registration guarantees typed nodes carry a value reference.
        if let Some(value) = node.value().load() {
            let mut digits = [0u8; MAX_VALUE_DIGITS];
            let len = write_value(&mut digits, value);
            append(out, &mut pos, b"[")?;
            append(out, &mut pos, &digits[..len])?;
            append(out, &mut pos, b"]")?;
        }
    }
    Ok(pos)
}

/// Encode the path of ancestors from the root down to (excluding)
/// `id`: `/` + each ancestor's node encoding + `/`, ending with a
/// trailing separator. A root node yields just `/`.
///
/// # Errors
///
/// Returns [`PathError::BufferTooSmall`] if `out` cannot hold the
/// encoding.
pub fn encode_path_to_root(
    tree: &ParamTree<'_>,
    id: crate::node::NodeId,
    out: &mut [u8],
) -> Result<usize, PathError> {
    let mut ancestors = [0usize; MAX_DEPTH];
    let mut count = 0;
    let mut current = tree.node(id).parent();
    while let Some(p) = current {
        ancestors[count] = p;
        count += 1;
        current = tree.node(p).parent();
    }

    let mut pos = 0;
    append(out, &mut pos, b"/")?;
    for i in (0..count).rev() {
        pos += encode_node(tree.node(ancestors[i]), &mut out[pos..])?;
        append(out, &mut pos, b"/")?;
    }
    Ok(pos)
}

#[inline]
fn append(out: &mut [u8], pos: &mut usize, bytes: &[u8]) -> Result<(), PathError> {
    if *pos + bytes.len() > out.len() {
        return Err(PathError::BufferTooSmall);
    }
    out[*pos..*pos + bytes.len()].copy_from_slice(bytes);
    *pos += bytes.len();
    Ok(())
}

/// One parsed path token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathToken<'p> {
    pub name: &'p [u8],
    /// Value type tag from `<T>`, if present.
    pub type_tag: Option<u8>,
    /// Value from `[V]`, if present.
    pub value: Option<i64>,
}

impl PathToken<'_> {
    /// Whether this token is the parent notation `..`.
    #[inline]
    #[must_use]
    pub fn is_parent(&self) -> bool {
        self.name == b".."
    }
}

/// Parse one token (one `/`-separated path segment).
///
/// # Errors
///
/// Returns [`PathError::Malformed`] when the segment violates the
/// grammar.
pub fn parse_token(segment: &[u8]) -> Result<PathToken<'_>, PathError> {
    if segment == b".." {
        return Ok(PathToken {
            name: segment,
            type_tag: None,
            value: None,
        });
    }

    let name_end = segment
        .iter()
        .position(|&b| b == b'<' || b == b'[')
        .unwrap_or(segment.len());
    let name = &segment[..name_end];
    if name.is_empty() || name.len() > MAX_NAME_LEN || name == b".." {
        return Err(PathError::Malformed);
    }

    let mut rest = &segment[name_end..];
    let mut type_tag = None;
    if rest.first() == Some(&b'<') {
        let close = rest
            .iter()
            .position(|&b| b == b'>')
            .ok_or(PathError::Malformed)?;
        let digits = &rest[1..close];
        if digits.is_empty() || digits.len() > 3 || !digits.iter().all(u8::is_ascii_digit) {
            return Err(PathError::Malformed);
        }
        let mut tag: u16 = 0;
        for &d in digits {
            tag = tag * 10 + u16::from(d - b'0');
        }
        if tag > u16::from(u8::MAX) {
            return Err(PathError::Malformed);
        }
        type_tag = Some(tag as u8);
        rest = &rest[close + 1..];
    }

    let mut value = None;
    if rest.first() == Some(&b'[') {
        let close = rest
            .iter()
            .position(|&b| b == b']')
            .ok_or(PathError::Malformed)?;
        value = Some(parse_value(&rest[1..close]).ok_or(PathError::Malformed)?);
        rest = &rest[close + 1..];
    }

    if !rest.is_empty() {
        return Err(PathError::Malformed);
    }

    Ok(PathToken {
        name,
        type_tag,
        value,
    })
}

/// Iterator over the `/`-separated segments of a path buffer, yielding
/// each segment with its byte offset. Empty segments (the leading `/`,
/// a trailing `/`, or doubled separators) are skipped.
pub struct Tokens<'p> {
    buf: &'p [u8],
    pos: usize,
}

impl<'p> Tokens<'p> {
    #[must_use]
    pub fn new(buf: &'p [u8]) -> Self {
        Self { buf, pos: 0 }
    }
}

impl<'p> Iterator for Tokens<'p> {
    type Item = (usize, &'p [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos < self.buf.len() {
            let start = self.pos;
            let end = self.buf[start..]
                .iter()
                .position(|&b| b == b'/')
                .map_or(self.buf.len(), |i| start + i);
            self.pos = end + 1;
            if end > start {
                return Some((start, &self.buf[start..end]));
            }
        }
        None
    }
}
