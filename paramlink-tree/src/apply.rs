//! Applying textual paths to the tree: Set, continuation, and
//! multi-root extraction.
//!
//! Application is deliberately **not transactional**: the walk updates
//! nodes as it resolves them and aborts on the first resolution or
//! type failure, leaving every earlier update in effect. Callers must
//! not assume atomicity; the protocol layer relies on this when it
//! replays persisted frames one at a time.

use crate::node::{NodeId, ParamTree};
use crate::path::{parse_token, PathError, PathToken, Tokens};

/// Error type for path application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ApplyError {
    /// The payload does not begin with `/`.
    NotRooted,
    /// The payload contains no tokens.
    EmptyPath,
    /// A token named no existing child (or popped past the root).
    NodeNotFound,
    /// A token's `<T>` tag differs from the node's declared type.
    TypeMismatch,
    /// A token violates the path grammar.
    Malformed,
}

impl core::fmt::Display for ApplyError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotRooted => write!(f, "path is not rooted"),
            Self::EmptyPath => write!(f, "path has no tokens"),
            Self::NodeNotFound => write!(f, "no such node"),
            Self::TypeMismatch => write!(f, "value type mismatch"),
            Self::Malformed => write!(f, "malformed path"),
        }
    }
}

impl From<PathError> for ApplyError {
    fn from(_: PathError) -> Self {
        ApplyError::Malformed
    }
}

impl<'a> ParamTree<'a> {
    /// Apply a rooted path (`/name.../`) to this tree.
    ///
    /// The first token must name the root and updates it in place; each
    /// later token resolves against the previously updated node (`..`
    /// pops to the parent, anything else must name an existing child)
    /// and is then updated from its optional `<T>`/`[V]` fields.
    /// Returns the node where the walk stopped, which a follow-up
    /// [`apply_continuation`](Self::apply_continuation) can resume from.
    ///
    /// # Errors
    ///
    /// Aborts on the first failure; updates already applied by earlier
    /// tokens of the same call remain in effect.
    pub fn set_from_path(&self, payload: &[u8]) -> Result<NodeId, ApplyError> {
        if payload.first() != Some(&b'/') {
            return Err(ApplyError::NotRooted);
        }

        let mut tokens = Tokens::new(payload);
        let (_, first) = tokens.next().ok_or(ApplyError::EmptyPath)?;
        let first = parse_token(first)?;
        if first.is_parent() || first.name != self.node(self.root()).name().as_bytes() {
            return Err(ApplyError::NodeNotFound);
        }
        let mut current = self.root();
        self.update_node(current, &first)?;

        for (_, segment) in tokens {
            let token = parse_token(segment)?;
            current = self.resolve(current, &token)?;
            self.update_node(current, &token)?;
        }
        Ok(current)
    }

    /// Resume a walk at `from`, for payloads that continue a previous
    /// chunk and therefore do not begin with `/`.
    ///
    /// Unlike [`set_from_path`](Self::set_from_path), every token —
    /// including the first — is a resolution step.
    ///
    /// # Errors
    ///
    /// Same failure and partial-update semantics as
    /// [`set_from_path`](Self::set_from_path).
    pub fn apply_continuation(&self, from: NodeId, payload: &[u8]) -> Result<NodeId, ApplyError> {
        let mut current = from;
        let mut any = false;
        for (_, segment) in Tokens::new(payload) {
            let token = parse_token(segment)?;
            current = self.resolve(current, &token)?;
            self.update_node(current, &token)?;
            any = true;
        }
        if !any {
            return Err(ApplyError::EmptyPath);
        }
        Ok(current)
    }

    /// Locate this tree's subtree within a buffer that may concatenate
    /// several independent root subtrees end-to-end (as a coordinator
    /// broadcast does).
    ///
    /// Scans tokens while tracking a synthetic depth counter (`..`
    /// pops, anything else pushes) and returns the byte offset of the
    /// `/` introducing the first depth-0 token whose name matches this
    /// tree's root. `None` if the buffer addresses other trees only.
    #[must_use]
    pub fn find_root(&self, payload: &[u8]) -> Option<usize> {
        if payload.first() != Some(&b'/') {
            return None;
        }
        let root_name = self.node(self.root()).name().as_bytes();
        let mut depth: i32 = 0;
        for (offset, segment) in Tokens::new(payload) {
            let Ok(token) = parse_token(segment) else {
                return None;
            };
            if token.is_parent() {
                depth -= 1;
            } else {
                if depth == 0 && token.name == root_name {
                    return Some(offset - 1);
                }
                depth += 1;
            }
        }
        None
    }

    fn resolve(&self, current: NodeId, token: &PathToken<'_>) -> Result<NodeId, ApplyError> {
        if token.is_parent() {
            self.node(current).parent().ok_or(ApplyError::NodeNotFound)
        } else {
            self.find_child(current, token.name)
                .ok_or(ApplyError::NodeNotFound)
        }
    }

    /// Update one resolved node from its token.
    ///
    /// A present `<T>` must equal the node's type. A present `[V]` is
    /// ignored for read-only or value-less nodes, and silently dropped
    /// when out of the declared type's range — the walk continues
    /// either way.
    fn update_node(&self, id: NodeId, token: &PathToken<'_>) -> Result<(), ApplyError> {
        let node = self.node(id);
        if let Some(tag) = token.type_tag {
            if tag != node.value_type().tag() {
                return Err(ApplyError::TypeMismatch);
            }
        }
        if let Some(value) = token.value {
            let _ = node.write_value(value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use std::vec::Vec;

    use crate::dump::{DumpCursor, DumpStatus};
    use crate::node::{Access, ParamTree, ValueRef};
    use crate::ApplyError;
    use core::cell::Cell;

    fn three_node_tree<'a>(
        v1: &'a Cell<i32>,
        v11: &'a Cell<i32>,
        v12: &'a Cell<i32>,
    ) -> ParamTree<'a> {
        let mut tree = ParamTree::new("root", 1).unwrap();
        let p1 = tree
            .add_child(tree.root(), "param1", ValueRef::I32(v1), Access::ReadWrite, 2)
            .unwrap();
        tree.add_child(p1, "param11", ValueRef::I32(v11), Access::ReadWrite, 0)
            .unwrap();
        tree.add_child(p1, "param12", ValueRef::I32(v12), Access::ReadWrite, 0)
            .unwrap();
        tree
    }

    fn dump_all(tree: &ParamTree<'_>, chunk_size: usize) -> Vec<u8> {
        let mut cursor = DumpCursor::new();
        let mut out = Vec::new();
        let mut buf = std::vec![0u8; chunk_size];
        loop {
            let (len, status) = tree.dump_chunk(&mut cursor, &mut buf);
            out.extend_from_slice(&buf[..len]);
            if status == DumpStatus::Done {
                return out;
            }
        }
    }

    #[test]
    fn test_set_then_dump_vector() {
        let (v1, v11, v12) = (Cell::new(0), Cell::new(0), Cell::new(0));
        let tree = three_node_tree(&v1, &v11, &v12);

        tree.set_from_path(b"/root/param1[700]/param11[1024]/../param12[1038]/")
            .unwrap();

        assert_eq!(v1.get(), 700);
        assert_eq!(v11.get(), 1024);
        assert_eq!(v12.get(), 1038);
        assert_eq!(
            dump_all(&tree, 4096),
            b"/root<0>/param1<6>[700]/param11<6>[1024]/../param12<6>[1038]/../../"
        );
    }

    #[test]
    fn test_set_accepts_matching_type_tags() {
        let (v1, v11, v12) = (Cell::new(0), Cell::new(0), Cell::new(0));
        let tree = three_node_tree(&v1, &v11, &v12);
        tree.set_from_path(b"/root<0>/param1<6>[5]/").unwrap();
        assert_eq!(v1.get(), 5);
    }

    #[test]
    fn test_set_aborts_on_type_mismatch() {
        let (v1, v11, v12) = (Cell::new(0), Cell::new(0), Cell::new(0));
        let tree = three_node_tree(&v1, &v11, &v12);
        assert_eq!(
            tree.set_from_path(b"/root/param1<3>[5]/param11[7]/"),
            Err(ApplyError::TypeMismatch)
        );
        // Nothing after the failing token was applied.
        assert_eq!(v1.get(), 0);
        assert_eq!(v11.get(), 0);
    }

    #[test]
    fn test_set_is_not_transactional() {
        let (v1, v11, v12) = (Cell::new(0), Cell::new(0), Cell::new(0));
        let tree = three_node_tree(&v1, &v11, &v12);
        let result = tree.set_from_path(b"/root/param1[5]/nosuch[9]/../param12[7]/");
        assert_eq!(result, Err(ApplyError::NodeNotFound));
        // The update before the failure stuck; the one after never ran.
        assert_eq!(v1.get(), 5);
        assert_eq!(v12.get(), 0);
    }

    #[test]
    fn test_out_of_range_value_skips_token_only() {
        let small = Cell::new(1u8);
        let wide = Cell::new(0u32);
        let mut tree = ParamTree::new("root", 2).unwrap();
        tree.add_child(tree.root(), "small", ValueRef::U8(&small), Access::ReadWrite, 0)
            .unwrap();
        tree.add_child(tree.root(), "wide", ValueRef::U32(&wide), Access::ReadWrite, 0)
            .unwrap();

        // 300 overflows a u8: dropped silently, walk continues.
        tree.set_from_path(b"/root/small[300]/../wide[300]/").unwrap();
        assert_eq!(small.get(), 1);
        assert_eq!(wide.get(), 300);
    }

    #[test]
    fn test_read_only_value_is_ignored() {
        let ro = Cell::new(17u16);
        let mut tree = ParamTree::new("root", 1).unwrap();
        tree.add_child(tree.root(), "ro", ValueRef::U16(&ro), Access::ReadOnly, 0)
            .unwrap();
        tree.set_from_path(b"/root/ro[99]/").unwrap();
        assert_eq!(ro.get(), 17);
    }

    #[test]
    fn test_set_requires_rooted_path_and_matching_root() {
        let (v1, v11, v12) = (Cell::new(0), Cell::new(0), Cell::new(0));
        let tree = three_node_tree(&v1, &v11, &v12);
        assert_eq!(
            tree.set_from_path(b"root/param1[1]/"),
            Err(ApplyError::NotRooted)
        );
        assert_eq!(
            tree.set_from_path(b"/other/param1[1]/"),
            Err(ApplyError::NodeNotFound)
        );
        assert_eq!(tree.set_from_path(b"/"), Err(ApplyError::EmptyPath));
        assert_eq!(v1.get(), 0);
    }

    #[test]
    fn test_find_root_in_combined_buffer() {
        let (a1, b1) = (Cell::new(0), Cell::new(0));
        let mut alpha = ParamTree::new("alpha", 1).unwrap();
        alpha
            .add_child(alpha.root(), "x", ValueRef::I32(&a1), Access::ReadWrite, 0)
            .unwrap();
        let mut beta = ParamTree::new("beta", 1).unwrap();
        beta.add_child(beta.root(), "y", ValueRef::I32(&b1), Access::ReadWrite, 0)
            .unwrap();

        let combined = b"/alpha<0>/x<6>[1]/../../beta<0>/y<6>[2]/../../";
        assert_eq!(alpha.find_root(combined), Some(0));
        let beta_off = beta.find_root(combined).unwrap();
        assert_eq!(&combined[beta_off..beta_off + 6], b"/beta<");

        // Applying from the located offset only touches the owned tree.
        beta.set_from_path(&combined[beta_off..]).ok();
        assert_eq!(b1.get(), 2);
        assert_eq!(a1.get(), 0);

        // A nested node with a colliding name is not a root match.
        let mut nested = ParamTree::new("x", 1).unwrap();
        nested
            .add_child(nested.root(), "z", ValueRef::I32(&b1), Access::ReadWrite, 0)
            .unwrap();
        assert_eq!(nested.find_root(combined), None);
    }

    #[test]
    fn test_continuation_applies_chunked_dump() {
        // Mirror of the persistence path: chunk a dump of one tree,
        // replay each chunk on a second identical tree.
        let (v1, v11, v12) = (Cell::new(700), Cell::new(1024), Cell::new(1038));
        let source = three_node_tree(&v1, &v11, &v12);

        let (w1, w11, w12) = (Cell::new(0), Cell::new(0), Cell::new(0));
        let target = three_node_tree(&w1, &w11, &w12);

        let mut cursor = DumpCursor::new();
        let mut buf = [0u8; 40];
        let mut resume = None;
        loop {
            let (len, status) = source.dump_chunk(&mut cursor, &mut buf);
            let chunk = &buf[..len];
            resume = Some(if chunk.first() == Some(&b'/') {
                target.set_from_path(chunk).unwrap()
            } else {
                target.apply_continuation(resume.unwrap(), chunk).unwrap()
            });
            if status == DumpStatus::Done {
                break;
            }
        }

        assert_eq!((w1.get(), w11.get(), w12.get()), (700, 1024, 1038));
        assert_eq!(dump_all(&target, 4096), dump_all(&source, 4096));
    }
}
