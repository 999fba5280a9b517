//! The recursive proof tree
//!
//! Proof that one or more attestations commit to a message. Each node is a
//! message, each edge an operation acting on that message, and the leaves
//! carry attestations to the time the messages existed prior.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use thiserror::Error;

use crate::attestation::Attestation;
use crate::op::Op;
use ots_types::{Deserializer, Error as CodecError, Result as CodecResult, Serializer};

/// Maximum nesting depth accepted when parsing a proof tree.
const MAX_DEPTH: usize = 256;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MergeError {
    #[error("cannot merge timestamps for different messages")]
    MessageMismatch,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShrinkError {
    #[error("timestamp has no attestations")]
    NoAttestations,

    #[error("multiple attestations but no branches to prune")]
    NoBranches,
}

/// Commitment state of a single digest.
///
/// Invariant: for every child entry `(op, child)`, `child.msg == op(msg)`.
/// Children are recomputed whenever they are grafted — during parsing and
/// during merge — never copied from an untrusted source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timestamp {
    msg: Vec<u8>,
    attestations: Vec<Attestation>,
    ops: BTreeMap<Op, Timestamp>,
}

impl Timestamp {
    pub fn new(msg: Vec<u8>) -> Self {
        Self {
            msg,
            attestations: Vec::new(),
            ops: BTreeMap::new(),
        }
    }

    /// The digest this node commits to.
    pub fn msg(&self) -> &[u8] {
        &self.msg
    }

    /// Attestations attached directly to this node, in canonical order.
    pub fn attestations(&self) -> &[Attestation] {
        &self.attestations
    }

    /// Attach an attestation directly to this node.
    ///
    /// The collection is unordered; storage keeps canonical order as an
    /// invariant so equality and serialization agree.
    pub fn attest(&mut self, attestation: Attestation) {
        let at = self
            .attestations
            .partition_point(|existing| existing <= &attestation);
        self.attestations.insert(at, attestation);
    }

    /// Child edges in canonical operation order.
    pub fn operations(&self) -> impl Iterator<Item = (&Op, &Timestamp)> {
        self.ops.iter().map(|(op, child)| (op, child))
    }

    pub fn op_count(&self) -> usize {
        self.ops.len()
    }

    /// Extend the tree with an operation edge. If the exact operation is
    /// already present, the existing child is returned; otherwise a new
    /// child is computed and inserted.
    pub fn add(&mut self, op: Op) -> &mut Timestamp {
        match self.ops.entry(op) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let child_msg = entry.key().call(&self.msg);
                entry.insert(Timestamp::new(child_msg))
            }
        }
    }

    /// Serialize this tree to a fresh byte vector.
    pub fn serialize_to_vec(&self) -> Vec<u8> {
        let mut s = Serializer::new();
        self.serialize(&mut s);
        s.into_vec()
    }

    /// Serialize into an existing context.
    ///
    /// Attestations are written in canonical order (their stored order, by
    /// invariant); every attestation but the last is preceded by the
    /// `0xff 0x00` marker. A lone `0x00` closes a node with no operation
    /// edges; otherwise each `(op, child)` pair except the final one is
    /// preceded by `0xff`.
    pub fn serialize(&self, s: &mut Serializer) {
        let attestations = &self.attestations;

        if attestations.len() > 1 {
            for attestation in &attestations[..attestations.len() - 1] {
                s.write_bytes(&[0xff, 0x00]);
                attestation.serialize(s);
            }
        }

        if self.ops.is_empty() {
            s.write_byte(0x00);
            if let Some(last) = attestations.last() {
                last.serialize(s);
            }
        } else {
            if let Some(last) = attestations.last() {
                s.write_bytes(&[0xff, 0x00]);
                last.serialize(s);
            }

            let last_index = self.ops.len() - 1;
            for (i, (op, child)) in self.ops.iter().enumerate() {
                if i < last_index {
                    s.write_byte(0xff);
                }
                op.serialize(s);
                child.serialize(s);
            }
        }
    }

    /// Deserialize a proof tree committing to `initial_msg`.
    ///
    /// The serialized form does not carry the message a node commits to;
    /// every child digest is recomputed from its operation immediately
    /// during the parse, so an inconsistent stream fails here rather than
    /// later at verification.
    pub fn deserialize(d: &mut Deserializer<'_>, initial_msg: Vec<u8>) -> CodecResult<Self> {
        Self::deserialize_at_depth(d, initial_msg, 0)
    }

    /// Deserialize from a complete byte buffer.
    pub fn from_bytes(bytes: &[u8], initial_msg: Vec<u8>) -> CodecResult<Self> {
        let mut d = Deserializer::new(bytes);
        Self::deserialize(&mut d, initial_msg)
    }

    fn deserialize_at_depth(
        d: &mut Deserializer<'_>,
        initial_msg: Vec<u8>,
        depth: usize,
    ) -> CodecResult<Self> {
        if depth > MAX_DEPTH {
            return Err(CodecError::RecursionLimit);
        }

        let mut stamp = Timestamp::new(initial_msg);

        let mut tag = d.read_byte()?;
        while tag == 0xff {
            let current = d.read_byte()?;
            stamp.parse_entry(d, current, depth)?;
            tag = d.read_byte()?;
        }
        stamp.parse_entry(d, tag, depth)?;

        Ok(stamp)
    }

    fn parse_entry(&mut self, d: &mut Deserializer<'_>, tag: u8, depth: usize) -> CodecResult<()> {
        if tag == 0x00 {
            let attestation = Attestation::deserialize(d)?;
            self.attest(attestation);
        } else {
            let op = Op::deserialize_from_tag(d, tag)?;
            let child_msg = op.call(&self.msg);
            let child = Timestamp::deserialize_at_depth(d, child_msg, depth + 1)?;
            self.ops.insert(op, child);
        }
        Ok(())
    }

    /// Add all operations and attestations from another timestamp to this
    /// one. Both trees must commit to the same message. Grafted children are
    /// recomputed from this tree's own digests, so the recomputation
    /// invariant survives merging trees built by independent sources.
    pub fn merge(&mut self, other: Timestamp) -> Result<(), MergeError> {
        if self.msg != other.msg {
            return Err(MergeError::MessageMismatch);
        }

        // Union by concatenation, duplicates kept; re-sorting restores the
        // canonical-order invariant
        self.attestations.extend(other.attestations);
        self.attestations.sort();

        for (op, other_child) in other.ops {
            let child = match self.ops.entry(op) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    let child_msg = entry.key().call(&self.msg);
                    entry.insert(Timestamp::new(child_msg))
                }
            };
            child.merge(other_child)?;
        }

        Ok(())
    }

    /// Reduce the tree to its single cheapest verifiable branch.
    ///
    /// Prefers the Bitcoin attestation with the lowest block height; with
    /// only pending attestations present, an arbitrary one is returned and
    /// nothing is pruned. Returns the chosen attestation.
    pub fn shrink(&mut self) -> Result<Attestation, ShrinkError> {
        let mut pairs = self.attestation_pairs();

        if pairs.is_empty() {
            return Err(ShrinkError::NoAttestations);
        }
        if pairs.len() == 1 {
            let (_, attestation) = pairs.remove(0);
            return Ok(attestation);
        }
        if self.ops.is_empty() {
            return Err(ShrinkError::NoBranches);
        }

        // Cheapest verifiable claim: minimum-height Bitcoin attestation
        // found strictly within the child subtrees
        let mut chosen: Option<Attestation> = None;
        for child in self.ops.values() {
            for attestation in child.attestation_set() {
                if let Attestation::Bitcoin { height } = &attestation {
                    let better = match &chosen {
                        Some(Attestation::Bitcoin { height: best }) => height < best,
                        _ => true,
                    };
                    if better {
                        chosen = Some(attestation);
                    }
                }
            }
        }

        let Some(chosen) = chosen else {
            // Only pending/unknown claims: nothing is cheaper than anything
            // else, return the first without pruning
            let (_, attestation) = pairs.remove(0);
            return Ok(attestation);
        };

        // Keep the first branch (canonical operation order) whose subtree
        // contains the chosen attestation; discard every other branch
        let mut kept: Option<Op> = None;
        for (op, child) in &self.ops {
            if child.attestation_set().contains(&chosen) {
                kept = Some(op.clone());
                break;
            }
        }

        if let Some(kept_op) = kept {
            self.ops.retain(|op, _| *op == kept_op);
            if let Some(child) = self.ops.get_mut(&kept_op) {
                child.shrink()?;
            }
        }

        Ok(chosen)
    }

    /// The subtree nodes that carry at least one attestation directly.
    /// A node with attestations terminates the walk on its branch.
    pub fn directly_verified(&self) -> Vec<&Timestamp> {
        if !self.attestations.is_empty() {
            return vec![self];
        }

        let mut nodes = Vec::new();
        for child in self.ops.values() {
            nodes.extend(child.directly_verified());
        }
        nodes
    }

    /// Mutable variant of [`directly_verified`](Self::directly_verified),
    /// used when upgrading pending attestations in place.
    pub fn directly_verified_mut(&mut self) -> Vec<&mut Timestamp> {
        if !self.attestations.is_empty() {
            return vec![self];
        }

        let mut nodes = Vec::new();
        for child in self.ops.values_mut() {
            nodes.extend(child.directly_verified_mut());
        }
        nodes
    }

    /// Every (digest, attestation) pair reachable from this node, in
    /// traversal order, duplicates included. Unlike
    /// [`all_attestations`](Self::all_attestations), nothing collapses:
    /// same-digest claims all appear.
    pub fn attestation_pairs(&self) -> Vec<(Vec<u8>, Attestation)> {
        let mut pairs = Vec::new();

        for attestation in &self.attestations {
            pairs.push((self.msg.clone(), attestation.clone()));
        }
        for child in self.ops.values() {
            pairs.extend(child.attestation_pairs());
        }

        pairs
    }

    /// All (digest, attestation) pairs reachable from this node, as a map.
    ///
    /// Keyed by digest content: distinct paths that recompute an identical
    /// intermediate digest collapse to one entry, with the later-visited
    /// attestation winning.
    pub fn all_attestations(&self) -> HashMap<Vec<u8>, Attestation> {
        let mut map = HashMap::new();

        for attestation in &self.attestations {
            map.insert(self.msg.clone(), attestation.clone());
        }

        for child in self.ops.values() {
            map.extend(child.all_attestations());
        }

        map
    }

    /// The set of distinct attestations reachable from this node.
    pub fn attestation_set(&self) -> HashSet<Attestation> {
        self.attestation_pairs()
            .into_iter()
            .map(|(_, attestation)| attestation)
            .collect()
    }

    /// Digests of all nodes with no outgoing operations.
    pub fn all_tips(&self) -> HashSet<Vec<u8>> {
        let mut tips = HashSet::new();

        if self.ops.is_empty() {
            tips.insert(self.msg.clone());
        }
        for child in self.ops.values() {
            tips.extend(child.all_tips());
        }

        tips
    }

    /// True iff any reachable attestation is a block-header attestation.
    /// Pending and unknown claims alone do not complete a proof.
    pub fn is_complete(&self) -> bool {
        self.attestation_pairs()
            .iter()
            .any(|(_, attestation)| attestation.is_block_header())
    }

    /// Render the proof tree as indented text, one claim or edge per line.
    pub fn tree_string(&self, indent: usize) -> String {
        let pad = "    ".repeat(indent);
        let mut out = String::new();

        for attestation in &self.attestations {
            out.push_str(&format!("{pad}verify {attestation}\n"));
        }

        if self.ops.len() > 1 {
            for (op, child) in &self.ops {
                out.push_str(&format!("{pad} -> {op}\n"));
                out.push_str(&child.tree_string(indent + 1));
            }
        } else if let Some((op, child)) = self.ops.iter().next() {
            out.push_str(&format!("{pad}{op}\n"));
            out.push_str(&child.tree_string(indent));
        }

        out
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tree_string(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pending(uri: &str) -> Attestation {
        Attestation::Pending { uri: uri.to_string() }
    }

    fn bitcoin(height: u64) -> Attestation {
        Attestation::Bitcoin { height }
    }

    fn att_bytes(att: &Attestation) -> Vec<u8> {
        let mut s = Serializer::new();
        att.serialize(&mut s);
        s.into_vec()
    }

    /// Walk the tree asserting the digest-recomputation invariant.
    fn assert_invariant(stamp: &Timestamp) {
        for (op, child) in stamp.operations() {
            assert_eq!(child.msg(), op.call(stamp.msg()).as_slice());
            assert_invariant(child);
        }
    }

    #[test]
    fn test_add_dedups_exact_operation() {
        let mut stamp = Timestamp::new(vec![1; 32]);
        let first = stamp.add(Op::Sha256).msg().to_vec();
        let second = stamp.add(Op::Sha256).msg().to_vec();
        assert_eq!(first, second);
        assert_eq!(stamp.op_count(), 1);

        stamp.add(Op::Append(vec![0xaa]));
        assert_eq!(stamp.op_count(), 2);
    }

    #[test]
    fn test_serialize_pure_leaf_single_attestation() {
        let mut stamp = Timestamp::new(vec![2; 32]);
        let att = pending("https://cal.example.com");
        stamp.attest(att.clone());

        let mut expected = vec![0x00];
        expected.extend(att_bytes(&att));
        assert_eq!(stamp.serialize_to_vec(), expected);
    }

    #[test]
    fn test_serialize_two_attestations_no_ops() {
        let mut stamp = Timestamp::new(vec![2; 32]);
        let a = pending("https://a.example.com");
        let b = pending("https://b.example.com");
        // Attached out of canonical order; storage re-establishes it
        stamp.attest(b.clone());
        stamp.attest(a.clone());

        let mut expected = vec![0xff, 0x00];
        expected.extend(att_bytes(&a));
        expected.push(0x00);
        expected.extend(att_bytes(&b));
        assert_eq!(stamp.serialize_to_vec(), expected);
    }

    #[test]
    fn test_serialize_attestation_and_branch() {
        let mut stamp = Timestamp::new(vec![2; 32]);
        let att = bitcoin(100);
        stamp.attest(att.clone());
        let child_att = pending("https://cal.example.com");
        stamp.add(Op::Sha256).attest(child_att.clone());

        let mut expected = vec![0xff, 0x00];
        expected.extend(att_bytes(&att));
        expected.push(Op::TAG_SHA256);
        expected.push(0x00);
        expected.extend(att_bytes(&child_att));
        assert_eq!(stamp.serialize_to_vec(), expected);
    }

    #[test]
    fn test_serialize_two_branches_marker() {
        let mut stamp = Timestamp::new(vec![2; 32]);
        stamp.add(Op::Sha1).attest(pending("a"));
        stamp.add(Op::Sha256).attest(pending("b"));

        let bytes = stamp.serialize_to_vec();
        // First branch prefixed with 0xff, second (last) unprefixed;
        // canonical order puts sha1 (0x02) first
        assert_eq!(bytes[0], 0xff);
        assert_eq!(bytes[1], Op::TAG_SHA1);
    }

    #[test]
    fn test_roundtrip_attestations_added_out_of_order() {
        let msg = vec![11; 32];
        let mut stamp = Timestamp::new(msg.clone());
        stamp.attest(pending("https://b.example.com"));
        stamp.attest(pending("https://a.example.com"));

        let bytes = stamp.serialize_to_vec();
        let parsed = Timestamp::from_bytes(&bytes, msg).unwrap();
        assert_eq!(parsed, stamp);
    }

    #[test]
    fn test_roundtrip_nested_tree() {
        let msg = vec![3; 32];
        let mut stamp = Timestamp::new(msg.clone());
        stamp.attest(pending("https://direct.example.com"));
        let mid = stamp.add(Op::Append(vec![0x01, 0x02]));
        let tip = mid.add(Op::Sha256);
        tip.attest(bitcoin(812_386));
        tip.attest(pending("https://tip.example.com"));
        stamp.add(Op::Prepend(vec![0xfe])).attest(pending("https://other.example.com"));

        let bytes = stamp.serialize_to_vec();
        let parsed = Timestamp::from_bytes(&bytes, msg).unwrap();
        assert_eq!(parsed, stamp);
        assert_invariant(&parsed);
    }

    #[test]
    fn test_deserialize_recomputes_child_digests() {
        let msg = vec![4; 32];
        let mut stamp = Timestamp::new(msg.clone());
        stamp.add(Op::Sha256).attest(pending("x"));

        let bytes = stamp.serialize_to_vec();
        let parsed = Timestamp::from_bytes(&bytes, msg.clone()).unwrap();
        let (_, child) = parsed.operations().next().unwrap();
        assert_eq!(child.msg(), Op::Sha256.call(&msg).as_slice());

        // Parsing against a different initial message yields different
        // child digests: the stream is never trusted for them
        let other_msg = vec![5; 32];
        let reparsed = Timestamp::from_bytes(&bytes, other_msg.clone()).unwrap();
        let (_, child) = reparsed.operations().next().unwrap();
        assert_eq!(child.msg(), Op::Sha256.call(&other_msg).as_slice());
    }

    #[test]
    fn test_deserialize_truncated_fails() {
        let mut stamp = Timestamp::new(vec![6; 32]);
        stamp.add(Op::Sha256).attest(bitcoin(1));
        let bytes = stamp.serialize_to_vec();

        for cut in 0..bytes.len() {
            assert!(
                Timestamp::from_bytes(&bytes[..cut], vec![6; 32]).is_err(),
                "truncation at {cut} must fail"
            );
        }
    }

    #[test]
    fn test_deserialize_unknown_op_tag_fails() {
        // 0x42 is no operation tag and not an attestation marker
        let result = Timestamp::from_bytes(&[0x42], vec![1; 32]);
        assert_eq!(result, Err(CodecError::UnknownOperationTag(0x42)));
    }

    #[test]
    fn test_deserialize_depth_limited() {
        // A long chain of sha256 edges, one per recursion level
        let mut bytes = vec![Op::TAG_SHA256; MAX_DEPTH + 2];
        bytes.push(0x00);
        let att = bitcoin(1);
        bytes.extend(att_bytes(&att));

        let result = Timestamp::from_bytes(&bytes, vec![1; 32]);
        assert_eq!(result, Err(CodecError::RecursionLimit));
    }

    #[test]
    fn test_merge_requires_same_message() {
        let mut a = Timestamp::new(vec![1; 32]);
        let b = Timestamp::new(vec![2; 32]);
        assert_eq!(a.merge(b), Err(MergeError::MessageMismatch));
    }

    #[test]
    fn test_merge_identity_up_to_attestation_duplication() {
        let msg = vec![7; 32];
        let mut stamp = Timestamp::new(msg.clone());
        stamp.add(Op::Sha256).attest(bitcoin(5));
        stamp.attest(pending("a"));

        let copy = stamp.clone();
        let mut merged = stamp.clone();
        merged.merge(copy).unwrap();

        // Structure unchanged, direct attestations doubled
        assert_eq!(merged.op_count(), stamp.op_count());
        assert_eq!(merged.attestations().len(), 2);
        assert_eq!(merged.attestation_set(), stamp.attestation_set());
        assert_invariant(&merged);
    }

    #[test]
    fn test_merge_two_calendar_proofs() {
        // Two independent single-calendar proofs for the same digest
        let msg = vec![8; 32];

        let mut first = Timestamp::new(msg.clone());
        first.add(Op::Append(vec![0x01])).attest(pending("https://alice.example.com"));

        let mut second = Timestamp::new(msg.clone());
        second.add(Op::Append(vec![0x02])).attest(pending("https://bob.example.com"));

        first.merge(second).unwrap();

        assert_eq!(first.all_attestations().len(), 2);
        assert_invariant(&first);
        // Both branches start from the same root digest
        assert_eq!(first.msg(), msg.as_slice());
    }

    #[test]
    fn test_merge_direct_calendar_attestations() {
        // Two single-calendar proofs, each a bare root carrying its own
        // pending claim; merging keeps one tip, the shared digest
        let msg = vec![10; 32];

        let mut first = Timestamp::new(msg.clone());
        first.attest(pending("https://alice.example.com"));

        let mut second = Timestamp::new(msg.clone());
        second.attest(pending("https://bob.example.com"));

        first.merge(second).unwrap();

        assert_eq!(first.attestation_set().len(), 2);
        assert_eq!(first.all_tips(), HashSet::from([msg]));
    }

    #[test]
    fn test_merge_recomputes_grafted_children() {
        let msg = vec![9; 32];
        let mut ours = Timestamp::new(msg.clone());

        let mut theirs = Timestamp::new(msg.clone());
        theirs
            .add(Op::Sha256)
            .add(Op::Append(vec![0xcc]))
            .attest(bitcoin(77));

        ours.merge(theirs).unwrap();
        assert_invariant(&ours);
        assert!(ours.is_complete());
    }

    #[test]
    fn test_shrink_no_attestations_fails() {
        let mut stamp = Timestamp::new(vec![1; 32]);
        stamp.add(Op::Sha256);
        assert_eq!(stamp.shrink(), Err(ShrinkError::NoAttestations));
    }

    #[test]
    fn test_shrink_single_attestation_untouched() {
        let mut stamp = Timestamp::new(vec![1; 32]);
        stamp.add(Op::Sha256).attest(bitcoin(42));
        let before = stamp.clone();

        assert_eq!(stamp.shrink(), Ok(bitcoin(42)));
        assert_eq!(stamp, before);
    }

    #[test]
    fn test_shrink_flat_multi_attestation_leaf_fails() {
        let mut stamp = Timestamp::new(vec![1; 32]);
        stamp.attest(pending("a"));
        stamp.attest(pending("b"));
        assert_eq!(stamp.shrink(), Err(ShrinkError::NoBranches));
    }

    #[test]
    fn test_shrink_prefers_minimum_bitcoin_height() {
        let mut stamp = Timestamp::new(vec![1; 32]);
        stamp.add(Op::Append(vec![0x01])).attest(bitcoin(500));
        stamp.add(Op::Append(vec![0x02])).attest(bitcoin(100));
        stamp.add(Op::Append(vec![0x03])).attest(pending("c"));

        assert_eq!(stamp.shrink(), Ok(bitcoin(100)));
        // Only the branch carrying the chosen attestation survives
        assert_eq!(stamp.op_count(), 1);
        let (op, child) = stamp.operations().next().unwrap();
        assert_eq!(op, &Op::Append(vec![0x02]));
        assert_eq!(child.attestations(), &[bitcoin(100)]);
    }

    #[test]
    fn test_shrink_only_pending_returns_without_pruning() {
        let mut stamp = Timestamp::new(vec![1; 32]);
        stamp.add(Op::Append(vec![0x01])).attest(pending("a"));
        stamp.add(Op::Append(vec![0x02])).attest(pending("b"));
        let before_ops = stamp.op_count();

        let chosen = stamp.shrink().unwrap();
        assert!(matches!(chosen, Attestation::Pending { .. }));
        assert_eq!(stamp.op_count(), before_ops);
    }

    #[test]
    fn test_shrink_upgraded_branch_drops_stale_calendar() {
        // One branch still pending, the other upgraded to a Bitcoin claim
        let mut stamp = Timestamp::new(vec![1; 32]);
        stamp.add(Op::Append(vec![0x01])).attest(pending("https://stale.example.com"));
        let upgraded = stamp.add(Op::Append(vec![0x02]));
        upgraded.attest(pending("https://done.example.com"));
        upgraded.add(Op::Sha256).attest(bitcoin(812_386));

        let total_before = stamp.all_attestations().len();
        assert_eq!(total_before, 3);

        assert_eq!(stamp.shrink(), Ok(bitcoin(812_386)));
        // The stale branch is gone; the kept branch retains its own chain
        assert_eq!(stamp.all_attestations().len(), 2);
        assert!(stamp.is_complete());
    }

    #[test]
    fn test_shrink_idempotent_choice() {
        let mut stamp = Timestamp::new(vec![1; 32]);
        stamp.add(Op::Append(vec![0x01])).attest(pending("a"));
        let b = stamp.add(Op::Append(vec![0x02]));
        b.attest(pending("b"));
        b.add(Op::Sha256).attest(bitcoin(50));

        let first = stamp.shrink().unwrap();
        let second = stamp.shrink().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_directly_verified_stops_at_attested_nodes() {
        let mut stamp = Timestamp::new(vec![1; 32]);
        let mid = stamp.add(Op::Sha256);
        mid.attest(pending("mid"));
        // A deeper attestation below an attested node is not listed
        mid.add(Op::Sha1).attest(bitcoin(9));
        stamp.add(Op::Append(vec![0x05])).attest(bitcoin(3));

        let nodes = stamp.directly_verified();
        assert_eq!(nodes.len(), 2);
        for node in nodes {
            assert!(!node.attestations().is_empty());
        }
    }

    #[test]
    fn test_all_tips() {
        let msg = vec![1; 32];
        let mut stamp = Timestamp::new(msg.clone());
        assert_eq!(stamp.all_tips(), HashSet::from([msg.clone()]));

        stamp.add(Op::Sha256);
        stamp.add(Op::Sha1);
        let tips = stamp.all_tips();
        assert_eq!(tips.len(), 2);
        assert!(tips.contains(&Op::Sha256.call(&msg)));
        assert!(tips.contains(&Op::Sha1.call(&msg)));
        assert!(!tips.contains(&msg));
    }

    #[test]
    fn test_is_complete() {
        let mut stamp = Timestamp::new(vec![1; 32]);
        assert!(!stamp.is_complete());

        stamp.add(Op::Sha256).attest(pending("a"));
        assert!(!stamp.is_complete());

        let unknown = Attestation::Unknown { tag: [9; 8], payload: vec![1] };
        stamp.attest(unknown);
        assert!(!stamp.is_complete());

        stamp.add(Op::Sha1).attest(Attestation::Litecoin { height: 4 });
        assert!(stamp.is_complete());
    }

    #[test]
    fn test_tree_string_mentions_claims_and_edges() {
        let mut stamp = Timestamp::new(vec![1; 32]);
        let tip = stamp.add(Op::Sha256);
        tip.attest(bitcoin(812_386));

        let rendered = stamp.to_string();
        assert!(rendered.contains("sha256"));
        assert!(rendered.contains("BitcoinBlockHeaderAttestation(812386)"));
    }

    // === Property tests over arbitrary valid trees ===

    fn arb_attestation() -> impl Strategy<Value = Attestation> {
        prop_oneof![
            "[a-z]{1,12}".prop_map(|uri| Attestation::Pending { uri }),
            (0u64..1_000_000).prop_map(|height| Attestation::Bitcoin { height }),
            (0u64..1_000_000).prop_map(|height| Attestation::Litecoin { height }),
            (0u64..1_000_000).prop_map(|height| Attestation::Ethereum { height }),
        ]
    }

    fn arb_op() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Sha1),
            Just(Op::Sha256),
            prop::collection::vec(any::<u8>(), 1..8).prop_map(Op::Append),
            prop::collection::vec(any::<u8>(), 1..8).prop_map(Op::Prepend),
        ]
    }

    /// Structure of a tree without digests: attestations plus child shapes.
    /// Tips always carry at least one attestation so the tree serializes to
    /// a parseable stream.
    #[derive(Debug, Clone)]
    struct Shape {
        attestations: Vec<Attestation>,
        children: Vec<(Op, Shape)>,
    }

    fn arb_shape() -> impl Strategy<Value = Shape> {
        let leaf = prop::collection::vec(arb_attestation(), 1..3)
            .prop_map(|attestations| Shape { attestations, children: vec![] });

        leaf.prop_recursive(3, 12, 3, |inner| {
            (
                prop::collection::vec(arb_attestation(), 0..2),
                prop::collection::vec((arb_op(), inner), 1..3),
            )
                .prop_map(|(attestations, children)| Shape { attestations, children })
        })
    }

    fn realize(shape: &Shape, msg: Vec<u8>) -> Timestamp {
        let mut stamp = Timestamp::new(msg);
        for attestation in &shape.attestations {
            stamp.attest(attestation.clone());
        }
        for (op, child_shape) in &shape.children {
            let child_msg = op.call(stamp.msg());
            let child = realize(child_shape, child_msg);
            // Duplicate ops in the shape collapse; last one wins
            stamp.ops.insert(op.clone(), child);
        }
        stamp
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_serialize_roundtrip(shape in arb_shape(), msg in prop::collection::vec(any::<u8>(), 1..64)) {
            let stamp = realize(&shape, msg.clone());
            let bytes = stamp.serialize_to_vec();
            let parsed = Timestamp::from_bytes(&bytes, msg).unwrap();
            assert_invariant(&parsed);
            prop_assert_eq!(parsed, stamp);
        }

        #[test]
        fn prop_merge_self_preserves_structure(shape in arb_shape(), msg in prop::collection::vec(any::<u8>(), 1..64)) {
            let stamp = realize(&shape, msg);
            let mut merged = stamp.clone();
            merged.merge(stamp.clone()).unwrap();
            prop_assert_eq!(merged.attestation_set(), stamp.attestation_set());
            prop_assert_eq!(merged.all_tips(), stamp.all_tips());
            assert_invariant(&merged);
        }

        #[test]
        fn prop_merge_holds_invariant(
            a in arb_shape(),
            b in arb_shape(),
            msg in prop::collection::vec(any::<u8>(), 1..64)
        ) {
            let mut ours = realize(&a, msg.clone());
            let theirs = realize(&b, msg);
            ours.merge(theirs).unwrap();
            assert_invariant(&ours);
        }
    }
}
