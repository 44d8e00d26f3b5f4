//! Ordered Merkle-Patricia roots for transactions and receipts.

use crate::{keccak256, Receipt, Transaction, B256, EMPTY_ROOT_HASH};
use alloy_rlp::Encodable;

/// Computes the root of a trie keyed by `rlp(index)`, the shape consensus
/// mandates for transaction and receipt roots.
pub fn ordered_trie_root(items: &[Vec<u8>]) -> B256 {
    if items.is_empty() {
        return EMPTY_ROOT_HASH;
    }

    let entries: Vec<(Vec<u8>, &[u8])> = items
        .iter()
        .enumerate()
        .map(|(index, item)| (nibbles(&alloy_rlp::encode(index as u64)), item.as_slice()))
        .collect();

    keccak256(build_node(&entries, 0))
}

/// Merkle root of a block body's transactions.
pub fn calculate_transactions_root(transactions: &[Transaction]) -> B256 {
    ordered_trie_root(&transactions.iter().map(alloy_rlp::encode).collect::<Vec<_>>())
}

/// Merkle root of the receipts' consensus encodings.
pub fn calculate_receipts_root(receipts: &[Receipt]) -> B256 {
    ordered_trie_root(&receipts.iter().map(Receipt::consensus_encode).collect::<Vec<_>>())
}

fn nibbles(key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(key.len() * 2);
    for byte in key {
        out.push(byte >> 4);
        out.push(byte & 0x0f);
    }
    out
}

/// Hex-prefix encoding of a nibble slice.
fn hex_prefix(nibbles: &[u8], leaf: bool) -> Vec<u8> {
    let mut flag = if leaf { 2u8 } else { 0u8 };
    let mut out = Vec::with_capacity(nibbles.len() / 2 + 1);

    let rest = if nibbles.len() % 2 == 1 {
        flag += 1;
        out.push((flag << 4) | nibbles[0]);
        &nibbles[1..]
    } else {
        out.push(flag << 4);
        nibbles
    };

    for pair in rest.chunks(2) {
        out.push((pair[0] << 4) | pair[1]);
    }
    out
}

/// RLP encoding of the node covering `entries` below `depth` consumed
/// nibbles. Keys are `rlp(index)` encodings and therefore prefix-free, so no
/// key ever terminates inside a branch.
fn build_node(entries: &[(Vec<u8>, &[u8])], depth: usize) -> Vec<u8> {
    debug_assert!(!entries.is_empty());

    if entries.len() == 1 {
        let (key, value) = &entries[0];
        return encode_pair(&hex_prefix(&key[depth..], true), &encode_str(value));
    }

    // shared prefix below the consumed depth
    let first = &entries[0].0;
    let mut common = first.len() - depth;
    for (key, _) in &entries[1..] {
        let mut shared = 0;
        while shared < common && key[depth + shared] == first[depth + shared] {
            shared += 1;
        }
        common = shared;
    }

    if common > 0 {
        let child = child_ref(build_node(entries, depth + common));
        return encode_pair(&hex_prefix(&first[depth..depth + common], false), &child);
    }

    // branch on the next nibble
    let mut slots: [Vec<u8>; 16] = Default::default();
    for nibble in 0u8..16 {
        let subset: Vec<_> =
            entries.iter().filter(|(key, _)| key[depth] == nibble).cloned().collect();
        if !subset.is_empty() {
            slots[nibble as usize] = child_ref(build_node(&subset, depth + 1));
        }
    }

    let mut payload = Vec::new();
    for slot in &slots {
        if slot.is_empty() {
            payload.push(alloy_rlp::EMPTY_STRING_CODE);
        } else {
            payload.extend_from_slice(slot);
        }
    }
    payload.push(alloy_rlp::EMPTY_STRING_CODE); // no branch value

    let mut out = Vec::new();
    alloy_rlp::Header { list: true, payload_length: payload.len() }.encode(&mut out);
    out.extend_from_slice(&payload);
    out
}

/// A node reference as stored in its parent: inlined when shorter than a
/// hash, a 32-byte hash string otherwise.
fn child_ref(node: Vec<u8>) -> Vec<u8> {
    if node.len() < 32 {
        node
    } else {
        encode_str(keccak256(&node).as_slice())
    }
}

fn encode_str(value: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len() + 1);
    value.encode(&mut out);
    out
}

/// RLP list of a hex-prefixed path and an already-encoded second item.
fn encode_pair(path: &[u8], second_encoded: &[u8]) -> Vec<u8> {
    let mut payload = Vec::new();
    path.encode(&mut payload);
    payload.extend_from_slice(second_encoded);

    let mut out = Vec::new();
    alloy_rlp::Header { list: true, payload_length: payload.len() }.encode(&mut out);
    out.extend_from_slice(&payload);
    out
}
