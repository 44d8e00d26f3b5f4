use crate::{
    nibbles::{self, encode_compact},
    TrieError,
};
use alloy_rlp::Encodable;
use dogesync_primitives::{keccak256, B256};
use std::sync::Arc;

/// A trie node. Nodes are immutable; updates path-copy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    /// A reference to a node stored under its hash, dereferenced on demand.
    Hash(B256),
    /// Leaf or extension: a shared nibble path over a single child. Leaf
    /// paths carry the terminator nibble and always hold a [`Node::Value`].
    Short { key: Vec<u8>, child: Arc<Node> },
    /// Branch node: one child per nibble plus an optional value.
    Full { children: [Option<Arc<Node>>; 16], value: Option<Vec<u8>> },
    /// Raw value bytes.
    Value(Vec<u8>),
}

impl Node {
    pub fn leaf(key: Vec<u8>, value: Vec<u8>) -> Arc<Self> {
        Arc::new(Node::Short { key, child: Arc::new(Node::Value(value)) })
    }

    /// Encodes the node, appending every node whose encoding reaches hash
    /// size to `batch` under its keccak256. The returned bytes are the
    /// node's own encoding (which the parent may inline).
    pub fn encode(&self, batch: &mut Vec<(B256, Vec<u8>)>) -> Vec<u8> {
        match self {
            Node::Hash(hash) => {
                let mut out = Vec::with_capacity(33);
                hash.encode(&mut out);
                out
            }
            Node::Value(value) => {
                let mut out = Vec::with_capacity(value.len() + 3);
                value.as_slice().encode(&mut out);
                out
            }
            Node::Short { key, child } => {
                let mut payload = Vec::new();
                encode_compact(key).as_slice().encode(&mut payload);
                match &**child {
                    // leaf values are part of the node, never hashed out
                    Node::Value(value) => value.as_slice().encode(&mut payload),
                    _ => {
                        let child_encoded = child.encode(batch);
                        payload.extend_from_slice(&child_ref(child_encoded, batch));
                    }
                }

                wrap_list(payload)
            }
            Node::Full { children, value } => {
                let mut payload = Vec::new();
                for child in children {
                    match child {
                        Some(child) => {
                            let encoded = child.encode(batch);
                            payload.extend_from_slice(&child_ref(encoded, batch));
                        }
                        None => payload.push(alloy_rlp::EMPTY_STRING_CODE),
                    }
                }
                match value {
                    Some(value) => value.as_slice().encode(&mut payload),
                    None => payload.push(alloy_rlp::EMPTY_STRING_CODE),
                }

                wrap_list(payload)
            }
        }
    }

    /// Hashes the node as a root: the encoding is always persisted under its
    /// keccak256, regardless of size.
    pub fn hash_root(&self, batch: &mut Vec<(B256, Vec<u8>)>) -> B256 {
        let encoded = self.encode(batch);
        let hash = keccak256(&encoded);
        if !batch.iter().any(|(h, _)| *h == hash) {
            batch.push((hash, encoded));
        }
        hash
    }
}

/// The reference a parent stores for a child: the raw encoding when it is
/// shorter than a hash, the hash string otherwise.
fn child_ref(encoded: Vec<u8>, batch: &mut Vec<(B256, Vec<u8>)>) -> Vec<u8> {
    if encoded.len() < 32 {
        return encoded;
    }

    let hash = keccak256(&encoded);
    batch.push((hash, encoded));

    let mut out = Vec::with_capacity(33);
    hash.encode(&mut out);
    out
}

fn wrap_list(payload: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 4);
    alloy_rlp::Header { list: true, payload_length: payload.len() }.encode(&mut out);
    out.extend_from_slice(&payload);
    out
}

/// Decodes a stored node encoding.
pub fn decode_node(buf: &[u8]) -> Result<Arc<Node>, TrieError> {
    let mut slice = buf;
    let node = parse_node(&mut slice)?;
    if !slice.is_empty() {
        return Err(TrieError::CorruptNode("trailing bytes after node"));
    }
    Ok(node)
}

fn parse_node(buf: &mut &[u8]) -> Result<Arc<Node>, TrieError> {
    let header = alloy_rlp::Header::decode(buf)?;
    let payload = &buf[..header.payload_length];
    *buf = &buf[header.payload_length..];

    if !header.list {
        // bare bytes are a hash reference
        if payload.len() != 32 {
            return Err(TrieError::CorruptNode("reference is not 32 bytes"));
        }
        return Ok(Arc::new(Node::Hash(B256::from_slice(payload))));
    }

    let items = split_items(payload)?;
    match items.len() {
        2 => {
            let RawItem::Str(compact) = items[0] else {
                return Err(TrieError::CorruptNode("short key expected to be bytes"));
            };
            let key = nibbles::decode_compact(compact)
                .ok_or(TrieError::CorruptNode("invalid compact key"))?;

            let child = if nibbles::has_terminator(&key) {
                let RawItem::Str(value) = items[1] else {
                    return Err(TrieError::CorruptNode("leaf value expected to be bytes"));
                };
                Arc::new(Node::Value(value.to_vec()))
            } else {
                item_to_node(&items[1])?
                    .ok_or(TrieError::CorruptNode("extension without child"))?
            };

            Ok(Arc::new(Node::Short { key, child }))
        }
        17 => {
            let mut children: [Option<Arc<Node>>; 16] = Default::default();
            for (i, item) in items[..16].iter().enumerate() {
                children[i] = item_to_node(item)?;
            }
            let RawItem::Str(value) = items[16] else {
                return Err(TrieError::CorruptNode("branch value expected to be bytes"));
            };
            let value = (!value.is_empty()).then(|| value.to_vec());

            Ok(Arc::new(Node::Full { children, value }))
        }
        _ => Err(TrieError::CorruptNode("node has incorrect number of items")),
    }
}

#[derive(Clone, Copy)]
enum RawItem<'a> {
    /// String payload.
    Str(&'a [u8]),
    /// Full encoding of an inline list item.
    List(&'a [u8]),
}

fn item_to_node(item: &RawItem<'_>) -> Result<Option<Arc<Node>>, TrieError> {
    match item {
        RawItem::Str(s) if s.is_empty() => Ok(None),
        RawItem::Str(s) if s.len() == 32 => Ok(Some(Arc::new(Node::Hash(B256::from_slice(s))))),
        RawItem::Str(_) => Err(TrieError::CorruptNode("child reference is not 32 bytes")),
        RawItem::List(encoding) => {
            let mut slice = *encoding;
            parse_node(&mut slice).map(Some)
        }
    }
}

fn split_items(mut payload: &[u8]) -> Result<Vec<RawItem<'_>>, TrieError> {
    let mut items = Vec::new();
    while !payload.is_empty() {
        let start = payload;
        let header = alloy_rlp::Header::decode(&mut payload)?;
        if header.payload_length > payload.len() {
            return Err(TrieError::CorruptNode("item length overflow"));
        }

        if header.list {
            let header_len = start.len() - payload.len();
            items.push(RawItem::List(&start[..header_len + header.payload_length]));
        } else {
            items.push(RawItem::Str(&payload[..header.payload_length]));
        }
        payload = &payload[header.payload_length..];
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nibbles::bytes_to_nibbles;

    #[test]
    fn leaf_roundtrip() {
        let node = Node::leaf(bytes_to_nibbles(b"key"), b"some longer value to exceed inline".to_vec());
        let mut batch = Vec::new();
        let encoded = node.encode(&mut batch);
        let decoded = decode_node(&encoded).unwrap();
        assert_eq!(*decoded, *node);
    }

    #[test]
    fn branch_roundtrip_with_hashed_children() {
        let mut children: [Option<Arc<Node>>; 16] = Default::default();
        children[3] = Some(Node::leaf(vec![1, 2, nibbles::TERMINATOR], vec![0xaa; 40]));
        children[7] = Some(Arc::new(Node::Hash(B256::repeat_byte(7))));
        let node = Node::Full { children, value: None };

        let mut batch = Vec::new();
        let encoded = node.encode(&mut batch);
        // the large leaf was hashed out of line
        assert_eq!(batch.len(), 1);

        let decoded = decode_node(&encoded).unwrap();
        let Node::Full { children, .. } = &*decoded else { panic!("expected branch") };
        assert_eq!(children[7], Some(Arc::new(Node::Hash(B256::repeat_byte(7)))));
        // the hashed child decodes back as a reference
        assert_eq!(children[3], Some(Arc::new(Node::Hash(batch[0].0))));
    }

    #[test]
    fn content_addressing_holds_for_batch() {
        let node = Node::leaf(bytes_to_nibbles(b"content"), vec![0x55; 64]);
        let mut batch = Vec::new();
        node.hash_root(&mut batch);
        for (hash, encoding) in &batch {
            assert_eq!(*hash, keccak256(encoding));
        }
    }
}
