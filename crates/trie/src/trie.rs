use crate::{
    nibbles::{bytes_to_nibbles, common_prefix, TERMINATOR},
    node::Node,
    storage::{get_node, TrieStorage},
    State, StateObject, TrieError,
};
use dogesync_primitives::{keccak256, Account, B256, EMPTY_ROOT_HASH, U256};
use std::sync::Arc;

/// An immutable snapshot of state at one root.
///
/// Updates return a new snapshot sharing unchanged subtrees; nothing is
/// persisted until [`Trie::commit`]. Interior nodes not touched since the
/// snapshot was loaded stay behind [`Node::Hash`] references and are
/// dereferenced from storage on demand.
#[derive(Clone)]
pub struct Trie {
    root: Option<Arc<Node>>,
    storage: Arc<dyn TrieStorage>,
}

impl Trie {
    pub(crate) fn empty(storage: Arc<dyn TrieStorage>) -> Self {
        Self { root: None, storage }
    }

    pub(crate) fn with_root(storage: Arc<dyn TrieStorage>, root: Arc<Node>) -> Self {
        Self { root: Some(root), storage }
    }

    /// Looks up the value stored under `key`.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, TrieError> {
        let path = bytes_to_nibbles(key);
        match &self.root {
            Some(root) => self.lookup(root, &path),
            None => Ok(None),
        }
    }

    /// Returns a snapshot with `key` set to `value`.
    pub fn update(&self, key: &[u8], value: Vec<u8>) -> Result<Self, TrieError> {
        let path = bytes_to_nibbles(key);
        let root = self.insert_at(self.root.clone(), &path, value)?;
        Ok(Self { root: Some(root), storage: Arc::clone(&self.storage) })
    }

    /// Returns a snapshot with `key` removed.
    pub fn delete(&self, key: &[u8]) -> Result<Self, TrieError> {
        let path = bytes_to_nibbles(key);
        let (root, _) = self.delete_at(self.root.clone(), &path)?;
        Ok(Self { root, storage: Arc::clone(&self.storage) })
    }

    /// The root hash of this snapshot, without persisting anything.
    pub fn root_hash(&self) -> B256 {
        match &self.root {
            Some(node) => {
                let mut scratch = Vec::new();
                node.hash_root(&mut scratch)
            }
            None => EMPTY_ROOT_HASH,
        }
    }

    /// Folds the modified objects of a state transition into this snapshot:
    /// storage slots into each account's storage trie, account leaves into
    /// the state trie, new code into the code table. All new nodes are
    /// written under their keccak256 in one batch.
    pub fn commit(
        &self,
        state: &State,
        objects: &[StateObject],
    ) -> Result<(Self, B256), TrieError> {
        let mut batch = Vec::new();
        let mut account_trie = self.clone();

        for object in objects {
            let account_key = keccak256(object.address.as_slice());

            if object.deleted {
                account_trie = account_trie.delete(account_key.as_slice())?;
                continue;
            }

            let mut storage_root = object.root;
            if !object.storage.is_empty() {
                let mut storage_trie = state.storage_snapshot_at(object.root)?;
                for (slot, value) in &object.storage {
                    let slot_key = keccak256(slot.as_slice());
                    if value.is_zero() {
                        storage_trie = storage_trie.delete(slot_key.as_slice())?;
                    } else {
                        let encoded = alloy_rlp::encode(U256::from_be_bytes(value.0));
                        storage_trie = storage_trie.update(slot_key.as_slice(), encoded)?;
                    }
                }
                storage_root = storage_trie.hash_into(&mut batch);
                state.add_account_state(storage_root, storage_trie);
            }

            if let Some(code) = &object.code {
                self.storage.set_code(object.code_hash, code)?;
            }

            let account = Account {
                nonce: object.nonce,
                balance: object.balance,
                storage_root,
                code_hash: object.code_hash,
            };
            account_trie = account_trie.update(account_key.as_slice(), alloy_rlp::encode(account))?;
        }

        let root = account_trie.hash_into(&mut batch);
        self.storage.write_nodes(&batch)?;
        state.add_trie_state(root, account_trie.clone());

        Ok((account_trie, root))
    }

    fn hash_into(&self, batch: &mut Vec<(B256, Vec<u8>)>) -> B256 {
        match &self.root {
            Some(node) => node.hash_root(batch),
            None => EMPTY_ROOT_HASH,
        }
    }

    fn resolve(&self, hash: B256) -> Result<Arc<Node>, TrieError> {
        get_node(self.storage.as_ref(), hash)?.ok_or(TrieError::DanglingNode(hash))
    }

    fn lookup(&self, node: &Arc<Node>, path: &[u8]) -> Result<Option<Vec<u8>>, TrieError> {
        match &**node {
            Node::Hash(hash) => {
                let resolved = self.resolve(*hash)?;
                self.lookup(&resolved, path)
            }
            Node::Value(value) => {
                Ok(path.is_empty().then(|| value.clone()))
            }
            Node::Short { key, child } => {
                if path.len() >= key.len() && path[..key.len()] == key[..] {
                    self.lookup(child, &path[key.len()..])
                } else {
                    Ok(None)
                }
            }
            Node::Full { children, value } => {
                if path[0] == TERMINATOR {
                    return Ok(value.clone());
                }
                match &children[path[0] as usize] {
                    Some(child) => self.lookup(child, &path[1..]),
                    None => Ok(None),
                }
            }
        }
    }

    fn insert_at(
        &self,
        node: Option<Arc<Node>>,
        path: &[u8],
        value: Vec<u8>,
    ) -> Result<Arc<Node>, TrieError> {
        let Some(node) = node else {
            return Ok(Node::leaf(path.to_vec(), value));
        };

        match &*node {
            Node::Hash(hash) => {
                let resolved = self.resolve(*hash)?;
                self.insert_at(Some(resolved), path, value)
            }
            Node::Value(_) => {
                // the whole path was consumed, this is a value replacement
                Ok(Arc::new(Node::Value(value)))
            }
            Node::Short { key, child } => {
                let shared = common_prefix(key, path);
                if shared == key.len() {
                    let child = self.insert_at(Some(Arc::clone(child)), &path[shared..], value)?;
                    return Ok(Arc::new(Node::Short { key: key.clone(), child }));
                }

                // diverged: branch at the first differing nibble
                let mut children: [Option<Arc<Node>>; 16] = Default::default();
                let mut branch_value = None;

                let existing = key[shared];
                if existing == TERMINATOR {
                    let Node::Value(existing_value) = &**child else {
                        return Err(TrieError::CorruptNode("leaf without value child"));
                    };
                    branch_value = Some(existing_value.clone());
                } else if key.len() == shared + 1 {
                    children[existing as usize] = Some(Arc::clone(child));
                } else {
                    children[existing as usize] = Some(Arc::new(Node::Short {
                        key: key[shared + 1..].to_vec(),
                        child: Arc::clone(child),
                    }));
                }

                let incoming = path[shared];
                if incoming == TERMINATOR {
                    branch_value = Some(value);
                } else {
                    children[incoming as usize] =
                        Some(Node::leaf(path[shared + 1..].to_vec(), value));
                }

                let full = Arc::new(Node::Full { children, value: branch_value });
                if shared > 0 {
                    Ok(Arc::new(Node::Short { key: path[..shared].to_vec(), child: full }))
                } else {
                    Ok(full)
                }
            }
            Node::Full { children, value: branch_value } => {
                if path[0] == TERMINATOR {
                    return Ok(Arc::new(Node::Full {
                        children: children.clone(),
                        value: Some(value),
                    }));
                }

                let index = path[0] as usize;
                let child = self.insert_at(children[index].clone(), &path[1..], value)?;
                let mut children = children.clone();
                children[index] = Some(child);
                Ok(Arc::new(Node::Full { children, value: branch_value.clone() }))
            }
        }
    }

    /// Removes `path`, returning the replacement node and whether anything
    /// changed.
    fn delete_at(
        &self,
        node: Option<Arc<Node>>,
        path: &[u8],
    ) -> Result<(Option<Arc<Node>>, bool), TrieError> {
        let Some(node) = node else { return Ok((None, false)) };

        match &*node {
            Node::Hash(hash) => {
                let resolved = self.resolve(*hash)?;
                self.delete_at(Some(resolved), path)
            }
            Node::Value(_) => Ok((None, true)),
            Node::Short { key, child } => {
                if path.len() < key.len() || path[..key.len()] != key[..] {
                    return Ok((Some(node), false));
                }

                let (new_child, changed) =
                    self.delete_at(Some(Arc::clone(child)), &path[key.len()..])?;
                if !changed {
                    return Ok((Some(node), false));
                }

                match new_child {
                    None => Ok((None, true)),
                    Some(child) => Ok((Some(self.merge_short(key.clone(), child)?), true)),
                }
            }
            Node::Full { children, value } => {
                let mut children = children.clone();
                let mut value = value.clone();

                if path[0] == TERMINATOR {
                    if value.is_none() {
                        return Ok((Some(node), false));
                    }
                    value = None;
                } else {
                    let index = path[0] as usize;
                    let (new_child, changed) =
                        self.delete_at(children[index].clone(), &path[1..])?;
                    if !changed {
                        return Ok((Some(node), false));
                    }
                    children[index] = new_child;
                }

                let remaining: Vec<usize> =
                    (0..16).filter(|i| children[*i].is_some()).collect();

                let collapsed = if remaining.is_empty() {
                    value.map(|v| Node::leaf(vec![TERMINATOR], v))
                } else if remaining.len() == 1 && value.is_none() {
                    // a branch with a single child folds into a short node
                    let index = remaining[0];
                    let child = children[index].take().expect("child present");
                    let child = match &*child {
                        Node::Hash(hash) => self.resolve(*hash)?,
                        _ => child,
                    };
                    Some(self.merge_short(vec![index as u8], child)?)
                } else {
                    Some(Arc::new(Node::Full { children, value }))
                };

                Ok((collapsed, true))
            }
        }
    }

    /// A short node over `key` and `child`, concatenating paths when the
    /// child is itself a short node.
    fn merge_short(&self, mut key: Vec<u8>, child: Arc<Node>) -> Result<Arc<Node>, TrieError> {
        match &*child {
            Node::Short { key: child_key, child: grandchild } => {
                key.extend_from_slice(child_key);
                Ok(Arc::new(Node::Short { key, child: Arc::clone(grandchild) }))
            }
            _ => Ok(Arc::new(Node::Short { key, child })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::State;
    use dogesync_kvdb::{Database, MemDb, TRIE_DBI};
    use dogesync_primitives::Address;

    fn state() -> State {
        State::new(Arc::new(crate::KvTrieStorage::new(Arc::new(MemDb::new()))))
    }

    #[test]
    fn insert_get_delete() {
        let state = state();
        let trie = state.new_snapshot();

        let trie = trie.update(b"dog", b"puppy".to_vec()).unwrap();
        let trie = trie.update(b"doge", b"coin".to_vec()).unwrap();
        let trie = trie.update(b"horse", b"stallion".to_vec()).unwrap();

        assert_eq!(trie.get(b"dog").unwrap(), Some(b"puppy".to_vec()));
        assert_eq!(trie.get(b"doge").unwrap(), Some(b"coin".to_vec()));
        assert_eq!(trie.get(b"horse").unwrap(), Some(b"stallion".to_vec()));
        assert_eq!(trie.get(b"cat").unwrap(), None);

        let trie = trie.delete(b"doge").unwrap();
        assert_eq!(trie.get(b"doge").unwrap(), None);
        assert_eq!(trie.get(b"dog").unwrap(), Some(b"puppy".to_vec()));
    }

    #[test]
    fn update_does_not_disturb_earlier_snapshot() {
        let state = state();
        let base = state.new_snapshot().update(b"key", b"one".to_vec()).unwrap();
        let updated = base.update(b"key", b"two".to_vec()).unwrap();

        assert_eq!(base.get(b"key").unwrap(), Some(b"one".to_vec()));
        assert_eq!(updated.get(b"key").unwrap(), Some(b"two".to_vec()));
        assert_ne!(base.root_hash(), updated.root_hash());
    }

    #[test]
    fn commit_then_reload_by_root() {
        let db = Arc::new(MemDb::new());
        let state = State::new(Arc::new(crate::KvTrieStorage::new(db.clone())));

        let object = StateObject {
            balance: U256::from(1000u64),
            nonce: 3,
            ..StateObject::new(Address::repeat_byte(0xaa))
        };

        let snapshot = state.new_snapshot();
        let (committed, root) = snapshot.commit(&state, &[object]).unwrap();
        assert_ne!(root, EMPTY_ROOT_HASH);
        assert_eq!(committed.root_hash(), root);

        // a fresh snapshot at the committed root sees the account
        let reloaded = state.new_snapshot_at(root).unwrap();
        let raw = reloaded.get(keccak256(Address::repeat_byte(0xaa).as_slice()).as_slice());
        let raw = raw.unwrap().expect("account leaf present");
        let account =
            <Account as alloy_rlp::Decodable>::decode(&mut raw.as_slice()).unwrap();
        assert_eq!(account.balance, U256::from(1000u64));
        assert_eq!(account.nonce, 3);

        // every persisted node is content-addressed
        let node = db.get(TRIE_DBI, root.as_slice()).unwrap().expect("root node stored");
        assert_eq!(keccak256(&node), root);
    }

    #[test]
    fn empty_commit_is_identity() {
        let state = state();
        let snapshot = state.new_snapshot();
        let object = StateObject {
            balance: U256::from(5u64),
            ..StateObject::new(Address::repeat_byte(1))
        };
        let (snapshot, root) = snapshot.commit(&state, &[object]).unwrap();

        let (_, root_again) = snapshot.commit(&state, &[]).unwrap();
        assert_eq!(root, root_again);
    }

    #[test]
    fn storage_slots_roll_into_account_root() {
        let state = state();
        let address = Address::repeat_byte(0xcc);

        let with_storage = StateObject {
            storage: vec![(B256::with_last_byte(1), B256::with_last_byte(9))],
            ..StateObject::new(address)
        };
        let (_, root_a) = state.new_snapshot().commit(&state, &[with_storage]).unwrap();

        let without_storage = StateObject::new(address);
        let (_, root_b) = state.new_snapshot().commit(&state, &[without_storage]).unwrap();

        assert_ne!(root_a, root_b);
    }
}
