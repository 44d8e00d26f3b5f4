use crate::{encode_varint, decode_varint, rlp_err, RawDbError, Snapshot};
use alloy_rlp::Decodable;
use dogesync_kvdb::{
    Database, ASSIST_DBI, BLOCK_DBI, CODE_DBI, HEAD_DBI, NUMHASH_DBI, RECEIPTS_DBI, SNAP_DBI,
    TD_DBI, TXES_DBI,
};
use dogesync_primitives::{
    keccak256, BlockNumber, Header, Receipt, SealedHeader, Transaction, TxHash, B256,
};

const HEAD_KEY: &[u8] = b"head";
const NUMBER_KEY: &[u8] = b"number";

// Headers

pub fn write_header(db: &dyn Database, header: &SealedHeader) -> Result<(), RawDbError> {
    Ok(db.set(HEAD_DBI, header.hash().as_slice(), alloy_rlp::encode(header.header()))?)
}

pub fn read_header(db: &dyn Database, hash: B256) -> Result<Option<SealedHeader>, RawDbError> {
    let Some(raw) = db.get(HEAD_DBI, hash.as_slice())? else { return Ok(None) };
    let header = Header::decode(&mut raw.as_slice()).map_err(rlp_err("header"))?;
    Ok(Some(SealedHeader::new(header, hash)))
}

/// The stored RLP bytes of a header, as served to peers.
pub fn read_raw_header(db: &dyn Database, hash: B256) -> Result<Option<Vec<u8>>, RawDbError> {
    Ok(db.get(HEAD_DBI, hash.as_slice())?)
}

// Bodies

/// Persists the body index of a block: the ordered tx hashes, concatenated.
/// Empty bodies are not written; absence of the record means "no body".
pub fn write_body(
    db: &dyn Database,
    hash: B256,
    transactions: &[Transaction],
) -> Result<(), RawDbError> {
    if transactions.is_empty() {
        return Ok(());
    }

    let mut blob = Vec::with_capacity(transactions.len() * 32);
    for tx in transactions {
        blob.extend_from_slice(tx.hash().as_slice());
    }
    Ok(db.set(BLOCK_DBI, hash.as_slice(), blob)?)
}

/// The ordered tx hashes of a block's body. The stored blob is sliced, not
/// parsed; anything that is not an exact multiple of 32 bytes is corrupt.
pub fn read_body(db: &dyn Database, hash: B256) -> Result<Option<Vec<TxHash>>, RawDbError> {
    let Some(blob) = db.get(BLOCK_DBI, hash.as_slice())? else { return Ok(None) };
    if blob.len() % 32 != 0 {
        return Err(RawDbError::CorruptBody(blob.len()));
    }

    Ok(Some(blob.chunks_exact(32).map(TxHash::from_slice).collect()))
}

// Transactions

pub fn write_transaction(db: &dyn Database, tx: &Transaction) -> Result<(), RawDbError> {
    Ok(db.set(TXES_DBI, tx.hash().as_slice(), alloy_rlp::encode(tx))?)
}

pub fn write_transactions(db: &dyn Database, txes: &[Transaction]) -> Result<(), RawDbError> {
    let mut batch = db.batch();
    for tx in txes {
        batch.set(TXES_DBI, tx.hash().as_slice(), &alloy_rlp::encode(tx));
    }
    Ok(batch.write()?)
}

pub fn read_transaction(db: &dyn Database, hash: TxHash) -> Result<Option<Transaction>, RawDbError> {
    let Some(raw) = db.get(TXES_DBI, hash.as_slice())? else { return Ok(None) };
    Ok(Some(Transaction::decode(&mut raw.as_slice()).map_err(rlp_err("transaction"))?))
}

// Receipts

pub fn write_receipts(db: &dyn Database, receipts: &[Receipt]) -> Result<(), RawDbError> {
    let mut batch = db.batch();
    for receipt in receipts {
        batch.set(RECEIPTS_DBI, receipt.tx_hash.as_slice(), &alloy_rlp::encode(receipt));
    }
    Ok(batch.write()?)
}

pub fn read_receipt(db: &dyn Database, tx_hash: TxHash) -> Result<Option<Receipt>, RawDbError> {
    let Some(raw) = db.get(RECEIPTS_DBI, tx_hash.as_slice())? else { return Ok(None) };
    Ok(Some(Receipt::decode(&mut raw.as_slice()).map_err(rlp_err("receipt"))?))
}

// Canonical index and head pointer

pub fn write_canonical_hash(
    db: &dyn Database,
    number: BlockNumber,
    hash: B256,
) -> Result<(), RawDbError> {
    Ok(db.set(NUMHASH_DBI, &encode_varint(number), hash.as_slice().to_vec())?)
}

pub fn read_canonical_hash(
    db: &dyn Database,
    number: BlockNumber,
) -> Result<Option<B256>, RawDbError> {
    Ok(db.get(NUMHASH_DBI, &encode_varint(number))?.map(|raw| B256::from_slice(&raw)))
}

pub fn write_head_hash(db: &dyn Database, hash: B256) -> Result<(), RawDbError> {
    Ok(db.set(ASSIST_DBI, HEAD_KEY, hash.as_slice().to_vec())?)
}

pub fn read_head_hash(db: &dyn Database) -> Result<Option<B256>, RawDbError> {
    Ok(db.get(ASSIST_DBI, HEAD_KEY)?.map(|raw| B256::from_slice(&raw)))
}

pub fn write_head_number(db: &dyn Database, number: BlockNumber) -> Result<(), RawDbError> {
    Ok(db.set(ASSIST_DBI, NUMBER_KEY, encode_varint(number))?)
}

pub fn read_head_number(db: &dyn Database) -> Result<Option<BlockNumber>, RawDbError> {
    let Some(raw) = db.get(ASSIST_DBI, NUMBER_KEY)? else { return Ok(None) };
    let (number, _) = decode_varint(&raw).ok_or(RawDbError::CorruptVarint)?;
    Ok(Some(number))
}

// Total difficulty

pub fn write_td(db: &dyn Database, hash: B256, td: u64) -> Result<(), RawDbError> {
    Ok(db.set(TD_DBI, hash.as_slice(), encode_varint(td))?)
}

pub fn read_td(db: &dyn Database, hash: B256) -> Result<Option<u64>, RawDbError> {
    let Some(raw) = db.get(TD_DBI, hash.as_slice())? else { return Ok(None) };
    let (td, _) = decode_varint(&raw).ok_or(RawDbError::CorruptVarint)?;
    Ok(Some(td))
}

// Consensus snapshots

pub fn write_snapshot(db: &dyn Database, snapshot: &Snapshot) -> Result<(), RawDbError> {
    let raw = rmp_serde::to_vec(snapshot)?;
    Ok(db.set(SNAP_DBI, &encode_varint(snapshot.number), raw)?)
}

pub fn read_snapshot(db: &dyn Database, number: BlockNumber) -> Result<Option<Snapshot>, RawDbError> {
    let Some(raw) = db.get(SNAP_DBI, &encode_varint(number))? else { return Ok(None) };
    Ok(Some(rmp_serde::from_slice(&raw)?))
}

// Contract code

pub fn write_code(db: &dyn Database, code: &[u8]) -> Result<B256, RawDbError> {
    let hash = keccak256(code);
    db.set(CODE_DBI, hash.as_slice(), code.to_vec())?;
    Ok(hash)
}

pub fn read_code(db: &dyn Database, hash: B256) -> Result<Option<Vec<u8>>, RawDbError> {
    Ok(db.get(CODE_DBI, hash.as_slice())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dogesync_kvdb::MemDb;
    use dogesync_primitives::{Address, ReceiptStatus, U256};

    fn tx(nonce: u64) -> Transaction {
        Transaction {
            nonce,
            gas_price: U256::from(1u64),
            gas: 21_000,
            to: Some(Address::repeat_byte(2)),
            value: U256::from(3u64),
            v: 27,
            r: U256::from(4u64),
            s: U256::from(5u64),
            ..Default::default()
        }
    }

    #[test]
    fn header_roundtrip() {
        let db = MemDb::new();
        let header = Header { number: 12, gas_limit: 8_000_000, ..Default::default() }.seal();

        write_header(&db, &header).unwrap();
        let read = read_header(&db, header.hash()).unwrap().unwrap();
        assert_eq!(read, header);
        assert_eq!(read_header(&db, B256::repeat_byte(9)).unwrap(), None);

        // the stored blob is exactly the header RLP, as served to peers
        let raw = read_raw_header(&db, header.hash()).unwrap().unwrap();
        assert_eq!(raw, alloy_rlp::encode(header.header()));
    }

    #[test]
    fn body_is_sliced_into_hashes() {
        let db = MemDb::new();
        let txes = vec![tx(0), tx(1), tx(2)];
        let hash = B256::repeat_byte(1);

        write_body(&db, hash, &txes).unwrap();
        let hashes = read_body(&db, hash).unwrap().unwrap();
        assert_eq!(hashes, txes.iter().map(Transaction::hash).collect::<Vec<_>>());
    }

    #[test]
    fn empty_body_is_not_written() {
        let db = MemDb::new();
        write_body(&db, B256::repeat_byte(1), &[]).unwrap();
        assert_eq!(read_body(&db, B256::repeat_byte(1)).unwrap(), None);
    }

    #[test]
    fn misaligned_body_is_corrupt() {
        let db = MemDb::new();
        let hash = B256::repeat_byte(1);
        db.set(dogesync_kvdb::BLOCK_DBI, hash.as_slice(), vec![0u8; 33]).unwrap();
        assert!(matches!(read_body(&db, hash), Err(RawDbError::CorruptBody(33))));
    }

    #[test]
    fn transactions_and_receipts_roundtrip() {
        let db = MemDb::new();
        let txes = vec![tx(0), tx(1)];
        write_transactions(&db, &txes).unwrap();
        assert_eq!(read_transaction(&db, txes[1].hash()).unwrap().unwrap(), txes[1]);

        let receipt = Receipt {
            status: Some(ReceiptStatus::Success),
            cumulative_gas_used: 21_000,
            gas_used: 21_000,
            tx_hash: txes[0].hash(),
            ..Default::default()
        };
        write_receipts(&db, std::slice::from_ref(&receipt)).unwrap();
        assert_eq!(read_receipt(&db, txes[0].hash()).unwrap().unwrap(), receipt);
    }

    #[test]
    fn head_and_canonical_pointers() {
        let db = MemDb::new();
        let hash = B256::repeat_byte(7);

        write_canonical_hash(&db, 42, hash).unwrap();
        write_head_hash(&db, hash).unwrap();
        write_head_number(&db, 42).unwrap();
        write_td(&db, hash, 43).unwrap();

        assert_eq!(read_canonical_hash(&db, 42).unwrap(), Some(hash));
        assert_eq!(read_canonical_hash(&db, 41).unwrap(), None);
        assert_eq!(read_head_hash(&db).unwrap(), Some(hash));
        assert_eq!(read_head_number(&db).unwrap(), Some(42));
        assert_eq!(read_td(&db, hash).unwrap(), Some(43));
    }

    #[test]
    fn snapshot_roundtrip() {
        let db = MemDb::new();
        let snapshot = Snapshot {
            number: 5,
            hash: B256::repeat_byte(5).to_string(),
            votes: vec![],
            set: vec![Address::repeat_byte(1), Address::repeat_byte(2)],
        };

        write_snapshot(&db, &snapshot).unwrap();
        assert_eq!(read_snapshot(&db, 5).unwrap().unwrap(), snapshot);
        assert_eq!(read_snapshot(&db, 6).unwrap(), None);
    }

    #[test]
    fn code_is_content_addressed() {
        let db = MemDb::new();
        let code = vec![0x60, 0x00, 0x60, 0x00, 0xf3];
        let hash = write_code(&db, &code).unwrap();
        assert_eq!(hash, keccak256(&code));
        assert_eq!(read_code(&db, hash).unwrap(), Some(code));
    }
}
