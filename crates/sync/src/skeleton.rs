use crate::SyncError;
use dogesync_network::{proto, RequestError, SyncPeerClient};
use dogesync_primitives::{Block, BlockNumber, Header, SealedHeader, Transaction};
use std::time::Duration;

/// Headers requested per skeleton round. Halved when a peer's message size
/// limit rejects the batch, regrown by one per successful round.
pub const MAX_SKELETON_HEADERS_AMOUNT: i64 = 190;

/// Deadline for the body fetch of one skeleton batch.
pub(crate) const BODY_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// One batch of sequential headers plus their bodies.
#[derive(Debug)]
pub struct Skeleton {
    pub amount: i64,
}

impl Skeleton {
    pub fn new(amount: i64) -> Self {
        Self { amount }
    }

    /// Fetches `amount` blocks starting at `from` (inclusive): one header
    /// round, one body round with its own deadline.
    pub async fn get_blocks_from_peer(
        &self,
        client: &dyn SyncPeerClient,
        from: BlockNumber,
    ) -> Result<Vec<Block>, SyncError> {
        let headers = get_headers(
            client,
            proto::GetHeadersRequest {
                number: from as i64,
                hash: String::new(),
                skip: 0,
                amount: self.amount,
            },
        )
        .await?;

        // within one batch, numbers must increase by exactly one
        for pair in headers.windows(2) {
            if pair[1].number != pair[0].number + 1 {
                return Err(SyncError::InvalidHeaderSequence);
            }
        }

        let hashes: Vec<_> = headers.iter().map(SealedHeader::hash).collect();

        let bodies = tokio::time::timeout(BODY_FETCH_TIMEOUT, client.get_bodies(hashes))
            .await
            .map_err(|_| RequestError::Timeout)??;

        if bodies.bodies.len() != headers.len() {
            return Err(SyncError::HeaderBodyMismatch {
                headers: headers.len(),
                bodies: bodies.bodies.len(),
            });
        }

        let mut blocks = Vec::with_capacity(headers.len());
        for (header, body) in headers.into_iter().zip(bodies.bodies) {
            let mut transactions = Vec::with_capacity(body.transactions.len());
            for raw in &body.transactions {
                transactions
                    .push(<Transaction as alloy_rlp::Decodable>::decode(&mut raw.as_slice())?);
            }
            blocks.push(Block::new(header, transactions));
        }

        Ok(blocks)
    }
}

/// Decodes a header response; a nil entry means a faulty peer and rejects
/// the whole batch.
async fn get_headers(
    client: &dyn SyncPeerClient,
    request: proto::GetHeadersRequest,
) -> Result<Vec<SealedHeader>, SyncError> {
    let response = client.get_headers(request).await?;

    let mut headers = Vec::with_capacity(response.objs.len());
    for raw in &response.objs {
        if raw.is_empty() {
            return Err(SyncError::NilHeaderResponse);
        }
        let header = <Header as alloy_rlp::Decodable>::decode(&mut raw.as_slice())?;
        headers.push(header.seal());
    }
    Ok(headers)
}

/// Fetches exactly one header by number, `None` when the peer lacks it.
pub(crate) async fn get_header(
    client: &dyn SyncPeerClient,
    number: BlockNumber,
) -> Result<Option<SealedHeader>, SyncError> {
    let response = client
        .get_headers(proto::GetHeadersRequest {
            number: number as i64,
            hash: String::new(),
            skip: 0,
            amount: 1,
        })
        .await?;

    match response.objs.len() {
        0 => Ok(None),
        1 => {
            let raw = &response.objs[0];
            if raw.is_empty() {
                return Err(SyncError::NilHeaderResponse);
            }
            let header = <Header as alloy_rlp::Decodable>::decode(&mut raw.as_slice())?;
            Ok(Some(header.seal()))
        }
        n => Err(SyncError::TooManyHeaders(n)),
    }
}
