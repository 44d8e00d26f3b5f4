use crate::types::{BlockTag, RpcBlock, RpcReceipt, RpcTransaction};
use dogesync_blockchain::Blockchain;
use dogesync_primitives::{keccak256, Account, Address, B256, U256};
use dogesync_trie::State;
use jsonrpsee::{
    core::{async_trait, RpcResult},
    proc_macros::rpc,
    types::{ErrorCode, ErrorObjectOwned},
};
use std::sync::Arc;

/// The read-only `eth_` namespace.
#[rpc(server, namespace = "eth")]
pub trait EthApi {
    #[method(name = "chainId")]
    async fn chain_id(&self) -> RpcResult<U256>;

    #[method(name = "blockNumber")]
    async fn block_number(&self) -> RpcResult<U256>;

    #[method(name = "gasPrice")]
    async fn gas_price(&self) -> RpcResult<U256>;

    #[method(name = "getBlockByNumber")]
    async fn get_block_by_number(&self, tag: String, full: bool) -> RpcResult<Option<RpcBlock>>;

    #[method(name = "getBlockByHash")]
    async fn get_block_by_hash(&self, hash: B256, full: bool) -> RpcResult<Option<RpcBlock>>;

    #[method(name = "getBalance")]
    async fn get_balance(&self, address: Address, tag: Option<String>) -> RpcResult<U256>;

    #[method(name = "getTransactionCount")]
    async fn get_transaction_count(&self, address: Address, tag: Option<String>)
        -> RpcResult<U256>;

    #[method(name = "getTransactionByHash")]
    async fn get_transaction_by_hash(&self, hash: B256) -> RpcResult<Option<RpcTransaction>>;

    #[method(name = "getTransactionReceipt")]
    async fn get_transaction_receipt(&self, hash: B256) -> RpcResult<Option<RpcReceipt>>;
}

/// [`EthApiServer`] over the blockchain getters and the state store.
pub struct EthApiImpl {
    blockchain: Arc<Blockchain>,
    state: Arc<State>,
}

impl EthApiImpl {
    pub fn new(blockchain: Arc<Blockchain>, state: Arc<State>) -> Self {
        Self { blockchain, state }
    }

    fn header_for_tag(&self, tag: Option<&str>) -> RpcResult<dogesync_primitives::SealedHeader> {
        let tag = match tag {
            Some(raw) => raw.parse::<BlockTag>().map_err(invalid_params)?,
            None => BlockTag::Latest,
        };

        let header = match tag {
            BlockTag::Latest => self.blockchain.header(),
            BlockTag::Earliest => self.blockchain.get_header_by_number(0),
            BlockTag::Number(number) => self.blockchain.get_header_by_number(number),
        };
        header.ok_or_else(|| not_found("block not found"))
    }

    fn account_at(&self, address: Address, tag: Option<&str>) -> RpcResult<Option<Account>> {
        let header = self.header_for_tag(tag)?;
        let snapshot =
            self.state.new_snapshot_at(header.state_root).map_err(internal_error)?;

        let Some(raw) =
            snapshot.get(keccak256(address.as_slice()).as_slice()).map_err(internal_error)?
        else {
            return Ok(None);
        };

        let account = <Account as alloy_rlp::Decodable>::decode(&mut raw.as_slice())
            .map_err(internal_error)?;
        Ok(Some(account))
    }
}

#[async_trait]
impl EthApiServer for EthApiImpl {
    async fn chain_id(&self) -> RpcResult<U256> {
        Ok(U256::from(self.blockchain.spec().chain_id()))
    }

    async fn block_number(&self) -> RpcResult<U256> {
        let header = self.blockchain.header().ok_or_else(|| not_found("chain not ready"))?;
        Ok(U256::from(header.number))
    }

    async fn gas_price(&self) -> RpcResult<U256> {
        Ok(self.blockchain.gas_price_average())
    }

    async fn get_block_by_number(&self, tag: String, full: bool) -> RpcResult<Option<RpcBlock>> {
        let number = match tag.parse::<BlockTag>().map_err(invalid_params)? {
            BlockTag::Latest => match self.blockchain.header() {
                Some(header) => header.number,
                None => return Ok(None),
            },
            BlockTag::Earliest => 0,
            BlockTag::Number(number) => number,
        };

        let block = self.blockchain.get_block_by_number(number).map_err(internal_error)?;
        Ok(block.map(|block| RpcBlock::from_block(&block, full)))
    }

    async fn get_block_by_hash(&self, hash: B256, full: bool) -> RpcResult<Option<RpcBlock>> {
        let Some(header) = self.blockchain.get_header_by_hash(hash) else { return Ok(None) };
        let block =
            self.blockchain.get_block_by_number(header.number).map_err(internal_error)?;
        Ok(block.map(|block| RpcBlock::from_block(&block, full)))
    }

    async fn get_balance(&self, address: Address, tag: Option<String>) -> RpcResult<U256> {
        Ok(self
            .account_at(address, tag.as_deref())?
            .map(|account| account.balance)
            .unwrap_or_default())
    }

    async fn get_transaction_count(
        &self,
        address: Address,
        tag: Option<String>,
    ) -> RpcResult<U256> {
        Ok(self
            .account_at(address, tag.as_deref())?
            .map(|account| U256::from(account.nonce))
            .unwrap_or_default())
    }

    async fn get_transaction_by_hash(&self, hash: B256) -> RpcResult<Option<RpcTransaction>> {
        let tx = self.blockchain.get_transaction_by_hash(hash).map_err(internal_error)?;
        Ok(tx.as_ref().map(RpcTransaction::from_transaction))
    }

    async fn get_transaction_receipt(&self, hash: B256) -> RpcResult<Option<RpcReceipt>> {
        let receipt = self.blockchain.get_receipt_by_tx_hash(hash).map_err(internal_error)?;
        Ok(receipt.as_ref().map(RpcReceipt::from_receipt))
    }
}

fn invalid_params(message: impl ToString) -> ErrorObjectOwned {
    ErrorObjectOwned::owned(
        ErrorCode::InvalidParams.code(),
        message.to_string(),
        None::<()>,
    )
}

fn not_found(message: &str) -> ErrorObjectOwned {
    ErrorObjectOwned::owned(ErrorCode::InvalidRequest.code(), message.to_string(), None::<()>)
}

fn internal_error(err: impl ToString) -> ErrorObjectOwned {
    ErrorObjectOwned::owned(
        ErrorCode::InternalError.code(),
        err.to_string(),
        None::<()>,
    )
}
