use std::sync::Arc;

use async_trait::async_trait;
use starknet::accounts::{
    Account, AccountError, ExecutionEncoding, SingleOwnerAccount,
};
use starknet::core::types::{
    BlockId, BlockTag, Call, ExecutionResult, Felt, FunctionCall,
    InvokeTransaction, MaybePreConfirmedBlockWithTxs, StarknetError,
    Transaction, TransactionFinalityStatus, TransactionReceipt,
};
use starknet::macros::{selector, short_string};
use starknet::providers::jsonrpc::{HttpTransport, JsonRpcClient};
use starknet::providers::{Provider, ProviderError};
use starknet::signers::{LocalWallet, Signer};
use tokio::sync::OnceCell;
use tracing::instrument;

use super::{
    median_tip, BlockRef, ChainError, DeclareFee, ExecutionStatus,
    FinalityStatus, Receipt, StarknetChain,
};
use crate::artifacts::CompiledArtifact;
use crate::config::NetworkConfig;
use crate::types::{Fri, Tip};

type RpcProvider = Arc<JsonRpcClient<HttpTransport>>;
type RpcAccount = SingleOwnerAccount<RpcProvider, LocalWallet>;

/// Answer of account contracts to a valid `is_valid_signature` call.
const VALID: Felt = short_string!("VALID");

/// [`StarknetChain`] over JSON-RPC, signing with a single owner account.
pub struct RpcChain {
    provider: RpcProvider,
    signer: LocalWallet,
    address: Felt,
    // The chain id is only fetched once a transaction is built, so that a
    // dead endpoint is reported by the preflight checks.
    account: OnceCell<RpcAccount>,
}

impl RpcChain {
    pub fn new(config: &NetworkConfig) -> Self {
        let provider = Arc::new(JsonRpcClient::new(HttpTransport::new(
            config.rpc_url.clone(),
        )));
        let signer =
            LocalWallet::from_signing_key(config.private_key.key.clone());

        Self {
            provider,
            signer,
            address: config.account_address,
            account: OnceCell::new(),
        }
    }

    async fn account(&self) -> Result<&RpcAccount, ChainError> {
        self.account
            .get_or_try_init(|| async {
                let chain_id =
                    self.provider.chain_id().await.map_err(provider_error)?;

                let mut account = SingleOwnerAccount::new(
                    self.provider.clone(),
                    self.signer.clone(),
                    self.address,
                    chain_id,
                    ExecutionEncoding::New,
                );
                account.set_block_id(BlockId::Tag(BlockTag::PreConfirmed));

                Ok(account)
            })
            .await
    }
}

#[async_trait]
impl StarknetChain for RpcChain {
    fn deployer_address(&self) -> Felt {
        self.address
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        self.provider.block_number().await.map_err(provider_error)
    }

    async fn check_class(&self, class_hash: Felt) -> Result<(), ChainError> {
        self.provider
            .get_class(BlockId::Tag(BlockTag::Latest), class_hash)
            .await
            .map(|_| ())
            .map_err(provider_error)
    }

    async fn class_hash_at(
        &self,
        block: BlockRef,
        address: Felt,
    ) -> Result<Felt, ChainError> {
        self.provider
            .get_class_hash_at(block_id(block), address)
            .await
            .map_err(provider_error)
    }

    async fn recommended_tip(&self) -> Result<Tip, ChainError> {
        let block = self
            .provider
            .get_block_with_txs(BlockId::Tag(BlockTag::Latest))
            .await
            .map_err(provider_error)?;

        let transactions = match block {
            MaybePreConfirmedBlockWithTxs::Block(block) => block.transactions,
            MaybePreConfirmedBlockWithTxs::PreConfirmedBlock(block) => {
                block.transactions
            }
        };

        let tips = transactions
            .iter()
            .filter_map(|tx| match tx {
                Transaction::Invoke(InvokeTransaction::V3(tx)) => Some(tx.tip),
                _ => None,
            })
            .collect();

        Ok(median_tip(tips))
    }

    #[instrument(skip_all, fields(contract = %artifact.name))]
    async fn estimate_declare_fee(
        &self,
        artifact: &CompiledArtifact,
        tip: Tip,
    ) -> Result<Fri, ChainError> {
        let account = self.account().await?;

        let estimate = account
            .declare_v3(artifact.class.clone(), artifact.compiled_class_hash)
            .tip(tip.0)
            .estimate_fee()
            .await
            .map_err(account_error)?;

        to_fri(estimate.overall_fee)
    }

    #[instrument(skip_all, fields(contract = %artifact.name))]
    async fn declare(
        &self,
        artifact: &CompiledArtifact,
        fee: DeclareFee,
    ) -> Result<Felt, ChainError> {
        let account = self.account().await?;

        // Raising the price bounds is how v3 transactions get to pay the
        // minimum fee when the estimate is below it.
        let multiplier =
            (fee.max_fee.0 as f64 / fee.estimated.0.max(1) as f64).max(1.0);

        let result = account
            .declare_v3(artifact.class.clone(), artifact.compiled_class_hash)
            .tip(fee.tip.0)
            .gas_price_estimate_multiplier(multiplier)
            .send()
            .await
            .map_err(account_error)?;

        Ok(result.transaction_hash)
    }

    #[instrument(skip_all, fields(calls = calls.len()))]
    async fn execute(
        &self,
        calls: Vec<Call>,
        tip: Option<Tip>,
    ) -> Result<Felt, ChainError> {
        let account = self.account().await?;

        let mut execution = account.execute_v3(calls);
        if let Some(tip) = tip {
            execution = execution.tip(tip.0);
        }

        let result = execution.send().await.map_err(account_error)?;

        Ok(result.transaction_hash)
    }

    async fn receipt(
        &self,
        transaction_hash: Felt,
    ) -> Result<Option<Receipt>, ChainError> {
        match self.provider.get_transaction_receipt(transaction_hash).await {
            Ok(receipt) => Ok(Some(into_receipt(receipt.receipt))),
            Err(ProviderError::StarknetError(
                StarknetError::TransactionHashNotFound,
            )) => Ok(None),
            Err(err) => Err(provider_error(err)),
        }
    }

    async fn sign_and_verify(
        &self,
        message_hash: Felt,
    ) -> Result<bool, ChainError> {
        let signature = self
            .signer
            .sign_hash(&message_hash)
            .await
            .map_err(|err| ChainError::Signing(err.to_string()))?;

        let call = FunctionCall {
            contract_address: self.address,
            entry_point_selector: selector!("is_valid_signature"),
            calldata: vec![message_hash, Felt::TWO, signature.r, signature.s],
        };

        match self.provider.call(call, BlockId::Tag(BlockTag::Latest)).await {
            Ok(result) => Ok(matches!(
                result.first(),
                Some(answer) if *answer == VALID || *answer == Felt::ONE
            )),
            // Accounts revert on signatures they reject
            Err(ProviderError::StarknetError(
                StarknetError::ContractError(_),
            )) => Ok(false),
            Err(err) => Err(provider_error(err)),
        }
    }

    async fn balance_of(
        &self,
        token: Felt,
        account: Felt,
    ) -> Result<Fri, ChainError> {
        let call = FunctionCall {
            contract_address: token,
            entry_point_selector: selector!("balance_of"),
            calldata: vec![account],
        };

        let result = self
            .provider
            .call(call, BlockId::Tag(BlockTag::Latest))
            .await
            .map_err(provider_error)?;

        // u256 as [low, high]
        to_fri(result.first().copied().unwrap_or_default())
    }
}

fn block_id(block: BlockRef) -> BlockId {
    match block {
        BlockRef::Latest | BlockRef::Pending => BlockId::Tag(BlockTag::Latest),
        BlockRef::PreConfirmed => BlockId::Tag(BlockTag::PreConfirmed),
        BlockRef::Number(number) => BlockId::Number(number),
        BlockRef::Hash(hash) => BlockId::Hash(hash),
    }
}

fn to_fri<T>(amount: T) -> Result<Fri, ChainError>
where
    u128: TryFrom<T>,
{
    u128::try_from(amount)
        .map(Fri)
        .map_err(|_| ChainError::Rpc("Fee amount does not fit in u128".into()))
}

fn into_receipt(receipt: TransactionReceipt) -> Receipt {
    let (transaction_hash, finality_status, actual_fee, events, execution_result) =
        match receipt {
            TransactionReceipt::Invoke(r) => (
                r.transaction_hash,
                r.finality_status,
                r.actual_fee,
                r.events,
                r.execution_result,
            ),
            TransactionReceipt::L1Handler(r) => (
                r.transaction_hash,
                r.finality_status,
                r.actual_fee,
                r.events,
                r.execution_result,
            ),
            TransactionReceipt::Declare(r) => (
                r.transaction_hash,
                r.finality_status,
                r.actual_fee,
                r.events,
                r.execution_result,
            ),
            TransactionReceipt::Deploy(r) => (
                r.transaction_hash,
                r.finality_status,
                r.actual_fee,
                r.events,
                r.execution_result,
            ),
            TransactionReceipt::DeployAccount(r) => (
                r.transaction_hash,
                r.finality_status,
                r.actual_fee,
                r.events,
                r.execution_result,
            ),
        };

    let finality_status = match finality_status {
        TransactionFinalityStatus::PreConfirmed => FinalityStatus::PreConfirmed,
        TransactionFinalityStatus::AcceptedOnL2 => FinalityStatus::AcceptedOnL2,
        TransactionFinalityStatus::AcceptedOnL1 => FinalityStatus::AcceptedOnL1,
    };

    let execution_status = match execution_result {
        ExecutionResult::Succeeded => ExecutionStatus::Succeeded,
        ExecutionResult::Reverted { reason } => {
            ExecutionStatus::Reverted { reason }
        }
    };

    Receipt {
        transaction_hash,
        finality_status,
        execution_status,
        actual_fee: actual_fee.amount,
        events,
    }
}

fn provider_error(err: ProviderError) -> ChainError {
    match err {
        ProviderError::StarknetError(StarknetError::ClassHashNotFound) => {
            ChainError::ClassHashNotFound
        }
        ProviderError::StarknetError(StarknetError::ContractNotFound) => {
            ChainError::ContractNotFound
        }
        ProviderError::StarknetError(
            StarknetError::TransactionHashNotFound,
        ) => ChainError::TransactionNotFound,
        ProviderError::StarknetError(
            StarknetError::InsufficientAccountBalance,
        ) => ChainError::InsufficientBalance(
            "Account balance is smaller than the transaction's maximal fee"
                .to_string(),
        ),
        ProviderError::StarknetError(StarknetError::ValidationFailure(
            reason,
        )) if reason.contains("exceed balance") => {
            ChainError::InsufficientBalance(reason)
        }
        ProviderError::StarknetError(err) => ChainError::Rpc(err.to_string()),
        other => ChainError::from_transport_message(other.to_string()),
    }
}

fn account_error<S>(err: AccountError<S>) -> ChainError
where
    S: std::error::Error,
{
    match err {
        AccountError::Provider(err) => provider_error(err),
        AccountError::Signing(err) => ChainError::Signing(err.to_string()),
        other => ChainError::Rpc(other.to_string()),
    }
}
