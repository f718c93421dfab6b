use std::time::Duration;

use indicatif::ProgressStyle;
use starknet::core::types::Felt;
use tracing::{debug, instrument, Span};
use tracing_indicatif::span_ext::IndicatifSpanExt;

use super::{ChainError, Receipt, StarknetChain};

/// Polls for a receipt until the transaction is accepted on L2.
///
/// Only reads are retried. A transaction is never resubmitted, and an RPC
/// failure while polling ends the wait.
pub struct ReceiptWaiter<'a> {
    chain: &'a dyn StarknetChain,
    transaction_hash: Felt,
    interval: Duration,
}

impl<'a> ReceiptWaiter<'a> {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(2000);

    pub fn new(chain: &'a dyn StarknetChain, transaction_hash: Felt) -> Self {
        Self {
            chain,
            transaction_hash,
            interval: Self::DEFAULT_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    #[instrument(
        name = "receipt",
        skip_all,
        fields(tx = %format!("{:#x}", self.transaction_hash))
    )]
    pub async fn wait(self) -> Result<Receipt, ChainError> {
        let span = Span::current();
        span.pb_set_style(&ProgressStyle::default_spinner());
        span.pb_set_message("Waiting for transaction receipt");

        let mut attempts = 0u64;
        loop {
            attempts += 1;

            match self.chain.receipt(self.transaction_hash).await? {
                Some(receipt) if receipt.finality_status.is_accepted() => {
                    debug!(attempts, finality = ?receipt.finality_status, "Receipt available");
                    return Ok(receipt);
                }
                Some(receipt) => {
                    debug!(attempts, finality = ?receipt.finality_status, "Waiting for L2 acceptance");
                }
                None => {}
            }

            tokio::time::sleep(self.interval).await;
        }
    }
}
