//! Batching of UDC deployments into a single multicall.

use rand::Rng;
use starknet::core::types::{Call, Event, Felt};
use starknet::macros::selector;
use tracing::{debug, error, info, instrument};

use crate::chain::{ExecutionStatus, ReceiptWaiter, StarknetChain};
use crate::error::{DeployError, Stage};
use crate::manifest::DeploymentRecord;
use crate::network::Network;
use crate::types::Tip;

/// `[address, deployer, unique, class_hash, calldata_len, ..., salt]`
const MIN_EVENT_DATA_LEN: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDeployment {
    pub name: String,
    pub contract: String,
    pub class_hash: Felt,
    pub salt: Felt,
}

#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub transaction_hash: Felt,
    pub actual_fee: Felt,
    /// In queue order.
    pub records: Vec<(String, DeploymentRecord)>,
}

#[derive(Debug)]
pub struct DeployQueue {
    factory: Felt,
    calls: Vec<Call>,
    pending: Vec<PendingDeployment>,
}

impl DeployQueue {
    pub fn new(factory: Felt) -> Self {
        Self {
            factory,
            calls: vec![],
            pending: vec![],
        }
    }

    pub fn pending(&self) -> &[PendingDeployment] {
        &self.pending
    }

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn unique_salt(&self) -> Felt {
        let mut rng = rand::rng();

        loop {
            // 31 bytes always fit in a felt
            let bytes: [u8; 31] = rng.random();
            let salt = Felt::from_bytes_be_slice(&bytes);

            if self.pending.iter().all(|pending| pending.salt != salt) {
                return salt;
            }
        }
    }

    /// Appends a `deployContract` call. The address is only known once the
    /// batch went through.
    pub fn queue(
        &mut self,
        name: impl Into<String>,
        contract: impl Into<String>,
        class_hash: Felt,
        constructor_calldata: Vec<Felt>,
    ) -> &PendingDeployment {
        let salt = self.unique_salt();

        let mut calldata = vec![
            class_hash,
            salt,
            Felt::ONE,
            Felt::from(constructor_calldata.len()),
        ];
        calldata.extend(constructor_calldata);

        self.calls.push(Call {
            to: self.factory,
            selector: selector!("deployContract"),
            calldata,
        });

        let pending = PendingDeployment {
            name: name.into(),
            contract: contract.into(),
            class_hash,
            salt,
        };
        debug!(?pending, "Queued deployment");
        self.pending.push(pending);

        &self.pending[self.pending.len() - 1]
    }

    /// Submits every queued call in one transaction and drains the queue.
    #[instrument(skip_all, fields(deployments = self.pending.len()))]
    pub async fn execute(
        &mut self,
        chain: &dyn StarknetChain,
        network: Network,
    ) -> Result<ExecutionOutcome, DeployError> {
        if self.pending.is_empty() {
            return Err(DeployError::EmptyBatch);
        }

        let calls = std::mem::take(&mut self.calls);
        let pending = std::mem::take(&mut self.pending);

        let categorize = |source| {
            DeployError::from_chain(
                Stage::Execution,
                network,
                chain.deployer_address(),
                source,
                |source| DeployError::ExecutionFailed { source },
            )
        };

        let tip = network.is_local().then_some(Tip::DEVNET);
        let transaction_hash =
            chain.execute(calls, tip).await.map_err(categorize)?;

        info!(
            tx = %format!("{transaction_hash:#066x}"),
            "Deployment transaction submitted"
        );

        let receipt = ReceiptWaiter::new(chain, transaction_hash)
            .wait()
            .await
            .map_err(categorize)?;

        if let ExecutionStatus::Reverted { reason } = &receipt.execution_status
        {
            error!(?receipt, "Deployment transaction reverted");
            return Err(DeployError::DeployReverted {
                reason: reason.clone(),
            });
        }

        let addresses =
            resolve_addresses(self.factory, &pending, &receipt.events);

        let unresolved: Vec<String> = pending
            .iter()
            .zip(&addresses)
            .filter(|(_, address)| address.is_none())
            .map(|(pending, _)| pending.name.clone())
            .collect();

        if !unresolved.is_empty() {
            return Err(DeployError::UnresolvedDeployments {
                transaction_hash,
                names: unresolved,
            });
        }

        let records = pending
            .into_iter()
            .zip(addresses)
            .filter_map(|(pending, address)| {
                let record = DeploymentRecord {
                    class_hash: pending.class_hash,
                    address: address?,
                    source_contract_name: pending.contract,
                };

                Some((pending.name, record))
            })
            .collect();

        Ok(ExecutionOutcome {
            transaction_hash,
            actual_fee: receipt.actual_fee,
            records,
        })
    }
}

/// Matches `ContractDeployed` events of `factory` against the pending
/// deployments by class hash and salt. Events that match nothing are
/// ignored.
pub fn resolve_addresses(
    factory: Felt,
    pending: &[PendingDeployment],
    events: &[Event],
) -> Vec<Option<Felt>> {
    let mut addresses = vec![None; pending.len()];

    for event in events {
        if event.from_address != factory
            || event.data.len() < MIN_EVENT_DATA_LEN
        {
            continue;
        }

        let address = event.data[0];
        let class_hash = event.data[3];
        let salt = event.data[event.data.len() - 1];

        let matched = pending.iter().zip(addresses.iter_mut()).find(
            |(pending, resolved)| {
                resolved.is_none()
                    && pending.class_hash == class_hash
                    && pending.salt == salt
            },
        );

        match matched {
            Some((pending, resolved)) => {
                debug!(
                    name = %pending.name,
                    address = %format!("{address:#066x}"),
                    "Resolved deployment"
                );
                *resolved = Some(address);
            }
            None => {
                debug!(
                    address = %format!("{address:#066x}"),
                    "Ignoring deployment event of another contract"
                );
            }
        }
    }

    addresses
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::chain::testing::{EventOrder, MockChain};
    use crate::network::UDC_ADDRESS;

    const ROLE_REGISTRY: Felt = Felt::from_hex_unchecked("0xaa");
    const CORE: Felt = Felt::from_hex_unchecked("0xbb");

    fn two_deployments() -> DeployQueue {
        let mut queue = DeployQueue::new(UDC_ADDRESS);
        queue.queue("RoleRegistry", "RoleRegistry", ROLE_REGISTRY, vec![Felt::ONE]);
        queue.queue("Core", "BloodworksCore", CORE, vec![]);
        queue
    }

    #[test]
    fn salts_are_unique_within_a_batch() {
        let mut queue = DeployQueue::new(UDC_ADDRESS);
        for n in 0..64 {
            queue.queue(format!("c{n}"), "RoleRegistry", ROLE_REGISTRY, vec![]);
        }

        let salts: HashSet<_> =
            queue.pending().iter().map(|pending| pending.salt).collect();
        assert_eq!(salts.len(), 64);
    }

    #[test]
    fn udc_call_layout() {
        let mut queue = DeployQueue::new(UDC_ADDRESS);
        let salt = queue
            .queue("RoleRegistry", "RoleRegistry", ROLE_REGISTRY, vec![
                Felt::TWO,
                Felt::THREE,
            ])
            .salt;

        let call = &queue.calls()[0];
        assert_eq!(call.to, UDC_ADDRESS);
        assert_eq!(call.selector, selector!("deployContract"));
        assert_eq!(
            call.calldata,
            vec![ROLE_REGISTRY, salt, Felt::ONE, Felt::TWO, Felt::TWO, Felt::THREE]
        );
    }

    #[tokio::test]
    async fn resolves_addresses_in_either_event_order() -> eyre::Result<()> {
        for order in [EventOrder::AsQueued, EventOrder::Reversed] {
            let chain = MockChain::default();
            chain.set_event_order(order);

            let mut queue = two_deployments();
            let outcome = queue.execute(&chain, Network::Devnet).await?;

            assert!(queue.is_empty());
            assert_eq!(outcome.records.len(), 2);
            assert_eq!(outcome.records[0].0, "RoleRegistry");
            assert_eq!(outcome.records[1].0, "Core");
            assert_eq!(outcome.records[1].1.source_contract_name, "BloodworksCore");

            for (_, record) in &outcome.records {
                assert_eq!(
                    chain.deployed_class(record.address),
                    Some(record.class_hash)
                );
            }
        }

        Ok(())
    }

    #[tokio::test]
    async fn one_transaction_per_batch() -> eyre::Result<()> {
        let chain = MockChain::default();

        let mut queue = two_deployments();
        queue.execute(&chain, Network::Devnet).await?;

        let executed = chain.executed();
        assert_eq!(chain.calls.execute.load(Ordering::SeqCst), 1);
        assert_eq!(executed[0].0.len(), 2);
        assert_eq!(executed[0].1, Some(Tip::DEVNET));

        Ok(())
    }

    #[tokio::test]
    async fn no_devnet_tip_elsewhere() -> eyre::Result<()> {
        let chain = MockChain::default();

        two_deployments().execute(&chain, Network::Sepolia).await?;

        assert_eq!(chain.executed()[0].1, None);

        Ok(())
    }

    #[tokio::test]
    async fn empty_batch_is_refused() {
        let chain = MockChain::default();

        let err = DeployQueue::new(UDC_ADDRESS)
            .execute(&chain, Network::Devnet)
            .await
            .unwrap_err();

        assert!(matches!(err, DeployError::EmptyBatch));
        assert_eq!(chain.calls.execute.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn revert_reason_is_kept() {
        let chain = MockChain::default();
        chain.revert_executions("Error in the called contract: 'ROLE_MISSING'");

        let err = two_deployments()
            .execute(&chain, Network::Devnet)
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "Deploy Calls Failed: Error in the called contract: 'ROLE_MISSING'"
        );
    }

    #[tokio::test]
    async fn missing_events_fail_the_batch() {
        let chain = MockChain::default();
        chain.set_event_order(EventOrder::Dropped);

        let err = two_deployments()
            .execute(&chain, Network::Devnet)
            .await
            .unwrap_err();

        match err {
            DeployError::UnresolvedDeployments { names, .. } => {
                assert_eq!(names, vec!["RoleRegistry", "Core"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn foreign_and_short_events_are_ignored() {
        let queue = two_deployments();
        let pending = queue.pending();

        let matching = Event {
            from_address: UDC_ADDRESS,
            keys: vec![selector!("ContractDeployed")],
            data: vec![
                Felt::from(0x1111u64),
                Felt::ONE,
                Felt::ONE,
                CORE,
                Felt::ZERO,
                pending[1].salt,
            ],
        };
        let foreign = Event {
            from_address: Felt::from(0x5555u64),
            ..matching.clone()
        };
        let short = Event {
            data: vec![Felt::from(0x2222u64), Felt::ONE, Felt::ONE, CORE],
            ..matching.clone()
        };
        let other_salt = Event {
            data: vec![
                Felt::from(0x3333u64),
                Felt::ONE,
                Felt::ONE,
                CORE,
                Felt::ZERO,
                Felt::from(0x42u64),
            ],
            ..matching.clone()
        };

        let addresses = resolve_addresses(
            UDC_ADDRESS,
            pending,
            &[foreign, short, other_salt, matching],
        );

        assert_eq!(addresses, vec![None, Some(Felt::from(0x1111u64))]);
    }
}
