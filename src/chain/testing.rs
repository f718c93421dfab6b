//! A scripted in-memory chain.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use starknet::core::types::{Call, Event, Felt};
use starknet::core::utils::get_contract_address;
use starknet::macros::selector;

use super::{
    BlockRef, ChainError, DeclareFee, ExecutionStatus, FinalityStatus, Receipt,
    StarknetChain,
};
use crate::artifacts::CompiledArtifact;
use crate::network::UDC_ADDRESS;
use crate::types::{Fri, Tip};

pub const DEPLOYER: Felt = Felt::from_hex_unchecked("0xd0");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    BlockNumber,
    ClassHashAt,
    Declare,
    EstimateDeclareFee,
    Execute,
    Receipt,
    SignAndVerify,
}

/// How deployment events show up in an execution receipt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EventOrder {
    #[default]
    AsQueued,
    Reversed,
    Dropped,
}

#[derive(Debug, Default)]
pub struct CallCounts {
    pub block_number: AtomicUsize,
    pub check_class: AtomicUsize,
    pub class_hash_at: AtomicUsize,
    pub recommended_tip: AtomicUsize,
    pub estimate_declare_fee: AtomicUsize,
    pub declare: AtomicUsize,
    pub execute: AtomicUsize,
    pub receipt: AtomicUsize,
    pub sign_and_verify: AtomicUsize,
    pub balance_of: AtomicUsize,
}

#[derive(Debug)]
struct Failure {
    error: ChainError,
    once: bool,
}

#[derive(Debug)]
struct State {
    declared: HashSet<Felt>,
    deployed: HashMap<Felt, Felt>,
    receipts: HashMap<Felt, Receipt>,
    hidden_receipt_polls: usize,
    pre_confirmed_receipt_polls: usize,
    failures: HashMap<Method, Failure>,
    signature_valid: bool,
    declare_status: ExecutionStatus,
    execution_status: ExecutionStatus,
    declare_fee: Fri,
    tip: Tip,
    balance: Fri,
    event_order: EventOrder,
    lookup_delay: Option<Duration>,
    executed: Vec<(Vec<Call>, Option<Tip>)>,
    declarations: Vec<(Felt, DeclareFee)>,
    next_transaction: u64,
}

impl Default for State {
    fn default() -> Self {
        Self {
            declared: HashSet::new(),
            deployed: HashMap::new(),
            receipts: HashMap::new(),
            hidden_receipt_polls: 0,
            pre_confirmed_receipt_polls: 0,
            failures: HashMap::new(),
            signature_valid: true,
            declare_status: ExecutionStatus::Succeeded,
            execution_status: ExecutionStatus::Succeeded,
            declare_fee: Fri(1_000_000_000_000_000),
            tip: Tip(0),
            balance: Fri(0),
            event_order: EventOrder::default(),
            lookup_delay: None,
            executed: vec![],
            declarations: vec![],
            next_transaction: 0x1000,
        }
    }
}

#[derive(Debug, Default)]
pub struct MockChain {
    pub calls: CallCounts,
    state: Mutex<State>,
}

impl MockChain {
    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    fn check_failure(&self, method: Method) -> Result<(), ChainError> {
        let mut state = self.state();
        let Some(failure) = state.failures.get(&method) else {
            return Ok(());
        };

        let error = failure.error.clone();
        if failure.once {
            state.failures.remove(&method);
        }

        Err(error)
    }

    fn next_transaction(state: &mut State) -> Felt {
        state.next_transaction += 1;
        Felt::from(state.next_transaction)
    }

    pub fn with_declared(self, class_hash: Felt) -> Self {
        self.state().declared.insert(class_hash);
        self
    }

    pub fn with_deployed(self, address: Felt, class_hash: Felt) -> Self {
        self.state().deployed.insert(address, class_hash);
        self
    }

    pub fn with_balance(self, balance: Fri) -> Self {
        self.state().balance = balance;
        self
    }

    pub fn insert_receipt(
        &self,
        transaction_hash: Felt,
        execution_status: ExecutionStatus,
        events: Vec<Event>,
    ) {
        self.state().receipts.insert(
            transaction_hash,
            Receipt {
                transaction_hash,
                finality_status: FinalityStatus::AcceptedOnL2,
                execution_status,
                actual_fee: Felt::from(1000u64),
                events,
            },
        );
    }

    /// The next `polls` receipt reads answer "unknown transaction".
    pub fn hide_receipts_for(&self, polls: usize) {
        self.state().hidden_receipt_polls = polls;
    }

    /// The next `polls` receipt reads that find a receipt serve it as
    /// pre-confirmed.
    pub fn pre_confirm_receipts_for(&self, polls: usize) {
        self.state().pre_confirmed_receipt_polls = polls;
    }

    pub fn fail(&self, method: Method, error: ChainError) {
        self.state()
            .failures
            .insert(method, Failure { error, once: false });
    }

    pub fn fail_once(&self, method: Method, error: ChainError) {
        self.state()
            .failures
            .insert(method, Failure { error, once: true });
    }

    pub fn fail_receipts_with(&self, error: ChainError) {
        self.fail(Method::Receipt, error);
    }

    pub fn reject_signatures(&self) {
        self.state().signature_valid = false;
    }

    pub fn revert_declarations(&self, reason: &str) {
        self.state().declare_status = ExecutionStatus::Reverted {
            reason: reason.to_string(),
        };
    }

    pub fn revert_executions(&self, reason: &str) {
        self.state().execution_status = ExecutionStatus::Reverted {
            reason: reason.to_string(),
        };
    }

    pub fn set_declare_fee(&self, fee: Fri) {
        self.state().declare_fee = fee;
    }

    pub fn set_tip(&self, tip: Tip) {
        self.state().tip = tip;
    }

    pub fn set_event_order(&self, order: EventOrder) {
        self.state().event_order = order;
    }

    pub fn set_lookup_delay(&self, delay: Duration) {
        self.state().lookup_delay = Some(delay);
    }

    pub fn executed(&self) -> Vec<(Vec<Call>, Option<Tip>)> {
        self.state().executed.clone()
    }

    pub fn declarations(&self) -> Vec<(Felt, DeclareFee)> {
        self.state().declarations.clone()
    }

    pub fn is_declared(&self, class_hash: Felt) -> bool {
        self.state().declared.contains(&class_hash)
    }

    pub fn deployed_class(&self, address: Felt) -> Option<Felt> {
        self.state().deployed.get(&address).copied()
    }
}

/// `ContractDeployed` as emitted by the Universal Deployer.
fn deployment_event(call: &Call) -> Option<(Felt, Felt, Event)> {
    if call.to != UDC_ADDRESS || call.selector != selector!("deployContract") {
        return None;
    }

    let [class_hash, salt, unique, _len, args @ ..] = call.calldata.as_slice()
    else {
        return None;
    };

    let address = get_contract_address(*salt, *class_hash, args, DEPLOYER);

    let mut data = vec![address, DEPLOYER, *unique, *class_hash];
    data.push(Felt::from(args.len()));
    data.extend_from_slice(args);
    data.push(*salt);

    let event = Event {
        from_address: UDC_ADDRESS,
        keys: vec![selector!("ContractDeployed")],
        data,
    };

    Some((address, *class_hash, event))
}

#[async_trait]
impl StarknetChain for MockChain {
    fn deployer_address(&self) -> Felt {
        DEPLOYER
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        self.calls.block_number.fetch_add(1, Ordering::SeqCst);
        self.check_failure(Method::BlockNumber)?;

        Ok(1)
    }

    async fn check_class(&self, class_hash: Felt) -> Result<(), ChainError> {
        self.calls.check_class.fetch_add(1, Ordering::SeqCst);

        if self.is_declared(class_hash) {
            Ok(())
        } else {
            Err(ChainError::ClassHashNotFound)
        }
    }

    async fn class_hash_at(
        &self,
        _block: BlockRef,
        address: Felt,
    ) -> Result<Felt, ChainError> {
        self.calls.class_hash_at.fetch_add(1, Ordering::SeqCst);

        let delay = self.state().lookup_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.check_failure(Method::ClassHashAt)?;

        self.deployed_class(address)
            .ok_or(ChainError::ContractNotFound)
    }

    async fn recommended_tip(&self) -> Result<Tip, ChainError> {
        self.calls.recommended_tip.fetch_add(1, Ordering::SeqCst);

        Ok(self.state().tip)
    }

    async fn estimate_declare_fee(
        &self,
        _artifact: &CompiledArtifact,
        _tip: Tip,
    ) -> Result<Fri, ChainError> {
        self.calls.estimate_declare_fee.fetch_add(1, Ordering::SeqCst);
        self.check_failure(Method::EstimateDeclareFee)?;

        Ok(self.state().declare_fee)
    }

    async fn declare(
        &self,
        artifact: &CompiledArtifact,
        fee: DeclareFee,
    ) -> Result<Felt, ChainError> {
        self.calls.declare.fetch_add(1, Ordering::SeqCst);
        self.check_failure(Method::Declare)?;

        let transaction_hash = {
            let mut state = self.state();
            state.declarations.push((artifact.class_hash, fee));
            if state.declare_status == ExecutionStatus::Succeeded {
                state.declared.insert(artifact.class_hash);
            }
            Self::next_transaction(&mut state)
        };

        let status = self.state().declare_status.clone();
        self.insert_receipt(transaction_hash, status, vec![]);

        Ok(transaction_hash)
    }

    async fn execute(
        &self,
        calls: Vec<Call>,
        tip: Option<Tip>,
    ) -> Result<Felt, ChainError> {
        self.calls.execute.fetch_add(1, Ordering::SeqCst);
        self.check_failure(Method::Execute)?;

        let (transaction_hash, status, events) = {
            let mut state = self.state();
            state.executed.push((calls.clone(), tip));

            let status = state.execution_status.clone();
            let mut events = vec![];
            if status == ExecutionStatus::Succeeded {
                for (address, class_hash, event) in
                    calls.iter().filter_map(deployment_event)
                {
                    state.deployed.insert(address, class_hash);
                    events.push(event);
                }
            }

            match state.event_order {
                EventOrder::AsQueued => {}
                EventOrder::Reversed => events.reverse(),
                EventOrder::Dropped => events.clear(),
            }

            (Self::next_transaction(&mut state), status, events)
        };

        self.insert_receipt(transaction_hash, status, events);

        Ok(transaction_hash)
    }

    async fn receipt(
        &self,
        transaction_hash: Felt,
    ) -> Result<Option<Receipt>, ChainError> {
        self.calls.receipt.fetch_add(1, Ordering::SeqCst);
        self.check_failure(Method::Receipt)?;

        let mut state = self.state();
        if state.hidden_receipt_polls > 0 {
            state.hidden_receipt_polls -= 1;
            return Ok(None);
        }

        let Some(mut receipt) = state.receipts.get(&transaction_hash).cloned()
        else {
            return Ok(None);
        };

        if state.pre_confirmed_receipt_polls > 0 {
            state.pre_confirmed_receipt_polls -= 1;
            receipt.finality_status = FinalityStatus::PreConfirmed;
        }

        Ok(Some(receipt))
    }

    async fn sign_and_verify(
        &self,
        _message_hash: Felt,
    ) -> Result<bool, ChainError> {
        self.calls.sign_and_verify.fetch_add(1, Ordering::SeqCst);
        self.check_failure(Method::SignAndVerify)?;

        Ok(self.state().signature_valid)
    }

    async fn balance_of(
        &self,
        _token: Felt,
        _account: Felt,
    ) -> Result<Fri, ChainError> {
        self.calls.balance_of.fetch_add(1, Ordering::SeqCst);

        Ok(self.state().balance)
    }
}
