use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use starknet::core::types::Felt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::chain::{BlockRef, ChainError, StarknetChain};

type Lookup = Shared<BoxFuture<'static, Option<Felt>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CacheKey {
    address: Felt,
    block: BlockRef,
}

impl CacheKey {
    fn new(address: Felt, block: BlockRef) -> Self {
        Self {
            address,
            block: block.normalize(),
        }
    }
}

#[derive(Default)]
struct Entries {
    values: HashMap<CacheKey, Felt>,
    in_flight: HashMap<CacheKey, Lookup>,
}

/// Memoizes `class_hash_at` lookups for the duration of a run.
///
/// Concurrent lookups of the same key share a single request. Successful
/// answers are kept until [`ClassHashCache::clear`], failures are logged and
/// never stored.
#[derive(Clone, Default)]
pub struct ClassHashCache {
    entries: Arc<Mutex<Entries>>,
}

impl fmt::Debug for ClassHashCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassHashCache").finish_non_exhaustive()
    }
}

impl ClassHashCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, address: Felt, block: BlockRef) -> Option<Felt> {
        let entries = self.entries.lock().await;

        entries.values.get(&CacheKey::new(address, block)).copied()
    }

    pub async fn get_or_fetch<F, Fut>(
        &self,
        address: Felt,
        block: BlockRef,
        fetch: F,
    ) -> Option<Felt>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Felt, ChainError>> + Send + 'static,
    {
        let key = CacheKey::new(address, block);

        let lookup = {
            let mut entries = self.entries.lock().await;

            if let Some(class_hash) = entries.values.get(&key) {
                return Some(*class_hash);
            }

            match entries.in_flight.get(&key) {
                Some(lookup) => {
                    debug!(address = %format!("{address:#x}"), "Joining in-flight class hash lookup");
                    lookup.clone()
                }
                None => {
                    let request = fetch();
                    let lookup = async move {
                        match request.await {
                            Ok(class_hash) => Some(class_hash),
                            Err(err) => {
                                warn!(
                                    address = %format!("{address:#066x}"),
                                    block = %key.block,
                                    %err,
                                    "Class hash lookup failed"
                                );
                                None
                            }
                        }
                    }
                    .boxed()
                    .shared();

                    entries.in_flight.insert(key, lookup.clone());
                    lookup
                }
            }
        };

        let class_hash = lookup.clone().await;

        let mut entries = self.entries.lock().await;
        let owned = entries
            .in_flight
            .get(&key)
            .is_some_and(|pending| pending.ptr_eq(&lookup));

        // A lookup that `clear` dropped meanwhile is answered but not stored
        if owned {
            entries.in_flight.remove(&key);
            if let Some(class_hash) = class_hash {
                entries.values.insert(key, class_hash);
            }
        }

        class_hash
    }

    pub async fn class_hash_at(
        &self,
        chain: &Arc<dyn StarknetChain>,
        address: Felt,
        block: BlockRef,
    ) -> Option<Felt> {
        let chain = chain.clone();
        let block = block.normalize();

        self.get_or_fetch(address, block, move || async move {
            chain.class_hash_at(block, address).await
        })
        .await
    }

    pub async fn clear(&self) {
        let mut entries = self.entries.lock().await;
        entries.values.clear();
        entries.in_flight.clear();
    }
}
