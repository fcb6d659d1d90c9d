//! Persistence of swap records.
//!
//! The service supports pluggable repository implementations; the in-memory
//! implementation is the default for tests and development. Records are never
//! deleted, failed and settled swaps are retained for audit.

use crate::error::Error;
use crate::status::SwapStatus;
use crate::swap::ChainSwap;
use crate::swap::ReverseSwap;
use crate::swap::SubmarineSwap;
use crate::swap::SwapKind;
use async_trait::async_trait;
use bitcoin::hashes::sha256;
use bitcoin::Amount;
use bitcoin::Txid;
use std::collections::HashMap;
use std::sync::Mutex;

/// Trait for storing and retrieving the three swap kinds.
///
/// Status updates are single statements: implementations must apply them
/// atomically with respect to concurrent readers.
#[async_trait]
pub trait SwapRepository: Send + Sync {
    async fn insert_submarine(&self, swap: SubmarineSwap) -> Result<(), Error>;
    async fn insert_reverse(&self, swap: ReverseSwap) -> Result<(), Error>;
    async fn insert_chain(&self, swap: ChainSwap) -> Result<(), Error>;

    async fn get_submarine(&self, id: &str) -> Result<Option<SubmarineSwap>, Error>;
    async fn get_reverse(&self, id: &str) -> Result<Option<ReverseSwap>, Error>;
    async fn get_chain(&self, id: &str) -> Result<Option<ChainSwap>, Error>;

    /// Find a submarine swap by the BOLT11 invoice it pays.
    async fn get_submarine_by_invoice(
        &self,
        invoice: &str,
    ) -> Result<Option<SubmarineSwap>, Error>;

    /// The kind of the live swap using `preimage_hash`, if any.
    ///
    /// Backs the uniqueness invariant on preimage hashes across all kinds.
    async fn find_by_preimage_hash(
        &self,
        preimage_hash: &sha256::Hash,
    ) -> Result<Option<(SwapKind, String)>, Error>;

    /// Find the swap (of any kind) watching `address` as a lockup address.
    async fn find_submarine_by_address(
        &self,
        address: &str,
    ) -> Result<Option<SubmarineSwap>, Error>;
    async fn find_reverse_by_address(&self, address: &str) -> Result<Option<ReverseSwap>, Error>;
    async fn find_chain_by_address(&self, address: &str) -> Result<Option<ChainSwap>, Error>;

    async fn update_status_submarine(&self, id: &str, status: SwapStatus) -> Result<(), Error>;
    async fn update_status_reverse(&self, id: &str, status: SwapStatus) -> Result<(), Error>;
    async fn update_status_chain(&self, id: &str, status: SwapStatus) -> Result<(), Error>;

    /// Record the observed lockup of a submarine swap.
    async fn set_submarine_lockup(
        &self,
        id: &str,
        transaction_id: Txid,
        onchain_amount: Amount,
    ) -> Result<(), Error>;

    /// Record the observed lockup of a chain swap leg.
    async fn set_chain_lockup(
        &self,
        id: &str,
        sending: bool,
        transaction_id: Txid,
        locked_amount: Amount,
    ) -> Result<(), Error>;

    async fn set_submarine_preimage(&self, id: &str, preimage: [u8; 32]) -> Result<(), Error>;
    async fn set_reverse_preimage(&self, id: &str, preimage: [u8; 32]) -> Result<(), Error>;
    async fn set_chain_preimage(&self, id: &str, preimage: [u8; 32]) -> Result<(), Error>;

    /// Non-terminal swaps, used to re-arm watchers after a restart.
    async fn list_pending_submarine(&self) -> Result<Vec<SubmarineSwap>, Error>;
    async fn list_pending_reverse(&self) -> Result<Vec<ReverseSwap>, Error>;
    async fn list_pending_chain(&self) -> Result<Vec<ChainSwap>, Error>;
}

/// In-memory implementation of [`SwapRepository`].
///
/// Data is lost on restart, which makes this suitable for development and
/// tests only.
#[derive(Default)]
pub struct InMemorySwapRepository {
    submarine_swaps: Mutex<HashMap<String, SubmarineSwap>>,
    reverse_swaps: Mutex<HashMap<String, ReverseSwap>>,
    chain_swaps: Mutex<HashMap<String, ChainSwap>>,
}

impl InMemorySwapRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn terminal(status: SwapStatus) -> bool {
    matches!(
        status,
        SwapStatus::TransactionClaimed | SwapStatus::TransactionRefunded
    )
}

#[async_trait]
impl SwapRepository for InMemorySwapRepository {
    async fn insert_submarine(&self, swap: SubmarineSwap) -> Result<(), Error> {
        let mut swaps = self.submarine_swaps.lock().expect("lock");
        swaps.insert(swap.id.clone(), swap);
        Ok(())
    }

    async fn insert_reverse(&self, swap: ReverseSwap) -> Result<(), Error> {
        let mut swaps = self.reverse_swaps.lock().expect("lock");
        swaps.insert(swap.id.clone(), swap);
        Ok(())
    }

    async fn insert_chain(&self, swap: ChainSwap) -> Result<(), Error> {
        let mut swaps = self.chain_swaps.lock().expect("lock");
        swaps.insert(swap.id.clone(), swap);
        Ok(())
    }

    async fn get_submarine(&self, id: &str) -> Result<Option<SubmarineSwap>, Error> {
        let swaps = self.submarine_swaps.lock().expect("lock");
        Ok(swaps.get(id).cloned())
    }

    async fn get_reverse(&self, id: &str) -> Result<Option<ReverseSwap>, Error> {
        let swaps = self.reverse_swaps.lock().expect("lock");
        Ok(swaps.get(id).cloned())
    }

    async fn get_chain(&self, id: &str) -> Result<Option<ChainSwap>, Error> {
        let swaps = self.chain_swaps.lock().expect("lock");
        Ok(swaps.get(id).cloned())
    }

    async fn get_submarine_by_invoice(
        &self,
        invoice: &str,
    ) -> Result<Option<SubmarineSwap>, Error> {
        let swaps = self.submarine_swaps.lock().expect("lock");
        Ok(swaps
            .values()
            .find(|s| s.invoice.to_string() == invoice)
            .cloned())
    }

    async fn find_by_preimage_hash(
        &self,
        preimage_hash: &sha256::Hash,
    ) -> Result<Option<(SwapKind, String)>, Error> {
        {
            let swaps = self.submarine_swaps.lock().expect("lock");
            if let Some(swap) = swaps.values().find(|s| s.preimage_hash == *preimage_hash) {
                return Ok(Some((SwapKind::Submarine, swap.id.clone())));
            }
        }

        {
            let swaps = self.reverse_swaps.lock().expect("lock");
            if let Some(swap) = swaps.values().find(|s| s.preimage_hash == *preimage_hash) {
                return Ok(Some((SwapKind::Reverse, swap.id.clone())));
            }
        }

        let swaps = self.chain_swaps.lock().expect("lock");
        Ok(swaps
            .values()
            .find(|s| s.preimage_hash == *preimage_hash)
            .map(|s| (SwapKind::Chain, s.id.clone())))
    }

    async fn find_submarine_by_address(
        &self,
        address: &str,
    ) -> Result<Option<SubmarineSwap>, Error> {
        let swaps = self.submarine_swaps.lock().expect("lock");
        Ok(swaps
            .values()
            .find(|s| s.lockup_address == address)
            .cloned())
    }

    async fn find_reverse_by_address(&self, address: &str) -> Result<Option<ReverseSwap>, Error> {
        let swaps = self.reverse_swaps.lock().expect("lock");
        Ok(swaps
            .values()
            .find(|s| s.lockup_address == address)
            .cloned())
    }

    async fn find_chain_by_address(&self, address: &str) -> Result<Option<ChainSwap>, Error> {
        let swaps = self.chain_swaps.lock().expect("lock");
        Ok(swaps
            .values()
            .find(|s| {
                s.sending.lockup_address == address || s.receiving.lockup_address == address
            })
            .cloned())
    }

    async fn update_status_submarine(&self, id: &str, status: SwapStatus) -> Result<(), Error> {
        let mut swaps = self.submarine_swaps.lock().expect("lock");
        match swaps.get_mut(id) {
            Some(swap) => {
                swap.status = status;
                Ok(())
            }
            None => Err(Error::SwapNotFound(id.to_string())),
        }
    }

    async fn update_status_reverse(&self, id: &str, status: SwapStatus) -> Result<(), Error> {
        let mut swaps = self.reverse_swaps.lock().expect("lock");
        match swaps.get_mut(id) {
            Some(swap) => {
                swap.status = status;
                Ok(())
            }
            None => Err(Error::SwapNotFound(id.to_string())),
        }
    }

    async fn update_status_chain(&self, id: &str, status: SwapStatus) -> Result<(), Error> {
        let mut swaps = self.chain_swaps.lock().expect("lock");
        match swaps.get_mut(id) {
            Some(swap) => {
                swap.status = status;
                Ok(())
            }
            None => Err(Error::SwapNotFound(id.to_string())),
        }
    }

    async fn set_submarine_lockup(
        &self,
        id: &str,
        transaction_id: Txid,
        onchain_amount: Amount,
    ) -> Result<(), Error> {
        let mut swaps = self.submarine_swaps.lock().expect("lock");
        match swaps.get_mut(id) {
            Some(swap) => {
                swap.lockup_transaction_id = Some(transaction_id);
                swap.onchain_amount = Some(onchain_amount);
                Ok(())
            }
            None => Err(Error::SwapNotFound(id.to_string())),
        }
    }

    async fn set_chain_lockup(
        &self,
        id: &str,
        sending: bool,
        transaction_id: Txid,
        locked_amount: Amount,
    ) -> Result<(), Error> {
        let mut swaps = self.chain_swaps.lock().expect("lock");
        match swaps.get_mut(id) {
            Some(swap) => {
                let leg = if sending {
                    &mut swap.sending
                } else {
                    &mut swap.receiving
                };
                leg.transaction_id = Some(transaction_id);
                leg.locked_amount = Some(locked_amount);
                Ok(())
            }
            None => Err(Error::SwapNotFound(id.to_string())),
        }
    }

    async fn set_submarine_preimage(&self, id: &str, preimage: [u8; 32]) -> Result<(), Error> {
        let mut swaps = self.submarine_swaps.lock().expect("lock");
        match swaps.get_mut(id) {
            Some(swap) => {
                swap.preimage = Some(preimage);
                Ok(())
            }
            None => Err(Error::SwapNotFound(id.to_string())),
        }
    }

    async fn set_reverse_preimage(&self, id: &str, preimage: [u8; 32]) -> Result<(), Error> {
        let mut swaps = self.reverse_swaps.lock().expect("lock");
        match swaps.get_mut(id) {
            Some(swap) => {
                swap.preimage = Some(preimage);
                Ok(())
            }
            None => Err(Error::SwapNotFound(id.to_string())),
        }
    }

    async fn set_chain_preimage(&self, id: &str, preimage: [u8; 32]) -> Result<(), Error> {
        let mut swaps = self.chain_swaps.lock().expect("lock");
        match swaps.get_mut(id) {
            Some(swap) => {
                swap.preimage = Some(preimage);
                Ok(())
            }
            None => Err(Error::SwapNotFound(id.to_string())),
        }
    }

    async fn list_pending_submarine(&self) -> Result<Vec<SubmarineSwap>, Error> {
        let swaps = self.submarine_swaps.lock().expect("lock");
        Ok(swaps
            .values()
            .filter(|s| !terminal(s.status))
            .cloned()
            .collect())
    }

    async fn list_pending_reverse(&self) -> Result<Vec<ReverseSwap>, Error> {
        let swaps = self.reverse_swaps.lock().expect("lock");
        Ok(swaps
            .values()
            .filter(|s| !terminal(s.status))
            .cloned()
            .collect())
    }

    async fn list_pending_chain(&self) -> Result<Vec<ChainSwap>, Error> {
        let swaps = self.chain_swaps.lock().expect("lock");
        Ok(swaps
            .values()
            .filter(|s| !terminal(s.status))
            .cloned()
            .collect())
    }
}
