use std::collections::HashMap;

use thiserror::Error;

use crate::models::{Address, Oracle, OracleIndexes};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("oracle {0} is already in the pool")]
    AlreadyRegistered(Address),
}

/// Registered oracles plus a lookup from index to the oracles holding it.
///
/// Append-only: oracles are never removed or re-registered during a run.
#[derive(Debug, Default, Clone)]
pub struct OraclePool {
    oracles: Vec<Oracle>,
    by_index: HashMap<u8, Vec<usize>>,
}

impl OraclePool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, address: Address, indexes: OracleIndexes) -> Result<(), PoolError> {
        if self.oracles.iter().any(|oracle| oracle.address == address) {
            return Err(PoolError::AlreadyRegistered(address));
        }

        let position = self.oracles.len();
        self.oracles.push(Oracle { address, indexes });
        for index in indexes.distinct() {
            self.by_index.entry(index).or_default().push(position);
        }
        Ok(())
    }

    /// Oracles holding `index` in any slot, each listed once, in registration order.
    pub fn holders(&self, index: u8) -> impl Iterator<Item = &Oracle> + '_ {
        self.by_index
            .get(&index)
            .into_iter()
            .flatten()
            .map(|position| &self.oracles[*position])
    }

    pub fn oracles(&self) -> &[Oracle] {
        &self.oracles
    }

    pub fn get(&self, address: &Address) -> Option<&Oracle> {
        self.oracles.iter().find(|oracle| oracle.address == *address)
    }

    pub fn len(&self) -> usize {
        self.oracles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.oracles.is_empty()
    }
}
