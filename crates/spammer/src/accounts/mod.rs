//! Sender account pool.
//!
//! Accounts are derived deterministically from a seed string: account `i` is
//! a pure function of `(seed, i)`, so a pool of 100 shares its first 10
//! identities with a pool of 10 built from the same seed. Deriving a pool
//! never touches the network.

use loadgen_types::{Address, Identity};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Ordered pool of sender identities.
///
/// Identities are owned here and handed out as `Arc<Identity>` so submission
/// tasks can reference a sender without copying its key.
pub struct AccountPool {
    seed: String,
    accounts: Vec<Arc<Identity>>,
    by_address: HashMap<Address, usize>,
}

impl AccountPool {
    /// Derive `count` accounts from `seed`.
    pub fn derive(seed: &str, count: usize) -> Result<Self, AccountPoolError> {
        if count == 0 {
            return Err(AccountPoolError::Empty);
        }

        let accounts: Vec<Arc<Identity>> = (0..count as u64)
            .map(|i| Arc::new(Identity::derive(seed, i)))
            .collect();

        let mut by_address = HashMap::with_capacity(count);
        for (i, account) in accounts.iter().enumerate() {
            if let Some(previous) = by_address.insert(account.address(), i) {
                return Err(AccountPoolError::DuplicateAddress {
                    first: previous,
                    second: i,
                });
            }
        }

        info!(seed, accounts = count, "Derived account pool");

        Ok(Self {
            seed: seed.to_string(),
            accounts,
            by_address,
        })
    }

    /// Seed the pool was derived from.
    pub fn seed(&self) -> &str {
        &self.seed
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Identity at `index`.
    pub fn get(&self, index: usize) -> Option<&Arc<Identity>> {
        self.accounts.get(index)
    }

    /// Address of the account at `index`.
    pub fn address(&self, index: usize) -> Option<Address> {
        self.accounts.get(index).map(|a| a.address())
    }

    /// Position of `address` in the pool.
    pub fn index_of(&self, address: &Address) -> Option<usize> {
        self.by_address.get(address).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Identity>> + '_ {
        self.accounts.iter()
    }

    /// All addresses, in pool order.
    pub fn addresses(&self) -> Vec<Address> {
        self.accounts.iter().map(|a| a.address()).collect()
    }
}

impl std::fmt::Debug for AccountPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountPool")
            .field("seed", &self.seed)
            .field("accounts", &self.accounts.len())
            .finish()
    }
}

/// Errors from deriving an account pool.
#[derive(Debug, thiserror::Error)]
pub enum AccountPoolError {
    #[error("Account pool must contain at least one account")]
    Empty,

    #[error("Accounts {first} and {second} derived the same address")]
    DuplicateAddress { first: usize, second: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_generation() {
        let pool = AccountPool::derive("loadgen", 16).unwrap();
        assert_eq!(pool.len(), 16);
        assert_eq!(pool.addresses().len(), 16);
        assert_eq!(pool.seed(), "loadgen");
    }

    #[test]
    fn test_account_deterministic() {
        let a = AccountPool::derive("loadgen", 8).unwrap();
        let b = AccountPool::derive("loadgen", 8).unwrap();
        assert_eq!(a.addresses(), b.addresses());

        let other = AccountPool::derive("other", 8).unwrap();
        assert_ne!(a.address(0), other.address(0));
    }

    #[test]
    fn test_prefix_stable() {
        let small = AccountPool::derive("loadgen", 10).unwrap();
        let large = AccountPool::derive("loadgen", 100).unwrap();
        assert_eq!(small.addresses(), large.addresses()[..10].to_vec());
    }

    #[test]
    fn test_lookup() {
        let pool = AccountPool::derive("loadgen", 5).unwrap();
        for i in 0..5 {
            let address = pool.address(i).unwrap();
            assert_eq!(pool.index_of(&address), Some(i));
            assert_eq!(pool.get(i).unwrap().address(), address);
        }
        assert!(pool.get(5).is_none());
        assert_eq!(pool.index_of(&Identity::from_phrase("//Alice").address()), None);
    }

    #[test]
    fn test_empty_pool_rejected() {
        assert!(matches!(
            AccountPool::derive("loadgen", 0),
            Err(AccountPoolError::Empty)
        ));
    }
}
