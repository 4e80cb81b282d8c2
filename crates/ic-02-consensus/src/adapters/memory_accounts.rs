//! In-memory account state, for tests and tooling.

use parking_lot::RwLock;
use shared_types::{Account, Address};
use std::collections::HashMap;

use crate::ports::AccountReader;

#[derive(Debug, Default)]
pub struct MemoryAccounts {
    accounts: RwLock<HashMap<Address, Account>>,
}

impl MemoryAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with the given accounts.
    pub fn with_accounts(accounts: impl IntoIterator<Item = Account>) -> Self {
        let store = Self::new();
        for account in accounts {
            store.put(account);
        }
        store
    }

    pub fn put(&self, account: Account) {
        self.accounts.write().insert(account.address, account);
    }
}

impl AccountReader for MemoryAccounts {
    fn get_account(&self, address: &Address) -> Result<Option<Account>, String> {
        Ok(self.accounts.read().get(address).cloned())
    }
}
