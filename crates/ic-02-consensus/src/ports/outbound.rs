//! Driven ports (Outbound dependencies)

use shared_types::{Account, Address};

/// Read access to persisted account state.
///
/// Errors are carried as strings so any storage backend can sit behind it.
pub trait AccountReader: Send + Sync {
    fn get_account(&self, address: &Address) -> Result<Option<Account>, String>;
}

impl<T: AccountReader + ?Sized> AccountReader for std::sync::Arc<T> {
    fn get_account(&self, address: &Address) -> Result<Option<Account>, String> {
        (**self).get_account(address)
    }
}
