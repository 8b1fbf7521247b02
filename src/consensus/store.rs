use std::collections::HashMap;
use std::sync::RwLock;

use super::vote::AccountId;
use crate::common::crypto::Digest;

/// Read access to locally held account state.
pub trait AccountState: Send + Sync {
    fn account_hash(&self, account_id: &AccountId) -> Option<Digest>;
}

#[derive(Debug, Default)]
pub struct AccountStore {
    accounts: RwLock<HashMap<AccountId, Digest>>,
}

impl AccountStore {
    pub fn new() -> Self {
        AccountStore {
            accounts: RwLock::new(HashMap::new()),
        }
    }

    pub fn set_account(&self, account_id: AccountId, hash: Digest) {
        if let Ok(mut accounts) = self.accounts.write() {
            accounts.insert(account_id, hash);
        }
    }
}

impl AccountState for AccountStore {
    fn account_hash(&self, account_id: &AccountId) -> Option<Digest> {
        self.accounts.read().ok()?.get(account_id).copied()
    }
}
