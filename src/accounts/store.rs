//! In-memory account table.

use std::collections::HashMap;

use serde::Serialize;

use crate::config::AccountRecord;

/// Credential pair of one upstream application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AccountInfo {
    pub app_id: String,
    pub app_secret: String,
}

impl AccountInfo {
    pub fn new(app_id: impl Into<String>, app_secret: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            app_secret: app_secret.into(),
        }
    }

    /// True when no account was resolved.
    pub fn is_empty(&self) -> bool {
        self.app_id.is_empty() && self.app_secret.is_empty()
    }

    /// Reset to empty, keeping the string buffers.
    pub fn clear(&mut self) {
        self.app_id.clear();
        self.app_secret.clear();
    }
}

/// Read-only map from account id to credentials, built once at startup.
#[derive(Debug, Clone, Default)]
pub struct AccountStore {
    accounts: HashMap<i64, AccountInfo>,
}

impl AccountStore {
    /// Build the store from configuration rows. Rows not in state 1 are skipped.
    pub fn from_records(records: &[AccountRecord]) -> Self {
        let accounts: HashMap<_, _> = records
            .iter()
            .filter(|r| r.state == 1)
            .map(|r| (r.id, AccountInfo::new(&r.app_id, &r.app_secret)))
            .collect();

        tracing::info!(
            loaded = accounts.len(),
            skipped = records.len() - accounts.len(),
            "Account store initialized"
        );

        Self { accounts }
    }

    pub fn from_map(accounts: HashMap<i64, AccountInfo>) -> Self {
        Self { accounts }
    }

    /// Look up an account. Unknown ids resolve to an empty [`AccountInfo`].
    pub fn lookup(&self, account_id: i64) -> AccountInfo {
        self.accounts.get(&account_id).cloned().unwrap_or_default()
    }

    /// Copy the credentials into `out`, reusing its buffers.
    pub fn lookup_into(&self, account_id: i64, out: &mut AccountInfo) {
        out.clear();
        if let Some(info) = self.accounts.get(&account_id) {
            out.app_id.push_str(&info.app_id);
            out.app_secret.push_str(&info.app_secret);
        }
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}
