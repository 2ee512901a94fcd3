//! Account resolution.
//!
//! The account table maps the opaque `accountId` of a call to the credential
//! pair used against the upstream API. It is loaded from configuration at
//! startup and never mutated afterwards, so lookups take no locks.

pub mod store;

pub use store::{AccountInfo, AccountStore};
