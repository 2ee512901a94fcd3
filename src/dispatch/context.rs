//! Per-request state.

use std::collections::HashMap;

use axum::http::{Method, StatusCode};

use crate::accounts::AccountInfo;
use crate::dispatch::envelope::Envelope;

/// State of one in-flight call.
///
/// Instances are recycled through [`ContextPool`](crate::dispatch::ContextPool);
/// a context is owned by exactly one request between acquire and release.
#[derive(Debug, Default)]
pub struct RequestContext {
    request_id: String,
    http_method: Method,
    path: String,
    params: HashMap<String, String>,
    account_id: Option<i64>,
    account: AccountInfo,
    response: Option<Envelope>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a credential pair. Used when driving handlers directly.
    pub fn with_account(mut self, account: AccountInfo) -> Self {
        self.account = account;
        self
    }

    /// Add a form field. Used when driving handlers directly.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Bind the context to a new exchange.
    pub(crate) fn begin(&mut self, method: &Method, path: &str, request_id: &str) {
        self.http_method = method.clone();
        self.path.push_str(path);
        self.request_id.push_str(request_id);
    }

    /// Clear everything, keeping allocated buffers for the next request.
    pub(crate) fn reset(&mut self) {
        self.request_id.clear();
        self.http_method = Method::GET;
        self.path.clear();
        self.params.clear();
        self.account_id = None;
        self.account.clear();
        self.response = None;
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn http_method(&self) -> &Method {
        &self.http_method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Form field value, if the caller sent it.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    pub(crate) fn params_mut(&mut self) -> &mut HashMap<String, String> {
        &mut self.params
    }

    pub fn account_id(&self) -> Option<i64> {
        self.account_id
    }

    /// Resolved credentials; empty when the account id is unknown.
    pub fn account(&self) -> &AccountInfo {
        &self.account
    }

    pub(crate) fn set_account_id(&mut self, account_id: i64) {
        self.account_id = Some(account_id);
    }

    pub(crate) fn account_mut(&mut self) -> &mut AccountInfo {
        &mut self.account
    }

    /// Store the response. Only the first write is kept; returns whether
    /// this call was it.
    pub fn respond(&mut self, envelope: Envelope) -> bool {
        if self.response.is_some() {
            return false;
        }
        self.response = Some(envelope);
        true
    }

    pub fn response(&self) -> Option<&Envelope> {
        self.response.as_ref()
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.response.as_ref().map(Envelope::status)
    }

    pub(crate) fn take_response(&mut self) -> Option<Envelope> {
        self.response.take()
    }
}
