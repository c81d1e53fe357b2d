//! Provider boundary
//!
//! The engine talks to the outside world through a single capability:
//! create/update/delete of one resource, parameterized by a property
//! mapping and returning either provider-assigned output fields or a
//! structured error with a retryable flag. Real cloud providers live in
//! plugin crates; `MemoryProvider` here backs tests and simulated runs.

use async_trait::async_trait;
use loam_core::Properties;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

/// Output fields recorded for an applied resource
pub type Outputs = serde_json::Map<String, serde_json::Value>;

/// Classification of a provider failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Rate limited by the provider API
    RateLimited,
    /// Call timed out
    Timeout,
    /// Request rejected as invalid
    Validation,
    /// Resource conflicts with existing provider state
    Conflict,
    /// Resource does not exist on the provider side
    NotFound,
    /// Anything else
    Other,
}

impl std::fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::RateLimited => "rate limited",
            Self::Timeout => "timeout",
            Self::Validation => "validation failed",
            Self::Conflict => "conflict",
            Self::NotFound => "not found",
            Self::Other => "provider failure",
        };
        f.write_str(s)
    }
}

/// Structured provider failure
#[derive(Error, Debug, Clone)]
#[error("{kind}: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
    pub retryable: bool,
}

impl ProviderError {
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::RateLimited,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Timeout,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Validation,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Conflict,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::NotFound,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Other,
            message: message.into(),
            retryable: false,
        }
    }
}

/// Provider abstraction
///
/// One implementation per cloud backend. The engine never inspects the
/// wire format behind these calls.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider name (e.g. "memory", "azure")
    fn name(&self) -> &str;

    /// Create a resource, returning its provider-assigned outputs
    async fn create(
        &self,
        kind: &str,
        id: &str,
        properties: &Properties,
    ) -> std::result::Result<Outputs, ProviderError>;

    /// Update an existing resource in place
    async fn update(
        &self,
        kind: &str,
        id: &str,
        provider_id: &str,
        properties: &Properties,
    ) -> std::result::Result<Outputs, ProviderError>;

    /// Delete a resource by its provider-assigned id
    async fn delete(
        &self,
        kind: &str,
        provider_id: &str,
    ) -> std::result::Result<(), ProviderError>;
}

/// Retry configuration for transient provider errors
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (first call included)
    pub max_attempts: u32,

    /// Initial delay between retries
    pub initial_delay: std::time::Duration,

    /// Maximum delay between retries
    pub max_delay: std::time::Duration,

    /// Backoff multiplier
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: std::time::Duration::from_secs(1),
            max_delay: std::time::Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> std::time::Duration {
        let factor = self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        let delay = self.initial_delay.mul_f64(factor);
        delay.min(self.max_delay)
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    /// resource id -> outputs of live resources
    live: HashMap<String, Outputs>,
    /// chronological call log, e.g. "create virtual-network/hub-vnet"
    calls: Vec<String>,
    /// resource id -> error returned on every attempt
    fail: HashMap<String, ProviderError>,
    /// resource id -> remaining transient failures before success
    flaky: HashMap<String, u32>,
    sequence: u64,
}

/// In-memory provider used by tests and simulated (offline) runs.
///
/// Outputs synthesize what a real provider would assign: an opaque `id`,
/// the resource `name`, and an echo of every scalar property.
#[derive(Debug, Default)]
pub struct MemoryProvider {
    inner: Mutex<MemoryInner>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every attempt for `id` with the given error
    pub fn fail_on(&self, id: impl Into<String>, error: ProviderError) {
        self.inner.lock().unwrap().fail.insert(id.into(), error);
    }

    /// Fail the first `count` attempts for `id` with a retryable error
    pub fn flaky_on(&self, id: impl Into<String>, count: u32) {
        self.inner.lock().unwrap().flaky.insert(id.into(), count);
    }

    /// Calls issued so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.inner.lock().unwrap().calls.len()
    }

    /// Outputs of a live resource
    pub fn outputs_of(&self, id: &str) -> Option<Outputs> {
        self.inner.lock().unwrap().live.get(id).cloned()
    }

    fn check_failure(
        inner: &mut MemoryInner,
        id: &str,
    ) -> std::result::Result<(), ProviderError> {
        if let Some(error) = inner.fail.get(id) {
            return Err(error.clone());
        }
        if let Some(remaining) = inner.flaky.get_mut(id) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ProviderError::rate_limited(format!(
                    "simulated transient failure for {id}"
                )));
            }
        }
        Ok(())
    }

    fn synthesize(inner: &mut MemoryInner, id: &str, properties: &Properties) -> Outputs {
        inner.sequence += 1;
        let mut outputs = Outputs::new();
        outputs.insert("id".to_string(), json!(format!("mem-{:06}", inner.sequence)));
        outputs.insert("name".to_string(), json!(id));
        for (key, value) in properties {
            if !value.is_object() && !value.is_array() {
                outputs.insert(key.clone(), value.clone());
            }
        }
        outputs
    }
}

#[async_trait]
impl Provider for MemoryProvider {
    fn name(&self) -> &str {
        "memory"
    }

    async fn create(
        &self,
        kind: &str,
        id: &str,
        properties: &Properties,
    ) -> std::result::Result<Outputs, ProviderError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(format!("create {kind}/{id}"));
        Self::check_failure(&mut inner, id)?;
        if inner.live.contains_key(id) {
            return Err(ProviderError::conflict(format!("{kind} '{id}' already exists")));
        }
        let outputs = Self::synthesize(&mut inner, id, properties);
        inner.live.insert(id.to_string(), outputs.clone());
        Ok(outputs)
    }

    async fn update(
        &self,
        kind: &str,
        id: &str,
        provider_id: &str,
        properties: &Properties,
    ) -> std::result::Result<Outputs, ProviderError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(format!("update {kind}/{id}"));
        Self::check_failure(&mut inner, id)?;
        // Upsert: a simulated run has no memory of earlier processes
        let mut outputs = Self::synthesize(&mut inner, id, properties);
        outputs.insert("id".to_string(), json!(provider_id));
        inner.live.insert(id.to_string(), outputs.clone());
        Ok(outputs)
    }

    async fn delete(
        &self,
        kind: &str,
        provider_id: &str,
    ) -> std::result::Result<(), ProviderError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(format!("delete {kind}/{provider_id}"));
        // Scripted failures key on the resource id when the resource is
        // live in this process, on the provider id otherwise
        let key = inner
            .live
            .iter()
            .find(|(_, outputs)| outputs.get("id").and_then(|v| v.as_str()) == Some(provider_id))
            .map(|(id, _)| id.clone())
            .unwrap_or_else(|| provider_id.to_string());
        Self::check_failure(&mut inner, &key)?;
        inner.live.remove(&key);
        Ok(())
    }
}
