//! The `Provider` trait -- the adapter interface for remote issue
//! trackers.
//!
//! Each concrete backend implements this trait. The trait is
//! intentionally object-safe so it can be stored as `Box<dyn Provider>`
//! in the [`registry::ProviderRegistry`] and shared as
//! `Arc<dyn Provider>` by the sync engine.

pub mod memory;
pub mod registry;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryProvider;
pub use registry::ProviderRegistry;

/// A remote tracker item as observed through a provider.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteItem {
    /// Opaque provider-assigned id, stable for the item's lifetime.
    pub id: String,
    /// Short human-facing key, e.g. "#123".
    pub key: String,
    /// Browser URL for the item.
    pub url: String,
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
}

/// Input for creating a remote item.
#[derive(Debug, Clone, Default)]
pub struct CreateItemInput {
    pub title: String,
    pub body: String,
}

/// Input for updating a remote item. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct UpdateItemInput {
    pub title: Option<String>,
    pub body: Option<String>,
    pub labels: Option<Vec<String>>,
}

/// Filters for [`Provider::search_items`].
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    /// Literal text the item body must contain. Discovery passes the
    /// metadata start marker plus plan id here.
    pub body_contains: Option<String>,
    /// Labels the item must carry (all of them).
    pub labels: Vec<String>,
}

/// Errors surfaced by provider implementations.
///
/// The retryability signal is carried on the error itself so the engine
/// never has to guess from message text. The one exception is
/// already-exists classification, where [`ProviderError::is_already_exists`]
/// keeps a string-matching fallback for backends without structured codes.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("provider {provider} does not support {capability}")]
    NotSupported {
        provider: String,
        capability: String,
    },

    #[error("remote item not found: {0}")]
    NotFound(String),

    #[error("provider rejected input: {0}")]
    InvalidInput(String),

    #[error("relation already exists: {0}")]
    AlreadyExists(String),

    #[error("transport error (retryable: {retryable}): {message}")]
    Transport { message: String, retryable: bool },
}

impl ProviderError {
    /// Whether a retry run could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { retryable: true, .. })
    }

    /// Whether this error means the requested relation was already in
    /// place. Structured variant first; falls back to matching the
    /// message for backends that only report error strings.
    pub fn is_already_exists(&self) -> bool {
        match self {
            Self::AlreadyExists(_) => true,
            Self::InvalidInput(msg) | Self::Transport { message: msg, .. } => {
                let msg = msg.to_ascii_lowercase();
                msg.contains("already exists") || msg.contains("duplicate")
            }
            _ => false,
        }
    }
}

/// Adapter interface for a remote issue tracker.
///
/// All methods are suspension points; local computation stays out of
/// this trait. Implementations are responsible for transport-level
/// timeout/retry; the engine treats a timeout like any other
/// [`ProviderError`].
///
/// # Object Safety
///
/// This trait is object-safe: it can be stored as `Box<dyn Provider>`.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Human-readable backend name (e.g. "memory", "github").
    fn name(&self) -> &str;

    /// Find items matching the filters. Used by map-sync discovery.
    async fn search_items(&self, filters: &SearchFilters)
        -> Result<Vec<RemoteItem>, ProviderError>;

    async fn create_item(&self, input: &CreateItemInput) -> Result<RemoteItem, ProviderError>;

    async fn update_item(
        &self,
        id: &str,
        input: &UpdateItemInput,
    ) -> Result<RemoteItem, ProviderError>;

    async fn get_item(&self, id: &str) -> Result<RemoteItem, ProviderError>;

    async fn delete_item(&self, id: &str) -> Result<(), ProviderError>;

    /// Link `child_id` under `parent_id`. Idempotent at the engine
    /// level: an already-present link answers
    /// [`ProviderError::AlreadyExists`].
    async fn set_parent(&self, child_id: &str, parent_id: &str) -> Result<(), ProviderError>;

    /// Mark `item_id` as blocked by `blocked_by_id`.
    async fn add_dependency(
        &self,
        item_id: &str,
        blocked_by_id: &str,
    ) -> Result<(), ProviderError>;
}

// Compile-time assertion: Provider must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn Provider) {}
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_signal_is_structural() {
        let retryable = ProviderError::Transport {
            message: "connection reset".to_owned(),
            retryable: true,
        };
        let permanent = ProviderError::Transport {
            message: "422 unprocessable".to_owned(),
            retryable: false,
        };
        assert!(retryable.is_retryable());
        assert!(!permanent.is_retryable());
        assert!(!ProviderError::Auth("bad token".to_owned()).is_retryable());
        assert!(!ProviderError::InvalidInput("bad field".to_owned()).is_retryable());
    }

    #[test]
    fn already_exists_structured_variant() {
        assert!(ProviderError::AlreadyExists("link".to_owned()).is_already_exists());
    }

    #[test]
    fn already_exists_string_fallback() {
        // Backends without structured codes report strings; both common
        // phrasings classify.
        assert!(
            ProviderError::InvalidInput("Dependency already exists on issue".to_owned())
                .is_already_exists()
        );
        assert!(
            ProviderError::Transport {
                message: "duplicate relation".to_owned(),
                retryable: false,
            }
            .is_already_exists()
        );
        assert!(!ProviderError::InvalidInput("missing relation".to_owned()).is_already_exists());
        assert!(!ProviderError::NotFound("x".to_owned()).is_already_exists());
    }

    #[test]
    fn error_messages_name_the_failure() {
        let err = ProviderError::NotSupported {
            provider: "memory".to_owned(),
            capability: "delete_item".to_owned(),
        };
        assert_eq!(err.to_string(), "provider memory does not support delete_item");
    }
}
