//! Transport seam between the engine and the remote authority.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::types::AssignableItem;

pub type Result<T> = std::result::Result<T, TransportError>;

/// Remote operations the engine consumes. Implementations must report 409
/// as [`TransportError::Conflict`] and 404 as [`TransportError::NotFound`].
#[async_trait]
pub trait AssignmentTransport: Send + Sync {
    /// Full catalog of assignable items.
    async fn fetch_catalog(&self) -> Result<Vec<AssignableItem>>;

    /// Items currently assigned to `parent_id`.
    async fn fetch_assigned(&self, parent_id: &str) -> Result<Vec<AssignableItem>>;

    async fn add_assignment(&self, parent_id: &str, item_id: &str) -> Result<()>;

    async fn add_assignments(&self, parent_id: &str, item_ids: &[String]) -> Result<()>;

    async fn remove_assignment(&self, parent_id: &str, item_id: &str) -> Result<()>;

    async fn remove_assignments(&self, parent_id: &str, item_ids: &[String]) -> Result<()>;
}

#[async_trait]
impl<T: AssignmentTransport + ?Sized> AssignmentTransport for Arc<T> {
    async fn fetch_catalog(&self) -> Result<Vec<AssignableItem>> {
        (**self).fetch_catalog().await
    }

    async fn fetch_assigned(&self, parent_id: &str) -> Result<Vec<AssignableItem>> {
        (**self).fetch_assigned(parent_id).await
    }

    async fn add_assignment(&self, parent_id: &str, item_id: &str) -> Result<()> {
        (**self).add_assignment(parent_id, item_id).await
    }

    async fn add_assignments(&self, parent_id: &str, item_ids: &[String]) -> Result<()> {
        (**self).add_assignments(parent_id, item_ids).await
    }

    async fn remove_assignment(&self, parent_id: &str, item_id: &str) -> Result<()> {
        (**self).remove_assignment(parent_id, item_id).await
    }

    async fn remove_assignments(&self, parent_id: &str, item_ids: &[String]) -> Result<()> {
        (**self).remove_assignments(parent_id, item_ids).await
    }
}
