//! Child profile management.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::error::BitsError;
use crate::feed::CacheVersion;
use crate::models::{Child, ChildPatch, NewChild};
use crate::store::{require_user, ChildStore, Identity};

pub struct ChildService {
    store: Arc<dyn ChildStore>,
    identity: Arc<dyn Identity>,
    /// Bit listings embed child summaries, so child writes invalidate them.
    bits_version: CacheVersion,
}

impl ChildService {
    pub fn new(
        store: Arc<dyn ChildStore>,
        identity: Arc<dyn Identity>,
        bits_version: CacheVersion,
    ) -> Self {
        Self {
            store,
            identity,
            bits_version,
        }
    }

    pub async fn list(&self) -> Result<Vec<Child>, BitsError> {
        self.store.list_children().await
    }

    pub async fn create(&self, new: NewChild) -> Result<Child, BitsError> {
        let today = Utc::now().date_naive();
        new.validate(today)?;
        let user_id = require_user(self.identity.as_ref()).await?;
        let insert = new.into_insert(user_id, today)?;

        let child = self.store.create_child(&insert).await?;
        tracing::info!(event = "child_created", child_id = %child.id, name = %child.name, "Child created");
        Ok(child)
    }

    pub async fn update(&self, id: Uuid, patch: ChildPatch) -> Result<(), BitsError> {
        let changes = patch.into_changes(Utc::now().date_naive())?;
        require_user(self.identity.as_ref()).await?;
        self.store.update_child(id, &changes).await?;

        self.bits_version.bump();
        tracing::info!(event = "child_updated", child_id = %id, "Child updated");
        Ok(())
    }

    /// Remove a child. Its bits survive with the association cleared.
    pub async fn delete(&self, id: Uuid) -> Result<(), BitsError> {
        require_user(self.identity.as_ref()).await?;
        self.store.delete_child(id).await?;

        self.bits_version.bump();
        tracing::info!(event = "child_deleted", child_id = %id, "Child deleted");
        Ok(())
    }
}
