//! Bit writes.
//!
//! Every write validates first, then resolves the signed-in user, then talks
//! to the store. Photos are uploaded before the row is written so a failed
//! upload never leaves a row pointing at a missing object. A successful write
//! bumps the [`CacheVersion`], which sends every timeline back to page 0.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::error::BitsError;
use crate::feed::CacheVersion;
use crate::models::{Bit, BitChanges, BitInsert, BitPatch, NewBit};
use crate::store::{require_user, BitStore, Identity, PhotoStore};

pub struct BitMutations {
    store: Arc<dyn BitStore>,
    photos: Arc<dyn PhotoStore>,
    identity: Arc<dyn Identity>,
    version: CacheVersion,
}

impl BitMutations {
    pub fn new(
        store: Arc<dyn BitStore>,
        photos: Arc<dyn PhotoStore>,
        identity: Arc<dyn Identity>,
        version: CacheVersion,
    ) -> Self {
        Self {
            store,
            photos,
            identity,
            version,
        }
    }

    pub async fn create(&self, new: NewBit) -> Result<Bit, BitsError> {
        new.validate()?;
        let user_id = require_user(self.identity.as_ref()).await?;

        let photo_url = match &new.photo {
            Some(photo) => Some(self.photos.upload_photo(user_id, photo).await?),
            None => None,
        };

        let insert = BitInsert {
            user_id,
            text: new.text.trim().to_string(),
            child_id: new.child_id,
            photo_url,
            context: non_blank(new.context),
            bit_date: new.bit_date.unwrap_or_else(|| Utc::now().date_naive()),
        };
        let bit = self.store.create_bit(&insert).await?;

        self.version.bump();
        tracing::info!(event = "bit_created", bit_id = %bit.id, has_photo = bit.photo_url.is_some(), "Bit created");
        Ok(bit)
    }

    /// Apply a partial update. Omitting the photo keeps the stored one.
    pub async fn update(&self, id: Uuid, patch: BitPatch) -> Result<(), BitsError> {
        patch.validate()?;
        let user_id = require_user(self.identity.as_ref()).await?;

        let photo_url = match &patch.photo {
            Some(photo) => Some(self.photos.upload_photo(user_id, photo).await?),
            None => None,
        };

        let changes = BitChanges {
            text: patch.text.map(|t| t.trim().to_string()),
            child_id: patch.child_id,
            photo_url,
            context: patch.context.map(non_blank),
            bit_date: patch.bit_date,
        };
        if changes.is_empty() {
            return Ok(());
        }
        self.store.update_bit(id, &changes).await?;

        self.version.bump();
        tracing::info!(event = "bit_updated", bit_id = %id, "Bit updated");
        Ok(())
    }

    /// Remove a bit. Confirmation is the caller's concern.
    pub async fn delete(&self, id: Uuid) -> Result<(), BitsError> {
        require_user(self.identity.as_ref()).await?;
        self.store.delete_bit(id).await?;

        self.version.bump();
        tracing::info!(event = "bit_deleted", bit_id = %id, "Bit deleted");
        Ok(())
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
