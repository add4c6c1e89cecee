//! Collaborator seams.
//!
//! The core never talks to a database, bucket or function directly; it goes
//! through these traits. Implementations: [`crate::memory::MemoryStore`]
//! (fixtures), [`crate::rest::RestBackend`] (hosted backend) and
//! [`crate::pg::PgStore`] (direct Postgres).

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::BitsError;
use crate::filter::BitFilter;
use crate::models::{
    Bit, BitChanges, BitInsert, Child, ChildChanges, ChildInsert, Milestone, PhotoUpload,
};

/// One page window returned by [`BitStore::list_bits`].
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub rows: Vec<Bit>,
    /// Exact number of matching rows, when the store can report it.
    pub total: Option<u64>,
}

/// Relational storage of bits.
///
/// `list_bits` must order rows by effective date descending, then
/// `created_at` descending, then id descending.
#[async_trait]
pub trait BitStore: Send + Sync {
    async fn list_bits(
        &self,
        filter: &BitFilter,
        page: usize,
        page_size: usize,
    ) -> Result<Page, BitsError>;

    async fn create_bit(&self, insert: &BitInsert) -> Result<Bit, BitsError>;

    async fn update_bit(&self, id: Uuid, changes: &BitChanges) -> Result<(), BitsError>;

    async fn delete_bit(&self, id: Uuid) -> Result<(), BitsError>;
}

#[async_trait]
pub trait ChildStore: Send + Sync {
    /// Children ordered by creation, oldest first.
    async fn list_children(&self) -> Result<Vec<Child>, BitsError>;

    async fn create_child(&self, insert: &ChildInsert) -> Result<Child, BitsError>;

    async fn update_child(&self, id: Uuid, changes: &ChildChanges) -> Result<(), BitsError>;

    async fn delete_child(&self, id: Uuid) -> Result<(), BitsError>;
}

#[async_trait]
pub trait MilestoneStore: Send + Sync {
    /// Milestones ordered by name.
    async fn list_milestones(&self) -> Result<Vec<Milestone>, BitsError>;

    /// Fails with [`BitsError::AlreadyExists`] when the owner already has the name.
    async fn create_milestone(&self, user_id: Uuid, name: &str) -> Result<Milestone, BitsError>;
}

/// Blob storage for photos.
#[async_trait]
pub trait PhotoStore: Send + Sync {
    /// Store the photo under the owner's prefix and return its public URL.
    async fn upload_photo(&self, owner: Uuid, photo: &PhotoUpload) -> Result<String, BitsError>;
}

#[async_trait]
pub trait Identity: Send + Sync {
    /// `None` when no user is signed in.
    async fn current_user_id(&self) -> Result<Option<Uuid>, BitsError>;
}

/// Speech-to-text for recorded voice notes.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &[u8]) -> Result<String, BitsError>;
}

/// Resolve the signed-in user or fail with [`BitsError::NotAuthenticated`].
pub async fn require_user(identity: &dyn Identity) -> Result<Uuid, BitsError> {
    identity
        .current_user_id()
        .await?
        .ok_or(BitsError::NotAuthenticated)
}

/// Photo object key: `<owner>/<random uuid>.<ext>`.
pub fn photo_object_path(owner: Uuid, photo: &PhotoUpload) -> String {
    format!("{}/{}.{}", owner, Uuid::new_v4(), photo.extension())
}

/// Ordering contract shared by every [`BitStore`].
pub fn timeline_order(a: &Bit, b: &Bit) -> std::cmp::Ordering {
    b.effective_date()
        .cmp(&a.effective_date())
        .then_with(|| b.created_at.cmp(&a.created_at))
        .then_with(|| b.id.cmp(&a.id))
}
