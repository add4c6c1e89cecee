use std::sync::Arc;

use crate::error::BitsError;
use crate::models::Milestone;
use crate::store::{require_user, Identity, MilestoneStore};

pub const MAX_MILESTONE_CHARS: usize = 100;

/// Named milestones a user can tag moments with.
pub struct MilestoneService {
    store: Arc<dyn MilestoneStore>,
    identity: Arc<dyn Identity>,
}

impl MilestoneService {
    pub fn new(store: Arc<dyn MilestoneStore>, identity: Arc<dyn Identity>) -> Self {
        Self { store, identity }
    }

    /// Milestones of the signed-in user, by name. Empty when signed out.
    pub async fn list(&self) -> Result<Vec<Milestone>, BitsError> {
        if self.identity.current_user_id().await?.is_none() {
            return Ok(Vec::new());
        }
        self.store.list_milestones().await
    }

    /// Create a milestone. A name the user already saved is reported as
    /// [`BitsError::AlreadyExists`].
    pub async fn create(&self, name: &str) -> Result<Milestone, BitsError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(BitsError::validation("Milestone name is required"));
        }
        if name.chars().count() > MAX_MILESTONE_CHARS {
            return Err(BitsError::validation("Milestone name too long"));
        }
        let user_id = require_user(self.identity.as_ref()).await?;

        match self.store.create_milestone(user_id, name).await {
            Ok(milestone) => {
                tracing::info!(event = "milestone_created", milestone_id = %milestone.id, "Milestone created");
                Ok(milestone)
            }
            Err(BitsError::AlreadyExists(_)) => {
                tracing::debug!(name = %name, "Milestone already exists");
                Err(BitsError::AlreadyExists(format!("milestone '{}'", name)))
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_duplicate_name_reports_already_exists() {
        let store = Arc::new(MemoryStore::signed_in(Uuid::new_v4()));
        let milestones = MilestoneService::new(store.clone(), store.clone());

        milestones.create("  First word ").await.unwrap();
        let err = milestones.create("First word").await.unwrap_err();
        assert_eq!(err.to_string(), "Already exists: milestone 'First word'");
    }

    #[tokio::test]
    async fn test_list_is_sorted_and_empty_when_signed_out() {
        let store = Arc::new(MemoryStore::signed_in(Uuid::new_v4()));
        let milestones = MilestoneService::new(store.clone(), store.clone());
        milestones.create("Walking").await.unwrap();
        milestones.create("Crawling").await.unwrap();

        let names: Vec<_> = milestones
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(names, vec!["Crawling", "Walking"]);

        store.sign_out().await;
        assert!(milestones.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blank_name_is_rejected() {
        let store = Arc::new(MemoryStore::signed_in(Uuid::new_v4()));
        let milestones = MilestoneService::new(store.clone(), store.clone());
        assert!(milestones.create("   ").await.unwrap_err().is_validation());
    }
}
