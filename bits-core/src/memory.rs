//! In-memory implementation of every store seam.
//!
//! Used as the fixture backing collection in tests and demos. It honours the
//! same filter and ordering contract as the real stores, counts calls per
//! operation and can be told to fail the next call of an operation.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::BitsError;
use crate::filter::BitFilter;
use crate::models::{
    Bit, BitChanges, BitInsert, Child, ChildChanges, ChildInsert, ChildSummary, Milestone,
    PhotoUpload,
};
use crate::store::{
    photo_object_path, timeline_order, BitStore, ChildStore, Identity, MilestoneStore, Page,
    PhotoStore,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    ListBits,
    CreateBit,
    UpdateBit,
    DeleteBit,
    UploadPhoto,
    ListChildren,
    CreateChild,
    UpdateChild,
    DeleteChild,
    ListMilestones,
    CreateMilestone,
}

#[derive(Default)]
struct State {
    user: Option<Uuid>,
    bits: Vec<Bit>,
    children: Vec<Child>,
    milestones: Vec<Milestone>,
    photos: Vec<String>,
    calls: HashMap<StoreOp, usize>,
    failures: HashMap<StoreOp, String>,
}

impl State {
    /// Count the call and consume a scheduled failure, if any.
    fn enter(&mut self, op: StoreOp) -> Result<(), BitsError> {
        *self.calls.entry(op).or_default() += 1;
        match self.failures.remove(&op) {
            Some(message) => Err(BitsError::Api { code: 500, message }),
            None => Ok(()),
        }
    }

    fn summary_for(&self, child_id: Option<Uuid>) -> Option<ChildSummary> {
        let id = child_id?;
        self.children.iter().find(|c| c.id == id).map(|c| ChildSummary {
            id: c.id,
            name: c.name.clone(),
            color: c.color.clone(),
            photo_url: c.photo_url.clone(),
        })
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store with `user` signed in.
    pub fn signed_in(user: Uuid) -> Self {
        Self {
            state: Mutex::new(State {
                user: Some(user),
                ..Default::default()
            }),
        }
    }

    pub async fn sign_in(&self, user: Uuid) {
        self.state.lock().await.user = Some(user);
    }

    pub async fn sign_out(&self) {
        self.state.lock().await.user = None;
    }

    /// Seed a bit verbatim, bypassing call counting.
    pub async fn insert_bit(&self, bit: Bit) {
        self.state.lock().await.bits.push(bit);
    }

    pub async fn insert_child(&self, child: Child) {
        self.state.lock().await.children.push(child);
    }

    /// Make the next call of `op` fail with an API error.
    pub async fn fail_next(&self, op: StoreOp, message: impl Into<String>) {
        self.state.lock().await.failures.insert(op, message.into());
    }

    pub async fn call_count(&self, op: StoreOp) -> usize {
        self.state.lock().await.calls.get(&op).copied().unwrap_or(0)
    }

    pub async fn bit(&self, id: Uuid) -> Option<Bit> {
        self.state.lock().await.bits.iter().find(|b| b.id == id).cloned()
    }

    pub async fn bit_count(&self) -> usize {
        self.state.lock().await.bits.len()
    }

    /// Object paths of every uploaded photo.
    pub async fn photos(&self) -> Vec<String> {
        self.state.lock().await.photos.clone()
    }
}

#[async_trait]
impl BitStore for MemoryStore {
    async fn list_bits(
        &self,
        filter: &BitFilter,
        page: usize,
        page_size: usize,
    ) -> Result<Page, BitsError> {
        let mut state = self.state.lock().await;
        state.enter(StoreOp::ListBits)?;

        let mut matching: Vec<Bit> = filter.apply(&state.bits).into_iter().cloned().collect();
        matching.sort_by(timeline_order);

        let total = matching.len() as u64;
        let rows = matching
            .into_iter()
            .skip(page.saturating_mul(page_size))
            .take(page_size)
            .map(|mut bit| {
                bit.child = state.summary_for(bit.child_id);
                bit
            })
            .collect();

        Ok(Page {
            rows,
            total: Some(total),
        })
    }

    async fn create_bit(&self, insert: &BitInsert) -> Result<Bit, BitsError> {
        let mut state = self.state.lock().await;
        state.enter(StoreOp::CreateBit)?;

        let now = Utc::now();
        let bit = Bit {
            id: Uuid::new_v4(),
            user_id: insert.user_id,
            child_id: insert.child_id,
            text: insert.text.clone(),
            context: insert.context.clone(),
            photo_url: insert.photo_url.clone(),
            bit_date: Some(insert.bit_date),
            created_at: now,
            updated_at: now,
            child: state.summary_for(insert.child_id),
        };
        state.bits.push(bit.clone());
        Ok(bit)
    }

    async fn update_bit(&self, id: Uuid, changes: &BitChanges) -> Result<(), BitsError> {
        let mut state = self.state.lock().await;
        state.enter(StoreOp::UpdateBit)?;

        let bit = state
            .bits
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or_else(|| BitsError::NotFound(format!("bit {}", id)))?;
        if let Some(text) = &changes.text {
            bit.text = text.clone();
        }
        if let Some(child_id) = changes.child_id {
            bit.child_id = child_id;
        }
        if let Some(url) = &changes.photo_url {
            bit.photo_url = Some(url.clone());
        }
        if let Some(context) = &changes.context {
            bit.context = context.clone();
        }
        if let Some(date) = changes.bit_date {
            bit.bit_date = Some(date);
        }
        bit.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_bit(&self, id: Uuid) -> Result<(), BitsError> {
        let mut state = self.state.lock().await;
        state.enter(StoreOp::DeleteBit)?;
        state.bits.retain(|b| b.id != id);
        Ok(())
    }
}

#[async_trait]
impl ChildStore for MemoryStore {
    async fn list_children(&self) -> Result<Vec<Child>, BitsError> {
        let mut state = self.state.lock().await;
        state.enter(StoreOp::ListChildren)?;
        let mut children = state.children.clone();
        children.sort_by_key(|c| c.created_at);
        Ok(children)
    }

    async fn create_child(&self, insert: &ChildInsert) -> Result<Child, BitsError> {
        let mut state = self.state.lock().await;
        state.enter(StoreOp::CreateChild)?;
        let now = Utc::now();
        let child = Child {
            id: Uuid::new_v4(),
            user_id: insert.user_id,
            name: insert.name.clone(),
            birthdate: insert.birthdate,
            color: insert.color.clone(),
            photo_url: None,
            created_at: now,
            updated_at: now,
        };
        state.children.push(child.clone());
        Ok(child)
    }

    async fn update_child(&self, id: Uuid, changes: &ChildChanges) -> Result<(), BitsError> {
        let mut state = self.state.lock().await;
        state.enter(StoreOp::UpdateChild)?;
        let child = state
            .children
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| BitsError::NotFound(format!("child {}", id)))?;
        if let Some(name) = &changes.name {
            child.name = name.clone();
        }
        if let Some(birthdate) = changes.birthdate {
            child.birthdate = birthdate;
        }
        if let Some(color) = &changes.color {
            child.color = color.clone();
        }
        child.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_child(&self, id: Uuid) -> Result<(), BitsError> {
        let mut state = self.state.lock().await;
        state.enter(StoreOp::DeleteChild)?;
        state.children.retain(|c| c.id != id);
        // bits keep their rows; the association is nulled
        for bit in state.bits.iter_mut().filter(|b| b.child_id == Some(id)) {
            bit.child_id = None;
        }
        Ok(())
    }
}

#[async_trait]
impl MilestoneStore for MemoryStore {
    async fn list_milestones(&self) -> Result<Vec<Milestone>, BitsError> {
        let mut state = self.state.lock().await;
        state.enter(StoreOp::ListMilestones)?;
        let mut milestones = state.milestones.clone();
        milestones.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(milestones)
    }

    async fn create_milestone(&self, user_id: Uuid, name: &str) -> Result<Milestone, BitsError> {
        let mut state = self.state.lock().await;
        state.enter(StoreOp::CreateMilestone)?;
        if state
            .milestones
            .iter()
            .any(|m| m.user_id == user_id && m.name == name)
        {
            return Err(BitsError::AlreadyExists(format!("milestone '{}'", name)));
        }
        let milestone = Milestone {
            id: Uuid::new_v4(),
            user_id,
            name: name.to_string(),
            created_at: Utc::now(),
        };
        state.milestones.push(milestone.clone());
        Ok(milestone)
    }
}

#[async_trait]
impl PhotoStore for MemoryStore {
    async fn upload_photo(&self, owner: Uuid, photo: &PhotoUpload) -> Result<String, BitsError> {
        let mut state = self.state.lock().await;
        state.enter(StoreOp::UploadPhoto)?;
        let path = photo_object_path(owner, photo);
        state.photos.push(path.clone());
        Ok(format!("memory://bit-photos/{}", path))
    }
}

#[async_trait]
impl Identity for MemoryStore {
    async fn current_user_id(&self) -> Result<Option<Uuid>, BitsError> {
        Ok(self.state.lock().await.user)
    }
}
