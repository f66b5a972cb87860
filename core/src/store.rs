use std::collections::HashMap;
use std::sync::Mutex;

use uuid::Uuid;

use crate::leads::{
    AuditEntry, DependentRecord, Lead, MergeAuditRecord, MigrationMarker, RetirementStamp,
};

/// Failure reported by a backing store. The engine never interprets the
/// text; it only propagates it as an internal error.
#[derive(Debug, thiserror::Error)]
#[error("storage error: {0}")]
pub struct StoreError(pub String);

/// The identity registry: CRUD on lead records. The merge subsystem is a
/// consumer of this store, never its owner.
pub trait LeadStore {
    fn find_by_id(&self, id: Uuid) -> impl Future<Output = Result<Option<Lead>, StoreError>> + Send;
    fn find_active(&self) -> impl Future<Output = Result<Vec<Lead>, StoreError>> + Send;
    fn create(&self, lead: Lead) -> impl Future<Output = Result<Lead, StoreError>> + Send;
    /// Full-record write. Also the compensation path that reactivates a
    /// deactivated source during rollback.
    fn update(&self, lead: &Lead) -> impl Future<Output = Result<(), StoreError>> + Send;
    fn deactivate(
        &self,
        id: Uuid,
        stamp: RetirementStamp,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// The audit/task stores: dependent records owned by leads, merge
/// snapshots, and the audit trail.
pub trait DependentStore {
    fn find_owned_by(
        &self,
        lead_id: Uuid,
    ) -> impl Future<Output = Result<Vec<DependentRecord>, StoreError>> + Send;
    /// Move a dependent to a new owner. `marker` records the pre-merge
    /// owner; passing `None` clears it (the undo path).
    fn reassign_owner(
        &self,
        record_id: Uuid,
        new_lead_id: Uuid,
        marker: Option<MigrationMarker>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
    /// Must be durable before the caller proceeds; the snapshot is the
    /// only path back to pre-merge state.
    fn store_snapshot(
        &self,
        snapshot: &MergeAuditRecord,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
    fn append_audit(
        &self,
        entry: AuditEntry,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

#[derive(Default)]
struct MemoryInner {
    leads: HashMap<Uuid, Lead>,
    dependents: HashMap<Uuid, DependentRecord>,
    snapshots: Vec<MergeAuditRecord>,
    audit: Vec<AuditEntry>,
}

/// In-memory implementation of both stores. Backs the engine tests and
/// doubles as an embedded registry for tooling.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_lead(&self, lead: Lead) {
        self.inner.lock().unwrap().leads.insert(lead.id, lead);
    }

    pub fn insert_dependent(&self, record: DependentRecord) {
        self.inner.lock().unwrap().dependents.insert(record.id, record);
    }

    pub fn snapshots(&self) -> Vec<MergeAuditRecord> {
        self.inner.lock().unwrap().snapshots.clone()
    }

    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.inner.lock().unwrap().audit.clone()
    }

    pub fn dependents(&self) -> Vec<DependentRecord> {
        self.inner.lock().unwrap().dependents.values().cloned().collect()
    }
}

impl LeadStore for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Lead>, StoreError> {
        Ok(self.inner.lock().unwrap().leads.get(&id).cloned())
    }

    async fn find_active(&self) -> Result<Vec<Lead>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .leads
            .values()
            .filter(|l| l.active)
            .cloned()
            .collect())
    }

    async fn create(&self, lead: Lead) -> Result<Lead, StoreError> {
        self.inner.lock().unwrap().leads.insert(lead.id, lead.clone());
        Ok(lead)
    }

    async fn update(&self, lead: &Lead) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.leads.contains_key(&lead.id) {
            return Err(StoreError(format!("lead {} does not exist", lead.id)));
        }
        inner.leads.insert(lead.id, lead.clone());
        Ok(())
    }

    async fn deactivate(&self, id: Uuid, stamp: RetirementStamp) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let lead = inner
            .leads
            .get_mut(&id)
            .ok_or_else(|| StoreError(format!("lead {id} does not exist")))?;
        lead.active = false;
        lead.updated_at = stamp.merged_at;
        lead.retirement = Some(stamp);
        Ok(())
    }
}

impl DependentStore for MemoryStore {
    async fn find_owned_by(&self, lead_id: Uuid) -> Result<Vec<DependentRecord>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .dependents
            .values()
            .filter(|d| d.lead_id == lead_id)
            .cloned()
            .collect())
    }

    async fn reassign_owner(
        &self,
        record_id: Uuid,
        new_lead_id: Uuid,
        marker: Option<MigrationMarker>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let record = inner
            .dependents
            .get_mut(&record_id)
            .ok_or_else(|| StoreError(format!("dependent {record_id} does not exist")))?;
        record.lead_id = new_lead_id;
        record.migration = marker;
        Ok(())
    }

    async fn store_snapshot(&self, snapshot: &MergeAuditRecord) -> Result<(), StoreError> {
        self.inner.lock().unwrap().snapshots.push(snapshot.clone());
        Ok(())
    }

    async fn append_audit(&self, entry: AuditEntry) -> Result<(), StoreError> {
        self.inner.lock().unwrap().audit.push(entry);
        Ok(())
    }
}
