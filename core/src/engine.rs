use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::DedupConfig;
use crate::decisions::{self, MergeFieldDecision, MergePreview};
use crate::error::MergeError;
use crate::identity::IdentityProfile;
use crate::leads::{
    AuditEntry, DependentKind, DependentRecord, Lead, MergeAuditRecord, MigrationMarker,
    RetirementStamp,
};
use crate::matching::{self, DuplicateCandidate};
use crate::store::{DependentStore, LeadStore, StoreError};

/// Per-profile outcome of a bulk duplicate check. A failed item carries
/// its error message here instead of aborting the batch.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BulkCheckItem {
    /// Index of the profile in the request, 0-based.
    pub index: usize,
    pub duplicates: Vec<DuplicateCandidate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Instruction to merge `source_id` into `target_id` under the given
/// (operator-reviewed) field decisions.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct MergeRequest {
    pub source_id: Uuid,
    pub target_id: Uuid,
    pub field_decisions: Vec<MergeFieldDecision>,
    /// When true (the default) the source's full pre-merge state is
    /// snapshotted before anything is torn down.
    #[serde(default = "default_preserve")]
    pub preserve_source_data: bool,
}

fn default_preserve() -> bool {
    true
}

/// Outcome of an executed merge.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MergeResult {
    pub target: Lead,
    /// Field paths whose stored value actually changed.
    pub changed_fields: Vec<String>,
    pub dependents_migrated: usize,
    /// Present when `preserve_source_data` was set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<MergeAuditRecord>,
}

/// Outcome of undoing a merge: a reconstruction under a fresh identity,
/// not an in-place restoration. Callers holding the retired id must
/// switch to `lead.id`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RestoredRecord {
    pub lead: Lead,
    pub dependents_reclaimed: usize,
}

/// Scan the active population for likely duplicates of `profile`.
/// Never fails on profile content: no usable identity fields means no
/// evidence, not an error.
pub async fn check_duplicates<L: LeadStore>(
    leads: &L,
    profile: &IdentityProfile,
    cfg: &DedupConfig,
) -> Result<Vec<DuplicateCandidate>, MergeError> {
    let pool = leads.find_active().await?;
    Ok(matching::find_duplicates(profile, &pool, cfg))
}

/// Check many profiles in one pass over the active population. The batch
/// is capped; individual profiles fail in isolation and never abort the
/// rest.
pub async fn bulk_check_duplicates<L: LeadStore>(
    leads: &L,
    profiles: &[IdentityProfile],
    cfg: &DedupConfig,
) -> Result<Vec<BulkCheckItem>, MergeError> {
    if profiles.is_empty() {
        return Err(MergeError::validation(
            "profiles array must not be empty",
            Some("profiles"),
        ));
    }
    if profiles.len() > cfg.max_bulk_profiles {
        return Err(MergeError::validation(
            format!(
                "batch size {} exceeds maximum of {}",
                profiles.len(),
                cfg.max_bulk_profiles
            ),
            Some("profiles"),
        ));
    }

    let pool = leads.find_active().await?;

    Ok(profiles
        .iter()
        .enumerate()
        .map(|(index, profile)| {
            if profile.is_empty() {
                BulkCheckItem {
                    index,
                    duplicates: Vec::new(),
                    error: Some(
                        "profile carries no identity fields to compare".to_string(),
                    ),
                }
            } else {
                BulkCheckItem {
                    index,
                    duplicates: matching::find_duplicates(profile, &pool, cfg),
                    error: None,
                }
            }
        })
        .collect())
}

/// Compute the advisory merge plan for a candidate pair. Read-only.
pub async fn preview_merge<L: LeadStore>(
    leads: &L,
    source_id: Uuid,
    target_id: Uuid,
    cfg: &DedupConfig,
) -> Result<MergePreview, MergeError> {
    if source_id == target_id {
        return Err(MergeError::validation(
            "source and target must be different records",
            Some("source_id"),
        ));
    }
    let source = resolve_active(leads, source_id).await?;
    let target = resolve_active(leads, target_id).await?;
    Ok(decisions::build_preview(&source, &target, cfg))
}

async fn resolve_active<L: LeadStore>(leads: &L, id: Uuid) -> Result<Lead, MergeError> {
    match leads.find_by_id(id).await? {
        Some(lead) if lead.active => Ok(lead),
        _ => Err(MergeError::NotFound { id }),
    }
}

/// Execute an approved merge. The five mutating steps run as a saga: a
/// failure at any point compensates every completed step in reverse, so
/// no partially merged pair is left behind. Re-invoking after success
/// fails fast because the source is no longer active.
pub async fn execute_merge<L: LeadStore, D: DependentStore>(
    leads: &L,
    deps: &D,
    request: &MergeRequest,
    merged_by: Uuid,
) -> Result<MergeResult, MergeError> {
    if request.source_id == request.target_id {
        return Err(MergeError::validation(
            "source and target must be different records",
            Some("source_id"),
        ));
    }
    if request.field_decisions.is_empty() {
        return Err(MergeError::validation(
            "field_decisions must not be empty; run a preview first",
            Some("field_decisions"),
        ));
    }
    for decision in &request.field_decisions {
        if decision.selected_value != decision.source_value
            && decision.selected_value != decision.target_value
        {
            return Err(MergeError::validation(
                format!(
                    "decision for '{}' selects a value taken from neither record",
                    decision.field
                ),
                Some("field_decisions"),
            ));
        }
    }

    let source = resolve_active(leads, request.source_id).await?;
    let target_before = resolve_active(leads, request.target_id).await?;
    let merged_at = Utc::now();

    // Apply decisions on a working copy first; path/type validation
    // happens before anything is written.
    let mut target = target_before.clone();
    let mut changed_fields = Vec::new();
    for decision in &request.field_decisions {
        if target.set_field(&decision.field, &decision.selected_value)? {
            changed_fields.push(decision.field.clone());
        }
    }
    target.updated_at = merged_at;

    // Serialize the snapshot state up front so a serialization failure
    // cannot strand a half-applied merge.
    let source_state = if request.preserve_source_data {
        Some(serde_json::to_value(&source).map_err(|e| {
            StoreError(format!("source record cannot be snapshotted: {e}"))
        })?)
    } else {
        None
    };

    let mut saga = Saga {
        source_before: &source,
        target_before: &target_before,
        migrated: Vec::new(),
        source_deactivated: false,
    };

    // Step 2: write the consolidated target.
    if let Err(err) = leads.update(&target).await {
        return Err(saga.unwind(leads, deps, err.into()).await);
    }

    // Step 3: durable snapshot before anything is torn down.
    let snapshot = if let Some(state) = source_state {
        let snapshot = MergeAuditRecord {
            id: Uuid::now_v7(),
            lead_id: source.id,
            merged_into: target.id,
            merged_by,
            merged_at,
            state,
        };
        if let Err(err) = deps.store_snapshot(&snapshot).await {
            return Err(saga.unwind(leads, deps, err.into()).await);
        }
        Some(snapshot)
    } else {
        None
    };

    // Step 4: migrate dependents, stamping each with its pre-merge owner.
    let dependents = match deps.find_owned_by(source.id).await {
        Ok(dependents) => dependents,
        Err(err) => return Err(saga.unwind(leads, deps, err.into()).await),
    };
    let marker = MigrationMarker {
        original_lead_id: source.id,
        migrated_at: merged_at,
    };
    for dependent in dependents {
        if let Err(err) = deps
            .reassign_owner(dependent.id, target.id, Some(marker.clone()))
            .await
        {
            return Err(saga.unwind(leads, deps, err.into()).await);
        }
        saga.migrated.push(dependent);
    }
    let dependents_migrated = saga.migrated.len();

    // Step 5: retire the source.
    let stamp = RetirementStamp {
        merged_into: target.id,
        merged_at,
        merged_by,
    };
    if let Err(err) = leads.deactivate(source.id, stamp).await {
        return Err(saga.unwind(leads, deps, err.into()).await);
    }
    saga.source_deactivated = true;

    // Step 6: one summarizing audit entry on the survivor.
    let activities = saga
        .migrated
        .iter()
        .filter(|d| d.kind == DependentKind::Activity)
        .count();
    let entry = AuditEntry {
        id: Uuid::now_v7(),
        lead_id: target.id,
        action: "lead.merged".to_string(),
        detail: serde_json::json!({
            "source_id": source.id,
            "fields_changed": changed_fields,
            "activities_migrated": activities,
            "tasks_migrated": dependents_migrated - activities,
            "snapshot_kept": snapshot.is_some(),
        }),
        actor: merged_by,
        created_at: merged_at,
    };
    if let Err(err) = deps.append_audit(entry).await {
        return Err(saga.unwind(leads, deps, err.into()).await);
    }

    tracing::info!(
        source = %source.id,
        target = %target.id,
        changed = changed_fields.len(),
        dependents = dependents_migrated,
        "merged lead"
    );

    Ok(MergeResult {
        target,
        changed_fields,
        dependents_migrated,
        snapshot,
    })
}

/// Tracks what the merge has written so far, so a failure can put it all
/// back through the same store seams.
struct Saga<'a> {
    source_before: &'a Lead,
    target_before: &'a Lead,
    /// Pre-migration copies of every dependent already moved.
    migrated: Vec<DependentRecord>,
    source_deactivated: bool,
}

impl Saga<'_> {
    /// Compensate every completed step in reverse order, then hand the
    /// original error back. A compensation failure is logged and reported
    /// instead — never swallowed.
    async fn unwind<L: LeadStore, D: DependentStore>(
        &self,
        leads: &L,
        deps: &D,
        cause: MergeError,
    ) -> MergeError {
        tracing::warn!(
            source = %self.source_before.id,
            target = %self.target_before.id,
            %cause,
            "merge failed, compensating completed steps"
        );

        if self.source_deactivated {
            if let Err(err) = leads.update(self.source_before).await {
                return self.compensation_failed("reactivate source", err);
            }
        }
        for dependent in self.migrated.iter().rev() {
            if let Err(err) = deps
                .reassign_owner(dependent.id, dependent.lead_id, dependent.migration.clone())
                .await
            {
                return self.compensation_failed("reclaim dependent", err);
            }
        }
        if let Err(err) = leads.update(self.target_before).await {
            return self.compensation_failed("restore target", err);
        }

        cause
    }

    fn compensation_failed(
        &self,
        step: &str,
        err: crate::store::StoreError,
    ) -> MergeError {
        tracing::error!(
            source = %self.source_before.id,
            target = %self.target_before.id,
            step,
            %err,
            "merge compensation failed; records may be inconsistent"
        );
        MergeError::Store(crate::store::StoreError(format!(
            "merge rollback failed while trying to {step}: {err}"
        )))
    }
}

/// Reverse a merge from its snapshot. Best-effort reconstruction: the
/// restored record gets a fresh identity, and only dependents migrated by
/// the snapshotted merge are reclaimed.
pub async fn undo_merge<L: LeadStore, D: DependentStore>(
    leads: &L,
    deps: &D,
    target_id: Uuid,
    snapshot: &MergeAuditRecord,
    undone_by: Uuid,
) -> Result<RestoredRecord, MergeError> {
    let target = leads
        .find_by_id(target_id)
        .await?
        .ok_or(MergeError::NotFound { id: target_id })?;

    let mut restored: Lead = serde_json::from_value(snapshot.state.clone()).map_err(|e| {
        MergeError::validation(
            format!("snapshot state is not a valid lead record: {e}"),
            Some("snapshot.state"),
        )
    })?;
    let now = Utc::now();
    restored.id = Uuid::now_v7();
    restored.active = true;
    restored.retirement = None;
    restored.updated_at = now;

    let restored = leads.create(restored).await?;

    // Reclaim only what this merge moved: the marker must point at the
    // retired lead and postdate the snapshot.
    let mut dependents_reclaimed = 0;
    for dependent in deps.find_owned_by(target.id).await? {
        let migrated_here = dependent.migration.as_ref().is_some_and(|m| {
            m.original_lead_id == snapshot.lead_id && m.migrated_at >= snapshot.merged_at
        });
        if migrated_here {
            deps.reassign_owner(dependent.id, restored.id, None).await?;
            dependents_reclaimed += 1;
        }
    }

    deps.append_audit(AuditEntry {
        id: Uuid::now_v7(),
        lead_id: target.id,
        action: "merge.undone".to_string(),
        detail: serde_json::json!({
            "original_lead_id": snapshot.lead_id,
            "restored_lead_id": restored.id,
            "dependents_reclaimed": dependents_reclaimed,
        }),
        actor: undone_by,
        created_at: now,
    })
    .await?;

    tracing::info!(
        target = %target.id,
        restored = %restored.id,
        reclaimed = dependents_reclaimed,
        "merge undone"
    );

    Ok(RestoredRecord {
        lead: restored,
        dependents_reclaimed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StoreError};

    fn actor() -> Uuid {
        Uuid::now_v7()
    }

    fn lead(email: &str, company: &str) -> Lead {
        let mut lead = Lead::new();
        lead.email = Some(email.to_string());
        lead.company_name = Some(company.to_string());
        lead
    }

    fn dependent(lead_id: Uuid, kind: DependentKind, summary: &str) -> DependentRecord {
        DependentRecord {
            id: Uuid::now_v7(),
            lead_id,
            kind,
            summary: summary.to_string(),
            payload: serde_json::Value::Null,
            migration: None,
            created_at: Utc::now(),
        }
    }

    async fn preview_and_merge(
        store: &MemoryStore,
        source: &Lead,
        target: &Lead,
        by: Uuid,
    ) -> MergeResult {
        let cfg = DedupConfig::default();
        let preview = preview_merge(store, source.id, target.id, &cfg)
            .await
            .expect("preview");
        let request = MergeRequest {
            source_id: source.id,
            target_id: target.id,
            field_decisions: preview.field_decisions,
            preserve_source_data: true,
        };
        execute_merge(store, store, &request, by).await.expect("merge")
    }

    #[tokio::test]
    async fn merge_migrates_dependents_and_retires_source() {
        let store = MemoryStore::new();
        let source = lead("s@acme-corp.com", "Acme Corporation");
        let target = lead("t@acme-corp.com", "Acme Corp");
        store.insert_lead(source.clone());
        store.insert_lead(target.clone());
        store.insert_dependent(dependent(source.id, DependentKind::Activity, "call"));
        store.insert_dependent(dependent(source.id, DependentKind::Activity, "visit"));
        store.insert_dependent(dependent(source.id, DependentKind::Task, "follow up"));

        let result = preview_and_merge(&store, &source, &target, actor()).await;
        assert_eq!(result.dependents_migrated, 3);
        assert!(result.snapshot.is_some());

        // All dependents now hang off the target, each stamped with the
        // source as its pre-merge owner.
        let dependents = store.dependents();
        assert_eq!(dependents.len(), 3);
        for d in &dependents {
            assert_eq!(d.lead_id, target.id);
            let marker = d.migration.as_ref().expect("migration marker");
            assert_eq!(marker.original_lead_id, source.id);
        }

        let retired = LeadStore::find_by_id(&store, source.id)
            .await
            .unwrap()
            .unwrap();
        assert!(!retired.active);
        assert_eq!(retired.retirement.unwrap().merged_into, target.id);

        let audit = store.audit_entries();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].lead_id, target.id);
        assert_eq!(audit[0].action, "lead.merged");
    }

    #[tokio::test]
    async fn merge_then_undo_round_trip() {
        let store = MemoryStore::new();
        let mut source = lead("j.doe@acme-corp.com", "Acme Corporation");
        source.phone = Some("+6681234567".to_string());
        let target = lead("jdoe@gmail.com", "Acme Corp");
        store.insert_lead(source.clone());
        store.insert_lead(target.clone());
        store.insert_dependent(dependent(source.id, DependentKind::Task, "quote"));

        let by = actor();
        let result = preview_and_merge(&store, &source, &target, by).await;
        let snapshot = result.snapshot.expect("snapshot");
        assert_eq!(snapshot.lead_id, source.id);
        assert_eq!(snapshot.merged_into, target.id);
        assert_eq!(store.snapshots().len(), 1);

        let restored = undo_merge(&store, &store, target.id, &snapshot, by)
            .await
            .expect("undo");

        // Fresh identity, pre-merge field values.
        assert_ne!(restored.lead.id, source.id);
        assert!(restored.lead.active);
        assert_eq!(restored.lead.email, source.email);
        assert_eq!(restored.lead.phone, source.phone);
        assert_eq!(restored.lead.company_name, source.company_name);
        assert_eq!(restored.dependents_reclaimed, 1);

        // The target no longer owns the reclaimed dependent and its
        // marker is cleared.
        let dependents = store.dependents();
        assert_eq!(dependents.len(), 1);
        assert_eq!(dependents[0].lead_id, restored.lead.id);
        assert!(dependents[0].migration.is_none());

        let audit = store.audit_entries();
        assert_eq!(audit.last().unwrap().action, "merge.undone");
    }

    #[tokio::test]
    async fn repeated_merge_fails_fast_on_retired_source() {
        let store = MemoryStore::new();
        let source = lead("s@acme-corp.com", "Acme Corporation");
        let target = lead("t@acme-corp.com", "Acme Corp");
        store.insert_lead(source.clone());
        store.insert_lead(target.clone());

        let result = preview_and_merge(&store, &source, &target, actor()).await;
        let request = MergeRequest {
            source_id: source.id,
            target_id: target.id,
            field_decisions: vec![MergeFieldDecision {
                field: "email".to_string(),
                source_value: serde_json::json!("s@acme-corp.com"),
                target_value: result.target.field_value("email"),
                selected_value: serde_json::json!("s@acme-corp.com"),
                reason: "operator override".to_string(),
                confidence: 1.0,
            }],
            preserve_source_data: true,
        };

        let err = execute_merge(&store, &store, &request, actor())
            .await
            .expect_err("retired source must not merge again");
        assert!(matches!(err, MergeError::NotFound { id } if id == source.id));
    }

    #[tokio::test]
    async fn merge_validation_failures() {
        let store = MemoryStore::new();
        let source = lead("s@acme-corp.com", "Acme");
        let target = lead("t@acme-corp.com", "Acme");
        store.insert_lead(source.clone());
        store.insert_lead(target.clone());

        // Same id.
        let err = preview_merge(&store, source.id, source.id, &DedupConfig::default())
            .await
            .expect_err("same id");
        assert!(matches!(err, MergeError::Validation { .. }));

        // Unknown id.
        let err = preview_merge(&store, source.id, Uuid::now_v7(), &DedupConfig::default())
            .await
            .expect_err("unknown id");
        assert!(matches!(err, MergeError::NotFound { .. }));

        // Empty decision list.
        let request = MergeRequest {
            source_id: source.id,
            target_id: target.id,
            field_decisions: Vec::new(),
            preserve_source_data: true,
        };
        let err = execute_merge(&store, &store, &request, actor())
            .await
            .expect_err("empty decisions");
        assert!(matches!(err, MergeError::Validation { .. }));

        // A decision is not allowed to invent a value.
        let request = MergeRequest {
            source_id: source.id,
            target_id: target.id,
            field_decisions: vec![MergeFieldDecision {
                field: "email".to_string(),
                source_value: serde_json::json!("s@acme-corp.com"),
                target_value: serde_json::json!("t@acme-corp.com"),
                selected_value: serde_json::json!("invented@elsewhere.com"),
                reason: "tampered".to_string(),
                confidence: 1.0,
            }],
            preserve_source_data: true,
        };
        let err = execute_merge(&store, &store, &request, actor())
            .await
            .expect_err("fabricated value");
        assert!(matches!(err, MergeError::Validation { .. }));
    }

    #[tokio::test]
    async fn undo_requires_an_existing_target() {
        let store = MemoryStore::new();
        let snapshot = MergeAuditRecord {
            id: Uuid::now_v7(),
            lead_id: Uuid::now_v7(),
            merged_into: Uuid::now_v7(),
            merged_by: actor(),
            merged_at: Utc::now(),
            state: serde_json::to_value(Lead::new()).unwrap(),
        };
        let err = undo_merge(&store, &store, Uuid::now_v7(), &snapshot, actor())
            .await
            .expect_err("missing target");
        assert!(matches!(err, MergeError::NotFound { .. }));
    }

    #[tokio::test]
    async fn bulk_check_isolates_bad_items() {
        let store = MemoryStore::new();
        store.insert_lead(lead("a@b.com", "Acme"));

        let valid = IdentityProfile {
            email: Some("a@b.com".to_string()),
            ..Default::default()
        };
        let profiles = vec![
            valid.clone(),
            valid.clone(),
            valid,
            IdentityProfile::default(),
        ];

        let items = bulk_check_duplicates(&store, &profiles, &DedupConfig::default())
            .await
            .expect("bulk check never aborts on item errors");
        assert_eq!(items.len(), 4);
        for item in &items[..3] {
            assert!(item.error.is_none());
            assert_eq!(item.duplicates.len(), 1);
        }
        assert!(items[3].duplicates.is_empty());
        assert!(items[3].error.is_some());
    }

    #[tokio::test]
    async fn bulk_check_enforces_the_batch_cap() {
        let store = MemoryStore::new();
        let cfg = DedupConfig::default();

        let err = bulk_check_duplicates(&store, &[], &cfg)
            .await
            .expect_err("empty batch");
        assert!(matches!(err, MergeError::Validation { .. }));

        let too_many = vec![IdentityProfile::default(); cfg.max_bulk_profiles + 1];
        let err = bulk_check_duplicates(&store, &too_many, &cfg)
            .await
            .expect_err("oversized batch");
        assert!(matches!(err, MergeError::Validation { .. }));
    }

    #[tokio::test]
    async fn check_duplicates_with_empty_profile_returns_nothing() {
        let store = MemoryStore::new();
        store.insert_lead(lead("a@b.com", "Acme"));
        let found = check_duplicates(&store, &IdentityProfile::default(), &DedupConfig::default())
            .await
            .expect("never errors on profile content");
        assert!(found.is_empty());
    }

    /// Delegates to a MemoryStore but fails the audit append — the last
    /// merge step — to exercise the compensation path.
    struct AuditFailsStore {
        inner: MemoryStore,
    }

    impl LeadStore for AuditFailsStore {
        async fn find_by_id(&self, id: Uuid) -> Result<Option<Lead>, StoreError> {
            self.inner.find_by_id(id).await
        }
        async fn find_active(&self) -> Result<Vec<Lead>, StoreError> {
            LeadStore::find_active(&self.inner).await
        }
        async fn create(&self, lead: Lead) -> Result<Lead, StoreError> {
            self.inner.create(lead).await
        }
        async fn update(&self, lead: &Lead) -> Result<(), StoreError> {
            self.inner.update(lead).await
        }
        async fn deactivate(&self, id: Uuid, stamp: RetirementStamp) -> Result<(), StoreError> {
            self.inner.deactivate(id, stamp).await
        }
    }

    impl DependentStore for AuditFailsStore {
        async fn find_owned_by(&self, lead_id: Uuid) -> Result<Vec<DependentRecord>, StoreError> {
            self.inner.find_owned_by(lead_id).await
        }
        async fn reassign_owner(
            &self,
            record_id: Uuid,
            new_lead_id: Uuid,
            marker: Option<MigrationMarker>,
        ) -> Result<(), StoreError> {
            self.inner.reassign_owner(record_id, new_lead_id, marker).await
        }
        async fn store_snapshot(&self, snapshot: &MergeAuditRecord) -> Result<(), StoreError> {
            self.inner.store_snapshot(snapshot).await
        }
        async fn append_audit(&self, _entry: AuditEntry) -> Result<(), StoreError> {
            Err(StoreError("audit store is down".to_string()))
        }
    }

    #[tokio::test]
    async fn failed_merge_compensates_every_completed_step() {
        let store = AuditFailsStore {
            inner: MemoryStore::new(),
        };
        let source = lead("s@acme-corp.com", "Acme Corporation");
        let target = lead("t@acme-corp.com", "Acme Corp");
        store.inner.insert_lead(source.clone());
        store.inner.insert_lead(target.clone());
        store
            .inner
            .insert_dependent(dependent(source.id, DependentKind::Task, "quote"));

        let preview = preview_merge(&store, source.id, target.id, &DedupConfig::default())
            .await
            .expect("preview");
        let request = MergeRequest {
            source_id: source.id,
            target_id: target.id,
            field_decisions: preview.field_decisions,
            preserve_source_data: true,
        };

        let err = execute_merge(&store, &store, &request, actor())
            .await
            .expect_err("audit failure must fail the merge");
        assert!(matches!(err, MergeError::Store(_)));

        // Source is active again, target untouched, dependent back home.
        let source_after = LeadStore::find_by_id(&store, source.id)
            .await
            .unwrap()
            .unwrap();
        assert!(source_after.active);
        assert!(source_after.retirement.is_none());

        let target_after = LeadStore::find_by_id(&store, target.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(target_after.email, target.email);

        let dependents = store.inner.dependents();
        assert_eq!(dependents[0].lead_id, source.id);
        assert!(dependents[0].migration.is_none());
    }
}
