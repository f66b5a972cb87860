use std::collections::BTreeMap;

use sqlx::PgPool;
use uuid::Uuid;

use leadreg_core::leads::{
    AuditEntry, BudgetStatus, DependentKind, DependentRecord, Lead, MergeAuditRecord,
    MigrationMarker, PurchaseTimeline, RetirementStamp,
};
use leadreg_core::store::{DependentStore, LeadStore, StoreError};

/// Postgres implementation of the lead registry and audit/task stores.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn store_err(err: sqlx::Error) -> StoreError {
    StoreError(err.to_string())
}

const LEAD_COLUMNS: &str = "id, email, phone, mobile, company_name, contact_name, source, \
     product_interest, budget_status, purchase_timeline, custom_fields, active, \
     merged_into, merged_at, merged_by, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct LeadRow {
    id: Uuid,
    email: Option<String>,
    phone: Option<String>,
    mobile: Option<String>,
    company_name: Option<String>,
    contact_name: Option<String>,
    source: Option<String>,
    product_interest: Option<String>,
    budget_status: String,
    purchase_timeline: String,
    custom_fields: serde_json::Value,
    active: bool,
    merged_into: Option<Uuid>,
    merged_at: Option<chrono::DateTime<chrono::Utc>>,
    merged_by: Option<Uuid>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl LeadRow {
    fn into_lead(self) -> Lead {
        let retirement = match (self.merged_into, self.merged_at, self.merged_by) {
            (Some(merged_into), Some(merged_at), Some(merged_by)) => Some(RetirementStamp {
                merged_into,
                merged_at,
                merged_by,
            }),
            _ => None,
        };

        let custom_fields: BTreeMap<String, serde_json::Value> =
            serde_json::from_value(self.custom_fields).unwrap_or_default();

        Lead {
            id: self.id,
            email: self.email,
            phone: self.phone,
            mobile: self.mobile,
            company_name: self.company_name,
            contact_name: self.contact_name,
            source: self.source,
            product_interest: self.product_interest,
            budget_status: budget_from_str(&self.budget_status),
            purchase_timeline: timeline_from_str(&self.purchase_timeline),
            custom_fields,
            active: self.active,
            retirement,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

fn budget_to_str(value: BudgetStatus) -> &'static str {
    match value {
        BudgetStatus::Confirmed => "confirmed",
        BudgetStatus::Estimated => "estimated",
        BudgetStatus::Unknown => "unknown",
    }
}

fn budget_from_str(value: &str) -> BudgetStatus {
    match value {
        "confirmed" => BudgetStatus::Confirmed,
        "estimated" => BudgetStatus::Estimated,
        _ => BudgetStatus::Unknown,
    }
}

fn timeline_to_str(value: PurchaseTimeline) -> &'static str {
    match value {
        PurchaseTimeline::Immediate => "immediate",
        PurchaseTimeline::ThisQuarter => "this_quarter",
        PurchaseTimeline::ThisYear => "this_year",
        PurchaseTimeline::Unknown => "unknown",
    }
}

fn timeline_from_str(value: &str) -> PurchaseTimeline {
    match value {
        "immediate" => PurchaseTimeline::Immediate,
        "this_quarter" => PurchaseTimeline::ThisQuarter,
        "this_year" => PurchaseTimeline::ThisYear,
        _ => PurchaseTimeline::Unknown,
    }
}

impl LeadStore for PgStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Lead>, StoreError> {
        let row = sqlx::query_as::<_, LeadRow>(&format!(
            "SELECT {LEAD_COLUMNS} FROM leads WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(row.map(LeadRow::into_lead))
    }

    async fn find_active(&self) -> Result<Vec<Lead>, StoreError> {
        let rows = sqlx::query_as::<_, LeadRow>(&format!(
            "SELECT {LEAD_COLUMNS} FROM leads WHERE active ORDER BY created_at"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(rows.into_iter().map(LeadRow::into_lead).collect())
    }

    async fn create(&self, lead: Lead) -> Result<Lead, StoreError> {
        let custom_fields =
            serde_json::to_value(&lead.custom_fields).unwrap_or(serde_json::Value::Null);
        sqlx::query(
            r#"
            INSERT INTO leads (id, email, phone, mobile, company_name, contact_name,
                source, product_interest, budget_status, purchase_timeline,
                custom_fields, active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(lead.id)
        .bind(&lead.email)
        .bind(&lead.phone)
        .bind(&lead.mobile)
        .bind(&lead.company_name)
        .bind(&lead.contact_name)
        .bind(&lead.source)
        .bind(&lead.product_interest)
        .bind(budget_to_str(lead.budget_status))
        .bind(timeline_to_str(lead.purchase_timeline))
        .bind(&custom_fields)
        .bind(lead.active)
        .bind(lead.created_at)
        .bind(lead.updated_at)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(lead)
    }

    async fn update(&self, lead: &Lead) -> Result<(), StoreError> {
        let custom_fields =
            serde_json::to_value(&lead.custom_fields).unwrap_or(serde_json::Value::Null);
        let result = sqlx::query(
            r#"
            UPDATE leads
            SET email = $2, phone = $3, mobile = $4, company_name = $5,
                contact_name = $6, source = $7, product_interest = $8,
                budget_status = $9, purchase_timeline = $10, custom_fields = $11,
                active = $12, merged_into = $13, merged_at = $14, merged_by = $15,
                updated_at = $16
            WHERE id = $1
            "#,
        )
        .bind(lead.id)
        .bind(&lead.email)
        .bind(&lead.phone)
        .bind(&lead.mobile)
        .bind(&lead.company_name)
        .bind(&lead.contact_name)
        .bind(&lead.source)
        .bind(&lead.product_interest)
        .bind(budget_to_str(lead.budget_status))
        .bind(timeline_to_str(lead.purchase_timeline))
        .bind(&custom_fields)
        .bind(lead.active)
        .bind(lead.retirement.as_ref().map(|r| r.merged_into))
        .bind(lead.retirement.as_ref().map(|r| r.merged_at))
        .bind(lead.retirement.as_ref().map(|r| r.merged_by))
        .bind(lead.updated_at)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError(format!("lead {} does not exist", lead.id)));
        }
        Ok(())
    }

    async fn deactivate(&self, id: Uuid, stamp: RetirementStamp) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE leads
            SET active = false, merged_into = $2, merged_at = $3, merged_by = $4,
                updated_at = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(stamp.merged_into)
        .bind(stamp.merged_at)
        .bind(stamp.merged_by)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError(format!("lead {id} does not exist")));
        }
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct DependentRow {
    id: Uuid,
    lead_id: Uuid,
    kind: String,
    summary: String,
    payload: serde_json::Value,
    original_lead_id: Option<Uuid>,
    migrated_at: Option<chrono::DateTime<chrono::Utc>>,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl DependentRow {
    fn into_record(self) -> DependentRecord {
        let migration = match (self.original_lead_id, self.migrated_at) {
            (Some(original_lead_id), Some(migrated_at)) => Some(MigrationMarker {
                original_lead_id,
                migrated_at,
            }),
            _ => None,
        };

        DependentRecord {
            id: self.id,
            lead_id: self.lead_id,
            kind: if self.kind == "task" {
                DependentKind::Task
            } else {
                DependentKind::Activity
            },
            summary: self.summary,
            payload: self.payload,
            migration,
            created_at: self.created_at,
        }
    }
}

impl DependentStore for PgStore {
    async fn find_owned_by(&self, lead_id: Uuid) -> Result<Vec<DependentRecord>, StoreError> {
        let rows = sqlx::query_as::<_, DependentRow>(
            r#"
            SELECT id, lead_id, kind, summary, payload, original_lead_id,
                   migrated_at, created_at
            FROM lead_dependents
            WHERE lead_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(lead_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(rows.into_iter().map(DependentRow::into_record).collect())
    }

    async fn reassign_owner(
        &self,
        record_id: Uuid,
        new_lead_id: Uuid,
        marker: Option<MigrationMarker>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE lead_dependents
            SET lead_id = $2, original_lead_id = $3, migrated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(record_id)
        .bind(new_lead_id)
        .bind(marker.as_ref().map(|m| m.original_lead_id))
        .bind(marker.as_ref().map(|m| m.migrated_at))
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError(format!("dependent {record_id} does not exist")));
        }
        Ok(())
    }

    async fn store_snapshot(&self, snapshot: &MergeAuditRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO lead_merge_snapshots (id, lead_id, merged_into, merged_by,
                merged_at, state)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(snapshot.id)
        .bind(snapshot.lead_id)
        .bind(snapshot.merged_into)
        .bind(snapshot.merged_by)
        .bind(snapshot.merged_at)
        .bind(&snapshot.state)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(())
    }

    async fn append_audit(&self, entry: AuditEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO lead_audit_entries (id, lead_id, action, detail, actor, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(entry.id)
        .bind(entry.lead_id)
        .bind(&entry.action)
        .bind(&entry.detail)
        .bind(entry.actor)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(())
    }
}
