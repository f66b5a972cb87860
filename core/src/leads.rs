use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::MergeError;

/// How firm a lead's budget information is. Ordering is by specificity:
/// a confirmed budget beats an estimated one in a merge conflict.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum BudgetStatus {
    Confirmed,
    Estimated,
    #[default]
    Unknown,
}

impl BudgetStatus {
    pub fn specificity(self) -> u8 {
        match self {
            BudgetStatus::Confirmed => 2,
            BudgetStatus::Estimated => 1,
            BudgetStatus::Unknown => 0,
        }
    }
}

/// When the lead expects to buy. Ordered by specificity like
/// [`BudgetStatus`].
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseTimeline {
    Immediate,
    ThisQuarter,
    ThisYear,
    #[default]
    Unknown,
}

impl PurchaseTimeline {
    pub fn specificity(self) -> u8 {
        match self {
            PurchaseTimeline::Immediate => 3,
            PurchaseTimeline::ThisQuarter => 2,
            PurchaseTimeline::ThisYear => 1,
            PurchaseTimeline::Unknown => 0,
        }
    }
}

/// Stamp written onto a lead retired by a merge. A retired lead keeps its
/// row but never surfaces as active again; the stamp points at the record
/// that survived.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RetirementStamp {
    pub merged_into: Uuid,
    pub merged_at: DateTime<Utc>,
    pub merged_by: Uuid,
}

/// A lead record. Identity fields double as duplicate-detection evidence;
/// the rest are merge-relevant business fields.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Lead {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mobile: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_name: Option<String>,
    /// Where the lead came from (e.g. "webform", "trade_fair", "import").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_interest: Option<String>,
    #[serde(default)]
    pub budget_status: BudgetStatus,
    #[serde(default)]
    pub purchase_timeline: PurchaseTimeline,
    /// Free-form keys merged as the union of both records' keys.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_fields: BTreeMap<String, serde_json::Value>,
    pub active: bool,
    /// Present only on retired records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retirement: Option<RetirementStamp>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The fixed mergeable field paths, custom fields excluded.
pub const MERGEABLE_PATHS: &[&str] = &[
    "email",
    "phone",
    "mobile",
    "company_name",
    "contact_name",
    "source",
    "product_interest",
    "budget_status",
    "purchase_timeline",
];

impl Lead {
    pub fn new() -> Self {
        let now = Utc::now();
        Lead {
            id: Uuid::now_v7(),
            email: None,
            phone: None,
            mobile: None,
            company_name: None,
            contact_name: None,
            source: None,
            product_interest: None,
            budget_status: BudgetStatus::Unknown,
            purchase_timeline: PurchaseTimeline::Unknown,
            custom_fields: BTreeMap::new(),
            active: true,
            retirement: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The value at a mergeable field path, as JSON. Absent values — blank
    /// strings, unknown qualification, missing custom keys — come back as
    /// `Null` so the decision heuristics treat them uniformly as empty.
    pub fn field_value(&self, path: &str) -> serde_json::Value {
        fn text(v: &Option<String>) -> serde_json::Value {
            match v.as_deref().map(str::trim) {
                Some(s) if !s.is_empty() => serde_json::Value::String(s.to_string()),
                _ => serde_json::Value::Null,
            }
        }

        match path {
            "email" => text(&self.email),
            "phone" => text(&self.phone),
            "mobile" => text(&self.mobile),
            "company_name" => text(&self.company_name),
            "contact_name" => text(&self.contact_name),
            "source" => text(&self.source),
            "product_interest" => text(&self.product_interest),
            "budget_status" => match self.budget_status {
                BudgetStatus::Unknown => serde_json::Value::Null,
                other => serde_json::to_value(other).unwrap_or(serde_json::Value::Null),
            },
            "purchase_timeline" => match self.purchase_timeline {
                PurchaseTimeline::Unknown => serde_json::Value::Null,
                other => serde_json::to_value(other).unwrap_or(serde_json::Value::Null),
            },
            _ => match path.strip_prefix("custom_fields.") {
                Some(key) => self
                    .custom_fields
                    .get(key)
                    .cloned()
                    .unwrap_or(serde_json::Value::Null),
                None => serde_json::Value::Null,
            },
        }
    }

    /// Write a decision's selected value onto this record. Returns whether
    /// the stored value actually changed.
    pub fn set_field(&mut self, path: &str, value: &serde_json::Value) -> Result<bool, MergeError> {
        let before = self.field_value(path);

        fn as_text(path: &str, value: &serde_json::Value) -> Result<Option<String>, MergeError> {
            match value {
                serde_json::Value::Null => Ok(None),
                serde_json::Value::String(s) if s.trim().is_empty() => Ok(None),
                serde_json::Value::String(s) => Ok(Some(s.trim().to_string())),
                other => Err(MergeError::validation(
                    format!("field '{path}' expects a string value, got {other}"),
                    Some(path),
                )),
            }
        }

        match path {
            "email" => self.email = as_text(path, value)?,
            "phone" => self.phone = as_text(path, value)?,
            "mobile" => self.mobile = as_text(path, value)?,
            "company_name" => self.company_name = as_text(path, value)?,
            "contact_name" => self.contact_name = as_text(path, value)?,
            "source" => self.source = as_text(path, value)?,
            "product_interest" => self.product_interest = as_text(path, value)?,
            "budget_status" => {
                self.budget_status = match value {
                    serde_json::Value::Null => BudgetStatus::Unknown,
                    other => serde_json::from_value(other.clone()).map_err(|_| {
                        MergeError::validation(
                            format!("'{other}' is not a budget status"),
                            Some(path),
                        )
                    })?,
                }
            }
            "purchase_timeline" => {
                self.purchase_timeline = match value {
                    serde_json::Value::Null => PurchaseTimeline::Unknown,
                    other => serde_json::from_value(other.clone()).map_err(|_| {
                        MergeError::validation(
                            format!("'{other}' is not a purchase timeline"),
                            Some(path),
                        )
                    })?,
                }
            }
            _ => match path.strip_prefix("custom_fields.") {
                Some(key) if !key.is_empty() => {
                    if value.is_null() {
                        self.custom_fields.remove(key);
                    } else {
                        self.custom_fields.insert(key.to_string(), value.clone());
                    }
                }
                _ => {
                    return Err(MergeError::validation(
                        format!("'{path}' is not a mergeable field path"),
                        Some(path),
                    ));
                }
            },
        }

        Ok(before != self.field_value(path))
    }
}

impl Default for Lead {
    fn default() -> Self {
        Lead::new()
    }
}

/// All mergeable paths for a record pair: the fixed list plus the sorted
/// union of both records' custom-field keys.
pub fn mergeable_paths(a: &Lead, b: &Lead) -> Vec<String> {
    let mut paths: Vec<String> = MERGEABLE_PATHS.iter().map(|p| p.to_string()).collect();
    let custom_keys: BTreeSet<&String> =
        a.custom_fields.keys().chain(b.custom_fields.keys()).collect();
    paths.extend(custom_keys.into_iter().map(|k| format!("custom_fields.{k}")));
    paths
}

/// What kind of dependent record hangs off a lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DependentKind {
    Activity,
    Task,
}

/// Tag on a dependent record moved during a merge. First-class and typed
/// so undo can reclaim dependents with an indexed lookup instead of
/// parsing free-form detail payloads.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MigrationMarker {
    pub original_lead_id: Uuid,
    pub migrated_at: DateTime<Utc>,
}

/// An activity or task owned by a lead. Content is opaque to the merge
/// subsystem; only ownership and the migration marker matter here.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DependentRecord {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub kind: DependentKind,
    pub summary: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub migration: Option<MigrationMarker>,
    pub created_at: DateTime<Utc>,
}

/// Durable snapshot of a retired record's full pre-merge state — the sole
/// path back. Written before the source is deactivated.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MergeAuditRecord {
    pub id: Uuid,
    /// The retired source lead.
    pub lead_id: Uuid,
    pub merged_into: Uuid,
    pub merged_by: Uuid,
    pub merged_at: DateTime<Utc>,
    /// Full pre-merge `Lead` document.
    pub state: serde_json::Value,
}

/// One line in a lead's audit trail.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuditEntry {
    pub id: Uuid,
    pub lead_id: Uuid,
    /// e.g. "lead.merged", "merge.undone"
    pub action: String,
    pub detail: serde_json::Value,
    pub actor: Uuid,
    pub created_at: DateTime<Utc>,
}
