use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::leads::Lead;

static EMAIL_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap());

/// The fields used as duplication evidence, in precedence order.
/// Precedence breaks ties when two fields match with equal confidence:
/// an email match is stronger evidence than a company-name match.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum IdentityField {
    Email,
    Phone,
    Mobile,
    CompanyName,
    ContactName,
}

impl IdentityField {
    pub const ALL: [IdentityField; 5] = [
        IdentityField::Email,
        IdentityField::Phone,
        IdentityField::Mobile,
        IdentityField::CompanyName,
        IdentityField::ContactName,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            IdentityField::Email => "email",
            IdentityField::Phone => "phone",
            IdentityField::Mobile => "mobile",
            IdentityField::CompanyName => "company_name",
            IdentityField::ContactName => "contact_name",
        }
    }
}

/// A transient view of one record's identity fields. Built on demand from
/// a stored lead or straight from a request body; never persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct IdentityProfile {
    /// Set when the profile was built from an existing lead, so the lead
    /// does not match itself during a scan.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
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
}

impl IdentityProfile {
    pub fn field(&self, field: IdentityField) -> Option<&str> {
        let value = match field {
            IdentityField::Email => &self.email,
            IdentityField::Phone => &self.phone,
            IdentityField::Mobile => &self.mobile,
            IdentityField::CompanyName => &self.company_name,
            IdentityField::ContactName => &self.contact_name,
        };
        value.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }

    /// True when no identity field carries a usable value — such a
    /// profile can never produce duplicate evidence.
    pub fn is_empty(&self) -> bool {
        IdentityField::ALL.iter().all(|f| self.field(*f).is_none())
    }
}

impl From<&Lead> for IdentityProfile {
    fn from(lead: &Lead) -> Self {
        IdentityProfile {
            id: Some(lead.id),
            email: lead.email.clone(),
            phone: lead.phone.clone(),
            mobile: lead.mobile.clone(),
            company_name: lead.company_name.clone(),
            contact_name: lead.contact_name.clone(),
        }
    }
}

/// Normalize a value for structural comparison of the given field kind.
pub fn normalize(field: IdentityField, value: &str) -> String {
    match field {
        IdentityField::Email => normalize_email(value),
        IdentityField::Phone | IdentityField::Mobile => normalize_phone(value),
        IdentityField::CompanyName => normalize_company(value),
        IdentityField::ContactName => normalize_person_name(value),
    }
}

pub fn normalize_email(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Digits only. "+66 8-1234-5678" and "66812345678" compare equal.
pub fn normalize_phone(value: &str) -> String {
    value.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Lowercased, punctuation stripped, whitespace collapsed.
/// "Acme, Corp." and "acme corp" compare equal.
pub fn normalize_company(value: &str) -> String {
    let cleaned: String = value
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn normalize_person_name(value: &str) -> String {
    value
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Loose structural check, not RFC validation: one '@', a dot in the
/// domain, no whitespace.
pub fn looks_like_email(value: &str) -> bool {
    EMAIL_SHAPE.is_match(value.trim())
}

/// The domain part of an email, lowercased. None when the value has no
/// usable '@' separator.
pub fn email_domain(value: &str) -> Option<String> {
    let trimmed = value.trim().to_lowercase();
    let (local, domain) = trimmed.split_once('@')?;
    if local.is_empty() || domain.is_empty() {
        return None;
    }
    Some(domain.to_string())
}

/// Whether the local part carries separator structure ("j.doe", "j_doe"),
/// a weak signal that the address is a maintained business mailbox.
pub fn structured_local_part(value: &str) -> bool {
    match value.trim().split_once('@') {
        Some((local, _)) => local.contains(['.', '_', '-']),
        None => false,
    }
}
