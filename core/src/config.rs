use serde::{Deserialize, Serialize};

use crate::identity::IdentityField;

pub const DEFAULT_SIGNIFICANCE_THRESHOLD: f64 = 0.60;
pub const DEFAULT_CORROBORATION_BOOST: f64 = 0.10;
pub const DEFAULT_COMPANY_LENGTH_MARGIN: f64 = 1.5;
pub const DEFAULT_MAX_BULK_PROFILES: usize = 50;

/// Tuning for duplicate detection and merge heuristics.
///
/// All thresholds and rankings live here instead of module-level consts so
/// tests can pin variants deterministically and deployments can retune
/// without a rebuild.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Minimum overall confidence for a pair to surface as a candidate.
    pub significance_threshold: f64,
    /// Added to the best per-field confidence when two or more fields
    /// corroborate, capped at 1.0.
    pub corroboration_boost: f64,
    /// A longer company name wins a merge conflict only when it exceeds
    /// the shorter by more than this factor of the shorter's length.
    pub company_length_margin: f64,
    /// Per-item error isolation cap for bulk duplicate checks.
    pub max_bulk_profiles: usize,
    /// Consumer mail domains that carry no company-identity signal.
    pub generic_email_domains: Vec<String>,
    /// Per-field fuzzy floors: below this similarity a differing pair is
    /// treated as no evidence at all.
    pub min_similarity: FieldThresholds,
    /// Per-field confidence weights applied to fuzzy similarity. Company
    /// names are a low-signal field: a lone fuzzy company match must stay
    /// in a low-confidence band.
    pub fuzzy_weight: FieldThresholds,
}

/// One f64 knob per identity field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FieldThresholds {
    pub email: f64,
    pub phone: f64,
    pub mobile: f64,
    pub company_name: f64,
    pub contact_name: f64,
}

impl FieldThresholds {
    pub fn get(&self, field: IdentityField) -> f64 {
        match field {
            IdentityField::Email => self.email,
            IdentityField::Phone => self.phone,
            IdentityField::Mobile => self.mobile,
            IdentityField::CompanyName => self.company_name,
            IdentityField::ContactName => self.contact_name,
        }
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        DedupConfig {
            significance_threshold: DEFAULT_SIGNIFICANCE_THRESHOLD,
            corroboration_boost: DEFAULT_CORROBORATION_BOOST,
            company_length_margin: DEFAULT_COMPANY_LENGTH_MARGIN,
            max_bulk_profiles: DEFAULT_MAX_BULK_PROFILES,
            generic_email_domains: [
                "gmail.com",
                "googlemail.com",
                "yahoo.com",
                "hotmail.com",
                "outlook.com",
                "live.com",
                "icloud.com",
                "aol.com",
                "gmx.com",
                "proton.me",
                "protonmail.com",
            ]
            .iter()
            .map(|d| d.to_string())
            .collect(),
            min_similarity: FieldThresholds {
                email: 0.90,
                phone: 0.92,
                mobile: 0.92,
                company_name: 0.80,
                contact_name: 0.82,
            },
            fuzzy_weight: FieldThresholds {
                email: 0.90,
                phone: 0.85,
                mobile: 0.85,
                company_name: 0.75,
                contact_name: 0.80,
            },
        }
    }
}

impl DedupConfig {
    pub fn is_generic_email_domain(&self, domain: &str) -> bool {
        self.generic_email_domains
            .iter()
            .any(|d| d.eq_ignore_ascii_case(domain))
    }
}
