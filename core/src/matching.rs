use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::DedupConfig;
use crate::identity::{self, IdentityField, IdentityProfile};
use crate::leads::Lead;

/// How two field values matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// Byte-equal after trimming.
    Exact,
    /// Equal after type-appropriate normalization (case fold, separator
    /// stripping).
    Normalized,
    /// Similar above the field's fuzzy floor.
    Fuzzy,
}

/// Evidence from comparing one identity field across two records.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct FieldMatch {
    pub field: IdentityField,
    pub match_type: MatchType,
    /// In [0, 1]. 1.0 only for exact/normalized matches.
    pub confidence: f64,
}

/// A pool record whose aggregated similarity cleared the significance
/// threshold.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DuplicateCandidate {
    /// The record the scan ran for, when it exists in the registry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<Uuid>,
    pub candidate_id: Uuid,
    pub matches: Vec<FieldMatch>,
    /// In [0, 1]; never below the best per-field confidence.
    pub overall_confidence: f64,
    /// The field that contributed the strongest evidence.
    pub primary_match_type: IdentityField,
}

/// Compare one identity field across two values. Pure and symmetric;
/// absence on either side is no evidence, never an error.
pub fn compare_field(
    field: IdentityField,
    a: Option<&str>,
    b: Option<&str>,
    cfg: &DedupConfig,
) -> Option<FieldMatch> {
    let a = a.map(str::trim).filter(|v| !v.is_empty())?;
    let b = b.map(str::trim).filter(|v| !v.is_empty())?;

    if a == b {
        return Some(FieldMatch {
            field,
            match_type: MatchType::Exact,
            confidence: 1.0,
        });
    }

    let na = identity::normalize(field, a);
    let nb = identity::normalize(field, b);
    if na.is_empty() || nb.is_empty() {
        return None;
    }
    if na == nb {
        return Some(FieldMatch {
            field,
            match_type: MatchType::Normalized,
            confidence: 1.0,
        });
    }

    let similarity = match field {
        // Edit distance suits character-level typos in addresses, numbers
        // and company names; Jaro-Winkler favors the shared prefixes and
        // transpositions typical of person names.
        IdentityField::Email
        | IdentityField::Phone
        | IdentityField::Mobile
        | IdentityField::CompanyName => strsim::normalized_levenshtein(&na, &nb),
        IdentityField::ContactName => strsim::jaro_winkler(&na, &nb),
    };

    if similarity < cfg.min_similarity.get(field) {
        return None;
    }

    Some(FieldMatch {
        field,
        match_type: MatchType::Fuzzy,
        confidence: (similarity * cfg.fuzzy_weight.get(field)).clamp(0.0, 1.0),
    })
}

/// Scan a pool of leads for records likely describing the same entity as
/// `profile`. Never errors: malformed or empty input degrades to an empty
/// result. Candidates come back sorted by confidence, strongest first.
pub fn find_duplicates(
    profile: &IdentityProfile,
    pool: &[Lead],
    cfg: &DedupConfig,
) -> Vec<DuplicateCandidate> {
    if profile.is_empty() {
        return Vec::new();
    }

    let mut candidates: Vec<DuplicateCandidate> = pool
        .iter()
        .filter(|lead| lead.active && Some(lead.id) != profile.id)
        .filter_map(|lead| score_pair(profile, lead, cfg))
        .filter(|c| c.overall_confidence >= cfg.significance_threshold)
        .collect();

    candidates.sort_by(|x, y| {
        y.overall_confidence
            .total_cmp(&x.overall_confidence)
            .then_with(|| x.candidate_id.cmp(&y.candidate_id))
    });
    candidates
}

fn score_pair(
    profile: &IdentityProfile,
    lead: &Lead,
    cfg: &DedupConfig,
) -> Option<DuplicateCandidate> {
    let other = IdentityProfile::from(lead);
    let matches: Vec<FieldMatch> = IdentityField::ALL
        .iter()
        .filter_map(|&field| compare_field(field, profile.field(field), other.field(field), cfg))
        .collect();

    let best = matches
        .iter()
        .copied()
        // Highest confidence wins; ties fall to field precedence
        // (email > phone > mobile > company > contact name).
        .min_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.field.cmp(&b.field))
        })?;

    let mut overall = best.confidence;
    if matches.len() >= 2 {
        overall = (overall + cfg.corroboration_boost).min(1.0);
    }

    Some(DuplicateCandidate {
        source_id: profile.id,
        candidate_id: lead.id,
        matches,
        overall_confidence: overall,
        primary_match_type: best.field,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> DedupConfig {
        DedupConfig::default()
    }

    fn lead_with(email: Option<&str>, company: Option<&str>) -> Lead {
        let mut lead = Lead::new();
        lead.email = email.map(str::to_string);
        lead.company_name = company.map(str::to_string);
        lead
    }

    // -- Field comparator ---------------------------------------------------

    #[test]
    fn absent_values_are_no_evidence() {
        let c = cfg();
        assert!(compare_field(IdentityField::Email, None, None, &c).is_none());
        assert!(compare_field(IdentityField::Email, Some("a@b.com"), None, &c).is_none());
        assert!(compare_field(IdentityField::Email, Some("  "), Some("a@b.com"), &c).is_none());
    }

    #[test]
    fn exact_beats_normalized() {
        let c = cfg();
        let exact =
            compare_field(IdentityField::Email, Some("a@b.com"), Some("a@b.com"), &c).unwrap();
        assert_eq!(exact.match_type, MatchType::Exact);
        assert_eq!(exact.confidence, 1.0);

        let normalized =
            compare_field(IdentityField::Email, Some("A@B.com"), Some("a@b.com"), &c).unwrap();
        assert_eq!(normalized.match_type, MatchType::Normalized);
        assert_eq!(normalized.confidence, 1.0);
    }

    #[test]
    fn phone_separators_normalize_away() {
        let c = cfg();
        let m = compare_field(
            IdentityField::Phone,
            Some("+66 8-1234-5678"),
            Some("6681234567 8"),
            &c,
        )
        .unwrap();
        assert_eq!(m.match_type, MatchType::Normalized);
    }

    #[test]
    fn company_typo_is_fuzzy_and_low_band() {
        let c = cfg();
        let m = compare_field(
            IdentityField::CompanyName,
            Some("Acme Corporation"),
            Some("Acme Corporaton"),
            &c,
        )
        .unwrap();
        assert_eq!(m.match_type, MatchType::Fuzzy);
        assert!(m.confidence < 0.8, "company fuzzy stays low: {}", m.confidence);
        assert!(m.confidence > 0.0);
    }

    #[test]
    fn dissimilar_values_emit_nothing() {
        let c = cfg();
        assert!(
            compare_field(
                IdentityField::CompanyName,
                Some("Acme Corporation"),
                Some("Globex Industries"),
                &c
            )
            .is_none()
        );
    }

    #[test]
    fn comparison_is_symmetric() {
        let c = cfg();
        let pairs = [
            (IdentityField::Email, "j.doe@acme.com", "jdoe@acme.com"),
            (IdentityField::CompanyName, "Acme Corp", "Acme Corporation"),
            (IdentityField::ContactName, "Jane Doe", "Jane M. Doe"),
            (IdentityField::Phone, "+6681234567", "0812345678"),
        ];
        for (field, a, b) in pairs {
            let ab = compare_field(field, Some(a), Some(b), &c);
            let ba = compare_field(field, Some(b), Some(a), &c);
            match (ab, ba) {
                (None, None) => {}
                (Some(x), Some(y)) => {
                    assert_eq!(x.match_type, y.match_type);
                    assert!((x.confidence - y.confidence).abs() < 1e-12);
                }
                other => panic!("asymmetric result for {field:?}: {other:?}"),
            }
        }
    }

    // -- Aggregator -----------------------------------------------------------

    #[test]
    fn exact_email_clone_is_a_full_confidence_candidate() {
        // A pool with one identical-email record yields exactly one
        // candidate at confidence 1.0, primary match email.
        let c = cfg();
        let profile = IdentityProfile {
            email: Some("a@b.com".to_string()),
            ..Default::default()
        };
        let pool = vec![
            lead_with(Some("a@b.com"), None),
            lead_with(Some("other@example.com"), None),
        ];

        let found = find_duplicates(&profile, &pool, &c);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].candidate_id, pool[0].id);
        assert_eq!(found[0].overall_confidence, 1.0);
        assert_eq!(found[0].primary_match_type, IdentityField::Email);
        assert!(matches!(
            found[0].matches[0].match_type,
            MatchType::Exact | MatchType::Normalized
        ));
    }

    #[test]
    fn empty_profile_degrades_to_no_evidence() {
        let c = cfg();
        let pool = vec![lead_with(Some("a@b.com"), None)];
        assert!(find_duplicates(&IdentityProfile::default(), &pool, &c).is_empty());
    }

    #[test]
    fn own_record_and_inactive_leads_are_skipped() {
        let c = cfg();
        let mut me = lead_with(Some("a@b.com"), None);
        me.active = true;
        let mut retired = lead_with(Some("a@b.com"), None);
        retired.active = false;

        let profile = IdentityProfile::from(&me);
        let pool = vec![me.clone(), retired];
        assert!(find_duplicates(&profile, &pool, &c).is_empty());
    }

    #[test]
    fn corroboration_boosts_but_never_exceeds_one() {
        let c = cfg();
        let profile = IdentityProfile {
            email: Some("a@b.com".to_string()),
            company_name: Some("Acme Corporation".to_string()),
            ..Default::default()
        };
        let pool = vec![lead_with(Some("a@b.com"), Some("Acme Corporation"))];

        let found = find_duplicates(&profile, &pool, &c);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].matches.len(), 2);
        assert_eq!(found[0].overall_confidence, 1.0);

        let best = found[0]
            .matches
            .iter()
            .map(|m| m.confidence)
            .fold(0.0_f64, f64::max);
        assert!(found[0].overall_confidence >= best);
    }

    #[test]
    fn lone_weak_company_match_stays_in_low_band() {
        let c = cfg();
        let profile = IdentityProfile {
            company_name: Some("Acme Corporation".to_string()),
            ..Default::default()
        };
        let pool = vec![lead_with(None, Some("Acme Corporaton"))];

        let found = find_duplicates(&profile, &pool, &c);
        for candidate in &found {
            assert!(candidate.overall_confidence < 0.8);
        }
    }

    #[test]
    fn candidates_sort_by_confidence_descending() {
        let c = cfg();
        let profile = IdentityProfile {
            email: Some("a@b.com".to_string()),
            company_name: Some("Acme Corporation".to_string()),
            ..Default::default()
        };
        let strong = lead_with(Some("a@b.com"), None);
        let weak = lead_with(None, Some("Acme Corporaton"));
        let pool = vec![weak.clone(), strong.clone()];

        let found = find_duplicates(&profile, &pool, &c);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].candidate_id, strong.id);
        assert_eq!(found[1].candidate_id, weak.id);
        assert!(found[0].overall_confidence >= found[1].overall_confidence);
    }

    #[test]
    fn primary_match_ties_break_by_field_precedence() {
        let c = cfg();
        let profile = IdentityProfile {
            phone: Some("0812345678".to_string()),
            email: Some("a@b.com".to_string()),
            ..Default::default()
        };
        let mut lead = Lead::new();
        lead.phone = Some("0812345678".to_string());
        lead.email = Some("a@b.com".to_string());

        let found = find_duplicates(&profile, &[lead], &c);
        assert_eq!(found[0].primary_match_type, IdentityField::Email);
    }
}
