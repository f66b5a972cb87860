use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::DedupConfig;
use crate::identity::{email_domain, structured_local_part};
use crate::leads::{BudgetStatus, Lead, PurchaseTimeline, mergeable_paths};

/// One field's merge recommendation. `selected_value` is always one of
/// `source_value`/`target_value`; confidence 1.0 marks the unambiguous
/// cases, anything lower is a heuristic tie-break that deserves review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MergeFieldDecision {
    pub field: String,
    pub source_value: Value,
    pub target_value: Value,
    pub selected_value: Value,
    pub reason: String,
    pub confidence: f64,
}

/// Advisory field-by-field merge plan. Recomputed on every call, never
/// cached; executing a merge takes the (possibly operator-edited)
/// decisions back in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MergePreview {
    pub source_id: Uuid,
    pub target_id: Uuid,
    pub field_decisions: Vec<MergeFieldDecision>,
    /// Decisions below confidence 1.0.
    pub conflict_count: usize,
    /// Decisions at confidence 1.0.
    pub auto_merge_count: usize,
    /// Decisions below confidence 0.8.
    pub manual_decision_count: usize,
}

const AUTO_CONFIDENCE: f64 = 1.0;
const MANUAL_REVIEW_BELOW: f64 = 0.8;

/// Build the merge plan for a record pair. Pure and read-only; the same
/// inputs always yield the same decisions.
pub fn build_preview(source: &Lead, target: &Lead, cfg: &DedupConfig) -> MergePreview {
    let mut field_decisions = Vec::new();

    for path in mergeable_paths(source, target) {
        let source_value = source.field_value(&path);
        let target_value = target.field_value(&path);

        let decision = match (source_value.is_null(), target_value.is_null()) {
            (true, true) => continue,
            (false, true) => MergeFieldDecision {
                field: path,
                selected_value: source_value.clone(),
                source_value,
                target_value,
                reason: "only the source record has a value".to_string(),
                confidence: AUTO_CONFIDENCE,
            },
            (true, false) => MergeFieldDecision {
                field: path,
                selected_value: target_value.clone(),
                source_value,
                target_value,
                reason: "only the target record has a value".to_string(),
                confidence: AUTO_CONFIDENCE,
            },
            (false, false) if source_value == target_value => MergeFieldDecision {
                field: path,
                selected_value: target_value.clone(),
                source_value,
                target_value,
                reason: "both records carry the same value".to_string(),
                confidence: AUTO_CONFIDENCE,
            },
            (false, false) => resolve_conflict(path, source_value, target_value, cfg),
        };

        field_decisions.push(decision);
    }

    let conflict_count = field_decisions
        .iter()
        .filter(|d| d.confidence < AUTO_CONFIDENCE)
        .count();
    let auto_merge_count = field_decisions.len() - conflict_count;
    let manual_decision_count = field_decisions
        .iter()
        .filter(|d| d.confidence < MANUAL_REVIEW_BELOW)
        .count();

    MergePreview {
        source_id: source.id,
        target_id: target.id,
        field_decisions,
        conflict_count,
        auto_merge_count,
        manual_decision_count,
    }
}

enum Pick {
    Source,
    Target,
}

fn resolve_conflict(
    field: String,
    source_value: Value,
    target_value: Value,
    cfg: &DedupConfig,
) -> MergeFieldDecision {
    let ruled: Option<(Pick, &'static str, f64)> = match field.as_str() {
        "email" => pick_email(&source_value, &target_value, cfg),
        "phone" | "mobile" => pick_international_phone(&source_value, &target_value),
        "company_name" => pick_longer_company(&source_value, &target_value, cfg),
        "contact_name" => pick_fuller_name(&source_value, &target_value),
        "budget_status" => pick_by_specificity::<BudgetStatus>(
            &source_value,
            &target_value,
            |s| s.specificity(),
        ),
        "purchase_timeline" => pick_by_specificity::<PurchaseTimeline>(
            &source_value,
            &target_value,
            |t| t.specificity(),
        ),
        _ => None,
    };

    let (pick, reason, confidence) = ruled.unwrap_or((
        Pick::Target,
        "conflicting values; kept the target's and flagged for manual review",
        0.5,
    ));

    let selected_value = match pick {
        Pick::Source => source_value.clone(),
        Pick::Target => target_value.clone(),
    };

    MergeFieldDecision {
        field,
        source_value,
        target_value,
        selected_value,
        reason: reason.to_string(),
        confidence,
    }
}

/// Non-generic domain outweighs a separator-structured local part; a tie
/// falls through to the default rule.
fn pick_email(
    source: &Value,
    target: &Value,
    cfg: &DedupConfig,
) -> Option<(Pick, &'static str, f64)> {
    let score = |v: &Value| -> u8 {
        let Some(addr) = v.as_str() else { return 0 };
        let domain_signal = match email_domain(addr) {
            Some(domain) if !cfg.is_generic_email_domain(&domain) => 2,
            _ => 0,
        };
        domain_signal + u8::from(structured_local_part(addr))
    };

    let reason = "preferred the address with a non-generic domain and structured local part";
    match score(source).cmp(&score(target)) {
        std::cmp::Ordering::Greater => Some((Pick::Source, reason, 0.8)),
        std::cmp::Ordering::Less => Some((Pick::Target, reason, 0.8)),
        std::cmp::Ordering::Equal => None,
    }
}

fn pick_international_phone(source: &Value, target: &Value) -> Option<(Pick, &'static str, f64)> {
    let intl = |v: &Value| v.as_str().is_some_and(|s| s.trim().starts_with('+'));
    let reason = "preferred the number in international format";
    match (intl(source), intl(target)) {
        (true, false) => Some((Pick::Source, reason, 0.9)),
        (false, true) => Some((Pick::Target, reason, 0.9)),
        _ => None,
    }
}

/// The longer name wins only when it exceeds the shorter by more than the
/// configured margin of the shorter's length; near-equal lengths are too
/// ambiguous to call.
fn pick_longer_company(
    source: &Value,
    target: &Value,
    cfg: &DedupConfig,
) -> Option<(Pick, &'static str, f64)> {
    let s = source.as_str()?.trim();
    let t = target.as_str()?.trim();
    let (longer, shorter) = if s.chars().count() >= t.chars().count() {
        (s, t)
    } else {
        (t, s)
    };
    let longer_len = longer.chars().count() as f64;
    let shorter_len = shorter.chars().count() as f64;
    if longer_len <= shorter_len * (1.0 + cfg.company_length_margin) {
        return None;
    }

    let reason = "preferred the substantially longer company name";
    if longer == s {
        Some((Pick::Source, reason, 0.7))
    } else {
        Some((Pick::Target, reason, 0.7))
    }
}

fn pick_fuller_name(source: &Value, target: &Value) -> Option<(Pick, &'static str, f64)> {
    let tokens = |v: &Value| v.as_str().map_or(0, |s| s.split_whitespace().count());
    let reason = "preferred the name with more parts";
    match tokens(source).cmp(&tokens(target)) {
        std::cmp::Ordering::Greater => Some((Pick::Source, reason, 0.8)),
        std::cmp::Ordering::Less => Some((Pick::Target, reason, 0.8)),
        std::cmp::Ordering::Equal => None,
    }
}

fn pick_by_specificity<T: serde::de::DeserializeOwned>(
    source: &Value,
    target: &Value,
    rank: impl Fn(T) -> u8,
) -> Option<(Pick, &'static str, f64)> {
    let source_rank = serde_json::from_value::<T>(source.clone()).ok().map(&rank)?;
    let target_rank = serde_json::from_value::<T>(target.clone()).ok().map(&rank)?;
    let reason = "preferred the more specific qualification";
    match source_rank.cmp(&target_rank) {
        std::cmp::Ordering::Greater => Some((Pick::Source, reason, 0.8)),
        std::cmp::Ordering::Less => Some((Pick::Target, reason, 0.8)),
        std::cmp::Ordering::Equal => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cfg() -> DedupConfig {
        DedupConfig::default()
    }

    fn decision<'a>(preview: &'a MergePreview, field: &str) -> &'a MergeFieldDecision {
        preview
            .field_decisions
            .iter()
            .find(|d| d.field == field)
            .unwrap_or_else(|| panic!("no decision for {field}"))
    }

    #[test]
    fn scenario_business_email_and_intl_phone_win_company_defaults() {
        let mut source = Lead::new();
        source.email = Some("j.doe@acme-corp.com".to_string());
        source.phone = Some("+6681234567".to_string());
        source.company_name = Some("Acme Corporation".to_string());

        let mut target = Lead::new();
        target.email = Some("jdoe@gmail.com".to_string());
        target.phone = Some("0812345678".to_string());
        target.company_name = Some("Acme Corp".to_string());

        let preview = build_preview(&source, &target, &cfg());

        let email = decision(&preview, "email");
        assert_eq!(email.selected_value, json!("j.doe@acme-corp.com"));
        assert_eq!(email.confidence, 0.8);

        let phone = decision(&preview, "phone");
        assert_eq!(phone.selected_value, json!("+6681234567"));
        assert_eq!(phone.confidence, 0.9);

        // 16 chars vs 9 does not clear the 1.5x margin, so the target's
        // value survives at the manual-review confidence.
        let company = decision(&preview, "company_name");
        assert_eq!(company.selected_value, json!("Acme Corp"));
        assert_eq!(company.confidence, 0.5);
    }

    #[test]
    fn empty_pairs_are_omitted_and_single_values_auto_merge() {
        let mut source = Lead::new();
        source.email = Some("a@b.com".to_string());
        let target = Lead::new();

        let preview = build_preview(&source, &target, &cfg());
        assert!(preview.field_decisions.iter().all(|d| d.field == "email"));

        let email = decision(&preview, "email");
        assert_eq!(email.selected_value, json!("a@b.com"));
        assert_eq!(email.confidence, 1.0);
        assert_eq!(preview.auto_merge_count, 1);
        assert_eq!(preview.conflict_count, 0);
    }

    #[test]
    fn identical_values_keep_target_copy_at_full_confidence() {
        let mut source = Lead::new();
        source.source = Some("webform".to_string());
        let mut target = Lead::new();
        target.source = Some("webform".to_string());

        let preview = build_preview(&source, &target, &cfg());
        let d = decision(&preview, "source");
        assert_eq!(d.selected_value, json!("webform"));
        assert_eq!(d.confidence, 1.0);
    }

    #[test]
    fn company_wins_past_the_length_margin() {
        let mut source = Lead::new();
        source.company_name = Some("Acme Corporation Global Holdings Ltd".to_string());
        let mut target = Lead::new();
        target.company_name = Some("Acme".to_string());

        let preview = build_preview(&source, &target, &cfg());
        let d = decision(&preview, "company_name");
        assert_eq!(
            d.selected_value,
            json!("Acme Corporation Global Holdings Ltd")
        );
        assert_eq!(d.confidence, 0.7);
    }

    #[test]
    fn fuller_contact_name_wins() {
        let mut source = Lead::new();
        source.contact_name = Some("Jane".to_string());
        let mut target = Lead::new();
        target.contact_name = Some("Jane M. Doe".to_string());

        let preview = build_preview(&source, &target, &cfg());
        let d = decision(&preview, "contact_name");
        assert_eq!(d.selected_value, json!("Jane M. Doe"));
        assert_eq!(d.confidence, 0.8);
    }

    #[test]
    fn more_specific_qualification_wins() {
        let mut source = Lead::new();
        source.budget_status = BudgetStatus::Confirmed;
        source.purchase_timeline = PurchaseTimeline::ThisYear;
        let mut target = Lead::new();
        target.budget_status = BudgetStatus::Estimated;
        target.purchase_timeline = PurchaseTimeline::Immediate;

        let preview = build_preview(&source, &target, &cfg());
        assert_eq!(
            decision(&preview, "budget_status").selected_value,
            json!("confirmed")
        );
        assert_eq!(
            decision(&preview, "purchase_timeline").selected_value,
            json!("immediate")
        );
        assert_eq!(decision(&preview, "budget_status").confidence, 0.8);
    }

    #[test]
    fn custom_field_conflicts_default_to_target_for_review() {
        let mut source = Lead::new();
        source
            .custom_fields
            .insert("region".to_string(), json!("apac"));
        let mut target = Lead::new();
        target
            .custom_fields
            .insert("region".to_string(), json!("emea"));

        let preview = build_preview(&source, &target, &cfg());
        let d = decision(&preview, "custom_fields.region");
        assert_eq!(d.selected_value, json!("emea"));
        assert_eq!(d.confidence, 0.5);
        assert_eq!(preview.manual_decision_count, 1);
    }

    #[test]
    fn every_selected_value_is_source_or_target() {
        let mut source = Lead::new();
        source.email = Some("j.doe@acme-corp.com".to_string());
        source.phone = Some("+6681234567".to_string());
        source.company_name = Some("Acme Corporation".to_string());
        source.contact_name = Some("Jane M. Doe".to_string());
        source.budget_status = BudgetStatus::Confirmed;
        source
            .custom_fields
            .insert("region".to_string(), json!("apac"));

        let mut target = Lead::new();
        target.email = Some("jdoe@gmail.com".to_string());
        target.mobile = Some("0899999999".to_string());
        target.company_name = Some("Acme Corp".to_string());
        target.contact_name = Some("Jane".to_string());
        target.purchase_timeline = PurchaseTimeline::ThisQuarter;
        target
            .custom_fields
            .insert("tier".to_string(), json!("gold"));

        let preview = build_preview(&source, &target, &cfg());
        assert!(!preview.field_decisions.is_empty());
        for d in &preview.field_decisions {
            assert!(
                d.selected_value == d.source_value || d.selected_value == d.target_value,
                "{} selected a fabricated value",
                d.field
            );
            assert!((0.0..=1.0).contains(&d.confidence));
        }
        assert_eq!(
            preview.conflict_count + preview.auto_merge_count,
            preview.field_decisions.len()
        );
    }

    #[test]
    fn preview_is_deterministic() {
        let mut source = Lead::new();
        source.email = Some("j.doe@acme-corp.com".to_string());
        source.company_name = Some("Acme Corporation".to_string());
        let mut target = Lead::new();
        target.email = Some("jdoe@gmail.com".to_string());
        target.company_name = Some("Acme Corp".to_string());

        let first = build_preview(&source, &target, &cfg());
        let second = build_preview(&source, &target, &cfg());
        assert_eq!(first, second);
    }
}
