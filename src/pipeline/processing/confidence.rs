use crate::config::ConfidenceConfig;
use crate::domain::{ConfidenceTier, IssueType, Severity, ValidationIssue};

fn step_up(tier: ConfidenceTier, steps: usize) -> ConfidenceTier {
    (0..steps).fold(tier, |t, _| match t {
        ConfidenceTier::Low => ConfidenceTier::Medium,
        _ => ConfidenceTier::High,
    })
}

/// Confidence tier from corroboration, extraction confidence and open issues.
///
/// The mean extraction confidence sets the base tier. Each corroboration
/// level (two channels, then `high_channel_count` channels) raises it one
/// step. Issues then cap it: any warning at medium, any error or clustering
/// ambiguity at low.
pub fn score(
    channel_count: usize,
    mean_extraction_confidence: f64,
    issues: &[ValidationIssue],
    config: &ConfidenceConfig,
) -> ConfidenceTier {
    let base = if mean_extraction_confidence >= config.high_confidence {
        ConfidenceTier::High
    } else if mean_extraction_confidence >= config.medium_confidence {
        ConfidenceTier::Medium
    } else {
        ConfidenceTier::Low
    };

    let corroboration = match channel_count {
        n if n >= config.high_channel_count.max(2) => 2,
        n if n >= 2 => 1,
        _ => 0,
    };
    let mut tier = step_up(base, corroboration);

    if issues.iter().any(|i| i.severity >= Severity::Warning) {
        tier = tier.min(ConfidenceTier::Medium);
    }
    if issues
        .iter()
        .any(|i| i.severity == Severity::Error || i.issue_type == IssueType::ClusteringAmbiguity)
    {
        tier = ConfidenceTier::Low;
    }
    tier
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn issue(issue_type: IssueType, severity: Severity) -> ValidationIssue {
        ValidationIssue::new(Uuid::nil(), issue_type, severity, "field", "test")
    }

    #[test]
    fn base_tier_follows_mean_confidence() {
        let config = ConfidenceConfig::default();
        assert_eq!(score(1, 0.9, &[], &config), ConfidenceTier::High);
        assert_eq!(score(1, 0.7, &[], &config), ConfidenceTier::Medium);
        assert_eq!(score(1, 0.4, &[], &config), ConfidenceTier::Low);
    }

    #[test]
    fn monotone_in_channel_count() {
        let config = ConfidenceConfig::default();
        for confidence in [0.2, 0.5, 0.7, 0.95] {
            let tiers: Vec<ConfidenceTier> = (1..=5).map(|n| score(n, confidence, &[], &config)).collect();
            assert!(tiers.windows(2).all(|w| w[0] <= w[1]), "{confidence}: {tiers:?}");
        }
        assert_eq!(score(3, 0.4, &[], &config), ConfidenceTier::High);
    }

    #[test]
    fn issues_cap_the_tier() {
        let config = ConfidenceConfig::default();
        let info = [issue(IssueType::FieldConflict, Severity::Info)];
        let warning = [issue(IssueType::FieldConflict, Severity::Warning)];
        let error = [issue(IssueType::ValidationFailure, Severity::Error)];
        let ambiguity = [issue(IssueType::ClusteringAmbiguity, Severity::Warning)];
        assert_eq!(score(3, 0.9, &info, &config), ConfidenceTier::High);
        assert_eq!(score(3, 0.9, &warning, &config), ConfidenceTier::Medium);
        assert_eq!(score(3, 0.9, &error, &config), ConfidenceTier::Low);
        assert_eq!(score(3, 0.9, &ambiguity, &config), ConfidenceTier::Low);
    }
}
