use chrono::{Duration, NaiveDate};
use tracing::debug;

use crate::config::{ChronologyBound, ValidationConfig, MAX_WINDOW_DAYS};
use crate::constants::{FIELD_COORDINATES, FIELD_EVENT_DATE, FIELD_MARITIME, FIELD_NARRATIVE, FIELD_TARGET_TYPE};
use crate::domain::{CanonicalIncidentRecord, IssueType, Severity, TargetType, ValidationIssue};
use crate::pipeline::processing::geo::{LocationHints, LookupOutcome};
use crate::pipeline::processing::normalize::keywords::ScopeVerdict;
use crate::pipeline::processing::normalize::KeywordMatcher;

/// Internal-consistency checks on a merged record. Never changes the record;
/// every finding is an attached issue.
pub struct Validator<'a> {
    config: &'a ValidationConfig,
    keywords: &'a KeywordMatcher,
}

impl<'a> Validator<'a> {
    pub fn new(config: &'a ValidationConfig, keywords: &'a KeywordMatcher) -> Self {
        Self { config, keywords }
    }

    pub fn validate(&self, record: &CanonicalIncidentRecord, hints: &LocationHints) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        self.check_coordinates(record, hints, &mut issues);
        self.check_chronology(record, &mut issues);
        self.check_date_range(record, &mut issues);
        self.check_target_type(record, &mut issues);
        self.check_maritime(record, &mut issues);
        self.check_scope(record, &mut issues);
        debug!("Validated {}: {} issues", record.id, issues.len());
        issues
    }

    fn check_coordinates(
        &self,
        record: &CanonicalIncidentRecord,
        hints: &LocationHints,
        issues: &mut Vec<ValidationIssue>,
    ) {
        let Some(point) = record.coordinates else { return };

        let places = [
            (record.city.as_deref(), self.config.city_tolerance_km, Severity::Warning),
            (record.region.as_deref(), self.config.region_tolerance_km, Severity::Error),
        ];
        for (place, tolerance, severity) in places {
            let Some(place) = place else { continue };
            match hints.lookup(place) {
                Some(LookupOutcome::Found { centroid }) => {
                    let distance = point.distance_km(centroid);
                    if distance > tolerance {
                        issues.push(
                            ValidationIssue::new(
                                record.id,
                                IssueType::ValidationFailure,
                                severity,
                                FIELD_COORDINATES,
                                format!(
                                    "coordinates ({:.4}, {:.4}) are {:.0} km from {} (tolerance {:.0} km)",
                                    point.latitude, point.longitude, distance, place, tolerance
                                ),
                            )
                            .with_suggestion(format!(
                                "centroid of {} is ({:.4}, {:.4})",
                                place, centroid.latitude, centroid.longitude
                            )),
                        );
                    }
                    // The finest place that resolved decides
                    return;
                }
                Some(LookupOutcome::Unavailable { reason }) => {
                    issues.push(ValidationIssue::new(
                        record.id,
                        IssueType::OracleUnavailable,
                        Severity::Info,
                        FIELD_COORDINATES,
                        format!("could not check coordinates against {}: {}", place, reason),
                    ));
                    return;
                }
                Some(LookupOutcome::Unknown) | None => continue,
            }
        }
    }

    fn check_chronology(&self, record: &CanonicalIncidentRecord, issues: &mut Vec<ValidationIssue>) {
        let lag = self.config.reporting_lag_days.clamp(0, MAX_WINDOW_DAYS);
        let lower = record
            .first_message_date
            .checked_sub_signed(Duration::days(lag))
            .unwrap_or(NaiveDate::MIN);
        let (upper, upper_name) = match self.config.chronology_upper_bound {
            ChronologyBound::FirstMessage => (record.first_message_date, "first message date"),
            ChronologyBound::LastMessage => (record.last_message_date, "last message date"),
        };

        if record.event_date > upper {
            issues.push(
                ValidationIssue::new(
                    record.id,
                    IssueType::ValidationFailure,
                    Severity::Error,
                    FIELD_EVENT_DATE,
                    format!(
                        "event date {} is after the {} {}",
                        record.event_date, upper_name, upper
                    ),
                )
                .with_suggestion("the extracted date is probably a misread; check the source posts"),
            );
        } else if record.event_date < lower {
            issues.push(ValidationIssue::new(
                record.id,
                IssueType::ValidationFailure,
                Severity::Warning,
                FIELD_EVENT_DATE,
                format!(
                    "event date {} precedes the first report {} by more than {} days",
                    record.event_date, record.first_message_date, lag
                ),
            ));
        }
    }

    fn check_date_range(&self, record: &CanonicalIncidentRecord, issues: &mut Vec<ValidationIssue>) {
        let Some(range) = &self.config.date_range else { return };
        if record.event_date < range.start || record.event_date >= range.end {
            issues.push(ValidationIssue::new(
                record.id,
                IssueType::ValidationFailure,
                Severity::Warning,
                FIELD_EVENT_DATE,
                format!(
                    "event date {} is outside the covered range {} to {}",
                    record.event_date, range.start, range.end
                ),
            ));
        }
    }

    fn check_target_type(&self, record: &CanonicalIncidentRecord, issues: &mut Vec<ValidationIssue>) {
        let named = self.keywords.target_types_in(&record.narrative);
        match record.target_type {
            Some(target) if target.is_specific() => {
                if !self.keywords.supports(target, &record.narrative) {
                    let mut issue = ValidationIssue::new(
                        record.id,
                        IssueType::ValidationFailure,
                        Severity::Warning,
                        FIELD_TARGET_TYPE,
                        format!("no keyword for {} appears in the reports", target),
                    );
                    if !named.is_empty() {
                        issue = issue.with_suggestion(format!("narrative mentions {}", join_targets(&named)));
                    }
                    issues.push(issue);
                }
            }
            _ => {
                if !named.is_empty() {
                    issues.push(
                        ValidationIssue::new(
                            record.id,
                            IssueType::ValidationFailure,
                            Severity::Info,
                            FIELD_TARGET_TYPE,
                            "target type is unspecified but the reports name one",
                        )
                        .with_suggestion(format!("narrative mentions {}", join_targets(&named))),
                    );
                }
            }
        }
    }

    fn check_maritime(&self, record: &CanonicalIncidentRecord, issues: &mut Vec<ValidationIssue>) {
        let expected = record.target_type == Some(TargetType::Naval)
            || self.keywords.mentions_maritime(&record.narrative);
        if record.maritime != expected {
            let description = if record.maritime {
                "maritime flag is set but nothing indicates a vessel or sea location"
            } else {
                "reports indicate a vessel or sea location but the maritime flag is not set"
            };
            issues.push(ValidationIssue::new(
                record.id,
                IssueType::ValidationFailure,
                Severity::Warning,
                FIELD_MARITIME,
                description,
            ));
        }
    }

    fn check_scope(&self, record: &CanonicalIncidentRecord, issues: &mut Vec<ValidationIssue>) {
        if !self.config.check_scope {
            return;
        }
        let text = [
            record.city.as_deref().unwrap_or_default(),
            record.region.as_deref().unwrap_or_default(),
            record.narrative.as_str(),
        ]
        .join(" ");
        if self.keywords.scope(&text) == ScopeVerdict::OutOfScope {
            issues.push(
                ValidationIssue::new(
                    record.id,
                    IssueType::ValidationFailure,
                    Severity::Error,
                    FIELD_NARRATIVE,
                    "reports only name locations outside the covered territory",
                )
                .with_suggestion("likely a strike on Ukraine rather than by Ukraine; review before publishing"),
            );
        }
    }
}

fn join_targets(targets: &std::collections::BTreeSet<TargetType>) -> String {
    targets.iter().map(|t| t.as_str()).collect::<Vec<_>>().join(", ")
}
