use std::collections::BTreeSet;

use crate::config::KeywordConfig;
use crate::domain::TargetType;
use crate::error::{LedgerError, Result};

use super::normalize;

/// Where a narrative places an incident relative to the dataset's coverage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeVerdict {
    InScope,
    OutOfScope,
    Unknown,
}

/// Keyword stems matched against normalized narratives.
///
/// Stems are normalized the same way as the text, so Cyrillic stems match
/// transliterated narratives. A stem only matches at the start of a word.
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    targets: Vec<(TargetType, Vec<String>)>,
    maritime: Vec<String>,
    in_scope: Vec<String>,
    out_of_scope: Vec<String>,
}

fn normalize_stems(stems: &[String]) -> Vec<String> {
    let mut out: Vec<String> = stems
        .iter()
        .map(|s| normalize(s))
        .filter(|s| !s.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

/// The narrative is padded with a leading space so `" " + stem` finds
/// stems at word starts only.
fn padded(text: &str) -> String {
    format!(" {}", normalize(text))
}

fn has_stem(padded_text: &str, stems: &[String]) -> bool {
    stems.iter().any(|stem| padded_text.contains(&format!(" {}", stem)))
}

impl KeywordMatcher {
    pub fn from_config(config: &KeywordConfig) -> Result<Self> {
        let mut targets = Vec::with_capacity(config.target_types.len());
        for (name, stems) in &config.target_types {
            let target = name
                .parse::<TargetType>()
                .map_err(|e| LedgerError::Config(format!("keywords.target_types: {}", e)))?;
            targets.push((target, normalize_stems(stems)));
        }
        targets.sort_by_key(|(target, _)| *target);
        Ok(Self {
            targets,
            maritime: normalize_stems(&config.maritime),
            in_scope: normalize_stems(&config.in_scope_locations),
            out_of_scope: normalize_stems(&config.out_of_scope_locations),
        })
    }

    /// Every target type whose keywords occur in the text.
    pub fn target_types_in(&self, text: &str) -> BTreeSet<TargetType> {
        let text = padded(text);
        self.targets
            .iter()
            .filter(|(_, stems)| has_stem(&text, stems))
            .map(|(target, _)| *target)
            .collect()
    }

    /// Whether the text carries at least one keyword for `target`.
    /// `other` has no keywords and is always supported.
    pub fn supports(&self, target: TargetType, text: &str) -> bool {
        if !target.is_specific() {
            return true;
        }
        let text = padded(text);
        self.targets
            .iter()
            .find(|(t, _)| *t == target)
            .is_some_and(|(_, stems)| has_stem(&text, stems))
    }

    pub fn mentions_maritime(&self, text: &str) -> bool {
        has_stem(&padded(text), &self.maritime)
    }

    /// Out of scope only when the text names an excluded location and no
    /// covered one.
    pub fn scope(&self, text: &str) -> ScopeVerdict {
        let text = padded(text);
        if has_stem(&text, &self.in_scope) {
            ScopeVerdict::InScope
        } else if has_stem(&text, &self.out_of_scope) {
            ScopeVerdict::OutOfScope
        } else {
            ScopeVerdict::Unknown
        }
    }
}
