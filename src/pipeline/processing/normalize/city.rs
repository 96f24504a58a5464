use std::collections::HashMap;

use super::normalize;

/// Decides whether two city names refer to the same place.
///
/// Names are compared after transliteration. Spelling variants that survive
/// transliteration (Russian vs Ukrainian forms) go through the alias table,
/// and a containment match is only accepted when the shorter name is long
/// enough to be meaningful.
#[derive(Debug, Clone)]
pub struct CityMatcher {
    aliases: HashMap<String, String>,
    min_substring_len: usize,
}

impl CityMatcher {
    pub fn new(groups: &[Vec<String>], min_substring_len: usize) -> Self {
        let mut aliases = HashMap::new();
        for group in groups {
            let Some(canonical) = group.first().map(|c| normalize(c)) else {
                continue;
            };
            for name in group {
                aliases.insert(normalize(name), canonical.clone());
            }
        }
        Self {
            aliases,
            min_substring_len,
        }
    }

    /// Normalized, alias-resolved form of a city name.
    pub fn canonical(&self, city: &str) -> String {
        let normalized = normalize(city);
        self.aliases.get(&normalized).cloned().unwrap_or(normalized)
    }

    pub fn equivalent(&self, a: &str, b: &str) -> bool {
        let a = self.canonical(a);
        let b = self.canonical(b);
        if a.is_empty() || b.is_empty() {
            return false;
        }
        if a == b {
            return true;
        }
        let shorter = a.chars().count().min(b.chars().count());
        shorter >= self.min_substring_len && (a.contains(&b) || b.contains(&a))
    }
}
