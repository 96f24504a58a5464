//! Text normalization shared by the similarity, reconciliation and validation stages.
//!
//! Everything is folded to lowercase Latin: Cyrillic (Russian and Ukrainian)
//! is transliterated character by character, apostrophes are dropped and any
//! other punctuation becomes a word break.

pub mod city;
pub mod keywords;

use std::collections::{BTreeSet, HashMap};

use once_cell::sync::Lazy;

pub use city::CityMatcher;
pub use keywords::KeywordMatcher;

static TRANSLIT: Lazy<HashMap<char, &'static str>> = Lazy::new(|| {
    [
        ('а', "a"), ('б', "b"), ('в', "v"), ('г', "g"), ('д', "d"), ('е', "e"),
        ('ё', "e"), ('ж', "zh"), ('з', "z"), ('и', "i"), ('й', "y"), ('к', "k"),
        ('л', "l"), ('м', "m"), ('н', "n"), ('о', "o"), ('п', "p"), ('р', "r"),
        ('с', "s"), ('т', "t"), ('у', "u"), ('ф', "f"), ('х', "kh"), ('ц', "ts"),
        ('ч', "ch"), ('ш', "sh"), ('щ', "shch"), ('ъ', ""), ('ы', "y"), ('ь', ""),
        ('э', "e"), ('ю', "yu"), ('я', "ya"),
        // Ukrainian
        ('і', "i"), ('ї', "yi"), ('є', "ye"), ('ґ', "g"),
        // Apostrophes vanish inside words
        ('\'', ""), ('\u{2019}', ""), ('\u{02BC}', ""), ('`', ""),
    ]
    .into_iter()
    .collect()
});

/// Words too common to say anything about overlap between two reports.
const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "was", "were", "from", "that", "this", "have", "has",
    "been", "near", "after", "are", "its", "into", "also", "reported", "reports",
];

/// Lowercase, transliterate and collapse whitespace.
pub fn normalize(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.trim().chars().flat_map(char::to_lowercase) {
        if let Some(latin) = TRANSLIT.get(&c) {
            out.push_str(latin);
        } else if c.is_alphanumeric() {
            out.push(c);
        } else {
            out.push(' ');
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `None` for absent or blank values, normalized text otherwise.
pub fn normalize_opt(s: Option<&str>) -> Option<String> {
    s.map(normalize).filter(|n| !n.is_empty())
}

/// Content tokens: three or more characters, or anything containing a digit.
pub fn tokens(s: &str) -> BTreeSet<String> {
    normalize(s)
        .split(' ')
        .filter(|t| t.chars().count() >= 3 || t.chars().any(|c| c.is_ascii_digit()))
        .filter(|t| !t.is_empty() && !STOPWORDS.contains(t))
        .map(str::to_string)
        .collect()
}

/// Jaccard similarity of two token sets. Two empty sets score zero.
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Whether either normalized string contains the other.
pub fn overlaps(a: &str, b: &str) -> bool {
    !a.is_empty() && !b.is_empty() && (a.contains(b) || b.contains(a))
}

/// Rough measure of how much concrete detail a text carries: distinct
/// tokens plus a bonus for numbers and capitalized names.
pub fn specificity(s: &str) -> usize {
    let named = s
        .split_whitespace()
        .filter(|w| {
            w.chars().next().is_some_and(|c| c.is_uppercase())
                || w.chars().any(|c| c.is_ascii_digit())
        })
        .count();
    tokens(s).len() + named
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transliterates_russian_and_ukrainian() {
        assert_eq!(normalize("Воронеж"), "voronezh");
        assert_eq!(normalize("Воронiж"), "voronizh");
        assert_eq!(normalize("  Старий   Оскол "), "stariy oskol");
        assert_eq!(normalize("Кам'янка"), "kamyanka");
    }

    #[test]
    fn punctuation_breaks_words() {
        assert_eq!(normalize("Stary-Oskol, (Belgorod)"), "stary oskol belgorod");
        assert_eq!(normalize_opt(Some("  ")), None);
    }

    #[test]
    fn tokens_keep_numbers_and_drop_noise() {
        let t = tokens("The tanker was hit by 2 drones near Kerch");
        assert!(t.contains("tanker"));
        assert!(t.contains("2"));
        assert!(t.contains("kerch"));
        assert!(!t.contains("the"));
        assert!(!t.contains("by"));
    }

    #[test]
    fn jaccard_of_disjoint_and_identical_sets() {
        let a = tokens("refinery fire Ryazan");
        let b = tokens("airfield strike Engels");
        assert_eq!(jaccard(&a, &b), 0.0);
        assert_eq!(jaccard(&a, &a), 1.0);
        assert_eq!(jaccard(&BTreeSet::new(), &BTreeSet::new()), 0.0);
    }

    #[test]
    fn specificity_prefers_detailed_text() {
        assert!(specificity("Two storage tanks burned at Tikhoretsk, 3 injured") > specificity("fire reported"));
    }
}
