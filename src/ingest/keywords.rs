// src/ingest/keywords.rs
//! Trigger keyword matching with whole-word boundaries and `&` compounds.

use std::collections::BTreeSet;

use once_cell::sync::OnceCell;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// NFKC, lowercase, and drop quote or comma noise glued to the end of a word
/// ("solar'" / "tariff," become "solar" / "tariff").
pub fn normalize_for_match(text: &str) -> String {
    let text: String = text.nfkc().collect::<String>().to_lowercase();

    static RE_QUOTES: OnceCell<Regex> = OnceCell::new();
    let re_quotes = RE_QUOTES.get_or_init(|| {
        Regex::new(r#"(\w)["'\u{201C}\u{201D}\u{2018}\u{2019}]+(\s|$)"#).unwrap()
    });
    let text = re_quotes.replace_all(&text, "$1$2");

    static RE_COMMA: OnceCell<Regex> = OnceCell::new();
    let re_comma = RE_COMMA.get_or_init(|| Regex::new(r"(\w),(\s|$)").unwrap());
    re_comma.replace_all(&text, "$1$2").into_owned()
}

#[derive(Debug, Clone)]
struct Trigger {
    /// Keyword as configured (lowercased, trimmed); reported on match.
    keyword: String,
    /// One pattern per `&` part; all must match.
    parts: Vec<Regex>,
}

#[derive(Debug, Clone, Default)]
pub struct KeywordMatcher {
    triggers: Vec<Trigger>,
}

impl KeywordMatcher {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = BTreeSet::new();
        let mut triggers = Vec::new();
        for kw in keywords {
            let kw = kw.as_ref().trim().to_lowercase();
            if kw.is_empty() || !seen.insert(kw.clone()) {
                continue;
            }
            let parts: Vec<Regex> = kw
                .split('&')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .filter_map(|p| Regex::new(&format!(r"\b{}\b", regex::escape(p))).ok())
                .collect();
            if parts.is_empty() {
                continue;
            }
            triggers.push(Trigger { keyword: kw, parts });
        }
        Self { triggers }
    }

    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }

    /// Keywords triggered by `text`, in configuration order.
    pub fn matches(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }
        let norm = normalize_for_match(text);
        self.triggers
            .iter()
            .filter(|t| t.parts.iter().all(|re| re.is_match(&norm)))
            .map(|t| t.keyword.clone())
            .collect()
    }

    /// Sorted, deduplicated union of title and snippet triggers.
    pub fn triggers(&self, title: &str, snippet: &str) -> Vec<String> {
        let set: BTreeSet<String> = self
            .matches(title)
            .into_iter()
            .chain(self.matches(snippet))
            .collect();
        set.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_noise_is_stripped() {
        assert_eq!(normalize_for_match("Solar' tariff, and “Grid”"), "solar tariff and “grid");
        assert_eq!(normalize_for_match("ＳＯＬＡＲ"), "solar");
    }

    #[test]
    fn boundary_exact() {
        let m = KeywordMatcher::new(["cat"]);
        assert!(m.matches("catering news").is_empty());
        assert_eq!(m.matches("Cat food recall"), vec!["cat".to_string()]);
    }

    #[test]
    fn compound_requires_every_part() {
        let m = KeywordMatcher::new(["solar & tariff"]);
        assert_eq!(m.matches("Tariff hits solar panels").len(), 1);
        assert!(m.matches("solar farm opens").is_empty());
        assert!(m.matches("solartariff").is_empty());
    }

    #[test]
    fn union_is_sorted_and_unique() {
        let m = KeywordMatcher::new(["wind", "solar", "Solar "]);
        assert_eq!(m.len(), 2);
        let t = m.triggers("Solar and wind", "more solar");
        assert_eq!(t, vec!["solar".to_string(), "wind".to_string()]);
    }
}
