// Keyword-density relevance score for collected records.

use threadscout_common::{topic_weight, DiscussionRecord, Keyword};

const TECHNICAL_WEIGHT: f64 = 0.5;
const PROBLEM_WEIGHT: f64 = 0.3;

const TECHNICAL_INDICATORS: &[&str] = &[
    "implementation",
    "protocol",
    "api",
    "framework",
    "architecture",
];

const PROBLEM_INDICATORS: &[&str] = &[
    "problem",
    "challenge",
    "issue",
    "difficulty",
    "pain point",
];

/// A session keyword prepared for matching.
#[derive(Debug, Clone, PartialEq)]
pub struct Term {
    needle: String,
    weight: f64,
}

impl Term {
    pub fn new(term: &str, weight: f64) -> Self {
        Self {
            needle: term.to_lowercase(),
            weight,
        }
    }
}

impl From<&Keyword> for Term {
    fn from(keyword: &Keyword) -> Self {
        Term::new(&keyword.term, topic_weight(keyword.topic.as_deref()))
    }
}

/// Score `record` against the session's keyword terms. Matching is a
/// case-insensitive substring test over title and body; each matched term
/// adds its topic weight.
pub fn score(record: &DiscussionRecord, terms: &[Term]) -> f64 {
    let text = record.text().to_lowercase();

    let keywords: f64 = terms
        .iter()
        .filter(|t| !t.needle.is_empty() && text.contains(&t.needle))
        .map(|t| t.weight)
        .sum();

    keywords
        + hits(&text, TECHNICAL_INDICATORS.iter().copied()) * TECHNICAL_WEIGHT
        + hits(&text, PROBLEM_INDICATORS.iter().copied()) * PROBLEM_WEIGHT
}

fn hits<'a>(text: &str, needles: impl IntoIterator<Item = &'a str>) -> f64 {
    needles
        .into_iter()
        .filter(|n| !n.is_empty() && text.contains(n))
        .count() as f64
}

/// Sort by descending relevance; ties keep collection order.
pub fn sort_by_relevance(records: &mut [DiscussionRecord]) {
    records.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));
}
