//! Word-overlap name similarity used to rank raw-query results.

use crate::record::Record;

/// Score how closely `text` matches `term`, as a percentage in `[0, 100]`.
///
/// Both sides are case-folded. Identical strings score 100. Otherwise the
/// score is the number of words in `text` that also occur in `term`, divided
/// by the word count of the longer side. Repeated words in `text` each count.
pub fn score(text: &str, term: &str) -> f64 {
    let text = text.to_lowercase();
    let term = term.to_lowercase();

    if text == term {
        return 100.0;
    }

    let text_words: Vec<&str> = text.split_whitespace().collect();
    let term_words: Vec<&str> = term.split_whitespace().collect();
    if text_words.is_empty() || term_words.is_empty() {
        return 0.0;
    }

    let overlap = text_words
        .iter()
        .filter(|word| term_words.contains(word))
        .count();
    let longest = text_words.len().max(term_words.len());

    overlap as f64 / longest as f64 * 100.0
}

/// Format a score the way the `Match_Percent` column shows it.
pub fn format_match_percent(score: f64) -> String {
    format!("{score:.2}%")
}

/// Rank records by name similarity to `term`, best first.
///
/// The sort is stable: records with equal scores keep their input order.
/// Every returned record carries its `Match_Percent`.
pub fn rank(records: Vec<Record>, term: &str) -> Vec<Record> {
    let mut scored: Vec<(f64, Record)> = records
        .into_iter()
        .map(|record| {
            let s = score(record.name.as_deref().unwrap_or_default(), term);
            (s, record)
        })
        .collect();

    scored.sort_by(|a, b| b.0.total_cmp(&a.0));

    scored
        .into_iter()
        .map(|(s, mut record)| {
            record.match_percent = Some(format_match_percent(s));
            record
        })
        .collect()
}
