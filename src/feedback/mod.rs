//! Feedback loop: measure how far human edits moved a suggestion and fold
//! approved text back into the retrieval corpus.

use anyhow::Result;
use serde_json::json;
use tracing::{info, warn};

use crate::llm::LlmClient;
use crate::storage::Database;
use crate::types::{now_ts, FeedbackRecord, MessageRecord, Suggestion, SuggestionStatus};
use crate::vector::{VectorStore, REPLIES_COLLECTION};

/// Character-level edit distance derived from a sequence-alignment
/// similarity ratio:
///
/// `distance = round((1 - ratio) * max(len(original), len(edited)))`
///
/// Identical strings short-circuit to 0; the value scales with the amount
/// of change.
pub fn edit_distance(original: &str, edited: &str) -> i64 {
    if original == edited {
        return 0;
    }

    let a: Vec<char> = original.chars().collect();
    let b: Vec<char> = edited.chars().collect();
    let ratio = similarity_ratio(&a, &b);
    let max_len = a.len().max(b.len()) as f64;
    ((1.0 - ratio) * max_len).round() as i64
}

/// Similarity in [0, 1]: twice the number of matched characters over the
/// total length, where matches are counted by recursively finding the
/// longest common block and matching the regions on either side of it.
pub fn similarity_ratio(a: &[char], b: &[char]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    let matches = total_matches(a, b);
    2.0 * matches as f64 / total as f64
}

fn total_matches(a: &[char], b: &[char]) -> usize {
    let mut matched = 0usize;
    // Regions still to be aligned, processed iteratively.
    let mut queue: Vec<(usize, usize, usize, usize)> = vec![(0, a.len(), 0, b.len())];

    while let Some((alo, ahi, blo, bhi)) = queue.pop() {
        let (i, j, size) = longest_match(a, b, alo, ahi, blo, bhi);
        if size == 0 {
            continue;
        }
        matched += size;
        queue.push((alo, i, blo, j));
        queue.push((i + size, ahi, j + size, bhi));
    }

    matched
}

/// Longest block of characters common to `a[alo..ahi]` and `b[blo..bhi]`.
/// Of equally long blocks, the earliest in `a` (then `b`) wins.
fn longest_match(
    a: &[char],
    b: &[char],
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let mut best = (alo, blo, 0usize);
    // j2len[j] = length of the common block ending at a[i], b[j].
    let mut j2len: Vec<usize> = vec![0; bhi.saturating_sub(blo)];

    for i in alo..ahi {
        let mut new_j2len = vec![0usize; bhi - blo];
        for j in blo..bhi {
            if a[i] == b[j] {
                let prev = if j > blo { j2len[j - blo - 1] } else { 0 };
                let length = prev + 1;
                new_j2len[j - blo] = length;
                if length > best.2 {
                    best = (i + 1 - length, j + 1 - length, length);
                }
            }
        }
        j2len = new_j2len;
    }

    best
}

/// Persist a feedback record for a reviewed suggestion and, for
/// approved/edited outcomes, index the final text into the approved-reply
/// corpus. The feedback row is written unconditionally; indexing failure is
/// logged, never propagated — the log has already committed.
pub async fn log_feedback(
    db: &Database,
    vectors: &VectorStore,
    llm: &LlmClient,
    suggestion: &Suggestion,
    message: &MessageRecord,
    owner_id: &str,
    final_text: &str,
) -> Result<FeedbackRecord> {
    let distance = edit_distance(&suggestion.suggested_text, final_text);

    let record = FeedbackRecord {
        id: uuid::Uuid::new_v4().to_string(),
        suggestion_id: suggestion.id.clone(),
        original_text: suggestion.suggested_text.clone(),
        edited_text: final_text.to_string(),
        edit_distance: distance,
        created_at: now_ts(),
    };
    db.insert_feedback(&record).await?;

    info!(
        suggestion = %suggestion.id,
        edit_distance = distance,
        "Logged suggestion feedback"
    );

    if matches!(
        suggestion.status,
        SuggestionStatus::Approved | SuggestionStatus::Edited
    ) {
        let payload = json!({
            "user_id": owner_id,
            "suggestion_id": suggestion.id,
            "category": message.category.map(|c| c.as_str()).unwrap_or(""),
            "subject": message.subject.as_deref().unwrap_or(""),
            "edit_distance": distance,
        });

        let indexed = async {
            let embedding = llm.embed(final_text).await?;
            vectors
                .upsert(
                    REPLIES_COLLECTION,
                    &suggestion.id,
                    &embedding,
                    final_text,
                    payload,
                )
                .await
        }
        .await;

        match indexed {
            Ok(()) => info!(suggestion = %suggestion.id, "Indexed approved reply"),
            Err(e) => {
                warn!(suggestion = %suggestion.id, error = %e, "Failed to index approved reply")
            }
        }
    }

    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_strings_have_zero_distance() {
        assert_eq!(edit_distance("", ""), 0);
        assert_eq!(edit_distance("hello", "hello"), 0);
        assert_eq!(edit_distance("god morgen, Mette", "god morgen, Mette"), 0);
    }

    #[test]
    fn completely_different_strings_score_max_length() {
        assert_eq!(edit_distance("aaaa", "bbbb"), 4);
    }

    #[test]
    fn distance_scales_with_the_change() {
        let original = "Thank you for your order.";
        let small_edit = "Thank you for your orders.";
        let big_edit = "We have cancelled everything.";

        let small = edit_distance(original, small_edit);
        let big = edit_distance(original, big_edit);
        assert!(small > 0);
        assert!(big > small);
    }

    #[test]
    fn ratio_is_symmetric_for_equal_length_inputs() {
        let a: Vec<char> = "abcdefgh".chars().collect();
        let b: Vec<char> = "abXdefYh".chars().collect();
        let forward = similarity_ratio(&a, &b);
        let backward = similarity_ratio(&b, &a);
        assert!((forward - backward).abs() < 1e-9);
    }
}
