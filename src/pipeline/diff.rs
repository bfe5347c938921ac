// src/pipeline/diff.rs

//! Diff calculation between two fetches of the same document.
//!
//! Tracked metrics are the score and the descendant (comment) count. A
//! metric triple is populated only when the value changed, with a missing
//! value treated as 0, so downstream renderers can tell "checked,
//! unchanged" apart from "never compared".

use crate::models::{Document, DocumentDiff};

/// Compare two snapshots and produce a sparse diff stamped with `now_ms`.
pub fn compute_diff(prev: &Document, next: &Document, now_ms: i64) -> DocumentDiff {
    let mut diff = DocumentDiff {
        ts: now_ms,
        ..DocumentDiff::default()
    };

    let score_prev = prev.score.unwrap_or(0);
    let score_next = next.score.unwrap_or(0);
    if score_prev != score_next {
        diff.score_prev = Some(score_prev);
        diff.score_next = Some(score_next);
        diff.score_delta = Some(score_next - score_prev);
    }

    let desc_prev = prev.descendants.unwrap_or(0);
    let desc_next = next.descendants.unwrap_or(0);
    if desc_prev != desc_next {
        diff.descendants_prev = Some(desc_prev);
        diff.descendants_next = Some(desc_next);
        diff.descendants_delta = Some(desc_next - desc_prev);
    }

    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentType;

    fn story(score: Option<i64>, descendants: Option<i64>) -> Document {
        Document {
            id: 1,
            kind: DocumentType::Story,
            by: "tester".into(),
            time: 1_700_000_000,
            title: Some("A story".into()),
            url: None,
            text: None,
            score,
            descendants,
            parent: None,
            poll: None,
            kids: None,
            parts: None,
            deleted: None,
            dead: None,
        }
    }

    #[test]
    fn test_identical_snapshots_have_no_changes() {
        let doc = story(Some(10), Some(5));
        let diff = compute_diff(&doc, &doc, 42);
        assert!(!diff.has_changes());
        assert_eq!(diff.ts, 42);
        assert_eq!(diff.score_prev, None);
        assert_eq!(diff.descendants_prev, None);
    }

    #[test]
    fn test_score_change_populates_only_score_triple() {
        let prev = story(Some(10), Some(5));
        let next = story(Some(15), Some(5));
        let diff = compute_diff(&prev, &next, 0);
        assert!(diff.has_changes());
        assert_eq!(diff.score_prev, Some(10));
        assert_eq!(diff.score_next, Some(15));
        assert_eq!(diff.score_delta, Some(5));
        assert_eq!(diff.descendants_delta, None);
    }

    #[test]
    fn test_descendants_change() {
        let prev = story(Some(10), Some(5));
        let next = story(Some(10), Some(9));
        let diff = compute_diff(&prev, &next, 0);
        assert_eq!(diff.descendants_prev, Some(5));
        assert_eq!(diff.descendants_next, Some(9));
        assert_eq!(diff.descendants_delta, Some(4));
        assert_eq!(diff.score_delta, None);
    }

    #[test]
    fn test_missing_metric_treated_as_zero() {
        let prev = story(None, None);
        let next = story(Some(3), None);
        let diff = compute_diff(&prev, &next, 0);
        assert_eq!(diff.score_prev, Some(0));
        assert_eq!(diff.score_next, Some(3));
        assert_eq!(diff.score_delta, Some(3));
        assert!(diff.descendants_delta.is_none());
    }

    #[test]
    fn test_negative_delta() {
        let prev = story(Some(10), None);
        let next = story(Some(7), None);
        let diff = compute_diff(&prev, &next, 0);
        assert_eq!(diff.score_delta, Some(-3));
    }
}
