//! Trace reference deduplication.

use crate::models::TraceReference;
use std::collections::HashSet;

/// Keeps the first occurrence of every trace id, preserving first-seen order.
#[must_use]
pub fn dedup_traces(traces: Vec<TraceReference>) -> Vec<TraceReference> {
    let mut seen = HashSet::with_capacity(traces.len());
    traces
        .into_iter()
        .filter(|trace| seen.insert(trace.trace_id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Cursor;

    fn trace(id: &str, offset: i64) -> TraceReference {
        TraceReference::new(id, Cursor::new(100, offset))
    }

    #[test]
    fn test_first_occurrence_wins() {
        let unique = dedup_traces(vec![
            trace("a", 1),
            trace("b", 2),
            trace("a", 3),
            trace("c", 4),
            trace("b", 5),
        ]);

        let ids: Vec<_> = unique.iter().map(|t| t.trace_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(unique[0].cursor, Cursor::new(100, 1));
        assert_eq!(unique[1].cursor, Cursor::new(100, 2));
    }

    #[test]
    fn test_empty_and_unique_inputs() {
        assert!(dedup_traces(Vec::new()).is_empty());

        let input = vec![trace("x", 1), trace("y", 2)];
        assert_eq!(dedup_traces(input.clone()), input);
    }
}
