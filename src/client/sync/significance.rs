//! Change significance.
//!
//! Decides whether an update to a durable node is worth a backend call, and
//! whether it may be debounced.

use crate::shared::node::Node;

/// How much an update matters to the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Significance {
    /// Nothing the backend stores changed enough
    Unchanged,
    /// Only the position moved; safe to debounce
    PositionOnly,
    /// A persisted field changed; send right away
    Content,
}

/// Classify the change from `old` to `new`.
///
/// Content fields are keyword, memo, color, type, analysis status and
/// parent. A coordinate counts as moved when it shifted by at least
/// `threshold` or appeared or disappeared.
pub fn classify(old: &Node, new: &Node, threshold: f64) -> Significance {
    let content_changed = old.keyword != new.keyword
        || old.memo != new.memo
        || old.color != new.color
        || old.node_type != new.node_type
        || old.analysis_status != new.analysis_status
        || old.parent_id != new.parent_id;
    if content_changed {
        return Significance::Content;
    }
    if moved(old.x, new.x, threshold) || moved(old.y, new.y, threshold) {
        return Significance::PositionOnly;
    }
    Significance::Unchanged
}

fn moved(before: Option<f64>, after: Option<f64>, threshold: f64) -> bool {
    match (before, after) {
        (Some(a), Some(b)) => (a - b).abs() >= threshold,
        (None, None) => false,
        _ => true,
    }
}
