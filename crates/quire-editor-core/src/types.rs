//! Selection type shared by the transformer, the splice helpers and the session.

use std::ops::Range;

use serde::{Deserialize, Serialize};

/// Text selection as an ordered pair of character offsets.
///
/// Offsets count Unicode scalar values, NOT bytes. `start == end` is a caret.
#[derive(Clone, Debug, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Selection {
    pub start: usize,
    pub end: usize,
}

impl Selection {
    /// Create a selection. The bounds may be given in either order.
    pub fn new(a: usize, b: usize) -> Self {
        Self {
            start: a.min(b),
            end: a.max(b),
        }
    }

    /// Create a collapsed selection (caret).
    pub fn collapsed(offset: usize) -> Self {
        Self {
            start: offset,
            end: offset,
        }
    }

    /// Check if the selection is collapsed (empty, caret only).
    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Same as `is_collapsed`.
    pub fn is_empty(&self) -> bool {
        self.is_collapsed()
    }

    /// Clamp both ends to a text of `len` chars, keeping them ordered.
    pub fn clamp(self, len: usize) -> Self {
        Self::new(self.start.min(len), self.end.min(len))
    }

    /// Shift the selection to account for `removed` chars being replaced by
    /// `inserted` chars at `at`.
    ///
    /// Offsets before the edit stay put, offsets after it move by the length
    /// delta, and offsets inside the removed span collapse onto its end.
    pub fn shift_for_edit(self, at: usize, removed: usize, inserted: usize) -> Self {
        let map = |offset: usize| {
            if offset <= at {
                offset
            } else if offset >= at + removed {
                offset - removed + inserted
            } else {
                at + inserted
            }
        };
        Self::new(map(self.start), map(self.end))
    }
}

impl From<Range<usize>> for Selection {
    fn from(range: Range<usize>) -> Self {
        Self::new(range.start, range.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_normalizes() {
        let sel = Selection::new(10, 5);
        assert_eq!(sel.start, 5);
        assert_eq!(sel.end, 10);
        assert_eq!(sel.len(), 5);
        assert!(!sel.is_collapsed());
    }

    #[test]
    fn test_selection_collapsed() {
        let sel = Selection::collapsed(5);
        assert!(sel.is_collapsed());
        assert!(sel.is_empty());
        assert_eq!(sel.len(), 0);
    }

    #[test]
    fn test_selection_clamp() {
        assert_eq!(Selection::new(3, 40).clamp(10), Selection::new(3, 10));
        assert_eq!(Selection::new(20, 40).clamp(10), Selection::collapsed(10));
    }

    #[test]
    fn test_shift_for_insert_before() {
        let sel = Selection::new(10, 12).shift_for_edit(2, 0, 5);
        assert_eq!(sel, Selection::new(15, 17));
    }

    #[test]
    fn test_shift_for_insert_after() {
        let sel = Selection::new(1, 2).shift_for_edit(5, 0, 5);
        assert_eq!(sel, Selection::new(1, 2));
    }

    #[test]
    fn test_shift_for_removal_spanning_caret() {
        let sel = Selection::collapsed(7).shift_for_edit(5, 4, 0);
        assert_eq!(sel, Selection::collapsed(5));
    }

    #[test]
    fn test_shift_for_replacement() {
        // "aaTOKENbb" -> "aaurlbb", caret after the token.
        let sel = Selection::collapsed(9).shift_for_edit(2, 5, 3);
        assert_eq!(sel, Selection::collapsed(7));
    }
}
