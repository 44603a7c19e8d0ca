//! Offset-tracking string splice
//!
//! Every rewrite in the compiler is addressed with offsets taken from a scan
//! of the *unedited* source. [`OffsetSplice`] keeps the running length delta
//! of the edits it already applied so callers can keep using those original
//! offsets, as long as edits are applied in ascending offset order.

use thiserror::Error;

/// Invalid splice arguments
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpliceError {
    #[error("end argument must be greater than or equal to start. Actual: start {start}, end {end}")]
    InvertedRange { start: usize, end: usize },

    #[error("range {start}..{end} (shifted by {delta}) is out of bounds for a text of length {len}")]
    OutOfBounds {
        start: usize,
        end: usize,
        delta: isize,
        len: usize,
    },

    #[error("range {start}..{end} does not fall on character boundaries")]
    NotCharBoundary { start: usize, end: usize },
}

/// Splicer translating original offsets into offsets of the edited text
#[derive(Debug, Default, Clone)]
pub struct OffsetSplice {
    delta: isize,
}

impl OffsetSplice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace `start..end` (original offsets) of `text` with `replacement`
    pub fn splice(
        &mut self,
        text: &str,
        replacement: &str,
        start: usize,
        end: usize,
    ) -> Result<String, SpliceError> {
        if end < start {
            return Err(SpliceError::InvertedRange { start, end });
        }

        let shift = |offset: usize| {
            let shifted = offset as isize + self.delta;
            usize::try_from(shifted).ok().filter(|shifted| *shifted <= text.len())
        };

        let (shifted_start, shifted_end) = match (shift(start), shift(end)) {
            (Some(s), Some(e)) => (s, e),
            _ => {
                return Err(SpliceError::OutOfBounds {
                    start,
                    end,
                    delta: self.delta,
                    len: text.len(),
                })
            }
        };

        if !text.is_char_boundary(shifted_start) || !text.is_char_boundary(shifted_end) {
            return Err(SpliceError::NotCharBoundary { start, end });
        }

        let mut spliced = String::with_capacity(text.len() + replacement.len());
        spliced.push_str(&text[..shifted_start]);
        spliced.push_str(replacement);
        spliced.push_str(&text[shifted_end..]);

        self.delta += replacement.len() as isize - (end - start) as isize;

        Ok(spliced)
    }
}
