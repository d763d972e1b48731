//! # Context Windowizer
//!
//! Turns a flat token sequence into one fixed-width window of vocabulary ids
//! per position, plus a separate focus id for the token itself.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SeqTagError};
use crate::vocab::{UNK_TOKEN, Vocabulary};

/// Largest accepted context on either side of the focus token.
pub const MAX_WINDOW_SIDE: usize = 1024;

/// Window shape around the focus token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Tokens taken before the focus token.
    pub left_size: usize,
    /// Tokens taken after the focus token.
    pub right_size: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            left_size: 2,
            right_size: 1,
        }
    }
}

impl WindowConfig {
    pub fn new(left_size: usize, right_size: usize) -> Self {
        Self {
            left_size,
            right_size,
        }
    }

    pub fn with_left_size(mut self, left_size: usize) -> Self {
        self.left_size = left_size;
        self
    }

    pub fn with_right_size(mut self, right_size: usize) -> Self {
        self.right_size = right_size;
        self
    }

    /// `left_size + 1 + right_size`, saturating at `usize::MAX`.
    pub fn width(&self) -> usize {
        self.left_size
            .saturating_add(1)
            .saturating_add(self.right_size)
    }

    /// Width of a window this config can actually build.
    ///
    /// # Errors
    ///
    /// `SeqTagError::InvalidWindow` if either side exceeds [`MAX_WINDOW_SIDE`].
    pub fn checked_width(&self) -> Result<usize> {
        if self.left_size > MAX_WINDOW_SIDE || self.right_size > MAX_WINDOW_SIDE {
            return Err(SeqTagError::InvalidWindow {
                left_size: self.left_size,
                right_size: self.right_size,
            });
        }
        Ok(self.left_size + 1 + self.right_size)
    }

    /// Tokens of the window at `position`, padded with the sentinel string.
    ///
    /// # Panics
    ///
    /// Panics if `position >= tokens.len()`.
    pub fn window_tokens<'a, S: AsRef<str>>(
        &self,
        tokens: &'a [S],
        position: usize,
    ) -> Result<Vec<&'a str>> {
        assert!(position < tokens.len(), "position {position} out of bounds");

        let mut window = Vec::with_capacity(self.checked_width()?);

        let pad_left = self.left_size.saturating_sub(position);
        window.extend(std::iter::repeat_n(UNK_TOKEN, pad_left));
        let start = position.saturating_sub(self.left_size);
        window.extend(tokens[start..=position].iter().map(|t| t.as_ref()));

        let end = position
            .saturating_add(self.right_size)
            .min(tokens.len() - 1);
        window.extend(tokens[position + 1..=end].iter().map(|t| t.as_ref()));
        let pad_right = self.right_size - (end - position);
        window.extend(std::iter::repeat_n(UNK_TOKEN, pad_right));

        Ok(window)
    }

    /// Vectorize a token sequence.
    ///
    /// # Errors
    ///
    /// `SeqTagError::InvalidWindow` for a window wider than [`MAX_WINDOW_SIDE`] allows.
    pub fn windowize<S: AsRef<str>>(
        &self,
        tokens: &[S],
        vocab: &Vocabulary,
    ) -> Result<WindowedFeatures> {
        let width = self.checked_width()?;
        let mut context = Vec::with_capacity(tokens.len() * width);

        for position in 0..tokens.len() {
            context.extend(
                self.window_tokens(tokens, position)?
                    .into_iter()
                    .map(|token| vocab.id(token)),
            );
        }

        Ok(WindowedFeatures {
            width,
            context,
            focus: focus_ids(tokens, vocab),
        })
    }
}

/// Vocabulary id of each token on its own.
pub fn focus_ids<S: AsRef<str>>(tokens: &[S], vocab: &Vocabulary) -> Vec<u32> {
    tokens.iter().map(|t| vocab.id(t.as_ref())).collect()
}

/// Row-major window ids plus focus ids, one row per token position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowedFeatures {
    /// Ids per window.
    pub width: usize,
    /// `len() * width` ids.
    pub context: Vec<u32>,
    /// One id per position.
    pub focus: Vec<u32>,
}

impl WindowedFeatures {
    pub fn len(&self) -> usize {
        self.focus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.focus.is_empty()
    }

    /// Window ids at `position`.
    pub fn window(&self, position: usize) -> Option<&[u32]> {
        let start = position.checked_mul(self.width)?;
        self.context.get(start..start + self.width)
    }

    pub fn windows(&self) -> impl Iterator<Item = &[u32]> {
        self.context.chunks(self.width.max(1))
    }
}
