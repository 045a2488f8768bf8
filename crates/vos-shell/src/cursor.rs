//! Position-tracking cursor over an immutable slice.
//!
//! Used for character scanning in the tokenizer and for token walking in
//! the parser. The cursor is a slice reference plus an index, so saving a
//! position is a copy.

use vos_types::error::{Result, VosError};

/// Bidirectional cursor over `&[T]`.
#[derive(Debug)]
pub struct SliceCursor<'a, T> {
    items: &'a [T],
    index: usize,
}

impl<T> Clone for SliceCursor<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for SliceCursor<'_, T> {}

impl<'a, T> SliceCursor<'a, T> {
    pub fn new(items: &'a [T]) -> Self {
        Self { items, index: 0 }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// True once the cursor has moved past the last item.
    pub fn end_of_array(&self) -> bool {
        self.index >= self.items.len()
    }

    pub fn current(&self) -> Option<&'a T> {
        self.items.get(self.index)
    }

    pub fn peek_next(&self) -> Option<&'a T> {
        self.items.get(self.index + 1)
    }

    pub fn peek_previous(&self) -> Option<&'a T> {
        self.index.checked_sub(1).and_then(|i| self.items.get(i))
    }

    /// Step forward one item. Fails when already at the end.
    pub fn advance(&mut self) -> Result<()> {
        if self.end_of_array() {
            return Err(VosError::Syntax("unexpected end of input".to_string()));
        }
        self.index += 1;
        Ok(())
    }

    /// Step back one item. Fails at the start.
    pub fn go_to_previous(&mut self) -> Result<()> {
        if self.index == 0 {
            return Err(VosError::Syntax("cursor is at the start of input".to_string()));
        }
        self.index -= 1;
        Ok(())
    }

    /// Return the current item and step past it.
    pub fn take(&mut self) -> Option<&'a T> {
        let item = self.current()?;
        self.index += 1;
        Some(item)
    }

    /// Items from the current position to the end.
    pub fn rest(&self) -> &'a [T] {
        self.items.get(self.index..).unwrap_or(&[])
    }
}
