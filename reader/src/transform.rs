//! Transforms applied on top of decoded entries.
//!
//! [Transformed] wraps a [Reader] with a per-element function (applied to every entry it
//! returns) and, optionally, a per-sequence function. When present, the per-sequence function
//! receives the decoded (untransformed) entries of every range access and its output replaces
//! the per-element results. Single-entry access and iteration only apply the per-element
//! function.

use crate::{
    blob::Blob,
    reader::{Decoder, Entries, Reader},
    Error, Index,
};
use std::fs::File;

type Element<'a, I, O> = Box<dyn Fn(I) -> O + Send + Sync + 'a>;
type Sequence<'a, I, O> = Box<dyn Fn(Vec<I>) -> Vec<O> + Send + Sync + 'a>;

/// A [Reader] with transforms applied to the entries it returns.
pub struct Transformed<'a, D: Decoder, O, B: Blob = File> {
    reader: &'a Reader<D, B>,
    element: Element<'a, D::Item, O>,
    sequence: Option<Sequence<'a, D::Item, O>>,
}

impl<'a, D: Decoder, B: Blob> Transformed<'a, D, D::Item, B> {
    /// Wrap `reader` without transforming individual entries.
    pub fn identity(reader: &'a Reader<D, B>) -> Self {
        Self::new(reader, |item| item)
    }
}

impl<'a, D: Decoder, O, B: Blob> Transformed<'a, D, O, B> {
    /// Wrap `reader`, applying `element` to every entry.
    pub fn new(
        reader: &'a Reader<D, B>,
        element: impl Fn(D::Item) -> O + Send + Sync + 'a,
    ) -> Self {
        Self {
            reader,
            element: Box::new(element),
            sequence: None,
        }
    }

    /// Replace the result of range accesses with `sequence` applied to the decoded entries.
    pub fn with_sequence(
        mut self,
        sequence: impl Fn(Vec<D::Item>) -> Vec<O> + Send + Sync + 'a,
    ) -> Self {
        self.sequence = Some(Box::new(sequence));
        self
    }

    /// The wrapped reader.
    pub fn reader(&self) -> &'a Reader<D, B> {
        self.reader
    }
}

impl<D: Decoder, O, B: Blob> Entries for Transformed<'_, D, O, B> {
    type Item = O;

    fn index(&self) -> &Index {
        self.reader.index()
    }

    fn get(&self, index: u64) -> Result<O, Error> {
        let item = self.reader.get(index)?;
        Ok((self.element)(item))
    }

    fn get_range(&self, start: u64, stop: u64) -> Result<Vec<O>, Error> {
        let items = self.reader.get_range(start, stop)?;
        if let Some(sequence) = &self.sequence {
            return Ok(sequence(items));
        }
        Ok(items.into_iter().map(|item| (self.element)(item)).collect())
    }
}
