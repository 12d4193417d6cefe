use std::num::NonZeroUsize;

use ndarray::{Array1, Array3, Array4, Axis};
use rand::{Rng, seq::SliceRandom};
use rayon::prelude::*;

use crate::{Record, Result, Transform};

/// A batch of transformed tiles and their labels.
#[derive(Debug, Clone)]
pub struct Batch {
    /// (N, 3, size, size) images.
    pub x: Array4<f32>,
    /// N labels.
    pub y: Array1<f32>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }
}

/// Produces batches of decoded tiles from a list of records.
#[derive(Debug, Clone)]
pub struct DataLoader {
    records: Vec<Record>,
    transform: Transform,
    batch_size: NonZeroUsize,
    shuffle: bool,
}

impl DataLoader {
    /// Creates a new `DataLoader`.
    ///
    /// # Arguments
    /// * `records` - The tiles to load.
    /// * `transform` - The transform applied to every tile.
    /// * `batch_size` - The maximum amount of tiles per batch, the last one may be shorter.
    /// * `shuffle` - Whether to visit the records in a new random order on every pass.
    pub fn new(
        records: Vec<Record>,
        transform: Transform,
        batch_size: NonZeroUsize,
        shuffle: bool,
    ) -> Self {
        Self {
            records,
            transform,
            batch_size,
            shuffle,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn num_batches(&self) -> usize {
        self.len().div_ceil(self.batch_size.get())
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Starts a pass over the records.
    ///
    /// The visiting order and the flip of every tile are drawn from `rng` up front, so a pass
    /// only depends on the state of `rng` when it starts.
    pub fn batches<R: Rng>(&self, rng: &mut R) -> Batches<'_> {
        let mut order: Vec<usize> = (0..self.len()).collect();
        if self.shuffle {
            order.shuffle(rng);
        }

        let flips = (0..self.len())
            .map(|_| self.transform.flips() && rng.random_bool(0.5))
            .collect();

        Batches {
            loader: self,
            order,
            flips,
            cursor: 0,
        }
    }
}

/// One pass over the records of a `DataLoader`.
pub struct Batches<'a> {
    loader: &'a DataLoader,
    order: Vec<usize>,
    flips: Vec<bool>,
    cursor: usize,
}

impl Batches<'_> {
    fn load(&self, indices: &[usize]) -> Result<Batch> {
        let DataLoader {
            records, transform, ..
        } = self.loader;

        let images: Vec<Array3<f32>> = indices
            .par_iter()
            .map(|&i| transform.load(&records[i].image, self.flips[i]))
            .collect::<Result<_>>()?;

        let views: Vec<_> = images.iter().map(Array3::view).collect();
        let x = ndarray::stack(Axis(0), &views)?;
        let y = indices.iter().map(|&i| records[i].label).collect();

        Ok(Batch { x, y })
    }
}

impl Iterator for Batches<'_> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.order.len() {
            return None;
        }

        let end = (self.cursor + self.loader.batch_size.get()).min(self.order.len());
        let indices = &self.order[self.cursor..end];
        let batch = self.load(indices);

        self.cursor = end;
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.order.len() - self.cursor).div_ceil(self.loader.batch_size.get());
        (remaining, Some(remaining))
    }
}
