use std::{fs, num::NonZeroUsize, path::Path};

use ndarray::{Array2, ArrayView2, Axis, s};
use rand::{Rng, seq::SliceRandom};

use crate::{MlErr, Result};

/// An immutable collection of supervised samples.
///
/// Inputs and targets are kept in two row-aligned matrices, row `i` of `x` is the input of the
/// `i`-th sample and row `i` of `y` its target.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    x: Array2<f32>,
    y: Array2<f32>,
}

impl Dataset {
    /// Creates a new `Dataset` from a flat row-major buffer.
    ///
    /// # Arguments
    /// * `data` - The samples, each row holds `x_size` inputs followed by `y_size` targets.
    /// * `x_size` - The amount of inputs per sample.
    /// * `y_size` - The amount of targets per sample.
    ///
    /// # Returns
    /// A new `Dataset` or an error if the buffer can't be split in whole rows.
    pub fn new(data: Vec<f32>, x_size: usize, y_size: usize) -> Result<Self> {
        if x_size == 0 || y_size == 0 {
            return Err(MlErr::InvalidInput("x_size and y_size must be greater than 0"));
        }

        let row_size = x_size + y_size;
        if data.len() % row_size != 0 {
            return Err(MlErr::SizeMismatch {
                what: "dataset values",
                got: data.len(),
                expected: data.len() - data.len() % row_size,
            });
        }

        let rows = data.len() / row_size;
        let full = Array2::from_shape_vec((rows, row_size), data)?;
        let x = full.slice(s![.., ..x_size]).to_owned();
        let y = full.slice(s![.., x_size..]).to_owned();

        Ok(Self { x, y })
    }

    /// Creates a new `Dataset` from already split inputs and targets.
    ///
    /// # Arguments
    /// * `x` - The inputs, one sample per row.
    /// * `y` - The targets, one sample per row.
    ///
    /// # Returns
    /// A new `Dataset` or an error if the amount of rows differ.
    pub fn from_arrays(x: Array2<f32>, y: Array2<f32>) -> Result<Self> {
        if x.nrows() != y.nrows() {
            return Err(MlErr::SizeMismatch {
                what: "target rows",
                got: y.nrows(),
                expected: x.nrows(),
            });
        }

        Ok(Self { x, y })
    }

    /// Loads a `Dataset` from a csv file with no header.
    ///
    /// # Arguments
    /// * `path` - The path to the csv file.
    /// * `x_size` - The amount of inputs per line.
    /// * `y_size` - The amount of targets per line.
    ///
    /// # Returns
    /// The loaded dataset or an error if the file can't be read or parsed.
    pub fn from_csv<P: AsRef<Path>>(path: P, x_size: usize, y_size: usize) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let row_size = x_size + y_size;
        let mut data = Vec::new();

        for (i, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let mut values = 0;
            for value in line.split(',') {
                let value = value.trim();
                let parsed = value.parse::<f32>().map_err(|_| MlErr::Parse {
                    line: i + 1,
                    value: value.to_string(),
                })?;

                data.push(parsed);
                values += 1;
            }

            if values != row_size {
                return Err(MlErr::SizeMismatch {
                    what: "csv line values",
                    got: values,
                    expected: row_size,
                });
            }
        }

        Self::new(data, x_size, y_size)
    }

    /// Returns the amount of samples.
    pub fn len(&self) -> usize {
        self.x.nrows()
    }

    /// Returns `true` if there are no samples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the amount of inputs per sample.
    pub fn x_size(&self) -> usize {
        self.x.ncols()
    }

    /// Returns the amount of targets per sample.
    pub fn y_size(&self) -> usize {
        self.y.ncols()
    }

    pub fn x(&self) -> ArrayView2<'_, f32> {
        self.x.view()
    }

    pub fn y(&self) -> ArrayView2<'_, f32> {
        self.y.view()
    }

    /// Builds a new dataset with the samples at `indices`, in that order.
    ///
    /// # Arguments
    /// * `indices` - The rows to take, may contain repeated values.
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            x: self.x.select(Axis(0), indices),
            y: self.y.select(Axis(0), indices),
        }
    }

    /// Shuffles the samples in place.
    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let mut indices: Vec<_> = (0..self.len()).collect();
        indices.shuffle(rng);
        *self = self.select(&indices);
    }

    /// Splits the dataset in two at the given row.
    ///
    /// # Returns
    /// The samples in `[0, at)` and the ones in `[at, len)`.
    pub fn split(self, at: usize) -> (Self, Self) {
        let at = at.min(self.len());
        let (x_head, x_tail) = self.x.view().split_at(Axis(0), at);
        let (y_head, y_tail) = self.y.view().split_at(Axis(0), at);

        let head = Self {
            x: x_head.to_owned(),
            y: y_head.to_owned(),
        };

        let tail = Self {
            x: x_tail.to_owned(),
            y: y_tail.to_owned(),
        };

        (head, tail)
    }

    /// Iterates the samples in consecutive batches, the last one may be smaller.
    ///
    /// # Arguments
    /// * `batch_size` - The maximum amount of rows per batch.
    pub fn batches(
        &self,
        batch_size: NonZeroUsize,
    ) -> impl Iterator<Item = (ArrayView2<'_, f32>, ArrayView2<'_, f32>)> {
        let len = self.len();
        let batch_size = batch_size.get();

        (0..len).step_by(batch_size).map(move |start| {
            let end = (start + batch_size).min(len);
            let x = self.x.slice(s![start..end, ..]);
            let y = self.y.slice(s![start..end, ..]);
            (x, y)
        })
    }
}
