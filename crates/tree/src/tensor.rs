//! # Tensors
//!
//! A dense row-major `f32` matrix. Rows are batch items, columns are the
//! per-operand coefficients of one tree layer.
//!
//! Binary elementwise operations broadcast: a dimension of size 1 stretches
//! to match the other operand, so `[r, c]` combines with `[r, 1]`, `[1, c]`
//! and `[1, 1]`.
//!
//! The `learnable` flag marks coefficients an external optimizer may update.
//! Nothing in this crate reads it; builders set it and collaborators
//! enumerate it.

use serde::{Deserialize, Serialize};

use crate::error::TreeError;

/// A two-dimensional runtime tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    rows: usize,
    cols: usize,
    /// Flattened data in row-major order
    data: Vec<f32>,
    #[serde(default)]
    learnable: bool,
}

impl Tensor {
    /// Create a tensor filled with zeros.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self::full(rows, cols, 0.0)
    }

    /// Create a tensor filled with ones.
    pub fn ones(rows: usize, cols: usize) -> Self {
        Self::full(rows, cols, 1.0)
    }

    /// Create a tensor filled with a constant value.
    pub fn full(rows: usize, cols: usize, value: f32) -> Self {
        Self {
            rows,
            cols,
            data: vec![value; rows * cols],
            learnable: false,
        }
    }

    /// Create a `[1, 1]` tensor.
    pub fn scalar(value: f32) -> Self {
        Self::full(1, 1, value)
    }

    /// Create a tensor from row-major data.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self, TreeError> {
        if data.len() != rows * cols {
            return Err(TreeError::InvalidData {
                reason: format!(
                    "{} values do not fill a [{}, {}] tensor",
                    data.len(),
                    rows,
                    cols
                ),
            });
        }
        Ok(Self {
            rows,
            cols,
            data,
            learnable: false,
        })
    }

    /// Create a tensor from a list of rows.
    pub fn from_rows(rows: &[Vec<f32>]) -> Result<Self, TreeError> {
        let cols = rows.first().map(Vec::len).unwrap_or(0);
        if rows.iter().any(|r| r.len() != cols) {
            return Err(TreeError::InvalidData {
                reason: "ragged rows".to_string(),
            });
        }
        let data = rows.iter().flatten().copied().collect();
        Self::from_vec(rows.len(), cols, data)
    }

    /// Create a `[n, 1]` column.
    pub fn column(values: Vec<f32>) -> Self {
        Self {
            rows: values.len(),
            cols: 1,
            data: values,
            learnable: false,
        }
    }

    /// Create a `[1, n]` row.
    pub fn row(values: Vec<f32>) -> Self {
        Self {
            rows: 1,
            cols: values.len(),
            data: values,
            learnable: false,
        }
    }

    /// Create a tensor with values from N(0, scale²), reproducible per seed.
    pub fn randn_seeded(rows: usize, cols: usize, scale: f32, seed: u64) -> Self {
        let size = rows * cols;
        let mut data = Vec::with_capacity(size);

        let mut state = seed;
        for _ in 0..size {
            // Box-Muller over a 64-bit LCG
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
            let u1 = (state as f32) / (u64::MAX as f32);
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
            let u2 = (state as f32) / (u64::MAX as f32);

            let u1 = u1.max(1e-10);
            let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f32::consts::PI * u2).cos();
            data.push(z * scale);
        }

        Self {
            rows,
            cols,
            data,
            learnable: false,
        }
    }

    /// Stack `[rows, 1]` columns side by side.
    ///
    /// `rows` fixes the row count when `columns` is empty.
    pub fn from_columns(rows: usize, columns: &[Tensor]) -> Result<Self, TreeError> {
        let mut data = vec![0.0; rows * columns.len()];
        for (j, column) in columns.iter().enumerate() {
            if column.cols != 1 || column.rows != rows {
                return Err(TreeError::ShapeMismatch {
                    op: "from_columns",
                    left: (rows, 1),
                    right: column.shape(),
                });
            }
            for i in 0..rows {
                data[i * columns.len() + j] = column.data[i];
            }
        }
        Self::from_vec(rows, columns.len(), data)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Element at `(row, col)`, if in range.
    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        if row < self.rows && col < self.cols {
            Some(self.data[row * self.cols + col])
        } else {
            None
        }
    }

    /// Values of one row.
    pub fn row_values(&self, row: usize) -> &[f32] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    /// Whether an optimizer may update this tensor.
    pub fn learnable(&self) -> bool {
        self.learnable
    }

    /// Mark (or unmark) the tensor as a learnable parameter.
    pub fn with_learnable(mut self, learnable: bool) -> Self {
        self.learnable = learnable;
        self
    }

    /// Column `col` as a `[rows, 1]` tensor.
    pub fn col(&self, col: usize) -> Result<Tensor, TreeError> {
        if col >= self.cols {
            return Err(TreeError::WidthMismatch {
                expected: col + 1,
                got: self.cols,
            });
        }
        let values = (0..self.rows)
            .map(|i| self.data[i * self.cols + col])
            .collect();
        Ok(Tensor::column(values))
    }

    fn broadcast_dim(
        op: &'static str,
        left: (usize, usize),
        right: (usize, usize),
        a: usize,
        b: usize,
    ) -> Result<usize, TreeError> {
        if a == b || b == 1 {
            Ok(a)
        } else if a == 1 {
            Ok(b)
        } else {
            Err(TreeError::ShapeMismatch { op, left, right })
        }
    }

    /// Apply a binary function elementwise with broadcasting.
    pub fn zip_with(
        &self,
        other: &Tensor,
        op: &'static str,
        f: impl Fn(f32, f32) -> f32,
    ) -> Result<Tensor, TreeError> {
        let (l, r) = (self.shape(), other.shape());
        let rows = Self::broadcast_dim(op, l, r, self.rows, other.rows)?;
        let cols = Self::broadcast_dim(op, l, r, self.cols, other.cols)?;

        let mut data = Vec::with_capacity(rows * cols);
        for i in 0..rows {
            let si = if self.rows == 1 { 0 } else { i };
            let oi = if other.rows == 1 { 0 } else { i };
            for j in 0..cols {
                let sj = if self.cols == 1 { 0 } else { j };
                let oj = if other.cols == 1 { 0 } else { j };
                data.push(f(
                    self.data[si * self.cols + sj],
                    other.data[oi * other.cols + oj],
                ));
            }
        }
        Ok(Tensor {
            rows,
            cols,
            data,
            learnable: false,
        })
    }

    /// Element-wise addition.
    pub fn add(&self, other: &Tensor) -> Result<Tensor, TreeError> {
        self.zip_with(other, "add", |a, b| a + b)
    }

    /// Element-wise multiplication.
    pub fn mul(&self, other: &Tensor) -> Result<Tensor, TreeError> {
        self.zip_with(other, "mul", |a, b| a * b)
    }

    /// Element-wise subtraction.
    pub fn sub(&self, other: &Tensor) -> Result<Tensor, TreeError> {
        self.zip_with(other, "sub", |a, b| a - b)
    }

    /// Scalar multiplication.
    pub fn scale(&self, scalar: f32) -> Tensor {
        self.map(|x| x * scalar)
    }

    /// Apply a function to each element.
    pub fn map(&self, f: impl Fn(f32) -> f32) -> Tensor {
        Tensor {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(|&x| f(x)).collect(),
            learnable: self.learnable,
        }
    }

    /// Matrix multiplication.
    pub fn matmul(&self, other: &Tensor) -> Result<Tensor, TreeError> {
        if self.cols != other.rows {
            return Err(TreeError::ShapeMismatch {
                op: "matmul",
                left: self.shape(),
                right: other.shape(),
            });
        }
        let (m, k, n) = (self.rows, self.cols, other.cols);

        let mut result = vec![0.0; m * n];
        for i in 0..m {
            for j in 0..n {
                let mut sum = 0.0;
                for kk in 0..k {
                    sum += self.data[i * k + kk] * other.data[kk * n + j];
                }
                result[i * n + j] = sum;
            }
        }
        Tensor::from_vec(m, n, result)
    }

    /// Row sums as `[rows, 1]`.
    pub fn sum_cols(&self) -> Tensor {
        Tensor::column(
            (0..self.rows)
                .map(|i| self.row_values(i).iter().sum())
                .collect(),
        )
    }

    /// Row products as `[rows, 1]`; an empty row has product 1.
    pub fn prod_cols(&self) -> Tensor {
        Tensor::column(
            (0..self.rows)
                .map(|i| self.row_values(i).iter().product())
                .collect(),
        )
    }

    /// Keep the rows where `mask` is true.
    pub fn select_rows(&self, mask: &[bool]) -> Result<Tensor, TreeError> {
        if mask.len() != self.rows {
            return Err(TreeError::RowMismatch {
                expected: self.rows,
                got: mask.len(),
            });
        }
        let mut data = Vec::new();
        let mut rows = 0;
        for (i, &keep) in mask.iter().enumerate() {
            if keep {
                data.extend_from_slice(self.row_values(i));
                rows += 1;
            }
        }
        Ok(Tensor {
            rows,
            cols: self.cols,
            data,
            learnable: self.learnable,
        })
    }

    /// Scatter rows back to the positions where `mask` is true, filling the
    /// others with zeros. Inverse of [`select_rows`](Self::select_rows).
    pub fn expand_rows(&self, mask: &[bool]) -> Result<Tensor, TreeError> {
        let selected = mask.iter().filter(|&&m| m).count();
        if selected != self.rows {
            return Err(TreeError::RowMismatch {
                expected: self.rows,
                got: selected,
            });
        }
        let mut data = vec![0.0; mask.len() * self.cols];
        let mut source = 0;
        for (i, &keep) in mask.iter().enumerate() {
            if keep {
                data[i * self.cols..(i + 1) * self.cols]
                    .copy_from_slice(self.row_values(source));
                source += 1;
            }
        }
        Tensor::from_vec(mask.len(), self.cols, data)
    }

    /// Concatenate along the row dimension.
    pub fn concat_rows(tensors: &[&Tensor]) -> Result<Tensor, TreeError> {
        let Some(first) = tensors.first() else {
            return Ok(Tensor::zeros(0, 0));
        };
        let cols = first.cols;
        let mut data = Vec::new();
        let mut rows = 0;
        for t in tensors {
            if t.cols != cols {
                return Err(TreeError::ShapeMismatch {
                    op: "concat_rows",
                    left: first.shape(),
                    right: t.shape(),
                });
            }
            data.extend_from_slice(&t.data);
            rows += t.rows;
        }
        Tensor::from_vec(rows, cols, data)
    }

    /// Concatenate along the column dimension.
    pub fn concat_cols(rows: usize, tensors: &[Tensor]) -> Result<Tensor, TreeError> {
        let cols: usize = tensors.iter().map(|t| t.cols).sum();
        let mut data = Vec::with_capacity(rows * cols);
        for t in tensors {
            if t.rows != rows {
                return Err(TreeError::ShapeMismatch {
                    op: "concat_cols",
                    left: (rows, cols),
                    right: t.shape(),
                });
            }
        }
        for i in 0..rows {
            for t in tensors {
                data.extend_from_slice(t.row_values(i));
            }
        }
        Tensor::from_vec(rows, cols, data)
    }

    /// Softmax over each row.
    pub fn softmax_rows(&self) -> Tensor {
        let mut data = Vec::with_capacity(self.data.len());
        for i in 0..self.rows {
            let row = self.row_values(i);
            let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let exps: Vec<f32> = row.iter().map(|&x| (x - max).exp()).collect();
            let total: f32 = exps.iter().sum();
            data.extend(exps.into_iter().map(|e| e / total));
        }
        Tensor {
            rows: self.rows,
            cols: self.cols,
            data,
            learnable: self.learnable,
        }
    }

    /// Logistic sigmoid of every element.
    pub fn sigmoid(&self) -> Tensor {
        self.map(|x| 1.0 / (1.0 + (-x).exp()))
    }

    /// Index of the largest value in each row (first on ties).
    pub fn argmax_rows(&self) -> Vec<usize> {
        (0..self.rows)
            .map(|i| {
                let row = self.row_values(i);
                let mut best = 0;
                for (j, &x) in row.iter().enumerate() {
                    if x > row[best] {
                        best = j;
                    }
                }
                best
            })
            .collect()
    }

    /// One-hot encoding of [`argmax_rows`](Self::argmax_rows).
    pub fn one_hot_argmax(&self) -> Tensor {
        let mut out = Tensor::zeros(self.rows, self.cols);
        if self.cols > 0 {
            for (i, j) in self.argmax_rows().into_iter().enumerate() {
                out.data[i * self.cols + j] = 1.0;
            }
        }
        out
    }

    /// True when `pred` holds for every element.
    pub fn all(&self, pred: impl Fn(f32) -> bool) -> bool {
        self.data.iter().all(|&x| pred(x))
    }

    /// True when `pred` holds for some element.
    pub fn any(&self, pred: impl Fn(f32) -> bool) -> bool {
        self.data.iter().any(|&x| pred(x))
    }

    /// Per-row flag for a `[rows, 1]` column.
    pub fn row_mask(&self, pred: impl Fn(f32) -> bool) -> Vec<bool> {
        (0..self.rows).map(|i| pred(self.data[i * self.cols])).collect()
    }

    /// Same shape and every element within `tol`.
    pub fn approx_eq(&self, other: &Tensor, tol: f32) -> bool {
        self.shape() == other.shape()
            && self
                .data
                .iter()
                .zip(other.data.iter())
                .all(|(a, b)| (a - b).abs() <= tol)
    }
}
