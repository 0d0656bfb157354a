// layermap_core/src/image.rs

use crate::error::{MapperError, MapperResult};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::ops::{Index, IndexMut};

// =========================================================================
// == Pixel Types ==
// =========================================================================

/// An 8-bit RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const GRAY: Color = Color::rgb(127, 127, 127);
    pub const RED: Color = Color::rgb(255, 0, 0);
    pub const GREEN: Color = Color::rgb(0, 255, 0);
    pub const TRANSPARENT: Color = Color {
        r: 0,
        g: 0,
        b: 0,
        a: 0,
    };

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Linear blend, `alpha = 0` returns `self`, `alpha = 1` returns `other`.
    pub fn blend(self, other: Color, alpha: f32) -> Color {
        let alpha = alpha.clamp(0.0, 1.0);
        let mix = |a: u8, b: u8| -> u8 {
            (a as f32 * (1.0 - alpha) + b as f32 * alpha).round() as u8
        };
        Color {
            r: mix(self.r, other.r),
            g: mix(self.g, other.g),
            b: mix(self.b, other.b),
            a: mix(self.a, other.a),
        }
    }
}

/// A value that can be stored in an [`Image`].
///
/// `MASKED_OUT` is written into the half of a split that does not receive a pixel.
pub trait Pixel: Copy + Debug + PartialEq + Send + Sync + 'static {
    const MASKED_OUT: Self;
}

impl Pixel for f32 {
    /// Negative depth is never integrated.
    const MASKED_OUT: Self = -1.0;
}

impl Pixel for u8 {
    const MASKED_OUT: Self = 0;
}

impl Pixel for Color {
    const MASKED_OUT: Self = Color::TRANSPARENT;
}

// =========================================================================
// == Image ==
// =========================================================================

/// A dense, row-major 2D image.
#[derive(Debug, Clone, PartialEq)]
pub struct Image<T> {
    rows: usize,
    cols: usize,
    data: Vec<T>,
}

/// Depth in meters. Values `<= 0` or non-finite are invalid measurements.
pub type DepthImage = Image<f32>;
pub type ColorImage = Image<Color>;
/// Single channel mask, `0` = unmasked, `> 0` = masked.
pub type MonoImage = Image<u8>;

impl<T: Pixel> Image<T> {
    /// Creates an image with every pixel set to `fill`.
    pub fn filled(rows: usize, cols: usize, fill: T) -> Self {
        Self {
            rows,
            cols,
            data: vec![fill; rows * cols],
        }
    }

    /// Wraps an existing row-major buffer.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<T>) -> MapperResult<Self> {
        if data.len() != rows * cols {
            return Err(MapperError::dimension_mismatch(
                "Image::from_vec",
                (rows, cols),
                (data.len() / cols.max(1), cols),
            ));
        }
        Ok(Self { rows, cols, data })
    }

    /// Builds an image by evaluating `f(row, col)` for every pixel.
    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let mut data = Vec::with_capacity(rows * cols);
        for row in 0..rows {
            for col in 0..cols {
                data.push(f(row, col));
            }
        }
        Self { rows, cols, data }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// `(rows, cols)`
    pub fn dims(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn num_pixels(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, row: usize, col: usize) -> Option<T> {
        if row < self.rows && col < self.cols {
            Some(self.data[row * self.cols + col])
        } else {
            None
        }
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn fill(&mut self, value: T) {
        self.data.iter_mut().for_each(|p| *p = value);
    }

    /// Iterates `(row, col, value)` in row-major order.
    pub fn iter_pixels(&self) -> impl Iterator<Item = (usize, usize, T)> + '_ {
        let cols = self.cols.max(1);
        self.data
            .iter()
            .enumerate()
            .map(move |(i, v)| (i / cols, i % cols, *v))
    }

    /// Errors unless `other` has the same `(rows, cols)`.
    pub fn check_same_dims<U>(&self, other: &Image<U>, context: &'static str) -> MapperResult<()> {
        if self.rows != other.rows || self.cols != other.cols {
            return Err(MapperError::dimension_mismatch(
                context,
                (self.rows, self.cols),
                (other.rows, other.cols),
            ));
        }
        Ok(())
    }
}

impl<T> Index<(usize, usize)> for Image<T> {
    type Output = T;

    fn index(&self, (row, col): (usize, usize)) -> &T {
        &self.data[row * self.cols + col]
    }
}

impl<T> IndexMut<(usize, usize)> for Image<T> {
    fn index_mut(&mut self, (row, col): (usize, usize)) -> &mut T {
        &mut self.data[row * self.cols + col]
    }
}

/// Valid depth measurements are finite and strictly positive.
pub fn is_valid_depth(depth: f32) -> bool {
    depth.is_finite() && depth > 0.0
}
