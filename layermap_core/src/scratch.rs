// layermap_core/src/scratch.rs

use crate::error::{MapperError, MapperResult};
use crate::image::{Image, Pixel};
use tracing::trace;

/// A reusable image buffer that is sized on first use.
///
/// The first `ensure_size` allocates; later calls with the same dimensions hand the
/// same buffer back without touching the allocator. A request for different
/// dimensions is refused with `DimensionMismatch`, since every consumer of these
/// buffers is tied to one camera stream. Call [`ScratchImage::reset`] to release the
/// buffer and allow a new size.
#[derive(Debug, Clone)]
pub struct ScratchImage<T> {
    name: &'static str,
    image: Option<Image<T>>,
}

impl<T: Pixel> ScratchImage<T> {
    pub const fn new(name: &'static str) -> Self {
        Self { name, image: None }
    }

    /// Returns the buffer, allocating it on the first call. The contents are left
    /// as written by the previous frame; writers overwrite every pixel.
    pub fn ensure_size(&mut self, rows: usize, cols: usize) -> MapperResult<&mut Image<T>> {
        self.check_size(rows, cols)?;
        let name = self.name;
        Ok(self.image.get_or_insert_with(|| {
            trace!(buffer = name, rows, cols, "allocating scratch image");
            Image::filled(rows, cols, T::MASKED_OUT)
        }))
    }

    /// Errors if the buffer exists with other dimensions; does not allocate.
    pub fn check_size(&self, rows: usize, cols: usize) -> MapperResult<()> {
        match &self.image {
            Some(image) if image.dims() != (rows, cols) => Err(MapperError::dimension_mismatch(
                self.name,
                image.dims(),
                (rows, cols),
            )),
            _ => Ok(()),
        }
    }

    /// The last written contents, `None` until the first `ensure_size`.
    pub fn get(&self) -> Option<&Image<T>> {
        self.image.as_ref()
    }

    pub fn is_allocated(&self) -> bool {
        self.image.is_some()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Drops the buffer so the next `ensure_size` may choose new dimensions.
    pub fn reset(&mut self) {
        self.image = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_call_allocates_with_sentinel() {
        let mut scratch = ScratchImage::<f32>::new("depth");
        assert!(scratch.get().is_none());
        assert!(!scratch.is_allocated());
        let image = scratch.ensure_size(3, 4).unwrap();
        assert_eq!(image.dims(), (3, 4));
        assert!(image.data().iter().all(|&d| d == -1.0));
        assert!(scratch.is_allocated());
    }

    #[test]
    fn test_same_size_is_idempotent() {
        let mut scratch = ScratchImage::<u8>::new("mask");
        scratch.ensure_size(2, 2).unwrap()[(1, 1)] = 7;
        let image = scratch.ensure_size(2, 2).unwrap();
        assert_eq!(image[(1, 1)], 7);
    }

    #[test]
    fn test_size_change_is_rejected_until_reset() {
        let mut scratch = ScratchImage::<u8>::new("mask");
        scratch.ensure_size(2, 2).unwrap();
        assert!(matches!(
            scratch.ensure_size(3, 2),
            Err(MapperError::DimensionMismatch {
                expected: (2, 2),
                actual: (3, 2),
                ..
            })
        ));
        assert!(scratch.check_size(3, 2).is_err());
        scratch.reset();
        assert!(!scratch.is_allocated());
        assert_eq!(scratch.ensure_size(3, 2).unwrap().dims(), (3, 2));
    }
}
