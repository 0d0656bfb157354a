// layermap_core/src/perception/mask_cleaner.rs

//! Removal of small speckles from binary masks.

use crate::error::MapperResult;
use crate::image::MonoImage;
use crate::scratch::ScratchImage;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

pub const DEFAULT_CONNECTED_MASK_COMPONENT_SIZE_THRESHOLD: usize = 2000;

/// Which neighbours join two mask pixels into one component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    Four,
    #[default]
    Eight,
}

impl Connectivity {
    fn offsets(self) -> &'static [(isize, isize)] {
        const FOUR: [(isize, isize); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];
        const EIGHT: [(isize, isize); 8] = [
            (-1, -1),
            (-1, 0),
            (-1, 1),
            (0, -1),
            (0, 1),
            (1, -1),
            (1, 0),
            (1, 1),
        ];
        match self {
            Connectivity::Four => &FOUR,
            Connectivity::Eight => &EIGHT,
        }
    }
}

impl fmt::Display for Connectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Connectivity::Four => write!(f, "4"),
            Connectivity::Eight => write!(f, "8"),
        }
    }
}

/// Copies `mask` into `out` with every connected component of nonzero pixels
/// smaller than `min_component_size` zeroed. Returns the number of components
/// removed.
fn clean_mask_onto(
    mask: &MonoImage,
    min_component_size: usize,
    connectivity: Connectivity,
    out: &mut MonoImage,
) -> usize {
    let (rows, cols) = mask.dims();
    out.data_mut().copy_from_slice(mask.data());

    let mut visited = vec![false; rows * cols];
    let mut queue = VecDeque::new();
    let mut component = Vec::new();
    let mut num_removed = 0;

    for start in 0..rows * cols {
        if visited[start] || mask.data()[start] == 0 {
            continue;
        }
        visited[start] = true;
        queue.push_back(start);
        component.clear();

        while let Some(i) = queue.pop_front() {
            component.push(i);
            let (row, col) = ((i / cols) as isize, (i % cols) as isize);
            for &(dr, dc) in connectivity.offsets() {
                let (r, c) = (row + dr, col + dc);
                if r < 0 || c < 0 || r >= rows as isize || c >= cols as isize {
                    continue;
                }
                let j = r as usize * cols + c as usize;
                if !visited[j] && mask.data()[j] != 0 {
                    visited[j] = true;
                    queue.push_back(j);
                }
            }
        }

        if component.len() < min_component_size {
            for &i in &component {
                out.data_mut()[i] = 0;
            }
            num_removed += 1;
        }
    }
    num_removed
}

/// Returns `mask` with connected components smaller than `min_component_size`
/// zeroed. Kept pixels keep their value.
pub fn clean_mask(mask: &MonoImage, min_component_size: usize, connectivity: Connectivity) -> MonoImage {
    let mut out = MonoImage::filled(mask.rows(), mask.cols(), 0);
    clean_mask_onto(mask, min_component_size, connectivity, &mut out);
    out
}

/// As [`clean_mask`], writing into a reusable buffer. Returns the number of removed
/// components.
pub fn clean_mask_into(
    mask: &MonoImage,
    min_component_size: usize,
    connectivity: Connectivity,
    out: &mut ScratchImage<u8>,
) -> MapperResult<usize> {
    let buffer = out.ensure_size(mask.rows(), mask.cols())?;
    Ok(clean_mask_onto(mask, min_component_size, connectivity, buffer))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two diagonal pixels, a 3x3 square with value 7 and a lone pixel.
    fn sample_mask() -> MonoImage {
        let mut mask = MonoImage::filled(10, 10, 0);
        mask[(0, 0)] = 255;
        mask[(1, 1)] = 255;
        for r in 4..7 {
            for c in 4..7 {
                mask[(r, c)] = 7;
            }
        }
        mask[(9, 0)] = 255;
        mask
    }

    fn component_sizes(mask: &MonoImage, connectivity: Connectivity) -> Vec<usize> {
        let (rows, cols) = mask.dims();
        let mut seen = vec![false; rows * cols];
        let mut sizes = Vec::new();
        for start in 0..rows * cols {
            if seen[start] || mask.data()[start] == 0 {
                continue;
            }
            let mut stack = vec![start];
            seen[start] = true;
            let mut size = 0;
            while let Some(i) = stack.pop() {
                size += 1;
                let (r, c) = ((i / cols) as isize, (i % cols) as isize);
                for &(dr, dc) in connectivity.offsets() {
                    let (nr, nc) = (r + dr, c + dc);
                    if nr < 0 || nc < 0 || nr >= rows as isize || nc >= cols as isize {
                        continue;
                    }
                    let j = nr as usize * cols + nc as usize;
                    if !seen[j] && mask.data()[j] != 0 {
                        seen[j] = true;
                        stack.push(j);
                    }
                }
            }
            sizes.push(size);
        }
        sizes
    }

    #[test]
    fn test_small_components_are_removed() {
        let mask = sample_mask();
        let cleaned = clean_mask(&mask, 3, Connectivity::Eight);
        assert!(component_sizes(&cleaned, Connectivity::Eight)
            .iter()
            .all(|&s| s >= 3));
        assert_eq!(cleaned[(0, 0)], 0);
        assert_eq!(cleaned[(9, 0)], 0);
        assert_eq!(cleaned[(5, 5)], 7);
    }

    #[test]
    fn test_connectivity_changes_component_membership() {
        let mask = sample_mask();
        // Diagonal pair is one component of 2 under 8-connectivity...
        let eight = clean_mask(&mask, 2, Connectivity::Eight);
        assert_eq!(eight[(0, 0)], 255);
        // ...but two singletons under 4-connectivity.
        let four = clean_mask(&mask, 2, Connectivity::Four);
        assert_eq!(four[(0, 0)], 0);
        assert_eq!(four[(1, 1)], 0);
    }

    #[test]
    fn test_never_sets_zero_pixels() {
        let mask = sample_mask();
        for threshold in [0, 1, 2, 5, 9, 10, 100] {
            let cleaned = clean_mask(&mask, threshold, Connectivity::Eight);
            for (r, c, v) in cleaned.iter_pixels() {
                assert!(v == 0 || v == mask[(r, c)]);
            }
        }
    }

    #[test]
    fn test_default_threshold_removes_everything_small() {
        let cleaned = clean_mask(
            &sample_mask(),
            DEFAULT_CONNECTED_MASK_COMPONENT_SIZE_THRESHOLD,
            Connectivity::default(),
        );
        assert!(cleaned.data().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_into_reports_removed_components() {
        let mut buffer = ScratchImage::new("cleaned");
        let removed = clean_mask_into(&sample_mask(), 3, Connectivity::Eight, &mut buffer).unwrap();
        assert_eq!(removed, 2);
        assert_eq!(buffer.get().unwrap()[(5, 5)], 7);
    }
}
