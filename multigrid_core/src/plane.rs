use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A dense 2D array addressed by `(x, y)`.
///
/// Used for per-cell side data: visibility and highlight masks, and the
/// integer encoding of a grid. Cells are stored x-major, so the flat layout
/// matches the `(width, height, ...)` tensor order of the wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plane<T> {
    width: usize,
    height: usize,
    cells: Vec<T>,
}

/// Integer encoding of a grid: `(type_index, color_index, aux)` per cell.
pub type GridEncoding = Plane<[i32; 3]>;

/// Per-cell boolean mask.
pub type Mask = Plane<bool>;

impl<T> Plane<T> {
    /// Creates a plane filled with `value`.
    pub fn filled(width: usize, height: usize, value: T) -> Self
    where
        T: Clone,
    {
        Plane {
            width,
            height,
            cells: vec![value; width * height],
        }
    }

    /// Creates a plane whose cells are produced by `f(x, y)`.
    pub fn from_generator<F>(width: usize, height: usize, mut f: F) -> Self
    where
        F: FnMut(usize, usize) -> T,
    {
        let mut cells = Vec::with_capacity(width * height);
        for x in 0..width {
            for y in 0..height {
                cells.push(f(x, y));
            }
        }
        Plane {
            width,
            height,
            cells,
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Converts (x, y) coordinates to a flat index, or `None` if out of bounds.
    #[inline]
    pub fn coords_to_index(&self, x: usize, y: usize) -> Option<usize> {
        self.is_valid(x, y).then_some(x * self.height + y)
    }

    #[inline]
    pub fn index_to_coords(&self, index: usize) -> Option<(usize, usize)> {
        (index < self.cells.len()).then(|| (index / self.height, index % self.height))
    }

    #[inline]
    pub fn is_valid(&self, x: usize, y: usize) -> bool {
        x < self.width && y < self.height
    }

    pub fn get(&self, x: usize, y: usize) -> Option<&T> {
        self.cells.get(self.coords_to_index(x, y)?)
    }

    pub fn get_mut(&mut self, x: usize, y: usize) -> Option<&mut T> {
        let index = self.coords_to_index(x, y)?;
        self.cells.get_mut(index)
    }

    /// Sets the value of the cell at the given coordinates.
    pub fn set(&mut self, x: usize, y: usize, value: T) -> Result<()> {
        let index = self.coords_to_index(x, y).ok_or(Error::OutOfBounds {
            x: x as i64,
            y: y as i64,
            width: self.width,
            height: self.height,
        })?;
        self.cells[index] = value;
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.cells.iter()
    }

    /// Returns an iterator that yields `((x, y), &T)` for each cell.
    pub fn enumerate(&self) -> impl Iterator<Item = ((usize, usize), &T)> {
        let height = self.height;
        self.cells
            .iter()
            .enumerate()
            .map(move |(index, cell)| ((index / height, index % height), cell))
    }

    pub fn as_slice(&self) -> &[T] {
        &self.cells
    }
}

impl GridEncoding {
    /// Flattens to the `(width, height, 3)` integer tensor.
    pub fn to_tensor(&self) -> Vec<i32> {
        self.cells.iter().flatten().copied().collect()
    }

    /// Parses a flat `(width, height, 3)` integer tensor.
    pub fn from_tensor(width: usize, height: usize, tensor: &[i32]) -> Result<Self> {
        let expected = width * height * 3;
        if tensor.len() != expected {
            return Err(Error::shape(expected, tensor.len()));
        }
        let cells = tensor
            .chunks_exact(3)
            .map(|c| [c[0], c[1], c[2]])
            .collect();
        Ok(Plane {
            width,
            height,
            cells,
        })
    }
}

impl<T> Index<(usize, usize)> for Plane<T> {
    type Output = T;

    #[inline]
    fn index(&self, (x, y): (usize, usize)) -> &Self::Output {
        match self.coords_to_index(x, y) {
            Some(idx) => &self.cells[idx],
            None => panic!(
                "Plane index ({}, {}) out of bounds for size ({}, {})",
                x, y, self.width, self.height
            ),
        }
    }
}

impl<T> IndexMut<(usize, usize)> for Plane<T> {
    #[inline]
    fn index_mut(&mut self, (x, y): (usize, usize)) -> &mut Self::Output {
        let (width, height) = (self.width, self.height);
        match self.coords_to_index(x, y) {
            Some(idx) => &mut self.cells[idx],
            None => panic!(
                "Plane index ({}, {}) out of bounds for size ({}, {})",
                x, y, width, height
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_x_major() {
        let plane = Plane::from_generator(3, 2, |x, y| (x, y));
        assert_eq!(plane.as_slice()[1], (0, 1));
        assert_eq!(plane.as_slice()[2], (1, 0));
        assert_eq!(plane[(2, 1)], (2, 1));
        assert_eq!(plane.index_to_coords(5), Some((2, 1)));
        assert_eq!(plane.get(3, 0), None);
    }

    #[test]
    fn set_out_of_bounds_fails() {
        let mut mask = Mask::filled(3, 3, false);
        assert!(matches!(
            mask.set(3, 1, true),
            Err(Error::OutOfBounds { x: 3, y: 1, .. })
        ));
        mask.set(2, 1, true).unwrap();
        assert!(mask[(2, 1)]);
    }

    #[test]
    fn tensor_length_is_checked() {
        let err = GridEncoding::from_tensor(3, 3, &[0; 26]).unwrap_err();
        assert_eq!(err, Error::ShapeMismatch { expected: 27, actual: 26 });

        let enc = GridEncoding::from_tensor(3, 3, &(0..27).collect::<Vec<_>>()).unwrap();
        assert_eq!(enc[(0, 1)], [3, 4, 5]);
        assert_eq!(enc.to_tensor().len(), 27);
    }
}
