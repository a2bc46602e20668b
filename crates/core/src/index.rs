use crate::IndexError;

/// Brute-force nearest-neighbour index over squared euclidean distance.
///
/// Vectors are stored row-major in one contiguous buffer; the position a
/// vector was added at is the id returned by [`FlatL2Index::search`].
#[derive(Debug, Clone, PartialEq)]
pub struct FlatL2Index {
    dimensions: usize,
    data: Vec<f32>,
}

impl FlatL2Index {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            data: Vec::new(),
        }
    }

    pub fn from_flat(dimensions: usize, data: Vec<f32>) -> Result<Self, IndexError> {
        if dimensions == 0 || data.len() % dimensions != 0 {
            return Err(IndexError::MisalignedArtifact(format!(
                "{} floats do not divide into rows of {dimensions}",
                data.len()
            )));
        }
        Ok(Self { dimensions, data })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        if self.dimensions == 0 {
            0
        } else {
            self.data.len() / self.dimensions
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_flat(&self) -> &[f32] {
        &self.data
    }

    pub fn add(&mut self, vector: &[f32]) -> Result<usize, IndexError> {
        if self.dimensions == 0 {
            return Err(IndexError::ZeroDimensions);
        }
        if vector.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }
        self.data.extend_from_slice(vector);
        Ok(self.len() - 1)
    }

    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dimensions)?;
        self.data.get(start..start + self.dimensions)
    }

    /// The `k` closest positions with their distances, closest first. Equal
    /// distances keep insertion order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>, IndexError> {
        if query.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                actual: query.len(),
            });
        }
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f32)> = self
            .data
            .chunks_exact(self.dimensions)
            .map(|row| squared_l2(row, query))
            .enumerate()
            .collect();

        scored.sort_by(|left, right| left.1.total_cmp(&right.1).then(left.0.cmp(&right.0)));
        scored.truncate(k);
        Ok(scored)
    }
}

pub fn squared_l2(left: &[f32], right: &[f32]) -> f32 {
    left.iter()
        .zip(right)
        .map(|(a, b)| {
            let delta = a - b;
            delta * delta
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_of(rows: &[[f32; 2]]) -> FlatL2Index {
        let mut index = FlatL2Index::new(2);
        for row in rows {
            index.add(row).unwrap();
        }
        index
    }

    #[test]
    fn search_orders_by_ascending_distance() {
        let index = index_of(&[[10.0, 0.0], [1.0, 0.0], [3.0, 0.0]]);
        let hits = index.search(&[0.0, 0.0], 2).unwrap();
        assert_eq!(hits, vec![(1, 1.0), (2, 9.0)]);
    }

    #[test]
    fn zero_width_index_refuses_vectors() {
        let mut index = FlatL2Index::new(0);
        assert!(matches!(index.add(&[]), Err(IndexError::ZeroDimensions)));
        assert!(index.is_empty());
    }

    #[test]
    fn k_larger_than_len_returns_everything() {
        let index = index_of(&[[0.0, 1.0], [0.0, 2.0]]);
        let hits = index.search(&[0.0, 0.0], 10).unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].1 <= hits[1].1);
    }

    #[test]
    fn ties_keep_insertion_order() {
        let index = index_of(&[[1.0, 0.0], [0.0, 1.0], [-1.0, 0.0]]);
        let hits = index.search(&[0.0, 0.0], 3).unwrap();
        let positions: Vec<_> = hits.iter().map(|hit| hit.0).collect();
        assert_eq!(positions, vec![0, 1, 2]);
    }

    #[test]
    fn zero_k_and_wrong_dimension() {
        let index = index_of(&[[1.0, 0.0]]);
        assert!(index.search(&[0.0, 0.0], 0).unwrap().is_empty());
        assert!(matches!(
            index.search(&[0.0], 1),
            Err(IndexError::DimensionMismatch { expected: 2, actual: 1 })
        ));
        let mut index = index;
        assert!(index.add(&[1.0, 2.0, 3.0]).is_err());
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn from_flat_rejects_ragged_buffers() {
        assert!(FlatL2Index::from_flat(3, vec![0.0; 7]).is_err());
        let index = FlatL2Index::from_flat(3, vec![0.0; 6]).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.vector(1), Some(&[0.0f32, 0.0, 0.0][..]));
        assert_eq!(index.vector(2), None);
    }
}
