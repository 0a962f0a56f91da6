//! Append-only flat vector index
//!
//! Vectors live contiguously in one `Vec<f32>`; slot `i` owns
//! `vectors[i * dimension..(i + 1) * dimension]`. Deleting a chunk only
//! vacates its slot; the space is reclaimed by compaction.

use uuid::Uuid;

use crate::error::{Error, Result};

/// Cosine similarity between two vectors; zero when either has zero norm
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[derive(Debug, Clone)]
pub struct FlatIndex {
    dimension: usize,
    vectors: Vec<f32>,
    /// Slot to chunk mapping; `None` marks a logically deleted slot
    slots: Vec<Option<Uuid>>,
}

impl FlatIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Vec::new(),
            slots: Vec::new(),
        }
    }

    /// Rebuild from persisted parts
    pub fn from_parts(dimension: usize, vectors: Vec<f32>, slots: Vec<Option<Uuid>>) -> Result<Self> {
        if vectors.len() != slots.len() * dimension {
            return Err(Error::persistence(format!(
                "vector data holds {} floats, expected {} slots x {} dimensions",
                vectors.len(),
                slots.len(),
                dimension
            )));
        }

        Ok(Self {
            dimension,
            vectors,
            slots,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of physical slots, including vacated ones
    pub fn physical_len(&self) -> usize {
        self.slots.len()
    }

    pub fn vectors(&self) -> &[f32] {
        &self.vectors
    }

    pub fn slots(&self) -> &[Option<Uuid>] {
        &self.slots
    }

    /// Append a vector, returning its slot
    pub fn push(&mut self, chunk_id: Uuid, embedding: &[f32]) -> Result<usize> {
        if embedding.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }

        self.vectors.extend_from_slice(embedding);
        self.slots.push(Some(chunk_id));
        Ok(self.slots.len() - 1)
    }

    pub fn vector(&self, slot: usize) -> &[f32] {
        &self.vectors[slot * self.dimension..(slot + 1) * self.dimension]
    }

    pub fn owner(&self, slot: usize) -> Option<Uuid> {
        self.slots.get(slot).copied().flatten()
    }

    /// Logically delete a slot
    pub fn vacate(&mut self, slot: usize) -> Option<Uuid> {
        self.slots.get_mut(slot).and_then(Option::take)
    }

    /// Undo a `vacate`
    pub fn restore(&mut self, slot: usize, chunk_id: Uuid) {
        if let Some(entry) = self.slots.get_mut(slot) {
            *entry = Some(chunk_id);
        }
    }

    /// Drop every slot at or after `len`
    pub fn truncate(&mut self, len: usize) {
        self.slots.truncate(len);
        self.vectors.truncate(len * self.dimension);
    }

    /// Live slots in insertion order
    pub fn live(&self) -> impl Iterator<Item = (usize, Uuid, &[f32])> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(move |(slot, owner)| owner.map(|id| (slot, id, self.vector(slot))))
    }

    /// Copy of the live slots only, renumbered from zero
    pub fn compacted(&self) -> Self {
        let mut out = Self::new(self.dimension);
        for (_, id, vector) in self.live() {
            out.vectors.extend_from_slice(vector);
            out.slots.push(Some(id));
        }
        out
    }

    /// Live slots ranked by cosine similarity to `query`, best first.
    /// Equal scores keep insertion order.
    pub fn rank(&self, query: &[f32], k: usize) -> Vec<(usize, Uuid, f32)> {
        let mut scored: Vec<(usize, Uuid, f32)> = self
            .live()
            .map(|(slot, id, vector)| (slot, id, cosine_similarity(query, vector)))
            .collect();

        scored.sort_by(|a, b| b.2.total_cmp(&a.2).then(a.0.cmp(&b.0)));
        scored.truncate(k);
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_push_rejects_wrong_dimension() {
        let mut index = FlatIndex::new(3);
        let err = index.push(Uuid::new_v4(), &[1.0, 2.0]).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 3, actual: 2 }));
        assert_eq!(index.physical_len(), 0);
    }

    #[test]
    fn test_rank_skips_vacated_and_breaks_ties_by_slot() {
        let mut index = FlatIndex::new(2);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        index.push(a, &[1.0, 0.0]).unwrap();
        index.push(b, &[1.0, 0.0]).unwrap();
        index.push(c, &[0.0, 1.0]).unwrap();

        let ranked: Vec<Uuid> = index.rank(&[1.0, 0.0], 3).into_iter().map(|r| r.1).collect();
        assert_eq!(ranked, vec![a, b, c]);

        index.vacate(0);
        let ranked: Vec<Uuid> = index.rank(&[1.0, 0.0], 3).into_iter().map(|r| r.1).collect();
        assert_eq!(ranked, vec![b, c]);
    }

    #[test]
    fn test_compacted_keeps_live_order() {
        let mut index = FlatIndex::new(1);
        let ids: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        for (i, id) in ids.iter().enumerate() {
            index.push(*id, &[i as f32]).unwrap();
        }
        index.vacate(1);

        let compacted = index.compacted();
        assert_eq!(compacted.physical_len(), 3);
        assert_eq!(compacted.vectors(), &[0.0, 2.0, 3.0]);
        assert_eq!(compacted.owner(1), Some(ids[2]));
    }

    #[test]
    fn test_from_parts_validates_length() {
        assert!(FlatIndex::from_parts(2, vec![0.0; 3], vec![None, None]).is_err());
        assert!(FlatIndex::from_parts(2, vec![0.0; 4], vec![None, None]).is_ok());
    }
}
