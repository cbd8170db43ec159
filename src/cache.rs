//! Cache of pooled representations for cached-mode training
//!
//! Pooling every example once and training the head on the stored vectors
//! avoids re-running the encoder each epoch. A discriminator switched to
//! cached mode consumes these batches directly.

use anyhow::Result;
use candle_core::{DType, Tensor};

/// Pooled representations with their class labels
#[derive(Debug, Default)]
pub struct RepresentationCache {
    /// One tensor per pushed batch, each `(batch, embed_size)`
    representations: Vec<Tensor>,
    labels: Vec<u32>,
}

impl RepresentationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty cache with capacity for `n_batches` pushes
    pub fn with_capacity(n_batches: usize) -> Self {
        Self {
            representations: Vec::with_capacity(n_batches),
            labels: Vec::new(),
        }
    }

    /// Add a `(batch, embed_size)` block of pooled vectors and their labels
    pub fn push(&mut self, pooled: Tensor, labels: &[u32]) -> Result<()> {
        let (rows, embed_size) = pooled.dims2()?;
        anyhow::ensure!(
            rows == labels.len(),
            "Got {} labels for {rows} pooled vectors",
            labels.len()
        );
        if let Some(expected) = self.embed_size() {
            anyhow::ensure!(
                embed_size == expected,
                "Pooled width {embed_size} does not match cached width {expected}"
            );
        }

        self.representations.push(pooled);
        self.labels.extend_from_slice(labels);
        Ok(())
    }

    /// Number of cached examples
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Width of the cached vectors, if any were pushed
    pub fn embed_size(&self) -> Option<usize> {
        self.representations.first().and_then(|t| t.dims().last().copied())
    }

    pub fn labels(&self) -> &[u32] {
        &self.labels
    }

    /// All examples as `(n, embed_size)` representations and `(n,)` labels
    pub fn stacked(&self) -> Result<(Tensor, Tensor)> {
        let first = self
            .representations
            .first()
            .ok_or_else(|| anyhow::anyhow!("Cache is empty"))?;
        let x = Tensor::cat(&self.representations, 0)?;
        let y = Tensor::new(self.labels.as_slice(), first.device())?;
        Ok((x, y))
    }

    /// Consecutive mini-batches of at most `batch_size` examples
    pub fn batches(&self, batch_size: usize) -> Result<Vec<(Tensor, Tensor)>> {
        anyhow::ensure!(batch_size > 0, "batch_size must be greater than 0");
        let (x, y) = self.stacked()?;
        let n = self.len();

        (0..n)
            .step_by(batch_size)
            .map(|start| {
                let len = batch_size.min(n - start);
                Ok((x.narrow(0, start, len)?, y.narrow(0, start, len)?))
            })
            .collect()
    }

    /// Extract cached vectors as f32 rows, one per example
    pub fn to_f32_vecs(&self) -> Result<Vec<Vec<f32>>> {
        let mut rows = Vec::with_capacity(self.len());
        for t in &self.representations {
            let block: Vec<Vec<f32>> = t.to_dtype(DType::F32)?.to_vec2()?;
            rows.extend(block);
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn test_cache_basic() {
        let device = Device::Cpu;
        let mut cache = RepresentationCache::with_capacity(2);
        assert!(cache.is_empty());
        assert!(cache.stacked().is_err());

        cache
            .push(Tensor::zeros((2, 4), DType::F32, &device).unwrap(), &[0, 1])
            .unwrap();
        cache
            .push(Tensor::ones((3, 4), DType::F32, &device).unwrap(), &[1, 1, 0])
            .unwrap();

        assert_eq!(cache.len(), 5);
        assert_eq!(cache.embed_size(), Some(4));
        assert_eq!(cache.labels(), &[0, 1, 1, 1, 0]);

        let (x, y) = cache.stacked().unwrap();
        assert_eq!(x.dims(), &[5, 4]);
        assert_eq!(y.dims(), &[5]);
    }

    #[test]
    fn test_cache_rejects_mismatched_push() {
        let device = Device::Cpu;
        let mut cache = RepresentationCache::new();
        let block = Tensor::zeros((2, 4), DType::F32, &device).unwrap();
        assert!(cache.push(block.clone(), &[0]).is_err());

        cache.push(block, &[0, 1]).unwrap();
        let narrower = Tensor::zeros((1, 3), DType::F32, &device).unwrap();
        assert!(cache.push(narrower, &[0]).is_err());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_cache_batches() {
        let device = Device::Cpu;
        let mut cache = RepresentationCache::new();
        let block = Tensor::arange(0f32, 20., &device)
            .unwrap()
            .reshape((5, 4))
            .unwrap();
        cache.push(block, &[0, 1, 2, 0, 1]).unwrap();

        let batches = cache.batches(2).unwrap();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[2].0.dims(), &[1, 4]);

        let last_labels: Vec<u32> = batches[2].1.to_vec1().unwrap();
        assert_eq!(last_labels, vec![1]);

        let rows = cache.to_f32_vecs().unwrap();
        assert_eq!(rows[4], vec![16.0, 17.0, 18.0, 19.0]);
    }
}
