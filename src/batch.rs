//! Collation of variable-length token sequences

use anyhow::Result;
use candle_core::{Device, Tensor};

/// Token id reserved for padding; pooled representations ignore it
pub const PAD_TOKEN_ID: u32 = 0;

/// Right-pad sequences with [`PAD_TOKEN_ID`] into a `(batch, max_len)` tensor.
///
/// A batch of empty sequences still yields one all-padding column.
pub fn pad_batch(sequences: &[Vec<u32>], device: &Device) -> Result<Tensor> {
    anyhow::ensure!(!sequences.is_empty(), "Cannot collate an empty batch");

    let max_len = sequences.iter().map(Vec::len).max().unwrap_or(0).max(1);
    let mut flat = Vec::with_capacity(sequences.len() * max_len);
    for seq in sequences {
        flat.extend_from_slice(seq);
        flat.extend(std::iter::repeat(PAD_TOKEN_ID).take(max_len - seq.len()));
    }

    Ok(Tensor::from_vec(flat, (sequences.len(), max_len), device)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_batch() {
        let batch = pad_batch(&[vec![5, 6, 7], vec![8]], &Device::Cpu).unwrap();
        let rows: Vec<Vec<u32>> = batch.to_vec2().unwrap();
        assert_eq!(rows, vec![vec![5, 6, 7], vec![8, 0, 0]]);
    }

    #[test]
    fn test_pad_batch_of_empty_sequences() {
        let batch = pad_batch(&[vec![], vec![]], &Device::Cpu).unwrap();
        assert_eq!(batch.dims(), &[2, 1]);
    }

    #[test]
    fn test_empty_batch_rejected() {
        assert!(pad_batch(&[], &Device::Cpu).is_err());
    }
}
