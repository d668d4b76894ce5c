//! Mini-batching utilities for pretraining.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Groups items from an iterator into batches of a fixed size; the last
/// batch may be shorter.
pub struct BatchIterator<T, I>
where
    I: Iterator<Item = T>,
{
    source: I,
    buffer: Vec<T>,
    batch_size: usize,
}

impl<T, I> BatchIterator<T, I>
where
    I: Iterator<Item = T>,
{
    pub fn new(source: I, batch_size: usize) -> Self {
        Self {
            source,
            buffer: Vec::with_capacity(batch_size),
            batch_size: batch_size.max(1),
        }
    }
}

impl<T, I> Iterator for BatchIterator<T, I>
where
    I: Iterator<Item = T>,
{
    type Item = Vec<T>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buffer.clear();

        while self.buffer.len() < self.batch_size {
            match self.source.next() {
                Some(item) => self.buffer.push(item),
                None => break,
            }
        }

        if self.buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buffer))
        }
    }
}

/// Shuffled index batches for one epoch. The order depends only on
/// `(seed, epoch)`.
pub fn epoch_batches(n: usize, batch_size: usize, seed: u64, epoch: usize) -> Vec<Vec<usize>> {
    let mut order: Vec<usize> = (0..n).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(epoch as u64));
    order.shuffle(&mut rng);
    BatchIterator::new(order.into_iter(), batch_size).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_iterator() {
        let items = vec![1, 2, 3, 4, 5, 6, 7];
        let batches: Vec<Vec<i32>> = BatchIterator::new(items.into_iter(), 3).collect();

        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0], vec![1, 2, 3]);
        assert_eq!(batches[1], vec![4, 5, 6]);
        assert_eq!(batches[2], vec![7]);
    }

    #[test]
    fn test_epoch_batches_cover_every_index_once() {
        let batches = epoch_batches(10, 4, 42, 0);
        assert_eq!(batches.len(), 3);
        let mut seen: Vec<usize> = batches.into_iter().flatten().collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_epoch_batches_are_reproducible() {
        assert_eq!(epoch_batches(20, 5, 1, 3), epoch_batches(20, 5, 1, 3));
        assert_ne!(epoch_batches(20, 20, 1, 3), epoch_batches(20, 20, 1, 4));
    }
}
