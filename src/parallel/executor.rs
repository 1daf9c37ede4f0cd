//! Bounded fork-join over rayon
//!
//! Every call is one barrier: it returns only after all items were
//! processed, with the results in input order.

use crate::error::{Error, Result};
use rayon::prelude::*;

/// Pool size for `item_count` items with at most `max_parallelism` threads
pub fn pool_size(max_parallelism: usize, item_count: usize) -> usize {
    max_parallelism.max(1).min(item_count.max(1))
}

/// Applies `mapper` to every item on a pool of
/// `min(max_parallelism, items.len())` threads
///
/// # Example
/// ```ignore
/// let lengths = fan_out(&files, 4, |file| file.code.len())?;
/// ```
pub fn fan_out<T, R, F>(items: &[T], max_parallelism: usize, mapper: F) -> Result<Vec<R>>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Send + Sync,
{
    // Empty and single-item fast paths
    match items {
        [] => return Ok(Vec::new()),
        [item] => return Ok(vec![mapper(item)]),
        _ => {}
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(pool_size(max_parallelism, items.len()))
        .build()
        .map_err(|e| Error::invalid_operation(format!("failed to create thread pool: {}", e)))?;

    Ok(pool.install(|| items.par_iter().map(&mapper).collect()))
}

/// [`fan_out`] for fallible work; the first error in input order wins
pub fn try_fan_out<T, R, F>(items: &[T], max_parallelism: usize, mapper: F) -> Result<Vec<R>>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> Result<R> + Send + Sync,
{
    fan_out(items, max_parallelism, mapper)?.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fan_out_keeps_order() {
        let items: Vec<u32> = (0..100).collect();
        let doubled = fan_out(&items, 4, |n| n * 2).unwrap();
        assert_eq!(doubled, (0..100).map(|n| n * 2).collect::<Vec<_>>());
    }

    #[test]
    fn test_fan_out_empty() {
        let items: Vec<u32> = Vec::new();
        assert!(fan_out(&items, 8, |n| *n).unwrap().is_empty());
    }

    #[test]
    fn test_try_fan_out_reports_error() {
        let items = vec![1, 2, 3];
        let result = try_fan_out(&items, 2, |n| {
            if *n == 2 {
                Err(Error::runtime("bad item"))
            } else {
                Ok(*n)
            }
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_pool_size_is_bounded() {
        assert_eq!(pool_size(16, 3), 3);
        assert_eq!(pool_size(2, 10), 2);
        assert_eq!(pool_size(0, 0), 1);
    }
}
