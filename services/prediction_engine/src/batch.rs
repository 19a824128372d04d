use futures::future::join_all;
use std::future::Future;
use tracing::debug;

/// Largest "contained-in" list the object store is known to accept.
pub const DEFAULT_CONTAINED_IN_LIMIT: usize = 20;

/// Splits `keys` into contiguous chunks of at most `limit` elements.
pub fn plan_chunks<K: Clone>(keys: &[K], limit: usize) -> Vec<Vec<K>> {
    keys.chunks(limit.max(1)).map(|chunk| chunk.to_vec()).collect()
}

/// Runs `query` once per chunk of `keys`, all chunks concurrently, and
/// concatenates the results once every chunk has settled.
///
/// Any failing chunk fails the whole call. No ordering is guaranteed across
/// chunks. An empty key list issues no queries.
pub async fn query_in_chunks<K, T, E, F, Fut>(keys: &[K], limit: usize, query: F) -> Result<Vec<T>, E>
where
    K: Clone,
    F: Fn(Vec<K>) -> Fut,
    Fut: Future<Output = Result<Vec<T>, E>>,
{
    let chunks = plan_chunks(keys, limit);
    if chunks.is_empty() {
        return Ok(Vec::new());
    }
    debug!("Querying {} keys in {} chunks", keys.len(), chunks.len());

    let results = join_all(chunks.into_iter().map(|chunk| query(chunk))).await;
    merge(results)
}

/// Like [`query_in_chunks`] for queries filtered by two key sets at once. Each
/// set is chunked separately and one query runs per pair of chunks.
pub async fn query_in_chunk_pairs<A, B, T, E, F, Fut>(
    left: &[A],
    right: &[B],
    limit: usize,
    query: F,
) -> Result<Vec<T>, E>
where
    A: Clone,
    B: Clone,
    F: Fn(Vec<A>, Vec<B>) -> Fut,
    Fut: Future<Output = Result<Vec<T>, E>>,
{
    let left_chunks = plan_chunks(left, limit);
    let right_chunks = plan_chunks(right, limit);
    if left_chunks.is_empty() || right_chunks.is_empty() {
        return Ok(Vec::new());
    }
    debug!(
        "Querying {}x{} keys in {} chunk pairs",
        left.len(),
        right.len(),
        left_chunks.len() * right_chunks.len()
    );

    let futures = left_chunks.iter().flat_map(|l| {
        let query = &query;
        right_chunks.iter().map(move |r| query(l.clone(), r.clone()))
    });
    let results = join_all(futures).await;
    merge(results)
}

fn merge<T, E>(results: Vec<Result<Vec<T>, E>>) -> Result<Vec<T>, E> {
    let mut merged = Vec::new();
    for result in results {
        merged.extend(result?);
    }
    Ok(merged)
}
