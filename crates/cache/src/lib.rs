//! A persistent key-value cache backing every cacheable node-API method
//! (spec.md section 4.1).
//!
//! Keys are an opaque, canonical binary encoding of `(method_name, args...)`
//! that the cache never inspects. Values are stored behind a small
//! self-describing envelope so a reader can recover the original type.
//! Volatile keys (e.g. "latest height" semantics) always delegate to the
//! caller's `compute` closure and are never persisted.

use std::{future::Future, path::Path};

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Errors surfaced by the cache. Per spec.md section 4.1, backend I/O errors
/// are retryable: the caller may proceed as if uncached.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(#[from] sled::Error),
    #[error("failed to encode cached value: {0}")]
    Encode(#[from] bincode::Error),
    #[error("cached envelope had an unrecognized format tag: {0}")]
    UnknownFormat(u8),
}

/// The only envelope format this implementation writes. A future format
/// would get a new tag value, letting old entries keep decoding correctly.
const FORMAT_BINCODE_V1: u8 = 1;

/// Build the opaque cache key for `(method, args)`. The cache itself never
/// looks inside this value; it is exposed so node-API adapters can construct
/// a stable key without reaching into the cache's internals.
pub fn cache_key(method: &str, args: &impl Serialize) -> Vec<u8> {
    let mut key = bincode::serialize(method).expect("method name always encodes");
    let arg_bytes = bincode::serialize(args).expect("cache key args must be encodable");
    key.extend_from_slice(&arg_bytes);
    key
}

/// An on-disk, crash-resilient key-value store memoizing idempotent node
/// RPC responses. One instance typically backs one `(era, layer)` pair
/// (spec.md section 6: "a directory per era+layer").
#[derive(Clone)]
pub struct KvCache {
    db: sled::Db,
}

impl KvCache {
    /// Open (creating if absent) the cache store rooted at `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, CacheError> {
        let db = sled::open(dir)?;
        Ok(Self { db })
    }

    /// An ephemeral, in-memory cache, useful for tests and for
    /// `query_on_cache_miss = false` style unit tests that don't need a
    /// real directory.
    pub fn temporary() -> Result<Self, CacheError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    /// Return the cached value for `key`, or compute, store, and return it.
    ///
    /// If `volatile` is `true`, `compute` always runs and nothing is stored
    /// (spec.md section 4.1: "latest height" semantics). Values `compute`
    /// returns as an error are never cached. Concurrent calls on the same
    /// key are safe; duplicate stores for identical bytes are idempotent.
    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        key: &[u8],
        volatile: bool,
        compute: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned + Clone + Send + 'static,
        E: From<CacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !volatile {
            if let Some(value) = self.get::<T>(key).map_err(E::from)? {
                return Ok(value);
            }
        }

        let value = compute().await?;

        if !volatile {
            self.put(key, &value).map_err(E::from)?;
        }

        Ok(value)
    }

    fn get<T: DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>, CacheError> {
        let Some(bytes) = self.db.get(key)? else {
            return Ok(None);
        };
        Ok(Some(decode_envelope(&bytes)?))
    }

    fn put<T: Serialize>(&self, key: &[u8], value: &T) -> Result<(), CacheError> {
        let envelope = encode_envelope(value)?;
        // Last-writer-wins: sled's `insert` unconditionally overwrites, which
        // is exactly the idempotence spec.md section 4.1 asks for since every
        // writer for a given key encodes the same logical value.
        self.db.insert(key, envelope)?;
        Ok(())
    }

    /// Flush buffered writes to disk. The cache tolerates unclean shutdown
    /// (spec.md section 6: "last-write may be lost, but no corruption"), so
    /// this is a best-effort call, not a correctness requirement.
    pub fn flush(&self) -> Result<(), CacheError> {
        self.db.flush()?;
        Ok(())
    }
}

fn encode_envelope<T: Serialize>(value: &T) -> Result<Vec<u8>, CacheError> {
    let mut out = vec![FORMAT_BINCODE_V1];
    out.extend(bincode::serialize(value)?);
    Ok(out)
}

fn decode_envelope<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CacheError> {
    let (tag, payload) = bytes.split_first().ok_or(CacheError::UnknownFormat(0))?;
    match *tag {
        FORMAT_BINCODE_V1 => Ok(bincode::deserialize(payload)?),
        other => Err(CacheError::UnknownFormat(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    enum TestError {
        Cache(CacheError),
        Compute,
    }
    impl From<CacheError> for TestError {
        fn from(e: CacheError) -> Self {
            TestError::Cache(e)
        }
    }

    #[tokio::test]
    async fn non_volatile_hits_cache_on_second_call() {
        let cache = KvCache::temporary().unwrap();
        let calls = AtomicU32::new(0);
        let key = cache_key("GetBlock", &42u64);

        for _ in 0..2 {
            let value: u64 = cache
                .get_or_compute(&key, false, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, TestError>(100u64)
                })
                .await
                .unwrap();
            assert_eq!(value, 100);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn volatile_always_recomputes() {
        let cache = KvCache::temporary().unwrap();
        let calls = AtomicU32::new(0);
        let key = cache_key("GetLatestHeight", &());

        for _ in 0..3 {
            cache
                .get_or_compute(&key, true, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, TestError>(7u64)
                })
                .await
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn errors_are_never_cached() {
        let cache = KvCache::temporary().unwrap();
        let key = cache_key("GetBlock", &1u64);

        let first: Result<u64, TestError> =
            cache.get_or_compute(&key, false, || async { Err(TestError::Compute) }).await;
        assert!(first.is_err());

        let second: u64 = cache
            .get_or_compute(&key, false, || async { Ok::<_, TestError>(55u64) })
            .await
            .unwrap();
        assert_eq!(second, 55);
    }

    #[tokio::test]
    async fn distinct_args_are_distinct_keys() {
        let cache = KvCache::temporary().unwrap();
        let key_a = cache_key("GetBlock", &1u64);
        let key_b = cache_key("GetBlock", &2u64);
        assert_ne!(key_a, key_b);

        cache.get_or_compute::<u64, TestError, _, _>(&key_a, false, || async { Ok(1) }).await.unwrap();
        cache.get_or_compute::<u64, TestError, _, _>(&key_b, false, || async { Ok(2) }).await.unwrap();

        let a: u64 = cache
            .get_or_compute(&key_a, false, || async { Ok::<_, TestError>(999) })
            .await
            .unwrap();
        assert_eq!(a, 1);
    }
}
