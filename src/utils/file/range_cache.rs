//! Block-granular caching over a [`RangeSource`].
//!
//! Arbitrary `[start, end)` requests are aligned to fixed-size blocks
//! (512 KiB by default). Concurrent requests that land in the same block
//! share one in-flight fetch, which is the main round-trip control during
//! R-tree descent, where many small adjacent reads arrive together. A
//! request that straddles a block boundary bypasses the cache and fetches
//! exactly the requested span.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::OnceCell;

use crate::utils::file::remote::{RangeSource, TransportError};

pub const DEFAULT_BLOCK_SIZE: u64 = 512 * 1024;

/// Cached blocks are dropped wholesale once the map reaches this many
/// entries (512 MiB at the default block size), bounding memory for
/// long-lived handles. In-flight waiters keep their shared future alive.
const MAX_CACHED_BLOCKS: usize = 1024;

type BlockFuture = Shared<BoxFuture<'static, Result<Bytes, TransportError>>>;

pub struct RangeCache<R> {
    source: Arc<R>,
    block_size: u64,
    blocks: Mutex<HashMap<u64, BlockFuture>>,
    file_size: OnceCell<u64>,
}

impl<R: RangeSource> RangeCache<R> {
    /// A `block_size` of 0 disables caching entirely: every request goes
    /// straight to the source.
    pub fn new(source: R, block_size: u64) -> Self {
        RangeCache {
            source: Arc::new(source),
            block_size,
            blocks: Mutex::new(HashMap::new()),
            file_size: OnceCell::new(),
        }
    }

    pub fn with_default_block_size(source: R) -> Self {
        RangeCache::new(source, DEFAULT_BLOCK_SIZE)
    }

    /// Total size of the underlying resource, discovered once and memoized.
    pub async fn file_size(&self) -> Result<u64, TransportError> {
        self.file_size
            .get_or_try_init(|| self.source.size())
            .await
            .copied()
    }

    /// Serves the half-open byte range `[start, end)`.
    pub async fn fetch(&self, start: u64, end: u64) -> Result<Bytes, TransportError> {
        debug_assert!(start < end, "empty range fetch");
        if self.block_size == 0 {
            return self.source.fetch(start, end).await;
        }

        let start_block = start / self.block_size;
        let end_block = (end - 1) / self.block_size;
        if start_block != end_block {
            return self.source.fetch(start, end).await;
        }

        // Clamping the block to the file end needs the size; await its
        // discovery before touching the block map.
        let file_size = self.file_size().await?;
        let block_start = start_block * self.block_size;
        let block_end = (block_start + self.block_size).min(file_size);

        let pending = {
            let mut blocks = self.blocks.lock().unwrap();
            if blocks.len() >= MAX_CACHED_BLOCKS {
                blocks.clear();
            }
            blocks
                .entry(start_block)
                .or_insert_with(|| {
                    tracing::debug!(block = start_block, block_start, block_end, "fetching block");
                    let source = Arc::clone(&self.source);
                    async move { source.fetch(block_start, block_end).await }
                        .boxed()
                        .shared()
                })
                .clone()
        };

        match pending.await {
            Ok(block) => {
                let lo = (start - block_start) as usize;
                let hi = ((end - block_start) as usize).min(block.len());
                Ok(block.slice(lo..hi.max(lo)))
            }
            Err(e) => {
                // Drop the failed block so a later retry re-fetches it.
                self.blocks.lock().unwrap().remove(&start_block);
                Err(e)
            }
        }
    }
}
