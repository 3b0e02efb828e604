//! The query orchestrator: a per-file handle that lazily initializes
//! metadata (header, total summary, chromosome directory, zoom headers),
//! picks a zoom level adaptively from the query width, and drives the
//! resolve-then-requery loop over the spatial index until every
//! overlapping leaf has decoded records.

use std::sync::Arc;

use futures::future::try_join_all;
use thiserror::Error;
use tracing::debug;

use crate::bbi::chrom_tree::{ChromLeaf, ChromRef, ChromTree};
use crate::bbi::codec::DecodeError;
use crate::bbi::index_tree::{IndexTree, QueryBounds};
use crate::bbi::models::{Header, Summary, ZoomHeader};
use crate::bbi::reader::BigWigReader;
use crate::bbi::records::DataRecord;
use crate::bbi::sections::SectionDecodeError;
use crate::utils::file::range_cache::{RangeCache, DEFAULT_BLOCK_SIZE};
use crate::utils::file::remote::{RangeSource, RemoteFile, TransportError};

/// Errors surfaced by queries and initialization.
#[derive(Debug, Error)]
pub enum BigWigError {
    #[error("unknown chromosome `{0}`")]
    UnknownChromosome(String),
    #[error("invalid zoom level {requested}: the file has {available}")]
    InvalidZoomIndex { requested: usize, available: usize },
    #[error("unsupported data record type {0}")]
    UnsupportedRecordType(u8),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl From<SectionDecodeError> for BigWigError {
    fn from(e: SectionDecodeError) -> Self {
        match e {
            SectionDecodeError::UnsupportedRecordType(t) => BigWigError::UnsupportedRecordType(t),
            SectionDecodeError::Decode(e) => BigWigError::Decode(e),
        }
    }
}

/// A query region: a chromosome (by name or id) and a half-open base
/// interval.
#[derive(Clone, Debug)]
pub struct GenomicRange {
    pub chrom: ChromRef,
    pub start: u32,
    pub end: u32,
}

impl GenomicRange {
    pub fn new(chrom: impl Into<ChromRef>, start: u32, end: u32) -> Self {
        GenomicRange {
            chrom: chrom.into(),
            start,
            end,
        }
    }
}

/// Zoom selection for a query: either an explicit level (an index into the
/// file's zoom headers), or budgets from which a level is picked
/// adaptively. With neither, full-resolution data is read.
#[derive(Clone, Debug, Default)]
pub struct ZoomQuery {
    pub level: Option<usize>,
    pub max_items: Option<u64>,
    pub max_bases: Option<u64>,
}

impl ZoomQuery {
    pub fn level(level: usize) -> Self {
        ZoomQuery {
            level: Some(level),
            ..ZoomQuery::default()
        }
    }

    pub fn adaptive(max_items: Option<u64>, max_bases: Option<u64>) -> Self {
        ZoomQuery {
            level: None,
            max_items,
            max_bases,
        }
    }
}

/// A handle on one remote bigWig file.
///
/// Everything a query touches is memoized on the handle for its lifetime:
/// byte-range blocks, the chromosome directory, index trees per zoom
/// level, and decoded leaf records. Nothing is evicted; drop the handle to
/// release the memory. A failed query keeps whatever resolved before the
/// failure, so retrying re-attempts only what failed.
pub struct BigWigFile<R: RangeSource> {
    reader: BigWigReader<R>,
    header: Option<Header>,
    summary: Option<Summary>,
    chroms: Option<Arc<ChromTree>>,
    zoom_headers: Option<Vec<ZoomHeader>>,
    index_tree: Option<IndexTree>,
    zoom_trees: Vec<Option<IndexTree>>,
}

impl BigWigFile<RemoteFile> {
    /// Opens a remote file by URI. Range requests go directly to `uri`, or
    /// through `forward_uri` (`?r=<start>-<end>&q=<uri>`) when given. The
    /// cache block size defaults to 512 KiB; 0 disables caching.
    pub fn open_uri(
        uri: &str,
        forward_uri: Option<&str>,
        cache_block_size_kib: Option<u64>,
    ) -> Result<Self, TransportError> {
        let source = RemoteFile::new(uri, forward_uri)?;
        let block_size = cache_block_size_kib
            .map(|kib| kib * 1024)
            .unwrap_or(DEFAULT_BLOCK_SIZE);
        Ok(Self::with_cache(RangeCache::new(source, block_size)))
    }
}

impl<R: RangeSource> BigWigFile<R> {
    /// Opens a handle over any range source, with the default cache block
    /// size.
    pub fn open(source: R) -> Self {
        Self::with_cache(RangeCache::with_default_block_size(source))
    }

    pub fn open_with_block_size(source: R, block_size: u64) -> Self {
        Self::with_cache(RangeCache::new(source, block_size))
    }

    fn with_cache(cache: RangeCache<R>) -> Self {
        BigWigFile {
            reader: BigWigReader::new(cache),
            header: None,
            summary: None,
            chroms: None,
            zoom_headers: None,
            index_tree: None,
            zoom_trees: Vec::new(),
        }
    }

    /// Drives initialization to completion. Idempotent: pieces already
    /// loaded are kept, so a retry after a transport failure resumes where
    /// the last attempt stopped.
    ///
    /// The chain is linear: header, then total summary, then the
    /// chromosome directory, then the zoom headers.
    pub async fn initialized(&mut self) -> Result<(), BigWigError> {
        let header = match self.header {
            Some(h) => h,
            None => {
                let h = self.reader.read_header().await?;
                debug!(version = h.version, zoom_levels = h.zoom_levels, "header loaded");
                self.header = Some(h);
                h
            }
        };
        if self.summary.is_none() {
            self.summary = Some(self.reader.read_total_summary(&header).await?);
        }
        if self.chroms.is_none() {
            let chroms = self.reader.read_chrom_tree(&header).await?;
            debug!(chromosomes = chroms.leaves().len(), "chromosome directory loaded");
            self.chroms = Some(Arc::new(chroms));
        }
        if self.zoom_headers.is_none() {
            let zoom_headers = self.reader.read_zoom_headers(&header).await?;
            self.zoom_trees = vec![None; zoom_headers.len()];
            self.zoom_headers = Some(zoom_headers);
        }
        Ok(())
    }

    /// File-wide summary statistics. `None` before initialization.
    pub fn summary(&self) -> Option<&Summary> {
        self.summary.as_ref()
    }

    /// All chromosomes in the file. `None` before initialization.
    pub fn chromosomes(&self) -> Option<Vec<&ChromLeaf>> {
        self.chroms.as_ref().map(|c| c.leaves())
    }

    /// Number of zoom levels. `None` before initialization.
    pub fn zoom_levels(&self) -> Option<u16> {
        self.header.as_ref().map(|h| h.zoom_levels)
    }

    /// The zoom headers, in file order. `None` before initialization.
    pub fn zoom_headers(&self) -> Option<&[ZoomHeader]> {
        self.zoom_headers.as_deref()
    }

    /// Runs a query. With no `range`, every record in the file (at the
    /// selected resolution) is returned. Records are in on-disk traversal
    /// order; callers wanting sorted output must sort.
    pub async fn query(
        &mut self,
        range: Option<GenomicRange>,
        zoom: Option<ZoomQuery>,
    ) -> Result<Vec<DataRecord>, BigWigError> {
        self.initialized().await?;
        let header = self.header.expect("initialized");
        let chroms = Arc::clone(self.chroms.as_ref().expect("initialized"));

        let bounds = match &range {
            Some(r) => {
                let leaf = chroms
                    .leaf(&r.chrom)
                    .ok_or_else(|| BigWigError::UnknownChromosome(r.chrom.to_string()))?;
                Some(QueryBounds {
                    chrom: leaf.id,
                    start: r.start,
                    end: r.end,
                })
            }
            None => None,
        };

        let zoom_level = self.select_zoom_level(bounds.as_ref(), zoom)?;
        debug!(?zoom_level, ?bounds, "query");

        let index_offset = match zoom_level {
            Some(level) => self.zoom_headers.as_ref().expect("initialized")[level].index_offset,
            None => header.full_index_offset,
        };

        // Split borrows: the reader is only read while the tree is grown in
        // place, block by block.
        let reader = &self.reader;
        let tree_slot = match zoom_level {
            Some(level) => &mut self.zoom_trees[level],
            None => &mut self.index_tree,
        };
        if tree_slot.is_none() {
            *tree_slot = Some(reader.read_rooted_index(&header, index_offset).await?);
        }
        let tree = tree_slot.as_mut().expect("just initialized");

        loop {
            let work = tree.collect_unresolved(bounds.as_ref());

            if !work.nodes.is_empty() {
                debug!(blocks = work.nodes.len(), "resolving index blocks");
                let fetched = try_join_all(
                    work.nodes
                        .iter()
                        .map(|(_, offset)| reader.read_index_node(&header, *offset)),
                )
                .await?;
                for ((path, _), children) in work.nodes.into_iter().zip(fetched) {
                    tree.node_at_mut(&path).children = Some(children);
                }
                continue;
            }

            if !work.leaves.is_empty() {
                debug!(leaves = work.leaves.len(), "resolving data sections");
                match zoom_level {
                    Some(_) => {
                        let fetched = try_join_all(
                            work.leaves
                                .iter()
                                .map(|(_, offset, size)| {
                                    reader.read_zoom_section(&header, *offset, *size)
                                }),
                        )
                        .await?;
                        for ((path, _, _), records) in work.leaves.into_iter().zip(fetched) {
                            let records = records
                                .into_iter()
                                .map(|record| DataRecord::Zoom {
                                    record,
                                    chroms: Arc::downgrade(&chroms),
                                })
                                .collect();
                            tree.node_at_mut(&path).data_records = Some(records);
                        }
                    }
                    None => {
                        let fetched = try_join_all(
                            work.leaves
                                .iter()
                                .map(|(_, offset, size)| {
                                    reader.read_data_section(&header, *offset, *size)
                                }),
                        )
                        .await?;
                        for ((path, _, _), (section, records)) in
                            work.leaves.into_iter().zip(fetched)
                        {
                            let section = Arc::new(section);
                            let records = records
                                .into_iter()
                                .enumerate()
                                .map(|(index, record)| DataRecord::Raw {
                                    section: Arc::clone(&section),
                                    record,
                                    index: index as u32,
                                    chroms: Arc::downgrade(&chroms),
                                })
                                .collect();
                            tree.node_at_mut(&path).data_records = Some(records);
                        }
                    }
                }
                continue;
            }

            break;
        }

        let mut out = Vec::new();
        for node in tree.query(bounds.as_ref()) {
            let records = match &node.data_records {
                Some(records) => records,
                None => continue,
            };
            match &bounds {
                Some(q) => out.extend(
                    records
                        .iter()
                        .filter(|r| {
                            r.chrom_id() == q.chrom && r.start() < q.end && r.end() > q.start
                        })
                        .cloned(),
                ),
                None => out.extend(records.iter().cloned()),
            }
        }
        Ok(out)
    }

    /// Picks a zoom level. Explicit levels are validated against the zoom
    /// header count. Adaptive selection defaults whichever of
    /// `max_items`/`max_bases` is missing to the other, compares the query
    /// width (the whole genome when no range was given) against
    /// `max_bases`, and scans zoom headers *in file order* for the first
    /// whose reduction level keeps the item count within `max_items` —
    /// falling back to the last header when none does. The file's own
    /// header order decides; reduction levels are not sorted.
    fn select_zoom_level(
        &self,
        bounds: Option<&QueryBounds>,
        zoom: Option<ZoomQuery>,
    ) -> Result<Option<usize>, BigWigError> {
        let zoom = match zoom {
            Some(z) => z,
            None => return Ok(None),
        };
        let headers = self.zoom_headers.as_ref().expect("initialized");

        if let Some(level) = zoom.level {
            if level >= headers.len() {
                return Err(BigWigError::InvalidZoomIndex {
                    requested: level,
                    available: headers.len(),
                });
            }
            return Ok(Some(level));
        }

        let max_items = zoom.max_items.filter(|v| *v > 0);
        let max_bases = zoom.max_bases.filter(|v| *v > 0);
        let (max_items, max_bases) = match (max_items, max_bases) {
            (None, None) => return Ok(None),
            (Some(items), None) => (items, items),
            (None, Some(bases)) => (bases, bases),
            (Some(items), Some(bases)) => (items, bases),
        };

        let width: u64 = match bounds {
            Some(q) => u64::from(q.end - q.start),
            None => self
                .chroms
                .as_ref()
                .expect("initialized")
                .leaves()
                .iter()
                .map(|l| u64::from(l.length))
                .sum(),
        };

        if width <= max_bases || headers.is_empty() {
            return Ok(None);
        }

        let mut level = 0usize;
        while level < headers.len() - 1 {
            if width as f64 / f64::from(headers[level].reduction_level) <= max_items as f64 {
                break;
            }
            level += 1;
        }
        Ok(Some(level))
    }
}
