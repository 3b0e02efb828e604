//! Low-level readers, one per on-disk structure. Every method fetches the
//! byte range it needs through the block cache and hands the bytes to the
//! matching decode routine; nothing here is memoized, that is the
//! orchestrator's job.

use futures::future::{try_join_all, BoxFuture, FutureExt};
use tracing::debug;

use crate::bbi::chrom_tree::{
    decode_chrom_tree_items, ChromNode, ChromTree, ChromTreeHeader, ChromTreeItem,
};
use crate::bbi::file::BigWigError;
use crate::bbi::index_tree::{decode_index_node_items, IndexTree, IndexTreeNode, RTreeHeader};
use crate::bbi::models::{Header, Summary, TreeNodeHeader, ZoomHeader};
use crate::bbi::sections::{self, RawRecord, SectionHeader, ZoomRecord};
use crate::utils::file::range_cache::RangeCache;
use crate::utils::file::remote::RangeSource;

pub(crate) struct BigWigReader<R> {
    cache: RangeCache<R>,
}

impl<R: RangeSource> BigWigReader<R> {
    pub fn new(cache: RangeCache<R>) -> Self {
        BigWigReader { cache }
    }

    pub async fn read_header(&self) -> Result<Header, BigWigError> {
        let buf = self.cache.fetch(0, Header::disk_size() as u64).await?;
        Ok(Header::decode(&buf)?)
    }

    /// Reads the zoom headers that immediately follow the main header, in
    /// file order.
    pub async fn read_zoom_headers(&self, header: &Header) -> Result<Vec<ZoomHeader>, BigWigError> {
        let count = header.zoom_levels as u64;
        if count == 0 {
            return Ok(Vec::new());
        }
        let start = Header::disk_size() as u64;
        let size = ZoomHeader::disk_size() as u64;
        let buf = self.cache.fetch(start, start + count * size).await?;

        let mut headers = Vec::with_capacity(count as usize);
        for i in 0..count as usize {
            headers.push(ZoomHeader::decode(
                &buf[i * size as usize..],
                header.endianness,
            )?);
        }
        Ok(headers)
    }

    /// Reads the file-wide summary. Version-1 files have none; all-zero
    /// statistics are returned for them.
    pub async fn read_total_summary(&self, header: &Header) -> Result<Summary, BigWigError> {
        if header.total_summary_offset == 0 {
            return Ok(Summary {
                bases_covered: 0,
                min_val: 0.0,
                max_val: 0.0,
                sum: 0.0,
                sum_squares: 0.0,
            });
        }
        let offset = header.total_summary_offset;
        let buf = self
            .cache
            .fetch(offset, offset + Summary::disk_size() as u64)
            .await?;
        Ok(Summary::decode(&buf, header.endianness)?)
    }

    /// Parses the chromosome B+-tree into a fully materialized directory.
    pub async fn read_chrom_tree(&self, header: &Header) -> Result<ChromTree, BigWigError> {
        let offset = header.chrom_tree_offset;
        let buf = self
            .cache
            .fetch(offset, offset + ChromTreeHeader::disk_size() as u64)
            .await?;
        let tree_header = ChromTreeHeader::decode(&buf, header.endianness)?;
        debug!(
            chromosomes = tree_header.item_count,
            key_size = tree_header.key_size,
            "reading chromosome tree"
        );
        let root = self
            .read_chrom_node(
                header,
                &tree_header,
                offset + ChromTreeHeader::disk_size() as u64,
            )
            .await?;
        Ok(ChromTree::new(root))
    }

    /// Reads one chromosome-tree node and, for internal nodes, all of its
    /// children concurrently. Item reads are sized from the node's own
    /// declared count, not the tree-wide block size.
    fn read_chrom_node<'a>(
        &'a self,
        header: &'a Header,
        tree_header: &'a ChromTreeHeader,
        offset: u64,
    ) -> BoxFuture<'a, Result<ChromNode, BigWigError>> {
        async move {
            let node_size = TreeNodeHeader::disk_size() as u64;
            let node_buf = self.cache.fetch(offset, offset + node_size).await?;
            let node = TreeNodeHeader::decode(&node_buf, header.endianness)?;

            let items = if node.count == 0 {
                Vec::new()
            } else {
                let item_size = u64::from(tree_header.key_size) + 8;
                let items_start = offset + node_size;
                let items_buf = self
                    .cache
                    .fetch(items_start, items_start + item_size * u64::from(node.count))
                    .await?;
                decode_chrom_tree_items(
                    &items_buf,
                    tree_header.key_size,
                    node.is_leaf,
                    node.count,
                    header.endianness,
                )?
            };

            if node.is_leaf {
                let children = items
                    .into_iter()
                    .map(|item| match item {
                        ChromTreeItem::Leaf(leaf) => ChromNode::Leaf(leaf),
                        ChromTreeItem::Internal { .. } => {
                            unreachable!("leaf node decoded an internal item")
                        }
                    })
                    .collect();
                Ok(ChromNode::Internal { children })
            } else {
                let offsets: Vec<u64> = items
                    .into_iter()
                    .map(|item| match item {
                        ChromTreeItem::Internal { child_offset } => child_offset,
                        ChromTreeItem::Leaf(_) => {
                            unreachable!("internal node decoded a leaf item")
                        }
                    })
                    .collect();
                let children = try_join_all(
                    offsets
                        .into_iter()
                        .map(|o| self.read_chrom_node(header, tree_header, o)),
                )
                .await?;
                Ok(ChromNode::Internal { children })
            }
        }
        .boxed()
    }

    /// Reads the R-tree header at `offset` and returns a tree whose root
    /// covers the header's bounding interval, children not yet resolved.
    pub async fn read_rooted_index(
        &self,
        header: &Header,
        offset: u64,
    ) -> Result<IndexTree, BigWigError> {
        let buf = self
            .cache
            .fetch(offset, offset + RTreeHeader::disk_size() as u64)
            .await?;
        let rtree = RTreeHeader::decode(&buf, header.endianness)?;
        debug!(offset, items = rtree.item_count, "reading index tree root");
        let root_offset = offset + RTreeHeader::disk_size() as u64;
        Ok(IndexTree::new(IndexTreeNode::internal(
            (
                rtree.start_chrom,
                rtree.start_base,
                rtree.end_chrom,
                rtree.end_base,
            ),
            root_offset,
        )))
    }

    /// Reads one R-tree node block: its 4-byte header, then its items,
    /// sized by the declared count and leaf flag.
    pub async fn read_index_node(
        &self,
        header: &Header,
        offset: u64,
    ) -> Result<Vec<IndexTreeNode>, BigWigError> {
        let node_size = TreeNodeHeader::disk_size() as u64;
        let node_buf = self.cache.fetch(offset, offset + node_size).await?;
        let node = TreeNodeHeader::decode(&node_buf, header.endianness)?;
        if node.count == 0 {
            return Ok(Vec::new());
        }

        let item_size = if node.is_leaf {
            RTreeHeader::leaf_item_size()
        } else {
            RTreeHeader::internal_item_size()
        } as u64;
        let items_start = offset + node_size;
        let items_buf = self
            .cache
            .fetch(items_start, items_start + item_size * u64::from(node.count))
            .await?;
        Ok(decode_index_node_items(
            &items_buf,
            node.is_leaf,
            node.count,
            header.endianness,
        )?)
    }

    /// Fetches and inflates a leaf's data section, returning its header
    /// and raw records.
    pub async fn read_data_section(
        &self,
        header: &Header,
        data_offset: u64,
        data_size: u64,
    ) -> Result<(SectionHeader, Vec<RawRecord>), BigWigError> {
        let raw = self.cache.fetch(data_offset, data_offset + data_size).await?;
        let plain = sections::inflate(&raw, header.uncompress_buf_size)?;
        Ok(sections::decode_data_section(&plain, header.endianness)?)
    }

    /// Fetches and inflates a zoom leaf's section, a headerless run of
    /// zoom-summary records.
    pub async fn read_zoom_section(
        &self,
        header: &Header,
        data_offset: u64,
        data_size: u64,
    ) -> Result<Vec<ZoomRecord>, BigWigError> {
        let raw = self.cache.fetch(data_offset, data_offset + data_size).await?;
        let plain = sections::inflate(&raw, header.uncompress_buf_size)?;
        Ok(sections::decode_zoom_section(&plain, header.endianness)?)
    }
}
