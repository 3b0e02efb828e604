//! The spatial index: an on-disk R-tree over (chromosome id, base) bounding
//! intervals, materialized lazily in memory. Children of a node are `None`
//! until their block has been fetched; a leaf's decoded records are `None`
//! until its data section has been resolved. Queries prune whole subtrees
//! whose bounding interval cannot overlap, comparing chromosome-major then
//! base-minor under half-open semantics.

use byteordered::Endianness;
use smallvec::SmallVec;

use crate::bbi::codec::{self, field, DecodeError, Field};
use crate::bbi::records::DataRecord;
use crate::bbi::CIR_TREE_MAGIC;

/// A fully resolved query range: numeric chromosome id plus a half-open
/// base-pair interval.
#[derive(Copy, Clone, Debug)]
pub(crate) struct QueryBounds {
    pub chrom: u32,
    pub start: u32,
    pub end: u32,
}

/// The fixed header in front of an on-disk R-tree. Only the overall
/// bounding interval and item count are kept; the block-shape fields are
/// validated away, since node reads are sized from each node's own count.
#[derive(Copy, Clone, Debug)]
pub(crate) struct RTreeHeader {
    pub item_count: u64,
    pub start_chrom: u32,
    pub start_base: u32,
    pub end_chrom: u32,
    pub end_base: u32,
}

const RTREE_HEADER_LAYOUT: &[Field] = &[
    field("magic", 4),
    field("blockSize", 4),
    field("itemCount", 8),
    field("startChromIx", 4),
    field("startBase", 4),
    field("endChromIx", 4),
    field("endBase", 4),
    field("endFileOffset", 8),
    field("itemsPerSlot", 4),
    field("reserved", 4),
];

const RTREE_INTERNAL_ITEM_LAYOUT: &[Field] = &[
    field("startChromIx", 4),
    field("startBase", 4),
    field("endChromIx", 4),
    field("endBase", 4),
    field("childOffset", 8),
];

const RTREE_LEAF_ITEM_LAYOUT: &[Field] = &[
    field("startChromIx", 4),
    field("startBase", 4),
    field("endChromIx", 4),
    field("endBase", 4),
    field("dataOffset", 8),
    field("dataSize", 8),
];

impl RTreeHeader {
    pub(crate) fn disk_size() -> usize {
        codec::layout_size(RTREE_HEADER_LAYOUT)
    }

    pub(crate) fn decode(data: &[u8], endianness: Endianness) -> Result<Self, DecodeError> {
        let f = codec::decode(RTREE_HEADER_LAYOUT, data, endianness)?;
        if f.u32("magic")? != CIR_TREE_MAGIC {
            return Err(DecodeError::InvalidFile("bad R-tree magic".to_owned()));
        }
        Ok(RTreeHeader {
            item_count: f.uint("itemCount")?,
            start_chrom: f.u32("startChromIx")?,
            start_base: f.u32("startBase")?,
            end_chrom: f.u32("endChromIx")?,
            end_base: f.u32("endBase")?,
        })
    }

    pub(crate) fn internal_item_size() -> usize {
        codec::layout_size(RTREE_INTERNAL_ITEM_LAYOUT)
    }

    pub(crate) fn leaf_item_size() -> usize {
        codec::layout_size(RTREE_LEAF_ITEM_LAYOUT)
    }
}

/// One node of the in-memory index tree.
#[derive(Clone, Debug)]
pub struct IndexTreeNode {
    pub is_leaf: bool,
    pub start_chrom: u32,
    pub start_base: u32,
    pub end_chrom: u32,
    pub end_base: u32,
    /// For internal nodes the file offset of the child block; for leaves
    /// the file offset of the compressed data section.
    pub(crate) data_offset: u64,
    pub(crate) data_size: u64,
    pub(crate) children: Option<Vec<IndexTreeNode>>,
    pub(crate) data_records: Option<Vec<DataRecord>>,
}

impl IndexTreeNode {
    pub(crate) fn internal(
        bounds: (u32, u32, u32, u32),
        child_offset: u64,
    ) -> IndexTreeNode {
        IndexTreeNode {
            is_leaf: false,
            start_chrom: bounds.0,
            start_base: bounds.1,
            end_chrom: bounds.2,
            end_base: bounds.3,
            data_offset: child_offset,
            data_size: 0,
            children: None,
            data_records: None,
        }
    }

    pub(crate) fn leaf(
        bounds: (u32, u32, u32, u32),
        data_offset: u64,
        data_size: u64,
    ) -> IndexTreeNode {
        IndexTreeNode {
            is_leaf: true,
            start_chrom: bounds.0,
            start_base: bounds.1,
            end_chrom: bounds.2,
            end_base: bounds.3,
            data_offset,
            data_size,
            children: None,
            data_records: None,
        }
    }

    /// Whether this node's bounding interval can overlap the query, under
    /// chromosome-major, base-minor, half-open ordering.
    pub(crate) fn overlaps(&self, q: &QueryBounds) -> bool {
        if self.end_chrom < q.chrom || self.start_chrom > q.chrom {
            return false;
        }
        if self.start_chrom == q.chrom && self.start_base >= q.end {
            return false;
        }
        if self.end_chrom == q.chrom && self.end_base <= q.start {
            return false;
        }
        true
    }
}

/// Pending resolution work found by walking the tree for a query: internal
/// frontier nodes whose child blocks are unread, and leaves whose data
/// sections are undecoded. Paths address nodes by child index from the root.
#[derive(Debug, Default)]
pub(crate) struct UnresolvedWork {
    pub nodes: Vec<(SmallVec<[usize; 8]>, u64)>,
    pub leaves: Vec<(SmallVec<[usize; 8]>, u64, u64)>,
}

/// A lazily materialized index tree, one per zoom level plus one for
/// full-resolution data.
#[derive(Clone, Debug)]
pub struct IndexTree {
    pub(crate) root: IndexTreeNode,
}

impl IndexTree {
    pub(crate) fn new(root: IndexTreeNode) -> Self {
        IndexTree { root }
    }

    /// Depth-first traversal. `visit` returning `true` prunes the subtree
    /// rooted at that node.
    pub(crate) fn dfs<'a>(&'a self, visit: &mut impl FnMut(&'a IndexTreeNode) -> bool) {
        fn walk<'a>(
            node: &'a IndexTreeNode,
            visit: &mut impl FnMut(&'a IndexTreeNode) -> bool,
        ) {
            if visit(node) {
                return;
            }
            if let Some(children) = &node.children {
                for child in children {
                    walk(child, visit);
                }
            }
        }
        walk(&self.root, visit);
    }

    /// All frontier nodes overlapping `range`: resolved leaves as well as
    /// nodes whose children have not been fetched yet. With no range, the
    /// whole frontier is returned.
    pub(crate) fn query(&self, range: Option<&QueryBounds>) -> Vec<&IndexTreeNode> {
        let mut out = Vec::new();
        self.dfs(&mut |node| {
            if let Some(q) = range {
                if !node.overlaps(q) {
                    return true;
                }
            }
            if node.children.is_none() {
                out.push(node);
            }
            false
        });
        out
    }

    /// Collects the unresolved work overlapping `range`.
    pub(crate) fn collect_unresolved(&self, range: Option<&QueryBounds>) -> UnresolvedWork {
        let mut work = UnresolvedWork::default();
        fn walk(
            node: &IndexTreeNode,
            path: &mut SmallVec<[usize; 8]>,
            range: Option<&QueryBounds>,
            work: &mut UnresolvedWork,
        ) {
            if let Some(q) = range {
                if !node.overlaps(q) {
                    return;
                }
            }
            match &node.children {
                Some(children) => {
                    for (i, child) in children.iter().enumerate() {
                        path.push(i);
                        walk(child, path, range, work);
                        path.pop();
                    }
                }
                None => {
                    if node.is_leaf {
                        if node.data_records.is_none() {
                            work.leaves
                                .push((path.clone(), node.data_offset, node.data_size));
                        }
                    } else {
                        work.nodes.push((path.clone(), node.data_offset));
                    }
                }
            }
        }
        let mut path = SmallVec::new();
        walk(&self.root, &mut path, range, &mut work);
        work
    }

    pub(crate) fn node_at_mut(&mut self, path: &[usize]) -> &mut IndexTreeNode {
        let mut node = &mut self.root;
        for &i in path {
            node = &mut node
                .children
                .as_mut()
                .expect("path descends through resolved nodes")[i];
        }
        node
    }
}

/// Decodes the `count` fixed-size items following an R-tree node header
/// into unresolved in-memory nodes.
pub(crate) fn decode_index_node_items(
    data: &[u8],
    is_leaf: bool,
    count: u16,
    endianness: Endianness,
) -> Result<Vec<IndexTreeNode>, DecodeError> {
    let item_size = if is_leaf {
        RTreeHeader::leaf_item_size()
    } else {
        RTreeHeader::internal_item_size()
    };

    let mut nodes = Vec::with_capacity(count as usize);
    for i in 0..count as usize {
        let chunk = data
            .get(i * item_size..(i + 1) * item_size)
            .ok_or(DecodeError::ShortBuffer {
                needed: (i + 1) * item_size,
                available: data.len(),
            })?;
        let node = if is_leaf {
            let f = codec::decode(RTREE_LEAF_ITEM_LAYOUT, chunk, endianness)?;
            IndexTreeNode::leaf(
                (
                    f.u32("startChromIx")?,
                    f.u32("startBase")?,
                    f.u32("endChromIx")?,
                    f.u32("endBase")?,
                ),
                f.uint("dataOffset")?,
                f.uint("dataSize")?,
            )
        } else {
            let f = codec::decode(RTREE_INTERNAL_ITEM_LAYOUT, chunk, endianness)?;
            IndexTreeNode::internal(
                (
                    f.u32("startChromIx")?,
                    f.u32("startBase")?,
                    f.u32("endChromIx")?,
                    f.u32("endBase")?,
                ),
                f.uint("childOffset")?,
            )
        };
        nodes.push(node);
    }
    Ok(nodes)
}
