//! Typed views of the file-level structures: the main header, the
//! per-zoom-level headers, and the total summary. Each carries its
//! declarative layout and a tagged constructor over the generic decoder.

use byteordered::Endianness;

use crate::bbi::codec::{self, field, DecodeError, Field};
use crate::bbi::BIGWIG_MAGIC;

/// The fixed-size header at offset 0 of a bigWig file.
///
/// The magic encodes the file's endianness, which is resolved exactly once
/// here and propagated to every later decode. Internal file offsets are not
/// public; data is reached through the query API.
#[derive(Copy, Clone, Debug)]
pub struct Header {
    pub endianness: Endianness,
    pub version: u16,
    pub zoom_levels: u16,
    pub field_count: u16,
    pub defined_field_count: u16,

    pub(crate) chrom_tree_offset: u64,
    pub(crate) full_data_offset: u64,
    pub(crate) full_index_offset: u64,
    pub(crate) auto_sql_offset: u64,
    pub(crate) total_summary_offset: u64,
    pub(crate) uncompress_buf_size: u32,
}

const HEADER_LAYOUT: &[Field] = &[
    field("magic", 4),
    field("version", 2),
    field("zoomLevels", 2),
    field("chromosomeTreeOffset", 8),
    field("fullDataOffset", 8),
    field("fullIndexOffset", 8),
    field("fieldCount", 2),
    field("definedFieldCount", 2),
    field("autoSqlOffset", 8),
    field("totalSummaryOffset", 8),
    field("uncompressedBufSize", 4),
    field("reserved", 8),
];

impl Header {
    pub(crate) fn disk_size() -> usize {
        codec::layout_size(HEADER_LAYOUT)
    }

    /// Decodes the header, resolving endianness from the magic. The raw
    /// first word is read big-endian; a byte-swapped match means the file
    /// is little-endian.
    pub(crate) fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() < 4 {
            return Err(DecodeError::ShortBuffer {
                needed: 4,
                available: data.len(),
            });
        }
        let raw_magic = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        let endianness = if raw_magic == BIGWIG_MAGIC {
            Endianness::Big
        } else if raw_magic.swap_bytes() == BIGWIG_MAGIC {
            Endianness::Little
        } else {
            return Err(DecodeError::BadMagic(raw_magic));
        };

        let f = codec::decode(HEADER_LAYOUT, data, endianness)?;
        Ok(Header {
            endianness,
            version: f.u16("version")?,
            zoom_levels: f.u16("zoomLevels")?,
            chrom_tree_offset: f.uint("chromosomeTreeOffset")?,
            full_data_offset: f.uint("fullDataOffset")?,
            full_index_offset: f.uint("fullIndexOffset")?,
            field_count: f.u16("fieldCount")?,
            defined_field_count: f.u16("definedFieldCount")?,
            auto_sql_offset: f.uint("autoSqlOffset")?,
            total_summary_offset: f.uint("totalSummaryOffset")?,
            uncompress_buf_size: f.u32("uncompressedBufSize")?,
        })
    }
}

/// Info on one zoom level: how many bases each record of that level
/// summarizes, and where its data and index sections live.
#[derive(Copy, Clone, Debug)]
pub struct ZoomHeader {
    pub reduction_level: u32,
    pub(crate) data_offset: u64,
    pub(crate) index_offset: u64,
}

const ZOOM_HEADER_LAYOUT: &[Field] = &[
    field("reductionLevel", 4),
    field("reserved", 4),
    field("dataOffset", 8),
    field("indexOffset", 8),
];

impl ZoomHeader {
    pub(crate) fn disk_size() -> usize {
        codec::layout_size(ZOOM_HEADER_LAYOUT)
    }

    pub(crate) fn decode(data: &[u8], endianness: Endianness) -> Result<Self, DecodeError> {
        let f = codec::decode(ZOOM_HEADER_LAYOUT, data, endianness)?;
        Ok(ZoomHeader {
            reduction_level: f.u32("reductionLevel")?,
            data_offset: f.uint("dataOffset")?,
            index_offset: f.uint("indexOffset")?,
        })
    }
}

/// Aggregate statistics over all the data in the file.
#[derive(Copy, Clone, Debug)]
pub struct Summary {
    pub bases_covered: u64,
    pub min_val: f64,
    pub max_val: f64,
    pub sum: f64,
    pub sum_squares: f64,
}

const SUMMARY_LAYOUT: &[Field] = &[
    field("basesCovered", 8),
    field("minVal", -8),
    field("maxVal", -8),
    field("sumData", -8),
    field("sumSquares", -8),
];

impl Summary {
    pub(crate) fn disk_size() -> usize {
        codec::layout_size(SUMMARY_LAYOUT)
    }

    pub(crate) fn decode(data: &[u8], endianness: Endianness) -> Result<Self, DecodeError> {
        let f = codec::decode(SUMMARY_LAYOUT, data, endianness)?;
        Ok(Summary {
            bases_covered: f.uint("basesCovered")?,
            min_val: f.float("minVal")?,
            max_val: f.float("maxVal")?,
            sum: f.float("sumData")?,
            sum_squares: f.float("sumSquares")?,
        })
    }
}

/// The 4-byte node header shared by the chromosome B+-tree and the R-tree:
/// a leaf flag, a reserved byte, and the item count.
#[derive(Copy, Clone, Debug)]
pub(crate) struct TreeNodeHeader {
    pub is_leaf: bool,
    pub count: u16,
}

const TREE_NODE_LAYOUT: &[Field] = &[field("isLeaf", 1), field("reserved", 1), field("count", 2)];

impl TreeNodeHeader {
    pub(crate) fn disk_size() -> usize {
        codec::layout_size(TREE_NODE_LAYOUT)
    }

    pub(crate) fn decode(data: &[u8], endianness: Endianness) -> Result<Self, DecodeError> {
        let f = codec::decode(TREE_NODE_LAYOUT, data, endianness)?;
        Ok(TreeNodeHeader {
            is_leaf: f.u8("isLeaf")? == 1,
            count: f.u16("count")?,
        })
    }
}
