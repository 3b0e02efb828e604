//! Decoding of leaf data sections: zlib-inflated blocks holding either a
//! section header followed by a run of raw records (BedGraph,
//! variable-step or fixed-step), or a headerless run of pre-aggregated
//! zoom-summary records.

use byteordered::Endianness;
use thiserror::Error;

use crate::bbi::codec::{self, field, DecodeError, Field};

#[derive(Debug, Error)]
pub(crate) enum SectionDecodeError {
    #[error("unsupported data record type {0}")]
    UnsupportedRecordType(u8),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// The header in front of a raw (full-resolution) data section.
#[derive(Copy, Clone, Debug)]
pub struct SectionHeader {
    pub chrom_id: u32,
    pub start: u32,
    pub end: u32,
    pub item_step: u32,
    pub item_span: u32,
    pub record_type: u8,
    pub item_count: u16,
}

const SECTION_HEADER_LAYOUT: &[Field] = &[
    field("chrId", 4),
    field("start", 4),
    field("end", 4),
    field("itemStep", 4),
    field("itemSpan", 4),
    field("type", 1),
    field("reserved", 1),
    field("itemCount", 2),
];

const BEDGRAPH_LAYOUT: &[Field] = &[
    field("chromStart", 4),
    field("chromEnd", 4),
    field("value", -4),
];

const VARIABLE_STEP_LAYOUT: &[Field] = &[field("chromStart", 4), field("value", -4)];

const FIXED_STEP_LAYOUT: &[Field] = &[field("value", -4)];

const ZOOM_RECORD_LAYOUT: &[Field] = &[
    field("chrId", 4),
    field("start", 4),
    field("end", 4),
    field("validCount", 4),
    field("minVal", -4),
    field("maxVal", -4),
    field("sumData", -4),
    field("sumSquares", -4),
];

impl SectionHeader {
    pub(crate) fn disk_size() -> usize {
        codec::layout_size(SECTION_HEADER_LAYOUT)
    }

    pub(crate) fn decode(data: &[u8], endianness: Endianness) -> Result<Self, DecodeError> {
        let f = codec::decode(SECTION_HEADER_LAYOUT, data, endianness)?;
        Ok(SectionHeader {
            chrom_id: f.u32("chrId")?,
            start: f.u32("start")?,
            end: f.u32("end")?,
            item_step: f.u32("itemStep")?,
            item_span: f.u32("itemSpan")?,
            record_type: f.u8("type")?,
            item_count: f.u16("itemCount")?,
        })
    }
}

/// One physical record of a raw data section. Variable- and fixed-step
/// variants omit positions the section header derives for them.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum RawRecord {
    BedGraph { start: u32, end: u32, value: f32 },
    VariableStep { start: u32, value: f32 },
    FixedStep { value: f32 },
}

/// One pre-aggregated zoom-summary record.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ZoomRecord {
    pub chrom_id: u32,
    pub start: u32,
    pub end: u32,
    pub valid_count: u32,
    pub min_val: f64,
    pub max_val: f64,
    pub sum: f64,
    pub sum_squares: f64,
}

impl ZoomRecord {
    pub(crate) fn disk_size() -> usize {
        codec::layout_size(ZOOM_RECORD_LAYOUT)
    }
}

/// Inflates a compressed data block. A zero `uncompress_buf_size` in the
/// file header means sections are stored uncompressed.
pub(crate) fn inflate(data: &[u8], uncompress_buf_size: u32) -> Result<Vec<u8>, DecodeError> {
    if uncompress_buf_size == 0 {
        return Ok(data.to_vec());
    }
    let mut decompressor = libdeflater::Decompressor::new();
    let mut out = vec![0u8; uncompress_buf_size as usize];
    let written = decompressor
        .zlib_decompress(data, &mut out)
        .map_err(|e| DecodeError::InvalidFile(format!("zlib inflate failed: {e}")))?;
    out.truncate(written);
    Ok(out)
}

/// Decodes an inflated raw data section: the section header, then
/// `itemCount` records laid out according to the header's type tag.
pub(crate) fn decode_data_section(
    plain: &[u8],
    endianness: Endianness,
) -> Result<(SectionHeader, Vec<RawRecord>), SectionDecodeError> {
    let header = SectionHeader::decode(plain, endianness)?;
    let layout: &[Field] = match header.record_type {
        1 => BEDGRAPH_LAYOUT,
        2 => VARIABLE_STEP_LAYOUT,
        3 => FIXED_STEP_LAYOUT,
        t => return Err(SectionDecodeError::UnsupportedRecordType(t)),
    };
    let record_size = codec::layout_size(layout);
    let body = &plain[SectionHeader::disk_size()..];

    let mut records = Vec::with_capacity(header.item_count as usize);
    for i in 0..header.item_count as usize {
        let chunk = body
            .get(i * record_size..(i + 1) * record_size)
            .ok_or(DecodeError::ShortBuffer {
                needed: SectionHeader::disk_size() + (i + 1) * record_size,
                available: plain.len(),
            })?;
        let f = codec::decode(layout, chunk, endianness)?;
        let record = match header.record_type {
            1 => RawRecord::BedGraph {
                start: f.u32("chromStart")?,
                end: f.u32("chromEnd")?,
                value: f.float("value")? as f32,
            },
            2 => RawRecord::VariableStep {
                start: f.u32("chromStart")?,
                value: f.float("value")? as f32,
            },
            _ => RawRecord::FixedStep {
                value: f.float("value")? as f32,
            },
        };
        records.push(record);
    }
    Ok((header, records))
}

/// Decodes an inflated zoom data section: a flat run of fixed-size
/// zoom-summary records with no header.
pub(crate) fn decode_zoom_section(
    plain: &[u8],
    endianness: Endianness,
) -> Result<Vec<ZoomRecord>, SectionDecodeError> {
    let record_size = ZoomRecord::disk_size();
    if plain.len() % record_size != 0 {
        return Err(SectionDecodeError::Decode(DecodeError::InvalidFile(
            format!("zoom section length {} is not a record multiple", plain.len()),
        )));
    }

    let count = plain.len() / record_size;
    let mut records = Vec::with_capacity(count);
    for i in 0..count {
        let chunk = &plain[i * record_size..(i + 1) * record_size];
        let f = codec::decode(ZOOM_RECORD_LAYOUT, chunk, endianness)?;
        records.push(ZoomRecord {
            chrom_id: f.u32("chrId")?,
            start: f.u32("start")?,
            end: f.u32("end")?,
            valid_count: f.u32("validCount")?,
            min_val: f.float("minVal")?,
            max_val: f.float("maxVal")?,
            sum: f.float("sumData")?,
            sum_squares: f.float("sumSquares")?,
        });
    }
    Ok(records)
}
