//! Test support: an in-memory byte-range source and a builder for small
//! synthetic bigWig images. The builder writes bytes by hand, so decoding
//! is tested against an independent encoding of the format.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;

use bigwig_remote::utils::file::remote::{RangeSource, TransportError};

pub struct MockSource {
    pub data: Vec<u8>,
    pub fetches: Mutex<Vec<(u64, u64)>>,
}

impl MockSource {
    pub fn new(data: Vec<u8>) -> Arc<Self> {
        Arc::new(MockSource {
            data,
            fetches: Mutex::new(Vec::new()),
        })
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.lock().unwrap().len()
    }
}

#[async_trait]
impl RangeSource for MockSource {
    async fn fetch(&self, start: u64, end: u64) -> Result<Bytes, TransportError> {
        self.fetches.lock().unwrap().push((start, end));
        let end = (end as usize).min(self.data.len());
        Ok(Bytes::copy_from_slice(&self.data[start as usize..end]))
    }

    async fn size(&self) -> Result<u64, TransportError> {
        Ok(self.data.len() as u64)
    }
}

/// Byte writer honoring one endianness for every multi-byte value.
pub struct Writer {
    big: bool,
    pub buf: Vec<u8>,
}

impl Writer {
    pub fn new(big: bool) -> Self {
        Writer { big, buf: Vec::new() }
    }

    pub fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn u16(&mut self, v: u16) {
        let b = if self.big { v.to_be_bytes() } else { v.to_le_bytes() };
        self.buf.extend_from_slice(&b);
    }

    pub fn u32(&mut self, v: u32) {
        let b = if self.big { v.to_be_bytes() } else { v.to_le_bytes() };
        self.buf.extend_from_slice(&b);
    }

    pub fn u64(&mut self, v: u64) {
        let b = if self.big { v.to_be_bytes() } else { v.to_le_bytes() };
        self.buf.extend_from_slice(&b);
    }

    pub fn f32(&mut self, v: f32) {
        self.u32(v.to_bits());
    }

    pub fn f64(&mut self, v: f64) {
        self.u64(v.to_bits());
    }

    pub fn bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }
}

fn zlib(plain: &[u8]) -> Vec<u8> {
    let mut compressor = libdeflater::Compressor::new(libdeflater::CompressionLvl::default());
    let mut out = vec![0u8; compressor.zlib_compress_bound(plain.len())];
    let written = compressor.zlib_compress(plain, &mut out).unwrap();
    out.truncate(written);
    out
}

const BIGWIG_MAGIC: u32 = 0x888F_FC26;
const CHROM_TREE_MAGIC: u32 = 0x78CA_8C91;
const CIR_TREE_MAGIC: u32 = 0x2468_ACE0;

pub const CHROM_LENGTH: u32 = 1_000_000;
pub const REDUCTION_LEVEL: u32 = 1000;

/// The raw records in the fixture's full-resolution data, as
/// (start, end, value): three BedGraph records in one section, then three
/// fixed-step records (start 60000, step 10, span 5) in another.
pub const RAW_EXPECTED: &[(u32, u32, f32)] = &[
    (0, 10_000, 1.0),
    (10_000, 20_000, 2.0),
    (59_990, 60_000, 3.0),
    (60_000, 60_005, 4.0),
    (60_010, 60_015, 5.0),
    (60_020, 60_025, 6.0),
];

/// The fixture's zoom records for reduction level 1000, as
/// (start, end, valid_count, min, max, sum, sum_squares).
pub const ZOOM_EXPECTED: &[(u32, u32, u32, f32, f32, f32, f32)] = &[
    (0, 1000, 100, 0.5, 8.0, 400.0, 2500.0),
    (1000, 2000, 50, 1.0, 2.0, 75.0, 120.0),
];

/// Builds a complete single-chromosome bigWig image with one zoom level.
pub fn build_fixture(big: bool) -> Vec<u8> {
    // Section A: BedGraph run.
    let mut a = Writer::new(big);
    a.u32(0); // chrId
    a.u32(0); // start
    a.u32(60_000); // end
    a.u32(0); // itemStep
    a.u32(0); // itemSpan
    a.u8(1); // type: BedGraph
    a.u8(0);
    a.u16(3);
    for (start, end, value) in &RAW_EXPECTED[..3] {
        a.u32(*start);
        a.u32(*end);
        a.f32(*value);
    }
    let data_a = zlib(&a.buf);

    // Section B: fixed-step run deriving positions from the header.
    let mut b = Writer::new(big);
    b.u32(0);
    b.u32(60_000);
    b.u32(60_030);
    b.u32(10); // itemStep
    b.u32(5); // itemSpan
    b.u8(3); // type: fixed-step
    b.u8(0);
    b.u16(3);
    for (_, _, value) in &RAW_EXPECTED[3..] {
        b.f32(*value);
    }
    let data_b = zlib(&b.buf);

    // Zoom section: a headerless run of summary records.
    let mut z = Writer::new(big);
    for (start, end, valid, min, max, sum, sumsq) in ZOOM_EXPECTED {
        z.u32(0);
        z.u32(*start);
        z.u32(*end);
        z.u32(*valid);
        z.f32(*min);
        z.f32(*max);
        z.f32(*sum);
        z.f32(*sumsq);
    }
    let zoom_data = zlib(&z.buf);

    // Chromosome B+-tree: header plus one leaf node.
    let mut chroms = Writer::new(big);
    chroms.u32(CHROM_TREE_MAGIC);
    chroms.u32(1); // blockSize
    chroms.u32(8); // keySize
    chroms.u32(8); // valSize
    chroms.u64(1); // itemCount
    chroms.u64(0); // reserved
    chroms.u8(1); // isLeaf
    chroms.u8(0);
    chroms.u16(1); // count
    chroms.bytes(b"chr1\0\0\0\0");
    chroms.u32(0); // chrId
    chroms.u32(CHROM_LENGTH);

    let header_size = 64u64;
    let zoom_headers_size = 24u64;
    let summary_size = 40u64;
    let chrom_tree_offset = header_size + zoom_headers_size + summary_size;
    let total_summary_offset = header_size + zoom_headers_size;
    let full_data_offset = chrom_tree_offset + chroms.buf.len() as u64;
    let data_a_offset = full_data_offset;
    let data_b_offset = data_a_offset + data_a.len() as u64;
    let full_index_offset = data_b_offset + data_b.len() as u64;

    // Full-resolution R-tree: an internal root with two leaf-node children.
    let index = {
        let root_offset = full_index_offset + 48;
        let child1_offset = root_offset + 4 + 2 * 24;
        let child2_offset = child1_offset + 4 + 32;

        let mut w = Writer::new(big);
        w.u32(CIR_TREE_MAGIC);
        w.u32(2); // blockSize
        w.u64(6); // itemCount
        w.u32(0); // startChromIx
        w.u32(0); // startBase
        w.u32(0); // endChromIx
        w.u32(60_030); // endBase
        w.u64(0); // endFileOffset
        w.u32(3); // itemsPerSlot
        w.u32(0); // reserved

        // Root: internal, two items.
        w.u8(0);
        w.u8(0);
        w.u16(2);
        w.u32(0);
        w.u32(0);
        w.u32(0);
        w.u32(60_000);
        w.u64(child1_offset);
        w.u32(0);
        w.u32(60_000);
        w.u32(0);
        w.u32(60_030);
        w.u64(child2_offset);

        // Child 1: leaf holding section A.
        w.u8(1);
        w.u8(0);
        w.u16(1);
        w.u32(0);
        w.u32(0);
        w.u32(0);
        w.u32(60_000);
        w.u64(data_a_offset);
        w.u64(data_a.len() as u64);

        // Child 2: leaf holding section B.
        w.u8(1);
        w.u8(0);
        w.u16(1);
        w.u32(0);
        w.u32(60_000);
        w.u32(0);
        w.u32(60_030);
        w.u64(data_b_offset);
        w.u64(data_b.len() as u64);

        w.buf
    };

    let zoom_data_offset = full_index_offset + index.len() as u64;
    let zoom_index_offset = zoom_data_offset + zoom_data.len() as u64;

    // Zoom R-tree: a single leaf node directly under the header.
    let zoom_index = {
        let mut w = Writer::new(big);
        w.u32(CIR_TREE_MAGIC);
        w.u32(1);
        w.u64(2);
        w.u32(0);
        w.u32(0);
        w.u32(0);
        w.u32(2000);
        w.u64(0);
        w.u32(2);
        w.u32(0);

        w.u8(1);
        w.u8(0);
        w.u16(1);
        w.u32(0);
        w.u32(0);
        w.u32(0);
        w.u32(2000);
        w.u64(zoom_data_offset);
        w.u64(zoom_data.len() as u64);

        w.buf
    };

    // Main header, now that every offset is known.
    let mut out = Writer::new(big);
    out.u32(BIGWIG_MAGIC);
    out.u16(4); // version
    out.u16(1); // zoomLevels
    out.u64(chrom_tree_offset);
    out.u64(full_data_offset);
    out.u64(full_index_offset);
    out.u16(0); // fieldCount
    out.u16(0); // definedFieldCount
    out.u64(0); // autoSqlOffset
    out.u64(total_summary_offset);
    out.u32(4096); // uncompressedBufSize
    out.u64(0); // reserved

    // Zoom header for the single level.
    out.u32(REDUCTION_LEVEL);
    out.u32(0);
    out.u64(zoom_data_offset);
    out.u64(zoom_index_offset);

    // Total summary.
    out.u64(120_000); // basesCovered
    out.f64(0.5);
    out.f64(8.0);
    out.f64(475.0);
    out.f64(2620.0);

    out.bytes(&chroms.buf);
    out.bytes(&data_a);
    out.bytes(&data_b);
    out.bytes(&index);
    out.bytes(&zoom_data);
    out.bytes(&zoom_index);

    assert_eq!(out.buf.len() as u64, zoom_index_offset + zoom_index.len() as u64);
    out.buf
}
