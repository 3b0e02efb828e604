pub(crate) mod chrom_tree;
pub(crate) mod codec;
pub(crate) mod file;
pub(crate) mod index_tree;
pub(crate) mod models;
pub(crate) mod reader;
pub(crate) mod records;
pub(crate) mod sections;

pub(crate) const BIGWIG_MAGIC: u32 = 0x888F_FC26;

pub(crate) const CIR_TREE_MAGIC: u32 = 0x2468_ACE0;
pub(crate) const CHROM_TREE_MAGIC: u32 = 0x78CA_8C91;

pub use chrom_tree::{ChromLeaf, ChromRef, ChromTree};
pub use codec::DecodeError;
pub use file::{BigWigError, BigWigFile, GenomicRange, ZoomQuery};
pub use index_tree::{IndexTree, IndexTreeNode};
pub use models::{Header, Summary, ZoomHeader};
pub use records::{Aggregate, DataRecord};
pub use sections::{RawRecord, SectionHeader, ZoomRecord};
