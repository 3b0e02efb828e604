//! The chromosome directory: the file's B+-tree mapping chromosome names
//! to numeric ids and lengths, fully materialized at initialization.
//! Lookup indices by id and by name are built lazily on first access and
//! memoized; chromosome counts are modest, so the whole tree is kept.

use std::collections::HashMap;
use std::sync::OnceLock;

use byteordered::Endianness;

use crate::bbi::codec::{self, field, DecodeError, Field};
use crate::bbi::CHROM_TREE_MAGIC;

/// One chromosome: its name, numeric id, and length in bases.
#[derive(Clone, Debug, PartialEq)]
pub struct ChromLeaf {
    pub name: String,
    pub id: u32,
    pub length: u32,
}

/// A node of the parsed directory tree. Internal nodes hold only children.
#[derive(Clone, Debug)]
pub(crate) enum ChromNode {
    Internal { children: Vec<ChromNode> },
    Leaf(ChromLeaf),
}

/// A chromosome reference, by name or by numeric id.
#[derive(Clone, Debug, PartialEq)]
pub enum ChromRef {
    Name(String),
    Id(u32),
}

impl From<&str> for ChromRef {
    fn from(name: &str) -> Self {
        ChromRef::Name(name.to_owned())
    }
}

impl From<String> for ChromRef {
    fn from(name: String) -> Self {
        ChromRef::Name(name)
    }
}

impl From<u32> for ChromRef {
    fn from(id: u32) -> Self {
        ChromRef::Id(id)
    }
}

impl std::fmt::Display for ChromRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChromRef::Name(name) => f.write_str(name),
            ChromRef::Id(id) => write!(f, "#{}", id),
        }
    }
}

/// The in-memory chromosome directory.
#[derive(Debug)]
pub struct ChromTree {
    root: ChromNode,
    by_id: OnceLock<HashMap<u32, ChromLeaf>>,
    by_name: OnceLock<HashMap<String, ChromLeaf>>,
}

impl ChromTree {
    pub(crate) fn new(root: ChromNode) -> Self {
        ChromTree {
            root,
            by_id: OnceLock::new(),
            by_name: OnceLock::new(),
        }
    }

    pub fn leaf(&self, chrom: &ChromRef) -> Option<&ChromLeaf> {
        match chrom {
            ChromRef::Name(name) => self.leaf_by_name(name),
            ChromRef::Id(id) => self.leaf_by_id(*id),
        }
    }

    pub fn leaf_by_id(&self, id: u32) -> Option<&ChromLeaf> {
        self.by_id
            .get_or_init(|| {
                let mut map = HashMap::new();
                Self::dfs(&self.root, &mut |leaf| {
                    map.insert(leaf.id, leaf.clone());
                });
                map
            })
            .get(&id)
    }

    pub fn leaf_by_name(&self, name: &str) -> Option<&ChromLeaf> {
        self.by_name
            .get_or_init(|| {
                let mut map = HashMap::new();
                Self::dfs(&self.root, &mut |leaf| {
                    map.insert(leaf.name.clone(), leaf.clone());
                });
                map
            })
            .get(name)
    }

    /// All chromosomes, in depth-first (on-disk) order.
    pub fn leaves(&self) -> Vec<&ChromLeaf> {
        let mut out = Vec::new();
        let mut stack = vec![&self.root];
        while let Some(node) = stack.pop() {
            match node {
                ChromNode::Leaf(leaf) => out.push(leaf),
                ChromNode::Internal { children } => stack.extend(children.iter().rev()),
            }
        }
        out
    }

    fn dfs(node: &ChromNode, visit: &mut impl FnMut(&ChromLeaf)) {
        match node {
            ChromNode::Leaf(leaf) => visit(leaf),
            ChromNode::Internal { children } => {
                for child in children {
                    Self::dfs(child, visit);
                }
            }
        }
    }
}

/// The fixed sub-header in front of the on-disk chromosome B+-tree. The
/// declared block size is not kept: node reads are sized from each node's
/// own item count.
#[derive(Copy, Clone, Debug)]
pub(crate) struct ChromTreeHeader {
    pub key_size: u32,
    pub item_count: u64,
}

const CHROM_TREE_HEADER_LAYOUT: &[Field] = &[
    field("magic", 4),
    field("blockSize", 4),
    field("keySize", 4),
    field("valSize", 4),
    field("itemCount", 8),
    field("reserved", 8),
];

impl ChromTreeHeader {
    pub(crate) fn disk_size() -> usize {
        codec::layout_size(CHROM_TREE_HEADER_LAYOUT)
    }

    pub(crate) fn decode(data: &[u8], endianness: Endianness) -> Result<Self, DecodeError> {
        let f = codec::decode(CHROM_TREE_HEADER_LAYOUT, data, endianness)?;
        if f.u32("magic")? != CHROM_TREE_MAGIC {
            return Err(DecodeError::InvalidFile(
                "bad chromosome tree magic".to_owned(),
            ));
        }
        let val_size = f.u32("valSize")?;
        if val_size != 8 {
            return Err(DecodeError::InvalidFile(format!(
                "chromosome tree value size {} (expected 8)",
                val_size
            )));
        }
        Ok(ChromTreeHeader {
            key_size: f.u32("keySize")?,
            item_count: f.uint("itemCount")?,
        })
    }
}

/// One item of an on-disk chromosome tree node.
#[derive(Clone, Debug)]
pub(crate) enum ChromTreeItem {
    Leaf(ChromLeaf),
    Internal { child_offset: u64 },
}

/// Decodes the `count` items following a node header. Each item is
/// `key_size + 8` bytes: a NUL-padded name plus either (id, length) for
/// leaves or a child offset for internal nodes.
pub(crate) fn decode_chrom_tree_items(
    data: &[u8],
    key_size: u32,
    is_leaf: bool,
    count: u16,
    endianness: Endianness,
) -> Result<Vec<ChromTreeItem>, DecodeError> {
    let key = field("key", key_size as i32);
    let leaf_layout = [key, field("chrId", 4), field("chrSize", 4)];
    let internal_layout = [key, field("childOffset", 8)];
    let item_size = key_size as usize + 8;

    let mut items = Vec::with_capacity(count as usize);
    for i in 0..count as usize {
        let chunk = data
            .get(i * item_size..(i + 1) * item_size)
            .ok_or(DecodeError::ShortBuffer {
                needed: (i + 1) * item_size,
                available: data.len(),
            })?;
        if is_leaf {
            let f = codec::decode(&leaf_layout, chunk, endianness)?;
            items.push(ChromTreeItem::Leaf(ChromLeaf {
                name: f.string("key")?.to_owned(),
                id: f.u32("chrId")?,
                length: f.u32("chrSize")?,
            }));
        } else {
            let f = codec::decode(&internal_layout, chunk, endianness)?;
            items.push(ChromTreeItem::Internal {
                child_offset: f.uint("childOffset")?,
            });
        }
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> ChromTree {
        ChromTree::new(ChromNode::Internal {
            children: vec![
                ChromNode::Leaf(ChromLeaf {
                    name: "chr1".to_owned(),
                    id: 0,
                    length: 248_956_422,
                }),
                ChromNode::Internal {
                    children: vec![
                        ChromNode::Leaf(ChromLeaf {
                            name: "chr2".to_owned(),
                            id: 1,
                            length: 242_193_529,
                        }),
                        ChromNode::Leaf(ChromLeaf {
                            name: "chrX".to_owned(),
                            id: 2,
                            length: 156_040_895,
                        }),
                    ],
                },
            ],
        })
    }

    #[test]
    fn lookup_by_name_and_id() {
        let tree = tree();
        assert_eq!(tree.leaf_by_name("chr2").unwrap().id, 1);
        assert_eq!(tree.leaf_by_id(2).unwrap().name, "chrX");
        assert_eq!(tree.leaf(&ChromRef::from("chr1")).unwrap().length, 248_956_422);
        assert_eq!(tree.leaf(&ChromRef::from(1u32)).unwrap().name, "chr2");
        assert!(tree.leaf_by_name("chrM").is_none());
        assert!(tree.leaf_by_id(99).is_none());
    }

    #[test]
    fn leaves_cover_every_chromosome() {
        let tree = tree();
        let names: Vec<_> = tree.leaves().iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["chr1", "chr2", "chrX"]);
    }

    #[test]
    fn decode_leaf_items() {
        let mut data = Vec::new();
        data.extend_from_slice(b"chr1\0\0\0\0");
        data.extend_from_slice(&7u32.to_le_bytes());
        data.extend_from_slice(&1000u32.to_le_bytes());
        data.extend_from_slice(b"chr10\0\0\0");
        data.extend_from_slice(&8u32.to_le_bytes());
        data.extend_from_slice(&2000u32.to_le_bytes());

        let items = decode_chrom_tree_items(&data, 8, true, 2, Endianness::Little).unwrap();
        match &items[0] {
            ChromTreeItem::Leaf(leaf) => {
                assert_eq!(leaf.name, "chr1");
                assert_eq!(leaf.id, 7);
                assert_eq!(leaf.length, 1000);
            }
            _ => panic!("expected a leaf"),
        }
        match &items[1] {
            ChromTreeItem::Leaf(leaf) => assert_eq!(leaf.name, "chr10"),
            _ => panic!("expected a leaf"),
        }
    }

    #[test]
    fn decode_internal_items() {
        let mut data = Vec::new();
        data.extend_from_slice(b"chr1\0\0\0\0");
        data.extend_from_slice(&0x1_0000_0000u64.to_le_bytes());

        let items = decode_chrom_tree_items(&data, 8, false, 1, Endianness::Little).unwrap();
        match &items[0] {
            ChromTreeItem::Internal { child_offset } => assert_eq!(*child_offset, 1 << 32),
            _ => panic!("expected an internal item"),
        }
    }
}
