//! Balanced-tree descent: `lookup_node` and the four-hook `traverse`.

use std::cmp::Ordering;

use crate::block::Block;
use crate::device::Device;
use crate::error::Error;
use crate::error::Result;
use crate::key::Key;
use crate::node::key_at;
use crate::node::ItemHead;
use crate::node::NodeHeader;
use crate::node::LEAF_LEVEL;
use crate::node::DiskChild;
use crate::path::Path;
use crate::path::PathFrame;

/// A tree's addressable shape: the current root, its height, and the
/// `offset` a resize/copy-in-flight applies to every on-disk child
/// pointer it scans (not to pointers it writes — the relocator writes
/// absolute numbers and shrinks `offset` back to zero when it finishes).
#[derive(Debug, Clone, Copy)]
pub struct Tree {
    pub root: u64,
    pub height: u16,
    pub blocksize: u32,
    pub offset: i64,
}

impl Tree {
    fn apply_offset(&self, blocknr: u32) -> u64 {
        (blocknr as i64 - self.offset) as u64
    }
}

fn read_block(dev: &mut dyn Device, blocksize: u32, nr: u64) -> Result<Block> {
    let mut block = Block::alloc(blocksize, nr);
    dev.read(block.data_mut(), nr, 1)
        .map_err(|source| Error::Io { block: nr, source })?;
    Ok(block)
}

/// Binary search over a node's entries (item heads in a leaf, keys in an
/// internal node); `found` is exact-key-match, `pos` is the insertion/descent
/// point otherwise.
fn fast_search(data: &[u8], nritems: u16, is_leaf: bool, key: &Key, cmp: fn(&Key, &Key) -> Ordering) -> (bool, usize) {
    let nritems = nritems as usize;
    let entry_key = |i: usize| -> Key {
        if is_leaf {
            ItemHead::read(data, i).key
        } else {
            key_at(data, i)
        }
    };

    let mut lo = 0usize;
    let mut hi = nritems;
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        match cmp(&entry_key(mid), key) {
            Ordering::Less => lo = mid + 1,
            Ordering::Greater => hi = mid,
            Ordering::Equal => return (true, mid),
        }
    }
    (false, lo)
}

fn child_at(data: &[u8], nritems: u16, pos: usize) -> u32 {
    DiskChild::read(data, nritems, pos).blocknr
}

/// Descends from block `from`, pushing a [`PathFrame`] per level. `for_leaf`
/// controls whether the descent continues past level 2 down to the leaf, or
/// stops once the parent-of-leaf internal node is found.
pub fn lookup_node(
    dev: &mut dyn Device,
    tree: &Tree,
    mut from: u64,
    cmp: fn(&Key, &Key) -> Ordering,
    key: &Key,
    path: &mut Path,
    for_leaf: bool,
) -> Result<bool> {
    path.clear();
    loop {
        let block = read_block(dev, tree.blocksize, from)?;
        let header = NodeHeader::read(block.data());
        if header.level as usize > tree.height as usize {
            return Err(Error::Invariant(format!(
                "node {from} claims level {} above tree height {}",
                header.level, tree.height
            )));
        }
        if !for_leaf && header.is_leaf() {
            return Ok(false);
        }

        let (found, pos) = fast_search(block.data(), header.nritems, header.is_leaf(), key, cmp);
        let is_leaf = header.is_leaf();
        let descend_pos = if !is_leaf && found { pos + 1 } else { pos };

        path.push(PathFrame {
            node: block,
            pos: descend_pos,
        });

        if is_leaf {
            return Ok(found);
        }

        let frame = path.last().unwrap();
        let header = NodeHeader::read(frame.node.data());
        if !for_leaf && header.level == 2 {
            return Ok(true);
        }

        let child = child_at(frame.node.data(), header.nritems, descend_pos);
        from = tree.apply_offset(child);
    }
}

pub fn lookup_leaf(
    dev: &mut dyn Device,
    tree: &Tree,
    from: u64,
    cmp: fn(&Key, &Key) -> Ordering,
    key: &Key,
    path: &mut Path,
) -> Result<bool> {
    lookup_node(dev, tree, from, cmp, key, path, true)
}

pub fn lookup_parent(
    dev: &mut dyn Device,
    tree: &Tree,
    from: u64,
    cmp: fn(&Key, &Key) -> Ordering,
    key: &Key,
    path: &mut Path,
) -> Result<bool> {
    lookup_node(dev, tree, from, cmp, key, path, false)
}

/// `on_node`'s return value, propagated through `on_child` to the parent and
/// finally out of `after_node` as the node's own contribution upward.
pub type NodeResult = u64;

pub trait TraverseHooks {
    fn before_node(&mut self, node: &Block) -> bool;
    fn on_node(&mut self, node: &mut Block) -> NodeResult;
    fn on_child(&mut self, node: &mut Block, slot: usize, child_result: NodeResult);
    fn after_node(&mut self, node: &mut Block) -> Result<NodeResult>;
}

pub fn traverse(dev: &mut dyn Device, tree: &Tree, root: u64, hooks: &mut dyn TraverseHooks) -> Result<NodeResult> {
    let mut node = read_block(dev, tree.blocksize, root)?;
    if !hooks.before_node(&node) {
        return Ok(0);
    }
    hooks.on_node(&mut node);

    let header = NodeHeader::read(node.data());
    if !header.is_leaf() {
        for slot in 0..header.nritems as usize {
            let child = child_at(node.data(), header.nritems, slot);
            let child_result = traverse(dev, tree, tree.apply_offset(child), hooks)?;
            hooks.on_child(&mut node, slot, child_result);
        }
    }

    hooks.after_node(&mut node)
}

pub fn simple_traverse(
    dev: &mut dyn Device,
    tree: &Tree,
    root: u64,
    mut on_node: impl FnMut(&Block),
) -> Result<()> {
    let node = read_block(dev, tree.blocksize, root)?;
    on_node(&node);
    let header = NodeHeader::read(node.data());
    if !header.is_leaf() {
        for slot in 0..header.nritems as usize {
            let child = child_at(node.data(), header.nritems, slot);
            simple_traverse(dev, tree, tree.apply_offset(child), &mut on_node)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::device::MemDevice;
    use crate::key::KEY_TYPE_SD;

    fn make_leaf(blocksize: u32, nr: u64, keys: &[Key]) -> Block {
        let mut block = Block::alloc(blocksize, nr);
        let header = NodeHeader {
            level: LEAF_LEVEL,
            nritems: keys.len() as u16,
            free_space: 0,
        };
        header.write(block.data_mut());
        for (i, k) in keys.iter().enumerate() {
            let ih = ItemHead {
                key: *k,
                free_space_or_entry_count: 0,
                item_len: 0,
                item_location: blocksize as u16,
                format: 0,
            };
            ih.write(block.data_mut(), i);
        }
        block
    }

    #[test]
    fn fast_search_finds_exact_match() {
        let blocksize = 4096;
        let keys = vec![
            Key::form_v2(1, 1, 0, KEY_TYPE_SD),
            Key::form_v2(1, 2, 0, KEY_TYPE_SD),
            Key::form_v2(1, 3, 0, KEY_TYPE_SD),
        ];
        let block = make_leaf(blocksize, 10, &keys);
        let (found, pos) = fast_search(block.data(), 3, true, &keys[1], Key::cmp_four);
        assert!(found);
        assert_eq!(pos, 1);
    }

    #[test]
    fn fast_search_reports_insertion_point() {
        let blocksize = 4096;
        let keys = vec![
            Key::form_v2(1, 1, 0, KEY_TYPE_SD),
            Key::form_v2(1, 3, 0, KEY_TYPE_SD),
        ];
        let block = make_leaf(blocksize, 10, &keys);
        let target = Key::form_v2(1, 2, 0, KEY_TYPE_SD);
        let (found, pos) = fast_search(block.data(), 2, true, &target, Key::cmp_four);
        assert!(!found);
        assert_eq!(pos, 1);
    }

    #[test]
    fn lookup_leaf_root_only() {
        let blocksize = 4096;
        let mut dev = MemDevice::new(64, blocksize);
        let keys = vec![Key::form_v2(1, 1, 0, KEY_TYPE_SD)];
        let block = make_leaf(blocksize, 5, &keys);
        dev.write(block.data(), 5, 1).unwrap();

        let tree = Tree {
            root: 5,
            height: 1,
            blocksize,
            offset: 0,
        };
        let mut path = Path::new();
        let found = lookup_leaf(&mut dev, &tree, 5, Key::cmp_four, &keys[0], &mut path).unwrap();
        assert!(found);
        assert_eq!(path.len(), 1);
    }
}
