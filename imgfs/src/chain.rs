//! # 块链层
//!
//! 文件的第 `i` 块：
//! - `i < 4` 时存于描述符的直接块
//! - 否则存于间接映射链的第 `(i - 4) / 255` 个节点、第 `(i - 4) % 255` 个位置
//!
//! 映射链经由 `next` 单向链接，全程迭代遍历。

use std::collections::BTreeMap;
use std::ops::Range;

use byte_store::ByteStore;

use crate::layout::{BlockId, Descriptor, FileMap};
use crate::{Error, FileSystem, Result, BLOCK_SIZE, DIRECT_BLOCKS, REFS_IN_FILE_MAP};

/// 块编号在磁盘上的存放位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Slot {
    Direct(usize),
    Mapped { map: BlockId, pos: usize },
}

/// 文件内的一块：它的存放位置，以及当前存着的块编号
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Link {
    pub slot: Slot,
    pub block: BlockId,
}

/// 容纳 `size` 字节所需的块数
#[inline]
pub(crate) fn count_blocks(size: usize) -> usize {
    size.div_ceil(BLOCK_SIZE)
}

/// 编址 `blocks` 个块所需的映射节点数
#[inline]
pub(crate) fn count_maps(blocks: usize) -> usize {
    blocks
        .saturating_sub(DIRECT_BLOCKS)
        .div_ceil(REFS_IN_FILE_MAP)
}

/// 文件内块序号 → (映射节点序号, 节点内位置)
#[inline]
fn locate(index: usize) -> (usize, usize) {
    let index = index - DIRECT_BLOCKS;
    (index / REFS_IN_FILE_MAP, index % REFS_IN_FILE_MAP)
}

impl<S: ByteStore> FileSystem<S> {
    /// 沿 `indirect` 读出映射链的前 `count` 个节点
    pub(crate) fn map_chain(
        &mut self,
        desc: &Descriptor,
        count: usize,
    ) -> Result<Vec<(BlockId, FileMap)>> {
        let mut chain = Vec::with_capacity(count);
        let mut next = desc.indirect;

        for _ in 0..count {
            if next.is_null() {
                return Err(Error::Corrupted("file map chain is shorter than the file"));
            }
            let map = self.file_map(next)?;
            let id = next;
            next = map.next;
            chain.push((id, map));
        }

        Ok(chain)
    }

    /// 依次列出 `range` 内每一块的位置与编号
    pub(crate) fn resolve_chain(&mut self, desc: &Descriptor, range: Range<usize>) -> Result<Vec<Link>> {
        let chain = self.map_chain(desc, count_maps(range.end))?;
        Ok(links_of(desc, &chain, range))
    }

    /// 把新的块编号写回各自的位置
    ///
    /// 描述符只在内存中修改，由调用者写回；被修改的映射节点各写一次。
    pub(crate) fn assign(&mut self, desc: &mut Descriptor, links: &[Link]) -> Result<()> {
        let mut dirty: BTreeMap<BlockId, FileMap> = BTreeMap::new();

        for link in links {
            match link.slot {
                Slot::Direct(i) => desc.direct[i] = link.block,
                Slot::Mapped { map, pos } => {
                    if !dirty.contains_key(&map) {
                        let record = self.file_map(map)?;
                        dirty.insert(map, record);
                    }
                    if let Some(record) = dirty.get_mut(&map) {
                        record.refs[pos] = link.block;
                    }
                }
            }
        }

        for (id, map) in &dirty {
            self.set_file_map(*id, map)?;
        }
        Ok(())
    }

    /// 调整文件大小并维护块链，描述符由调用者写回。
    ///
    /// 变大时只补足映射节点，不分配数据块；变小时释放多出的数据块与映射节点。
    pub(crate) fn resize(&mut self, desc: &mut Descriptor, new_size: u16) -> Result<()> {
        if new_size < desc.size {
            self.shrink(desc, new_size)?;
        } else {
            self.grow(desc, new_size)?;
        }
        desc.size = new_size;
        Ok(())
    }

    /// 释放文件占用的全部块
    pub(crate) fn release_blocks(&mut self, desc: &mut Descriptor) -> Result<()> {
        self.resize(desc, 0)
    }

    fn shrink(&mut self, desc: &mut Descriptor, new_size: u16) -> Result<()> {
        let old_blocks = desc.block_count();
        let new_blocks = count_blocks(new_size as usize);
        let mut chain = self.map_chain(desc, count_maps(old_blocks))?;
        let links = links_of(desc, &chain, 0..old_blocks);

        // 末块中不再可见的部分清零，再次变大时只会读到零
        let tail = new_size as usize % BLOCK_SIZE;
        if tail != 0 {
            let last = links[new_blocks - 1].block;
            if !last.is_null() {
                let mut data = self.block(last)?;
                data[tail..].fill(0);
                self.set_block(last, &data)?;
            }
        }

        for link in &links[new_blocks..] {
            if !link.block.is_null() {
                self.dealloc_block(link.block)?;
            }
            if let Slot::Direct(i) = link.slot {
                desc.direct[i] = BlockId::NULL;
            }
        }

        let kept_maps = count_maps(new_blocks);
        for (id, _) in chain.drain(kept_maps..) {
            self.dealloc_block(id)?;
        }

        match chain.last_mut() {
            Some((id, map)) => {
                let (node, pos) = locate(new_blocks - 1);
                debug_assert_eq!(node, kept_maps - 1);
                map.refs[pos + 1..].fill(BlockId::NULL);
                map.next = BlockId::NULL;
                self.set_file_map(*id, map)?;
            }
            None => desc.indirect = BlockId::NULL,
        }

        Ok(())
    }

    fn grow(&mut self, desc: &mut Descriptor, new_size: u16) -> Result<()> {
        let old_blocks = desc.block_count();
        let new_blocks = count_blocks(new_size as usize);
        if new_blocks == old_blocks {
            return Ok(());
        }

        for slot in &mut desc.direct[old_blocks.min(DIRECT_BLOCKS)..new_blocks.min(DIRECT_BLOCKS)] {
            *slot = BlockId::NULL;
        }

        let old_maps = count_maps(old_blocks);
        let new_maps = count_maps(new_blocks);
        let mut chain = self.map_chain(desc, old_maps)?;

        let mut fresh = Vec::with_capacity(new_maps - old_maps);
        for _ in old_maps..new_maps {
            match self.alloc_block() {
                Ok(id) => fresh.push(id),
                Err(err) => {
                    for id in fresh {
                        self.dealloc_block(id)?;
                    }
                    return Err(err);
                }
            }
        }

        for (i, &id) in fresh.iter().enumerate() {
            let mut map = FileMap::empty();
            map.next = fresh.get(i + 1).copied().unwrap_or(BlockId::NULL);
            self.set_file_map(id, &map)?;
        }

        match chain.last_mut() {
            Some((id, map)) => {
                // 末节点中新暴露的槽位置空
                let node = old_maps - 1;
                let start = old_blocks - DIRECT_BLOCKS - node * REFS_IN_FILE_MAP;
                let end = (new_blocks - DIRECT_BLOCKS - node * REFS_IN_FILE_MAP).min(REFS_IN_FILE_MAP);
                map.refs[start..end].fill(BlockId::NULL);
                if let Some(&first) = fresh.first() {
                    map.next = first;
                }
                self.set_file_map(*id, map)?;
            }
            None => {
                if let Some(&first) = fresh.first() {
                    desc.indirect = first;
                }
            }
        }

        Ok(())
    }
}

fn links_of(desc: &Descriptor, chain: &[(BlockId, FileMap)], range: Range<usize>) -> Vec<Link> {
    range
        .map(|index| {
            if index < DIRECT_BLOCKS {
                Link {
                    slot: Slot::Direct(index),
                    block: desc.direct[index],
                }
            } else {
                let (node, pos) = locate(index);
                let (map, record) = &chain[node];
                Link {
                    slot: Slot::Mapped { map: *map, pos },
                    block: record.refs[pos],
                }
            }
        })
        .collect()
}
