//! # 文件读写层
//!
//! 把文件内的字节区间映射到块链上。写入不会让文件变大，
//! 空间需要先用截断预留；块在首次写入时才分配。

use std::ops::Range;

use byte_store::ByteStore;

use crate::chain::Link;
use crate::layout::Descriptor;
use crate::{Error, FileSystem, Result, BLOCK_SIZE};

impl<S: ByteStore> FileSystem<S> {
    pub(crate) fn read_at(&mut self, desc: &Descriptor, offset: usize, size: usize) -> Result<Vec<u8>> {
        check_range(desc, offset, size)?;
        if size == 0 || desc.size == 0 {
            return Ok(Vec::new());
        }

        let links = self.resolve_chain(desc, covering(desc, offset, size))?;
        let mut buf = Vec::with_capacity(links.len() * BLOCK_SIZE);
        for link in &links {
            buf.extend_from_slice(&self.block(link.block)?);
        }

        let at = offset % BLOCK_SIZE;
        Ok(buf[at..at + size].to_vec())
    }

    pub(crate) fn write_at(&mut self, id: u16, offset: usize, data: &[u8]) -> Result<()> {
        let mut desc = self.descriptor(id)?;
        if desc.is_dir() {
            return Err(Error::IsADirectory);
        }
        check_range(&desc, offset, data.len())?;
        if data.is_empty() {
            return Ok(());
        }

        let mut links = self.resolve_chain(&desc, covering(&desc, offset, data.len()))?;
        let fresh = self.fill_holes(&mut links)?;

        self.write_blocks(&links, &fresh, offset % BLOCK_SIZE, data)?;

        let assigned: Vec<Link> = links
            .iter()
            .zip(&fresh)
            .filter_map(|(link, &fresh)| fresh.then_some(*link))
            .collect();
        self.assign(&mut desc, &assigned)?;
        self.set_descriptor(id, &desc)
    }

    /// 为仍是空块的位置分配新块，返回哪些位置是新分配的；
    /// 空间不足时退还本次已分配的块
    fn fill_holes(&mut self, links: &mut [Link]) -> Result<Vec<bool>> {
        let mut fresh = vec![false; links.len()];

        for i in 0..links.len() {
            if !links[i].block.is_null() {
                continue;
            }
            match self.alloc_block() {
                Ok(block) => {
                    links[i].block = block;
                    fresh[i] = true;
                }
                Err(err) => {
                    for (link, _) in links.iter().zip(&fresh).filter(|(_, fresh)| **fresh) {
                        self.dealloc_block(link.block)?;
                    }
                    return Err(err);
                }
            }
        }

        Ok(fresh)
    }

    /// 从首块内偏移 `at` 开始，把 `data` 依次写入各块。
    ///
    /// 新分配的块从全零开始，数据没覆盖到的新块也会整块写零。
    fn write_blocks(&mut self, links: &[Link], fresh: &[bool], mut at: usize, data: &[u8]) -> Result<()> {
        if at >= BLOCK_SIZE {
            return Err(Error::OffsetExceedsBlockSize(at));
        }

        let mut rest = data;
        for (link, &fresh) in links.iter().zip(fresh) {
            if rest.is_empty() {
                if fresh {
                    self.set_block(link.block, &[0; BLOCK_SIZE])?;
                }
                continue;
            }

            let len = (BLOCK_SIZE - at).min(rest.len());
            let mut block = if fresh || len == BLOCK_SIZE {
                [0; BLOCK_SIZE]
            } else {
                self.block(link.block)?
            };
            block[at..at + len].copy_from_slice(&rest[..len]);
            self.set_block(link.block, &block)?;

            rest = &rest[len..];
            at = 0;
        }

        Ok(())
    }
}

fn check_range(desc: &Descriptor, offset: usize, size: usize) -> Result<()> {
    if offset
        .checked_add(size)
        .map_or(true, |end| end > desc.size as usize)
    {
        return Err(Error::RangeExceedsFileSize {
            offset,
            size,
            file_size: desc.size as usize,
        });
    }
    Ok(())
}

/// 覆盖 `[offset, offset + size)` 的块序号，末块按 `(offset + size) / 512` 取并截到文件末块
fn covering(desc: &Descriptor, offset: usize, size: usize) -> Range<usize> {
    let last = desc.block_count() - 1;
    let start = offset / BLOCK_SIZE;
    let end = ((offset + size) / BLOCK_SIZE).min(last);
    start..end + 1
}
