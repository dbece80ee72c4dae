use byte_store::ByteStore;

use crate::layout::BlockId;
use crate::{Error, Result};

/// 每次扫描的字节数（128 位）
const CHUNK_BYTES: usize = 16;

/// 空闲块位图：第 `i` 块对应第 `i / 8` 字节的第 `i % 8` 位（低位在前）。
///
/// 位为 0 表示空闲，为 1 表示已占用。位图不在内存中常驻，
/// 每次操作都直接读写存储上的字节。
#[derive(Debug, Clone, Copy)]
pub struct Bitmap {
    /// 位图在存储上的起始字节
    offset: u64,
    /// 位图所指示区域的总块数
    bits: usize,
}

impl Bitmap {
    #[inline]
    pub const fn new(offset: u64, bits: usize) -> Self {
        Self { offset, bits }
    }

    #[inline]
    fn bytes(&self) -> usize {
        self.bits.div_ceil(8)
    }

    /// 清空位图，仅保留第 0 块为已占用
    pub fn init(&self, store: &mut impl ByteStore) -> Result<()> {
        let mut bytes = vec![0; self.bytes()];
        bytes[0] = 1;
        self.write_chunk(store, 0, &bytes)
    }

    pub fn read_chunk(&self, store: &mut impl ByteStore, at: usize, len: usize) -> Result<Vec<u8>> {
        let mut chunk = vec![0; len];
        store.read_bytes(self.offset + at as u64, &mut chunk)?;
        Ok(chunk)
    }

    pub fn write_chunk(&self, store: &mut impl ByteStore, at: usize, chunk: &[u8]) -> Result<()> {
        store.write_bytes(self.offset + at as u64, chunk)?;
        Ok(())
    }

    /// 首次适配：按编号递增找到第一个空闲块，并在同一次调用中占用它
    pub fn alloc(&self, store: &mut impl ByteStore) -> Result<BlockId> {
        let bytes = self.bytes();
        for at in (0..bytes).step_by(CHUNK_BYTES) {
            let mut chunk = self.read_chunk(store, at, CHUNK_BYTES.min(bytes - at))?;

            let Some((byte_index, bit_index)) = chunk
                .iter()
                .enumerate()
                .find_map(|(i, &bits)| (bits != u8::MAX).then_some((i, bits.trailing_ones())))
            else {
                continue;
            };

            let index = (at + byte_index) * 8 + bit_index as usize;
            if index >= self.bits {
                break;
            }

            chunk[byte_index] |= 1 << bit_index;
            self.write_chunk(store, at, &chunk)?;
            return Ok(BlockId::new(index as u16));
        }

        Err(Error::NoFreeBlock)
    }

    pub fn dealloc(&self, store: &mut impl ByteStore, block: BlockId) -> Result<()> {
        if !self.get(store, block)? {
            log::warn!("block {block} is freed twice");
        }
        self.set(store, block, false)
    }

    pub fn get(&self, store: &mut impl ByteStore, block: BlockId) -> Result<bool> {
        let index = self.check(block)?;
        let byte = self.read_chunk(store, index / 8, 1)?[0];
        Ok(byte & (1 << (index % 8)) != 0)
    }

    pub fn set(&self, store: &mut impl ByteStore, block: BlockId, used: bool) -> Result<()> {
        let index = self.check(block)?;
        let mut byte = self.read_chunk(store, index / 8, 1)?;
        if used {
            byte[0] |= 1 << (index % 8);
        } else {
            byte[0] &= !(1 << (index % 8));
        }
        self.write_chunk(store, index / 8, &byte)
    }

    pub fn count_free(&self, store: &mut impl ByteStore) -> Result<usize> {
        let used: usize = self
            .read_chunk(store, 0, self.bytes())?
            .iter()
            .map(|byte| byte.count_ones() as usize)
            .sum();
        Ok(self.bits - used)
    }

    fn check(&self, block: BlockId) -> Result<usize> {
        if block.is_null() {
            return Err(Error::ReservedIndex);
        }
        if block.index() >= self.bits {
            return Err(Error::OutOfRange {
                index: block.index(),
                capacity: self.bits,
            });
        }
        Ok(block.index())
    }
}
