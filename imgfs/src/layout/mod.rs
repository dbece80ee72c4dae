//! # 磁盘数据结构层
//!
//! imgfs 的磁盘布局（字节偏移）：
//! 描述符个数(2字节) | 空闲块位图 | 描述符表 | 块区域
//!
//! 所有记录都按小端序、按字段声明顺序紧密排列，没有填充。

mod bitmap;
mod descriptor;
mod dir_entry;
mod file_map;

use byte_store::ByteStore;
use derive_more::{Display, From, Into};

pub use self::{
    bitmap::Bitmap,
    descriptor::{Descriptor, DescriptorKind},
    dir_entry::DirEntry,
    file_map::FileMap,
};
use crate::{Result, BLOCKS_COUNT, BLOCK_SIZE, NULL_ID};

/// 块区域中的一块数据
pub type DataBlock = [u8; BLOCK_SIZE];

/// 定长记录的编解码
pub trait Record: Sized {
    /// 记录在磁盘上所占的字节数
    const SIZE: usize;

    /// `bytes` 的长度恰为 [`Record::SIZE`]
    fn decode(bytes: &[u8]) -> Result<Self>;

    /// `bytes` 的长度恰为 [`Record::SIZE`]
    fn encode(&self, bytes: &mut [u8]);
}

/// 在任意字节存储上按偏移存取记录
pub trait RecordStore: ByteStore {
    fn read_struct<T: Record>(&mut self, offset: u64) -> Result<T> {
        let mut buf = vec![0; T::SIZE];
        self.read_bytes(offset, &mut buf)?;
        T::decode(&buf)
    }

    fn write_struct<T: Record>(&mut self, offset: u64, value: &T) -> Result<()> {
        let mut buf = vec![0; T::SIZE];
        value.encode(&mut buf);
        self.write_bytes(offset, &buf)?;
        Ok(())
    }
}

impl<S: ByteStore + ?Sized> RecordStore for S {}

/// 块编号；[`BlockId::NULL`] 表示“没有块”，读出来恒为全零块
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into, Display)]
#[repr(transparent)]
pub struct BlockId(u16);

impl BlockId {
    pub const NULL: Self = Self(NULL_ID);

    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn is_null(self) -> bool {
        self == Self::NULL
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// 一个已挂载镜像的字节布局，由描述符个数唯一确定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    descriptors_count: u16,
}

impl Layout {
    pub const DESCRIPTORS_COUNT_OFFSET: u64 = 0;
    pub const BITMAP_OFFSET: u64 = 2;
    pub const BITMAP_BYTES: usize = BLOCKS_COUNT / 8;
    pub const DESCRIPTOR_TABLE_OFFSET: u64 = Self::BITMAP_OFFSET + Self::BITMAP_BYTES as u64;

    #[inline]
    pub const fn new(descriptors_count: u16) -> Self {
        Self { descriptors_count }
    }

    #[inline]
    pub fn descriptors_count(&self) -> u16 {
        self.descriptors_count
    }

    #[inline]
    pub fn descriptor_offset(&self, id: u16) -> u64 {
        Self::DESCRIPTOR_TABLE_OFFSET + id as u64 * Descriptor::SIZE as u64
    }

    /// 块区域紧跟在描述符表之后
    #[inline]
    pub fn block_area_offset(&self) -> u64 {
        self.descriptor_offset(self.descriptors_count)
    }

    #[inline]
    pub fn block_offset(&self, block: BlockId) -> u64 {
        self.block_area_offset() + block.index() as u64 * BLOCK_SIZE as u64
    }

    /// 镜像的总字节数
    #[inline]
    pub fn total_len(&self) -> u64 {
        self.block_area_offset() + (BLOCKS_COUNT * BLOCK_SIZE) as u64
    }
}

impl Record for u16 {
    const SIZE: usize = 2;

    fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(read_u16(bytes, 0))
    }

    fn encode(&self, bytes: &mut [u8]) {
        write_u16(bytes, 0, *self);
    }
}

impl Record for DataBlock {
    const SIZE: usize = BLOCK_SIZE;

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut block = [0; BLOCK_SIZE];
        block.copy_from_slice(bytes);
        Ok(block)
    }

    fn encode(&self, bytes: &mut [u8]) {
        bytes.copy_from_slice(self);
    }
}

#[inline]
pub(crate) fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

#[inline]
pub(crate) fn write_u16(bytes: &mut [u8], at: usize, value: u16) {
    bytes[at..at + 2].copy_from_slice(&value.to_le_bytes());
}
