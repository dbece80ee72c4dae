//! # 磁盘管理器层
//!
//! 构建出镜像的布局并使用：描述符与块的存取、空闲块位图、打开文件表。

use std::collections::BTreeMap;
use std::path::Path;

use byte_store::{ByteStore, FileStore};
use derive_more::{Display, From, Into};

use crate::layout::*;
use crate::{Error, Result, BLOCKS_COUNT, NULL_ID, ROOT};

/// 已挂载的文件系统
///
/// 单线程使用，所有操作直接读写底层存储；打开文件表只存在于内存中，
/// 生命周期与挂载实例相同。
#[derive(Debug)]
pub struct FileSystem<S: ByteStore = FileStore> {
    store: S,
    layout: Layout,
    bitmap: Bitmap,
    /// 打开文件表：句柄 → 描述符编号
    handles: BTreeMap<Handle, u16>,
    last_handle: u32,
}

/// 打开文件的句柄，编号单调递增
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into, Display)]
pub struct Handle(u32);

impl FileSystem<FileStore> {
    /// 在 `path` 处新建镜像并格式化
    pub fn format(path: impl AsRef<Path>, descriptors_count: u16) -> Result<Self> {
        check_descriptors_count(descriptors_count)?;
        Self::format_on(FileStore::create(path)?, descriptors_count)
    }

    /// 挂载 `path` 处已有的镜像
    pub fn mount(path: impl AsRef<Path>) -> Result<Self> {
        Self::mount_on(FileStore::open(path)?)
    }
}

impl<S: ByteStore> FileSystem<S> {
    pub fn format_on(mut store: S, descriptors_count: u16) -> Result<Self> {
        check_descriptors_count(descriptors_count)?;

        let layout = Layout::new(descriptors_count);
        store.resize(layout.total_len())?;

        let mut fs = Self::new(store, layout);
        fs.initialize()?;
        Ok(fs)
    }

    /// 根描述符尚未使用的镜像会在此时完成初始化
    pub fn mount_on(mut store: S) -> Result<Self> {
        let descriptors_count: u16 = store.read_struct(Layout::DESCRIPTORS_COUNT_OFFSET)?;
        check_descriptors_count(descriptors_count)?;

        let layout = Layout::new(descriptors_count);
        if store.len()? < layout.total_len() {
            return Err(Error::Corrupted("image is shorter than its layout"));
        }

        let mut fs = Self::new(store, layout);
        if fs.descriptor(ROOT)?.is_unused() {
            log::info!("root descriptor is unused, initializing the image");
            fs.initialize()?;
        }
        log::info!("mounted image with {descriptors_count} descriptors");
        Ok(fs)
    }

    fn new(store: S, layout: Layout) -> Self {
        Self {
            store,
            layout,
            bitmap: Bitmap::new(Layout::BITMAP_OFFSET, BLOCKS_COUNT),
            handles: BTreeMap::new(),
            last_handle: 0,
        }
    }

    /// 写入描述符个数，清空位图与描述符表，写入根目录
    fn initialize(&mut self) -> Result<()> {
        let descriptors_count = self.layout.descriptors_count();
        self.store
            .write_struct(Layout::DESCRIPTORS_COUNT_OFFSET, &descriptors_count)?;
        self.bitmap.init(&mut self.store)?;

        let table = vec![0; descriptors_count as usize * Descriptor::SIZE];
        self.store
            .write_bytes(Layout::DESCRIPTOR_TABLE_OFFSET, &table)?;
        self.set_descriptor(ROOT, &Descriptor::new(ROOT, DescriptorKind::Directory))?;

        log::info!("formatted image with {descriptors_count} descriptors");
        Ok(())
    }

    #[inline]
    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn sync(&mut self) -> Result<()> {
        self.store.flush()?;
        Ok(())
    }

    /// 同步后取回底层存储
    pub fn into_store(mut self) -> Result<S> {
        self.sync()?;
        Ok(self.store)
    }
}

/* 描述符存取 */
impl<S: ByteStore> FileSystem<S> {
    pub fn descriptor(&mut self, id: u16) -> Result<Descriptor> {
        self.check_descriptor(id)?;
        let offset = self.layout.descriptor_offset(id);
        self.store.read_struct(offset)
    }

    pub(crate) fn set_descriptor(&mut self, id: u16, descriptor: &Descriptor) -> Result<()> {
        self.check_descriptor(id)?;
        let offset = self.layout.descriptor_offset(id);
        self.store.write_struct(offset, descriptor)
    }

    /// 线性扫描描述符表，找到第一个未使用的描述符
    pub(crate) fn first_free_descriptor(&mut self) -> Result<u16> {
        for id in 0..self.layout.descriptors_count() {
            if self.descriptor(id)?.is_unused() {
                return Ok(id);
            }
        }
        Err(Error::NoFreeDescriptor)
    }

    /// 分配并立即写回一个新描述符
    pub(crate) fn alloc_descriptor(&mut self, kind: DescriptorKind) -> Result<Descriptor> {
        let id = self.first_free_descriptor()?;
        let descriptor = Descriptor::new(id, kind);
        self.set_descriptor(id, &descriptor)?;
        log::debug!("allocated descriptor {id} ({kind:?})");
        Ok(descriptor)
    }

    fn check_descriptor(&self, id: u16) -> Result<()> {
        let capacity = self.layout.descriptors_count() as usize;
        if id as usize >= capacity {
            return Err(Error::OutOfRange {
                index: id as usize,
                capacity,
            });
        }
        Ok(())
    }
}

/* 块与映射记录存取 */
impl<S: ByteStore> FileSystem<S> {
    /// 空块读出全零
    pub(crate) fn block(&mut self, id: BlockId) -> Result<DataBlock> {
        if id.is_null() {
            return Ok([0; crate::BLOCK_SIZE]);
        }
        self.check_block(id)?;
        let offset = self.layout.block_offset(id);
        self.store.read_struct(offset)
    }

    pub(crate) fn set_block(&mut self, id: BlockId, block: &DataBlock) -> Result<()> {
        self.check_writable(id)?;
        let offset = self.layout.block_offset(id);
        self.store.write_struct(offset, block)
    }

    /// 空块读出全零的映射记录
    pub(crate) fn file_map(&mut self, id: BlockId) -> Result<FileMap> {
        if id.is_null() {
            return Ok(FileMap::zeroed());
        }
        self.check_block(id)?;
        let offset = self.layout.block_offset(id);
        self.store.read_struct(offset)
    }

    pub(crate) fn set_file_map(&mut self, id: BlockId, map: &FileMap) -> Result<()> {
        self.check_writable(id)?;
        let offset = self.layout.block_offset(id);
        self.store.write_struct(offset, map)
    }

    /// 写入块内第 `slot` 个记录
    pub(crate) fn write_record<T: Record>(&mut self, id: BlockId, slot: usize, value: &T) -> Result<()> {
        self.check_writable(id)?;
        let offset = self.layout.block_offset(id) + (slot * T::SIZE) as u64;
        self.store.write_struct(offset, value)
    }

    pub(crate) fn alloc_block(&mut self) -> Result<BlockId> {
        let id = self.bitmap.alloc(&mut self.store)?;
        log::debug!("allocated block {id}");
        Ok(id)
    }

    pub(crate) fn dealloc_block(&mut self, id: BlockId) -> Result<()> {
        self.bitmap.dealloc(&mut self.store, id)?;
        log::debug!("freed block {id}");
        Ok(())
    }

    pub fn is_block_allocated(&mut self, id: BlockId) -> Result<bool> {
        self.bitmap.get(&mut self.store, id)
    }

    pub fn free_blocks(&mut self) -> Result<usize> {
        self.bitmap.count_free(&mut self.store)
    }

    fn check_block(&self, id: BlockId) -> Result<()> {
        if id.index() >= BLOCKS_COUNT {
            return Err(Error::OutOfRange {
                index: id.index(),
                capacity: BLOCKS_COUNT,
            });
        }
        Ok(())
    }

    fn check_writable(&self, id: BlockId) -> Result<()> {
        if id.is_null() {
            return Err(Error::ReservedIndex);
        }
        self.check_block(id)
    }
}

/* 打开文件表 */
impl<S: ByteStore> FileSystem<S> {
    pub(crate) fn insert_handle(&mut self, descriptor: u16) -> Handle {
        self.last_handle += 1;
        let handle = Handle(self.last_handle);
        self.handles.insert(handle, descriptor);
        log::debug!("opened descriptor {descriptor} as handle {handle}");
        handle
    }

    pub(crate) fn remove_handle(&mut self, handle: Handle) -> Result<u16> {
        let descriptor = self
            .handles
            .remove(&handle)
            .ok_or(Error::HandleNotOpen(handle))?;
        log::debug!("closed handle {handle} of descriptor {descriptor}");
        Ok(descriptor)
    }

    pub(crate) fn handle_target(&self, handle: Handle) -> Result<u16> {
        self.handles
            .get(&handle)
            .copied()
            .ok_or(Error::HandleNotOpen(handle))
    }

    /// 是否还有句柄指向该描述符
    pub(crate) fn is_open(&self, descriptor: u16) -> bool {
        self.handles.values().any(|&id| id == descriptor)
    }
}

fn check_descriptors_count(descriptors_count: u16) -> Result<()> {
    if descriptors_count == 0 || descriptors_count >= NULL_ID {
        return Err(Error::InvalidDescriptorCount(descriptors_count as u32));
    }
    Ok(())
}
