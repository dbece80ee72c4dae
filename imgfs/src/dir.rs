//! # 目录层
//!
//! 目录就是内容为目录项序列的文件，每块 32 个目录项。
//! 删除只留下墓碑，目录不会收缩。

use byte_store::ByteStore;

use crate::layout::{BlockId, Descriptor, DirEntry, Record};
use crate::{Error, FileSystem, Result, BLOCK_SIZE, MAX_FILE_SIZE};

pub(crate) const ENTRIES_PER_BLOCK: usize = BLOCK_SIZE / DirEntry::SIZE;

/// 目录项所在的块与块内槽位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EntryPos {
    pub block: BlockId,
    pub slot: usize,
}

impl<S: ByteStore> FileSystem<S> {
    pub(crate) fn directory(&mut self, id: u16) -> Result<Descriptor> {
        let desc = self.descriptor(id)?;
        if !desc.is_dir() {
            return Err(Error::NotADirectory);
        }
        Ok(desc)
    }

    /// 按存储顺序列出全部目录项，包括墓碑与从未用过的槽位
    fn entries(&mut self, dir: &Descriptor) -> Result<Vec<(DirEntry, EntryPos)>> {
        let links = self.resolve_chain(dir, 0..dir.block_count())?;
        let mut entries = Vec::with_capacity(links.len() * ENTRIES_PER_BLOCK);

        for link in links.into_iter().filter(|link| !link.block.is_null()) {
            let data = self.block(link.block)?;
            for (slot, raw) in data.chunks_exact(DirEntry::SIZE).enumerate() {
                let pos = EntryPos {
                    block: link.block,
                    slot,
                };
                entries.push((DirEntry::decode(raw)?, pos));
            }
        }

        Ok(entries)
    }

    /// 名字区分大小写，只匹配有效的目录项
    pub(crate) fn find_entry(&mut self, dir: &Descriptor, name: &str) -> Result<(DirEntry, EntryPos)> {
        self.entries(dir)?
            .into_iter()
            .find(|(entry, _)| entry.is_valid() && entry.name() == name)
            .ok_or_else(|| Error::NotFound(name.to_owned()))
    }

    /// 第一个无效槽位；都被占满时让目录增长一块
    pub(crate) fn find_free_slot(&mut self, dir: &mut Descriptor) -> Result<EntryPos> {
        let free = self
            .entries(dir)?
            .into_iter()
            .find(|(entry, _)| !entry.is_valid());

        match free {
            Some((_, pos)) => Ok(pos),
            None => self.grow_directory(dir),
        }
    }

    fn grow_directory(&mut self, dir: &mut Descriptor) -> Result<EntryPos> {
        let old_size = dir.size;
        let new_size = old_size as usize + BLOCK_SIZE;
        if new_size > MAX_FILE_SIZE {
            return Err(Error::DirectoryFull);
        }

        let index = dir.block_count();
        self.resize(dir, new_size as u16)?;

        let block = match self.alloc_block() {
            Ok(block) => block,
            Err(err) => {
                self.resize(dir, old_size)?;
                return Err(err);
            }
        };
        // 新块的所有槽位均无效
        self.set_block(block, &[0; BLOCK_SIZE])?;

        let mut links = self.resolve_chain(dir, index..index + 1)?;
        links[0].block = block;
        self.assign(dir, &links)?;
        self.set_descriptor(dir.id, dir)?;

        log::debug!("directory {} grew to {} bytes", dir.id, dir.size);
        Ok(EntryPos { block, slot: 0 })
    }

    pub(crate) fn add_entry(&mut self, dir_id: u16, name: &str, target: u16) -> Result<()> {
        let mut dir = self.directory(dir_id)?;
        let entry = DirEntry::new(name, target)?;

        match self.find_entry(&dir, name) {
            Ok(_) => return Err(Error::AlreadyExists(name.to_owned())),
            Err(Error::NotFound(_)) => {}
            Err(err) => return Err(err),
        }

        let pos = self.find_free_slot(&mut dir)?;
        self.write_record(pos.block, pos.slot, &entry)
    }

    /// 原地写入墓碑，返回被删除的目录项
    pub(crate) fn remove_entry(&mut self, dir_id: u16, name: &str) -> Result<DirEntry> {
        let dir = self.directory(dir_id)?;
        let (entry, pos) = self.find_entry(&dir, name)?;
        self.write_record(pos.block, pos.slot, &entry.tombstone())?;
        Ok(entry)
    }

    /// 目录中所有有效的目录项，按存储顺序
    pub fn list_directory(&mut self, dir_id: u16) -> Result<Vec<DirEntry>> {
        let dir = self.directory(dir_id)?;
        Ok(self
            .entries(&dir)?
            .into_iter()
            .filter_map(|(entry, _)| entry.is_valid().then_some(entry))
            .collect())
    }
}
