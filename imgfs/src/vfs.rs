//! # 链接与生命周期层
//!
//! 确立了文件系统的操作逻辑：创建、打开与关闭、截断、硬链接、删除、
//! 目录与符号链接。所有路径都相对 `cwd` 解析，传入 [`ROOT`] 即从根目录出发。
//!
//! 描述符的链接数只统计父目录中的名字，`.` 与 `..` 不计入。

use byte_store::ByteStore;

use crate::layout::{Descriptor, DescriptorKind, DirEntry};
use crate::{Error, FileSystem, Handle, Result, MAX_FILE_SIZE, MAX_SYMLINK_HOPS, ROOT};

impl<S: ByteStore> FileSystem<S> {
    /// 创建空文件，返回其描述符编号
    pub fn create_file(&mut self, path: &str, cwd: u16) -> Result<u16> {
        self.create_node(path, cwd, DescriptorKind::File, |_, _, _| Ok(()))
    }

    pub fn open_file(&mut self, path: &str, cwd: u16) -> Result<Handle> {
        let desc = self.lookup(path, cwd)?;
        Ok(self.insert_handle(desc.id))
    }

    /// 已被删除且不再被打开的文件在此时回收
    pub fn close_file(&mut self, handle: Handle) -> Result<()> {
        let id = self.remove_handle(handle)?;
        let desc = self.descriptor(id)?;
        if desc.links == 0 && !self.is_open(id) {
            self.reclaim(id)?;
        }
        Ok(())
    }

    pub fn read_file(&mut self, handle: Handle, offset: usize, size: usize) -> Result<Vec<u8>> {
        let id = self.handle_target(handle)?;
        let desc = self.descriptor(id)?;
        self.read_at(&desc, offset, size)
    }

    /// 写入不会让文件变大，需要先用 [`FileSystem::truncate`] 预留空间
    pub fn write_file(&mut self, handle: Handle, data: &[u8], offset: usize) -> Result<()> {
        let id = self.handle_target(handle)?;
        self.write_at(id, offset, data)
    }

    pub fn descriptor_of(&mut self, handle: Handle) -> Result<Descriptor> {
        let id = self.handle_target(handle)?;
        self.descriptor(id)
    }

    pub fn truncate(&mut self, path: &str, size: u16, cwd: u16) -> Result<Descriptor> {
        let mut desc = self.lookup(path, cwd)?;
        if desc.is_dir() {
            return Err(Error::IsADirectory);
        }

        self.resize(&mut desc, size)?;
        self.set_descriptor(desc.id, &desc)?;
        Ok(desc)
    }

    /// 为已有的文件添加硬链接；末分量上的符号链接不跟随，链接的是它本身
    pub fn link_file(&mut self, existing: &str, new_path: &str, cwd: u16) -> Result<()> {
        let mut desc = self.lookup_with(existing, cwd, false, MAX_SYMLINK_HOPS)?;
        if desc.is_dir() {
            return Err(Error::IsADirectory);
        }
        if desc.links == u8::MAX {
            return Err(Error::TooManyLinks);
        }

        let (parent, name) = self.resolve_parent(new_path, cwd)?;
        check_node_name(name)?;
        self.add_entry(parent, name, desc.id)?;

        desc.links += 1;
        self.set_descriptor(desc.id, &desc)
    }

    pub fn unlink_file(&mut self, path: &str, cwd: u16) -> Result<()> {
        let (parent, name) = self.resolve_parent(path, cwd)?;
        let dir = self.directory(parent)?;
        let (entry, _) = self.find_entry(&dir, name)?;
        if self.descriptor(entry.descriptor())?.is_dir() {
            return Err(Error::IsADirectory);
        }
        self.unlink_entry(parent, name)
    }

    /// 新目录含有 `.` 与 `..` 两项，返回其描述符编号
    pub fn make_directory(&mut self, path: &str, cwd: u16) -> Result<u16> {
        self.create_node(path, cwd, DescriptorKind::Directory, |fs, parent, id| {
            fs.add_entry(id, ".", id)?;
            fs.add_entry(id, "..", parent)
        })
    }

    /// 只能删除除 `.` 与 `..` 外没有其他有效目录项的目录
    pub fn remove_directory(&mut self, path: &str, cwd: u16) -> Result<()> {
        let desc = self.lookup_with(path, cwd, false, MAX_SYMLINK_HOPS)?;
        if desc.id == ROOT {
            return Err(Error::CannotDeleteRoot);
        }
        if !desc.is_dir() {
            return Err(Error::NotADirectory);
        }

        let (parent, name) = self.resolve_parent(path, cwd)?;
        check_node_name(name)?;

        let occupied = self
            .list_directory(desc.id)?
            .iter()
            .any(|entry| !matches!(entry.name(), "." | ".."));
        if occupied {
            return Err(Error::DirectoryNotEmpty(path.to_owned()));
        }

        self.unlink_entry(parent, name)
    }

    /// 符号链接的内容就是目标路径，返回其描述符编号
    pub fn create_symlink(&mut self, path: &str, target: &str, cwd: u16) -> Result<u16> {
        if target.len() > MAX_FILE_SIZE {
            return Err(Error::RangeExceedsFileSize {
                offset: 0,
                size: target.len(),
                file_size: MAX_FILE_SIZE,
            });
        }

        self.create_node(path, cwd, DescriptorKind::Symlink, |fs, _, id| {
            let mut desc = fs.descriptor(id)?;
            fs.resize(&mut desc, target.len() as u16)?;
            fs.set_descriptor(id, &desc)?;
            fs.write_at(id, 0, target.as_bytes())
        })
    }
}

impl<S: ByteStore> FileSystem<S> {
    /// 分配描述符，由 `init` 填充内容后再登记到父目录；任一步失败都会回收它
    fn create_node(
        &mut self,
        path: &str,
        cwd: u16,
        kind: DescriptorKind,
        init: impl FnOnce(&mut Self, u16, u16) -> Result<()>,
    ) -> Result<u16> {
        let (parent, name) = self.resolve_parent(path, cwd)?;
        check_node_name(name)?;

        let dir = self.directory(parent)?;
        match self.find_entry(&dir, name) {
            Ok(_) => return Err(Error::AlreadyExists(name.to_owned())),
            Err(Error::NotFound(_)) => {}
            Err(err) => return Err(err),
        }

        let id = self.alloc_descriptor(kind)?.id;
        let created = init(self, parent, id).and_then(|()| self.add_entry(parent, name, id));
        if let Err(err) = created {
            self.reclaim(id)?;
            return Err(err);
        }

        log::debug!("created {kind:?} `{name}` as descriptor {id} in directory {parent}");
        Ok(id)
    }

    /// 删除目录项；仍有其他链接或仍被打开时只减少链接数，否则立即回收
    fn unlink_entry(&mut self, parent: u16, name: &str) -> Result<()> {
        let entry = self.remove_entry(parent, name)?;
        let id = entry.descriptor();
        let mut desc = self.descriptor(id)?;

        if desc.links > 1 || self.is_open(id) {
            desc.links = desc.links.saturating_sub(1);
            self.set_descriptor(id, &desc)
        } else {
            self.reclaim(id)
        }
    }

    /// 释放全部块并把描述符标记为未使用
    fn reclaim(&mut self, id: u16) -> Result<()> {
        if id == ROOT {
            return Err(Error::CannotDeleteRoot);
        }

        let mut desc = self.descriptor(id)?;
        self.release_blocks(&mut desc)?;
        self.set_descriptor(id, &Descriptor::unused(id))?;

        log::debug!("reclaimed descriptor {id}");
        Ok(())
    }
}

/// 新名字还不能是 `.` 或 `..`
fn check_node_name(name: &str) -> Result<()> {
    DirEntry::check_name(name)?;
    if matches!(name, "." | "..") {
        return Err(Error::InvalidName(name.to_owned()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use byte_store::MemStore;

    use super::*;
    use crate::BLOCKS_COUNT;

    fn fs() -> FileSystem<MemStore> {
        FileSystem::format_on(MemStore::new(), 32).unwrap()
    }

    fn names(fs: &mut FileSystem<MemStore>, dir: u16) -> Vec<String> {
        fs.list_directory(dir)
            .unwrap()
            .iter()
            .map(|entry| entry.name().to_owned())
            .collect()
    }

    #[test]
    fn create_write_read() {
        let mut fs = fs();
        let id = fs.create_file("a", ROOT).unwrap();
        assert_eq!(fs.truncate("a", 10, ROOT).unwrap().size, 10);

        let handle = fs.open_file("/a", ROOT).unwrap();
        assert_eq!(fs.descriptor_of(handle).unwrap().id, id);
        fs.write_file(handle, b"hello", 3).unwrap();
        assert_eq!(fs.read_file(handle, 0, 10).unwrap(), b"\0\0\0hello\0\0");
        assert!(matches!(
            fs.write_file(handle, b"hello", 6),
            Err(Error::RangeExceedsFileSize { .. })
        ));
        fs.close_file(handle).unwrap();
        assert!(matches!(
            fs.read_file(handle, 0, 1),
            Err(Error::HandleNotOpen(_))
        ));
    }

    #[test]
    fn create_rejects() {
        let mut fs = fs();
        fs.create_file("a", ROOT).unwrap();
        assert!(matches!(
            fs.create_file("a", ROOT),
            Err(Error::AlreadyExists(_))
        ));
        assert!(matches!(fs.create_file("..", ROOT), Err(Error::InvalidName(_))));
        assert!(matches!(fs.create_file("/", ROOT), Err(Error::InvalidName(_))));
        assert!(matches!(
            fs.create_file("a/b", ROOT),
            Err(Error::NotADirectory)
        ));
        assert!(matches!(
            fs.create_file("missing/b", ROOT),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn descriptors_run_out() {
        let mut fs = FileSystem::format_on(MemStore::new(), 3).unwrap();
        fs.create_file("a", ROOT).unwrap();
        fs.create_file("b", ROOT).unwrap();
        assert!(matches!(
            fs.create_file("c", ROOT),
            Err(Error::NoFreeDescriptor)
        ));
        assert_eq!(names(&mut fs, ROOT), ["a", "b"]);
    }

    #[test]
    fn hard_links_share_data() {
        let mut fs = fs();
        let id = fs.create_file("a", ROOT).unwrap();
        fs.truncate("a", 4, ROOT).unwrap();
        fs.link_file("a", "b", ROOT).unwrap();
        assert_eq!(fs.descriptor(id).unwrap().links, 2);

        let handle = fs.open_file("b", ROOT).unwrap();
        fs.write_file(handle, b"data", 0).unwrap();
        fs.close_file(handle).unwrap();

        fs.unlink_file("a", ROOT).unwrap();
        assert_eq!(fs.descriptor(id).unwrap().links, 1);
        let handle = fs.open_file("b", ROOT).unwrap();
        assert_eq!(fs.read_file(handle, 0, 4).unwrap(), b"data");
        fs.close_file(handle).unwrap();

        fs.unlink_file("b", ROOT).unwrap();
        assert!(fs.descriptor(id).unwrap().is_unused());
        assert!(matches!(fs.lookup("b", ROOT), Err(Error::NotFound(_))));
    }

    #[test]
    fn unlink_while_open_defers_reclaim() {
        let mut fs = fs();
        let id = fs.create_file("a", ROOT).unwrap();
        fs.truncate("a", 600, ROOT).unwrap();
        let first = fs.open_file("a", ROOT).unwrap();
        let second = fs.open_file("a", ROOT).unwrap();
        fs.write_file(first, &[1; 600], 0).unwrap();
        let used = BLOCKS_COUNT - fs.free_blocks().unwrap();

        fs.unlink_file("a", ROOT).unwrap();
        let desc = fs.descriptor(id).unwrap();
        assert_eq!(desc.links, 0);
        assert!(!desc.is_unused());
        assert_eq!(fs.read_file(second, 0, 600).unwrap(), vec![1; 600]);

        fs.close_file(first).unwrap();
        assert!(!fs.descriptor(id).unwrap().is_unused());
        fs.close_file(second).unwrap();
        assert!(fs.descriptor(id).unwrap().is_unused());
        assert_eq!(BLOCKS_COUNT - fs.free_blocks().unwrap(), used - 2);
    }

    #[test]
    fn links_refuse_directories_and_symlinks_stay_unresolved() {
        let mut fs = fs();
        fs.make_directory("d", ROOT).unwrap();
        assert!(matches!(
            fs.link_file("d", "e", ROOT),
            Err(Error::IsADirectory)
        ));
        assert!(matches!(fs.unlink_file("d", ROOT), Err(Error::IsADirectory)));

        let link = fs.create_symlink("l", "d", ROOT).unwrap();
        fs.link_file("l", "m", ROOT).unwrap();
        assert_eq!(fs.lookup_with("m", ROOT, false, 0).unwrap().id, link);
        assert_eq!(fs.descriptor(link).unwrap().links, 2);
    }

    #[test]
    fn too_many_links() {
        let mut fs = fs();
        let id = fs.create_file("a", ROOT).unwrap();
        let mut desc = fs.descriptor(id).unwrap();
        desc.links = u8::MAX;
        fs.set_descriptor(id, &desc).unwrap();
        assert!(matches!(
            fs.link_file("a", "b", ROOT),
            Err(Error::TooManyLinks)
        ));
    }

    #[test]
    fn directories() {
        let mut fs = fs();
        let d = fs.make_directory("d", ROOT).unwrap();
        assert_eq!(names(&mut fs, d), [".", ".."]);
        assert_eq!(fs.lookup("d/..", ROOT).unwrap().id, ROOT);
        assert_eq!(fs.lookup("d/.", ROOT).unwrap().id, d);
        assert_eq!(fs.descriptor(d).unwrap().links, 1);

        let e = fs.make_directory("d/e", ROOT).unwrap();
        assert_eq!(fs.lookup("e/..", d).unwrap().id, d);
        fs.create_file("e/f", d).unwrap();

        assert!(matches!(
            fs.remove_directory("d", ROOT),
            Err(Error::DirectoryNotEmpty(_))
        ));
        assert!(matches!(
            fs.remove_directory("d/e/f", ROOT),
            Err(Error::NotADirectory)
        ));
        assert!(matches!(
            fs.remove_directory("/", ROOT),
            Err(Error::CannotDeleteRoot)
        ));
        assert!(matches!(
            fs.remove_directory("d/.", ROOT),
            Err(Error::InvalidName(_))
        ));

        fs.unlink_file("d/e/f", ROOT).unwrap();
        fs.remove_directory("d/e", ROOT).unwrap();
        assert!(fs.descriptor(e).unwrap().is_unused());
        fs.remove_directory("d", ROOT).unwrap();
        assert!(fs.descriptor(d).unwrap().is_unused());
        assert_eq!(fs.free_blocks().unwrap(), BLOCKS_COUNT - 2);
        assert!(names(&mut fs, ROOT).is_empty());
    }

    #[test]
    fn symlinks_read_through() {
        let mut fs = fs();
        fs.make_directory("d", ROOT).unwrap();
        fs.create_file("d/f", ROOT).unwrap();
        fs.truncate("d/f", 3, ROOT).unwrap();
        let handle = fs.open_file("d/f", ROOT).unwrap();
        fs.write_file(handle, b"abc", 0).unwrap();
        fs.close_file(handle).unwrap();

        let link = fs.create_symlink("l", "/d/f", ROOT).unwrap();
        assert_eq!(fs.descriptor(link).unwrap().size, "/d/f".len() as u16);
        assert_eq!(fs.read_link("l", ROOT).unwrap(), "/d/f");

        let handle = fs.open_file("l", ROOT).unwrap();
        assert_eq!(fs.read_file(handle, 0, 3).unwrap(), b"abc");
        fs.close_file(handle).unwrap();

        // 截断跟随符号链接作用于目标
        assert_eq!(fs.truncate("l", 1, ROOT).unwrap().id, fs.lookup("d/f", ROOT).unwrap().id);

        fs.unlink_file("l", ROOT).unwrap();
        assert!(fs.descriptor(link).unwrap().is_unused());
        assert_eq!(fs.lookup("d/f", ROOT).unwrap().size, 1);
    }

    #[test]
    fn failed_creation_reclaims_descriptor() {
        let mut fs = fs();
        while fs.free_blocks().unwrap() > 0 {
            fs.alloc_block().unwrap();
        }
        // 根目录还没有块，登记新名字时分配失败
        assert!(matches!(
            fs.create_file("a", ROOT),
            Err(Error::NoFreeBlock)
        ));
        assert!(fs.descriptor(1).unwrap().is_unused());
    }
}
