//! # 路径解析层
//!
//! 以 `/` 分隔的路径，开头的 `/` 表示从根目录出发，否则从给定的起始目录出发。
//! `.` 与 `..` 只是普通的目录项。

use byte_store::ByteStore;

use crate::layout::Descriptor;
use crate::{Error, FileSystem, Result, MAX_SYMLINK_HOPS, ROOT, SEPARATOR};

impl<S: ByteStore> FileSystem<S> {
    /// 解析路径，跟随所有符号链接
    pub fn lookup(&mut self, path: &str, cwd: u16) -> Result<Descriptor> {
        self.lookup_with(path, cwd, true, MAX_SYMLINK_HOPS)
    }

    /// 中间分量上的符号链接总会被跟随；末分量上的仅在 `resolve_symlinks` 时跟随。
    ///
    /// 每跟随一次消耗一跳，目标与剩余路径拼接后从起始目录重新解析，
    /// 跳数用尽时报 [`Error::SymlinkLoop`]。
    pub fn lookup_with(
        &mut self,
        path: &str,
        cwd: u16,
        resolve_symlinks: bool,
        mut hops: usize,
    ) -> Result<Descriptor> {
        let mut pending = path.to_owned();

        'restart: loop {
            let mut current = if pending.starts_with(SEPARATOR) {
                ROOT
            } else {
                cwd
            };
            let mut rest = pending.as_str();

            loop {
                rest = rest.trim_start_matches(SEPARATOR);
                if rest.is_empty() {
                    return self.descriptor(current);
                }

                let (head, tail) = rest.split_once(SEPARATOR).unwrap_or((rest, ""));
                let tail = tail.trim_start_matches(SEPARATOR);

                let dir = self.directory(current)?;
                let (entry, _) = self.find_entry(&dir, head)?;
                let desc = self.descriptor(entry.descriptor())?;
                log::trace!("`{head}` in directory {current} is descriptor {}", desc.id);

                if desc.is_symlink() && (resolve_symlinks || !tail.is_empty()) {
                    if hops == 0 {
                        return Err(Error::SymlinkLoop);
                    }
                    hops -= 1;

                    let target = self.symlink_target(&desc)?;
                    pending = if tail.is_empty() {
                        target
                    } else {
                        format!("{target}{SEPARATOR}{tail}")
                    };
                    continue 'restart;
                }

                if tail.is_empty() {
                    return Ok(desc);
                }
                current = desc.id;
                rest = tail;
            }
        }
    }

    /// 读出符号链接所存的目标路径，不跟随
    pub fn read_link(&mut self, path: &str, cwd: u16) -> Result<String> {
        let desc = self.lookup_with(path, cwd, false, MAX_SYMLINK_HOPS)?;
        if !desc.is_symlink() {
            return Err(Error::NotASymlink);
        }
        self.symlink_target(&desc)
    }

    pub(crate) fn symlink_target(&mut self, desc: &Descriptor) -> Result<String> {
        let payload = self.read_at(desc, 0, desc.size as usize)?;
        String::from_utf8(payload).map_err(|_| Error::Corrupted("symlink target is not UTF-8"))
    }

    /// 解析出父目录，返回父目录编号与末分量
    pub(crate) fn resolve_parent<'p>(&mut self, path: &'p str, cwd: u16) -> Result<(u16, &'p str)> {
        let (dir, name) = split_parent(path);
        let parent = match dir {
            Some(dir) => self.lookup(dir, cwd)?.id,
            None => cwd,
        };
        self.directory(parent)?;
        Ok((parent, name))
    }
}

/// 把路径拆成父目录部分与末分量；没有分隔符时父目录为 `None`
pub(crate) fn split_parent(path: &str) -> (Option<&str>, &str) {
    let path = path.trim_end_matches(SEPARATOR);
    match path.rsplit_once(SEPARATOR) {
        None => (None, path),
        Some((dir, name)) => {
            let dir = dir.trim_end_matches(SEPARATOR);
            (Some(if dir.is_empty() { "/" } else { dir }), name)
        }
    }
}

#[cfg(test)]
mod tests {
    use byte_store::MemStore;

    use super::*;
    use crate::DescriptorKind;

    /// 根目录下：目录 `d`（内含文件 `f`）、指向 `d` 的符号链接 `l`
    fn fs() -> FileSystem<MemStore> {
        let mut fs = FileSystem::format_on(MemStore::new(), 16).unwrap();
        let dir = fs.alloc_descriptor(DescriptorKind::Directory).unwrap();
        fs.add_entry(ROOT, "d", dir.id).unwrap();
        let file = fs.alloc_descriptor(DescriptorKind::File).unwrap();
        fs.add_entry(dir.id, "f", file.id).unwrap();
        symlink(&mut fs, ROOT, "l", "/d");
        fs
    }

    fn symlink(fs: &mut FileSystem<MemStore>, dir: u16, name: &str, target: &str) -> u16 {
        let mut link = fs.alloc_descriptor(DescriptorKind::Symlink).unwrap();
        fs.resize(&mut link, target.len() as u16).unwrap();
        fs.set_descriptor(link.id, &link).unwrap();
        fs.write_at(link.id, 0, target.as_bytes()).unwrap();
        fs.add_entry(dir, name, link.id).unwrap();
        link.id
    }

    #[test]
    fn split() {
        assert_eq!(split_parent("a"), (None, "a"));
        assert_eq!(split_parent("a/"), (None, "a"));
        assert_eq!(split_parent("/a"), (Some("/"), "a"));
        assert_eq!(split_parent("//a"), (Some("/"), "a"));
        assert_eq!(split_parent("a/b/c"), (Some("a/b"), "c"));
        assert_eq!(split_parent("a//b/"), (Some("a"), "b"));
        assert_eq!(split_parent("/"), (None, ""));
    }

    #[test]
    fn absolute_and_relative() {
        let mut fs = fs();
        assert_eq!(fs.lookup("/", 2).unwrap().id, ROOT);
        assert_eq!(fs.lookup("", 1).unwrap().id, 1);
        assert_eq!(fs.lookup("/d/f", ROOT).unwrap().id, 2);
        assert_eq!(fs.lookup("d//f/", ROOT).unwrap().id, 2);
        assert_eq!(fs.lookup("f", 1).unwrap().id, 2);
        assert_eq!(fs.lookup("/d", 1).unwrap().id, 1);
        assert!(matches!(fs.lookup("f", ROOT), Err(Error::NotFound(_))));
        assert!(matches!(
            fs.lookup("d/f/x", ROOT),
            Err(Error::NotADirectory)
        ));
    }

    #[test]
    fn follows_symlinks() {
        let mut fs = fs();
        assert_eq!(fs.lookup("l/f", ROOT).unwrap().id, 2);
        assert_eq!(fs.lookup("l", ROOT).unwrap().id, 1);
        assert_eq!(fs.lookup_with("l", ROOT, false, 0).unwrap().id, 3);
        assert_eq!(fs.read_link("l", ROOT).unwrap(), "/d");
        assert!(matches!(fs.read_link("d", ROOT), Err(Error::NotASymlink)));

        // 中间分量上的符号链接即便不解析末分量也会跟随
        assert_eq!(fs.lookup_with("l/f", ROOT, false, 1).unwrap().id, 2);
        assert!(matches!(
            fs.lookup_with("l/f", ROOT, false, 0),
            Err(Error::SymlinkLoop)
        ));
    }

    #[test]
    fn relative_targets_restart_from_cwd() {
        let mut fs = fs();
        // 目标相对起始目录解析，而不是符号链接所在的目录
        symlink(&mut fs, 1, "r", "d/f");
        assert_eq!(fs.lookup("/d/r", ROOT).unwrap().id, 2);
        assert!(matches!(fs.lookup("r", 1), Err(Error::NotFound(_))));
    }

    #[test]
    fn loops_exhaust_hops() {
        let mut fs = fs();
        symlink(&mut fs, ROOT, "a", "b");
        symlink(&mut fs, ROOT, "b", "a");
        assert!(matches!(fs.lookup("a", ROOT), Err(Error::SymlinkLoop)));
        assert!(matches!(fs.lookup("a/x", ROOT), Err(Error::SymlinkLoop)));
        assert_eq!(fs.lookup_with("a", ROOT, false, 0).unwrap().id, 4);
    }

    #[test]
    fn parent_resolution() {
        let mut fs = fs();
        assert_eq!(fs.resolve_parent("x", 1).unwrap(), (1, "x"));
        assert_eq!(fs.resolve_parent("/x", 1).unwrap(), (ROOT, "x"));
        assert_eq!(fs.resolve_parent("l/x", ROOT).unwrap(), (1, "x"));
        assert!(matches!(
            fs.resolve_parent("d/f/x", ROOT),
            Err(Error::NotADirectory)
        ));
    }
}
