
use std::fs;
use std::path::Path;

use imgfs::{ByteStore, DirEntry, FileSystem, MAX_FILE_SIZE, ROOT};

/// Copies every regular file directly under `source` into the image root,
/// in name order, and returns the names that were packed.
///
/// Files whose names do not fit a directory entry, or that are larger than
/// an image file can be, are skipped with a warning.
pub fn pack_dir<S: ByteStore>(
    fs: &mut FileSystem<S>,
    source: impl AsRef<Path>,
) -> imgfs::Result<Vec<String>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => files.push((name, entry.path())),
            Err(name) => log::warn!("skipping {name:?}: name is not UTF-8"),
        }
    }
    files.sort();

    let mut packed = Vec::with_capacity(files.len());
    for (name, path) in files {
        if let Err(err) = DirEntry::check_name(&name) {
            log::warn!("skipping {name:?}: {err}");
            continue;
        }
        let data = fs::read(&path)?;
        if data.len() > MAX_FILE_SIZE {
            log::warn!("skipping {name:?}: {} bytes is too large", data.len());
            continue;
        }

        fs.create_file(&name, ROOT)?;
        fs.truncate(&name, data.len() as u16, ROOT)?;
        let handle = fs.open_file(&name, ROOT)?;
        fs.write_file(handle, &data, 0)?;
        fs.close_file(handle)?;

        log::info!("packed {name:?} ({} bytes)", data.len());
        packed.push(name);
    }

    fs.sync()?;
    Ok(packed)
}
