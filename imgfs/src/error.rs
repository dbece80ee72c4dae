use std::io;

use thiserror::Error;

use crate::Handle;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("no free descriptor left")]
    NoFreeDescriptor,
    #[error("no free block left")]
    NoFreeBlock,
    #[error("index {index} is out of range, capacity is {capacity}")]
    OutOfRange { index: usize, capacity: usize },
    #[error("the null block is reserved and cannot be written")]
    ReservedIndex,
    #[error("`{0}` not found")]
    NotFound(String),
    #[error("not a directory")]
    NotADirectory,
    #[error("is a directory")]
    IsADirectory,
    #[error("directory `{0}` is not empty")]
    DirectoryNotEmpty(String),
    #[error("the root directory cannot be removed")]
    CannotDeleteRoot,
    #[error("too many levels of symbolic links")]
    SymlinkLoop,
    #[error("not a symbolic link")]
    NotASymlink,
    #[error("too many links")]
    TooManyLinks,
    #[error("handle {0} is not open")]
    HandleNotOpen(Handle),
    #[error("range {offset}+{size} exceeds file size {file_size}")]
    RangeExceedsFileSize {
        offset: usize,
        size: usize,
        file_size: usize,
    },
    #[error("offset {0} exceeds the block size")]
    OffsetExceedsBlockSize(usize),
    #[error("`{0}` already exists")]
    AlreadyExists(String),
    #[error("invalid name `{0}`")]
    InvalidName(String),
    #[error("directory cannot grow any further")]
    DirectoryFull,
    #[error("invalid descriptor count {0}")]
    InvalidDescriptorCount(u32),
    #[error("corrupted image: {0}")]
    Corrupted(&'static str),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = core::result::Result<T, Error>;
