//! imgfs：建立在单个扁平镜像文件之上的类 Unix 文件系统。

/* imgfs 的整体架构，自上而下 */

// 链接与生命周期层：创建、硬链接、删除、目录与符号链接
mod vfs;

// 文件读写层：字节区间到块链的映射
mod file;

// 路径解析层
mod path;

// 目录层：目录项的查找、墓碑删除与槽位分配
mod dir;

// 块链层：直接块 + 间接映射链
mod chain;

// 磁盘管理器层：布局、描述符与块的存取、位图分配
mod efs;

// 磁盘数据结构层：表示磁盘文件系统的数据结构
mod layout;

mod error;

pub use byte_store::{ByteStore, FileStore, MemStore};

pub use self::{
    efs::{FileSystem, Handle},
    error::{Error, Result},
    layout::{BlockId, DataBlock, Descriptor, DescriptorKind, DirEntry, FileMap, Layout, Record},
};

pub const BLOCK_SIZE: usize = 512;
/// 块区域的总块数，位图恰好占 1022 字节
pub const BLOCKS_COUNT: usize = 8176;
/// 每个间接映射记录可容纳的块编号数
pub const REFS_IN_FILE_MAP: usize = BLOCK_SIZE / 2 - 1;
/// 描述符内的直接块个数
pub const DIRECT_BLOCKS: usize = 4;
/// 哨兵编号：“没有块/没有描述符”
pub const NULL_ID: u16 = u16::MAX;
pub const MAX_SYMLINK_HOPS: usize = 255;
pub const MAX_FILE_SIZE: usize = u16::MAX as usize;
pub const SEPARATOR: char = '/';
/// 根目录的描述符编号
pub const ROOT: u16 = 0;
