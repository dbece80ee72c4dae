//! # 字节存储接口层
//!
//! 字节存储是可按**字节偏移**随机读写的扁平容器，例如磁盘镜像文件；
//! [`ByteStore`] 就是对它的抽象，文件系统的全部数据都经由它落地。
//!
//! 与块设备不同，读写的范围不必按块对齐。

mod file;
mod mem;

use std::io;

pub use self::{file::FileStore, mem::MemStore};

/// 字节存储特质
pub trait ByteStore {
    /// 从 `offset` 处读满 `buf`，不足则报错
    fn read_bytes(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()>;

    /// 把 `buf` 整个写到 `offset` 处
    fn write_bytes(&mut self, offset: u64, buf: &[u8]) -> io::Result<()>;

    /// 存储当前的字节数
    fn len(&mut self) -> io::Result<u64>;

    /// 调整存储的字节数，新增的部分为零
    fn resize(&mut self, len: u64) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
