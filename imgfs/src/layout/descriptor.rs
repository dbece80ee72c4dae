use crate::layout::{read_u16, write_u16, BlockId, Record};
use crate::{Error, Result, BLOCK_SIZE, DIRECT_BLOCKS};

/// 文件描述符（索引节点）
///
/// 磁盘上占 16 字节：
/// `id u16 | kind u8 | size u16 | links u8 | direct [u16; 4] | indirect u16`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub id: u16,
    pub kind: DescriptorKind,
    /// 文件字节数
    pub size: u16,
    /// 硬链接个数
    pub links: u8,
    /// 直接块
    pub direct: [BlockId; DIRECT_BLOCKS],
    /// 间接映射链的首个节点
    pub indirect: BlockId,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DescriptorKind {
    #[default]
    Unused = 0,
    File = 1,
    Directory = 2,
    Symlink = 3,
}

impl Descriptor {
    /// 新建的描述符有一个链接，不占任何块
    #[inline]
    pub fn new(id: u16, kind: DescriptorKind) -> Self {
        Self {
            id,
            kind,
            size: 0,
            links: 1,
            direct: [BlockId::NULL; DIRECT_BLOCKS],
            indirect: BlockId::NULL,
        }
    }

    #[inline]
    pub fn unused(id: u16) -> Self {
        Self {
            links: 0,
            ..Self::new(id, DescriptorKind::Unused)
        }
    }

    #[inline]
    pub fn is_unused(&self) -> bool {
        self.kind == DescriptorKind::Unused
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.kind == DescriptorKind::Directory
    }

    #[inline]
    pub fn is_symlink(&self) -> bool {
        self.kind == DescriptorKind::Symlink
    }

    /// 容纳文件数据所需的块数
    #[inline]
    pub fn block_count(&self) -> usize {
        (self.size as usize).div_ceil(BLOCK_SIZE)
    }
}

impl TryFrom<u8> for DescriptorKind {
    type Error = Error;

    fn try_from(raw: u8) -> Result<Self> {
        match raw {
            0 => Ok(Self::Unused),
            1 => Ok(Self::File),
            2 => Ok(Self::Directory),
            3 => Ok(Self::Symlink),
            _ => Err(Error::Corrupted("unknown descriptor kind")),
        }
    }
}

impl Record for Descriptor {
    const SIZE: usize = 16;

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut direct = [BlockId::NULL; DIRECT_BLOCKS];
        for (i, block) in direct.iter_mut().enumerate() {
            *block = BlockId::new(read_u16(bytes, 6 + i * 2));
        }

        Ok(Self {
            id: read_u16(bytes, 0),
            kind: DescriptorKind::try_from(bytes[2])?,
            size: read_u16(bytes, 3),
            links: bytes[5],
            direct,
            indirect: BlockId::new(read_u16(bytes, 14)),
        })
    }

    fn encode(&self, bytes: &mut [u8]) {
        write_u16(bytes, 0, self.id);
        bytes[2] = self.kind as u8;
        write_u16(bytes, 3, self.size);
        bytes[5] = self.links;
        for (i, block) in self.direct.iter().enumerate() {
            write_u16(bytes, 6 + i * 2, (*block).into());
        }
        write_u16(bytes, 14, self.indirect.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_positions() {
        let desc = Descriptor {
            id: 0x0102,
            kind: DescriptorKind::Symlink,
            size: 0x0304,
            links: 5,
            direct: [
                BlockId::new(0x0A0B),
                BlockId::new(1),
                BlockId::NULL,
                BlockId::new(7),
            ],
            indirect: BlockId::new(0x1122),
        };
        let mut bytes = [0; Descriptor::SIZE];
        desc.encode(&mut bytes);
        assert_eq!(
            bytes,
            [
                0x02, 0x01, 3, 0x04, 0x03, 5, 0x0B, 0x0A, 1, 0, 0xFF, 0xFF, 7, 0, 0x22, 0x11
            ]
        );
        assert_eq!(Descriptor::decode(&bytes).unwrap(), desc);
    }

    #[test]
    fn zeroed_record_is_unused() {
        let desc = Descriptor::decode(&[0; Descriptor::SIZE]).unwrap();
        assert!(desc.is_unused());
        assert_eq!(desc.links, 0);
    }

    #[test]
    fn unknown_kind() {
        let mut bytes = [0; Descriptor::SIZE];
        bytes[2] = 9;
        assert!(matches!(
            Descriptor::decode(&bytes),
            Err(Error::Corrupted(_))
        ));
    }

    #[test]
    fn block_count() {
        let mut desc = Descriptor::new(1, DescriptorKind::File);
        assert_eq!(desc.block_count(), 0);
        desc.size = 1;
        assert_eq!(desc.block_count(), 1);
        desc.size = 512;
        assert_eq!(desc.block_count(), 1);
        desc.size = 513;
        assert_eq!(desc.block_count(), 2);
        desc.size = u16::MAX;
        assert_eq!(desc.block_count(), 128);
    }
}
