use crate::layout::{read_u16, write_u16, Record};
use crate::{Error, Result, SEPARATOR};

const NAME_MAX_LEN: usize = 13;

/// 目录项：`name [u8; 13] | valid u8 | descriptor u16`
///
/// 删除时只清掉 `valid`，留下墓碑。
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// UTF-8 名字，不足部分补 0
    name: [u8; NAME_MAX_LEN],
    valid: bool,
    descriptor: u16,
}

impl DirEntry {
    pub fn new(name: &str, descriptor: u16) -> Result<Self> {
        Self::check_name(name)?;

        let bytes = name.as_bytes();
        let mut raw = [0; NAME_MAX_LEN];
        raw[..bytes.len()].copy_from_slice(bytes);

        Ok(Self {
            name: raw,
            valid: true,
            descriptor,
        })
    }

    /// 名字不能为空、不能超过 13 字节、不能含分隔符或 NUL
    pub fn check_name(name: &str) -> Result<()> {
        if name.is_empty()
            || name.len() > NAME_MAX_LEN
            || name.contains(SEPARATOR)
            || name.contains('\0')
        {
            return Err(Error::InvalidName(name.to_owned()));
        }
        Ok(())
    }

    /// 构造与解码时都已校验过 UTF-8
    pub fn name(&self) -> &str {
        core::str::from_utf8(name_bytes(&self.name)).unwrap_or_default()
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    #[inline]
    pub fn descriptor(&self) -> u16 {
        self.descriptor
    }

    /// 保留名字与编号的墓碑
    #[inline]
    pub fn tombstone(&self) -> Self {
        Self {
            valid: false,
            ..self.clone()
        }
    }
}

impl Record for DirEntry {
    const SIZE: usize = 16;

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut name = [0; NAME_MAX_LEN];
        name.copy_from_slice(&bytes[..NAME_MAX_LEN]);
        if core::str::from_utf8(name_bytes(&name)).is_err() {
            return Err(Error::Corrupted("directory entry name is not UTF-8"));
        }

        Ok(Self {
            name,
            valid: bytes[NAME_MAX_LEN] != 0,
            descriptor: read_u16(bytes, NAME_MAX_LEN + 1),
        })
    }

    fn encode(&self, bytes: &mut [u8]) {
        bytes[..NAME_MAX_LEN].copy_from_slice(&self.name);
        bytes[NAME_MAX_LEN] = self.valid as u8;
        write_u16(bytes, NAME_MAX_LEN + 1, self.descriptor);
    }
}

/// 去掉末尾补的 0
fn name_bytes(raw: &[u8; NAME_MAX_LEN]) -> &[u8] {
    let len = raw.iter().position(|&c| c == 0).unwrap_or(NAME_MAX_LEN);
    &raw[..len]
}
