use crate::layout::{read_u16, write_u16, BlockId, Record};
use crate::{Result, BLOCK_SIZE, REFS_IN_FILE_MAP};

/// 间接映射记录，占满一个块：`refs [u16; 255] | next u16`
///
/// 多个映射记录经 `next` 串成单链表，承载直接块之后的全部块编号。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMap {
    pub refs: [BlockId; REFS_IN_FILE_MAP],
    /// 链上的下一个映射记录
    pub next: BlockId,
}

impl FileMap {
    /// 全部置空的映射记录，用作链上的新节点
    pub fn empty() -> Self {
        Self {
            refs: [BlockId::NULL; REFS_IN_FILE_MAP],
            next: BlockId::NULL,
        }
    }

    /// 全零的映射记录，即空块上读出的内容
    pub fn zeroed() -> Self {
        Self {
            refs: [BlockId::new(0); REFS_IN_FILE_MAP],
            next: BlockId::new(0),
        }
    }
}

impl Record for FileMap {
    const SIZE: usize = BLOCK_SIZE;

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut refs = [BlockId::NULL; REFS_IN_FILE_MAP];
        for (i, block) in refs.iter_mut().enumerate() {
            *block = BlockId::new(read_u16(bytes, i * 2));
        }

        Ok(Self {
            refs,
            next: BlockId::new(read_u16(bytes, REFS_IN_FILE_MAP * 2)),
        })
    }

    fn encode(&self, bytes: &mut [u8]) {
        for (i, block) in self.refs.iter().enumerate() {
            write_u16(bytes, i * 2, (*block).into());
        }
        write_u16(bytes, REFS_IN_FILE_MAP * 2, self.next.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_lives_at_510() {
        let mut map = FileMap::empty();
        map.refs[0] = BlockId::new(0x0201);
        map.refs[254] = BlockId::new(9);
        map.next = BlockId::new(0x0403);

        let mut bytes = [0; FileMap::SIZE];
        map.encode(&mut bytes);
        assert_eq!(&bytes[..4], &[0x01, 0x02, 0xFF, 0xFF]);
        assert_eq!(&bytes[508..], &[9, 0, 0x03, 0x04]);
        assert_eq!(FileMap::decode(&bytes).unwrap(), map);
    }

    #[test]
    fn zeroed_map_decodes_from_zero_block() {
        assert_eq!(FileMap::decode(&[0; FileMap::SIZE]).unwrap(), FileMap::zeroed());
    }
}
