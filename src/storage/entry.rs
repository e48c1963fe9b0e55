//! 日志条目编解码
//!
//! 磁盘帧格式 (全部小端):
//!
//! ```text
//! size:u32 | key_len:u32 | key_bytes | val_len:u32 | val_bytes
//! ```
//!
//! `size` 为整帧长度 (含自身 4 字节)。空 value 的条目是墓碑,
//! 解码侧必须能区分。

use std::io::{self, Read};

use crate::{KvError, Result};

/// 帧头开销: size(4) + key_len(4) + val_len(4)
pub const FRAME_OVERHEAD: usize = 12;

/// 一条 key/value 记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: String,
    pub value: String,
}

impl Entry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// 构造墓碑条目 (空 value)
    pub fn tombstone(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: String::new(),
        }
    }

    /// 是否为墓碑
    pub fn is_tombstone(&self) -> bool {
        self.value.is_empty()
    }

    /// 编码后的帧长度
    pub fn encoded_len(&self) -> usize {
        FRAME_OVERHEAD + self.key.len() + self.value.len()
    }

    /// 编码为自分界字节帧
    pub fn encode(&self) -> Vec<u8> {
        let size = self.encoded_len();
        let mut buf = Vec::with_capacity(size);
        buf.extend_from_slice(&(size as u32).to_le_bytes());
        buf.extend_from_slice(&(self.key.len() as u32).to_le_bytes());
        buf.extend_from_slice(self.key.as_bytes());
        buf.extend_from_slice(&(self.value.len() as u32).to_le_bytes());
        buf.extend_from_slice(self.value.as_bytes());
        buf
    }

    /// 从完整帧解码 (`frame` 含 size 前缀)
    pub fn decode(frame: &[u8]) -> Result<Self> {
        if frame.len() < FRAME_OVERHEAD {
            return Err(KvError::CorruptedFile(format!(
                "frame too short: {} bytes",
                frame.len()
            )));
        }

        let size = u32::from_le_bytes(frame[0..4].try_into().unwrap()) as usize;
        if size != frame.len() {
            return Err(KvError::CorruptedFile(format!(
                "frame size mismatch: declared {}, got {}",
                size,
                frame.len()
            )));
        }

        let key_len = u32::from_le_bytes(frame[4..8].try_into().unwrap()) as usize;
        if 8 + key_len + 4 > size {
            return Err(KvError::CorruptedFile(format!(
                "key length {} exceeds frame",
                key_len
            )));
        }

        let val_off = 8 + key_len;
        let val_len =
            u32::from_le_bytes(frame[val_off..val_off + 4].try_into().unwrap()) as usize;
        if FRAME_OVERHEAD + key_len + val_len != size {
            return Err(KvError::CorruptedFile(format!(
                "value length {} inconsistent with frame size {}",
                val_len, size
            )));
        }

        let key = String::from_utf8(frame[8..8 + key_len].to_vec())
            .map_err(|e| KvError::CorruptedFile(format!("invalid key utf-8: {}", e)))?;
        let value = String::from_utf8(frame[val_off + 4..size].to_vec())
            .map_err(|e| KvError::CorruptedFile(format!("invalid value utf-8: {}", e)))?;

        Ok(Self { key, value })
    }

    /// 从读取器顺序读一帧
    ///
    /// 返回 `Ok(None)` 表示干净 EOF; 结尾被截断的半帧同样按 EOF 处理
    /// (崩溃时最后一帧可能未写完)。帧中途长度不一致则报 `CorruptedFile`。
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Option<(Self, u64)>> {
        let mut size_buf = [0u8; 4];
        match read_exact_or_eof(reader, &mut size_buf)? {
            ReadOutcome::Eof => return Ok(None),
            ReadOutcome::Partial => return Ok(None),
            ReadOutcome::Full => {}
        }

        let size = u32::from_le_bytes(size_buf) as usize;
        if size < FRAME_OVERHEAD {
            return Err(KvError::CorruptedFile(format!(
                "declared frame size {} below minimum",
                size
            )));
        }

        let mut frame = vec![0u8; size];
        frame[0..4].copy_from_slice(&size_buf);
        match read_exact_or_eof(reader, &mut frame[4..])? {
            // size 前缀完整但帧体被截断: 视为崩溃残留, 按 EOF 处理
            ReadOutcome::Eof | ReadOutcome::Partial => return Ok(None),
            ReadOutcome::Full => {}
        }

        let entry = Self::decode(&frame)?;
        Ok(Some((entry, size as u64)))
    }
}

enum ReadOutcome {
    Full,
    Partial,
    Eof,
}

/// 尽量填满 buf; 区分干净 EOF / 半帧截断 / 完整读取
fn read_exact_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<ReadOutcome> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => {
                return Ok(if filled == 0 {
                    ReadOutcome::Eof
                } else {
                    ReadOutcome::Partial
                });
            }
            Ok(n) => filled += n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(KvError::Io(e)),
        }
    }
    Ok(ReadOutcome::Full)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_encode_decode_roundtrip() {
        let entry = Entry::new("key1", "value1");
        let buf = entry.encode();

        assert_eq!(buf.len(), 22);
        assert_eq!(entry.encoded_len(), 22);

        let decoded = Entry::decode(&buf).unwrap();
        assert_eq!(decoded, entry);
    }

    #[test]
    fn test_tombstone_distinguishable() {
        let tomb = Entry::tombstone("key1");
        assert!(tomb.is_tombstone());

        let buf = tomb.encode();
        let decoded = Entry::decode(&buf).unwrap();
        assert!(decoded.is_tombstone());
        assert_eq!(decoded.key, "key1");

        assert!(!Entry::new("key1", "v").is_tombstone());
    }

    #[test]
    fn test_read_from_stream() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&Entry::new("key1", "value1").encode());
        buf.extend_from_slice(&Entry::tombstone("key2").encode());

        let mut cursor = Cursor::new(buf);

        let (e1, n1) = Entry::read_from(&mut cursor).unwrap().unwrap();
        assert_eq!(e1.key, "key1");
        assert_eq!(e1.value, "value1");
        assert_eq!(n1, 22);

        let (e2, n2) = Entry::read_from(&mut cursor).unwrap().unwrap();
        assert!(e2.is_tombstone());
        assert_eq!(n2, 16);

        assert!(Entry::read_from(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn test_truncated_tail_is_eof() {
        let full = Entry::new("key1", "value1").encode();

        // 截断帧体
        let mut cursor = Cursor::new(full[..10].to_vec());
        assert!(Entry::read_from(&mut cursor).unwrap().is_none());

        // 截断 size 前缀
        let mut cursor = Cursor::new(full[..2].to_vec());
        assert!(Entry::read_from(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn test_corrupted_frame_rejected() {
        let mut buf = Entry::new("key1", "value1").encode();
        // 声明长度与实际不符
        buf[4..8].copy_from_slice(&100u32.to_le_bytes());
        assert!(matches!(
            Entry::decode(&buf),
            Err(KvError::CorruptedFile(_))
        ));

        // size 小于最小帧头
        let mut cursor = Cursor::new(4u32.to_le_bytes().to_vec());
        assert!(matches!(
            Entry::read_from(&mut cursor),
            Err(KvError::CorruptedFile(_))
        ));
    }
}
