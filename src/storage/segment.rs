//! 分段文件 + 内存 hash 索引
//!
//! 每个分段独占一份 `key → 偏移` 索引; 值为 `DELETED` 表示该分段内
//! 此 key 已被墓碑覆盖。封存分段的文件与索引都不可变, 只能被合并
//! 流程整体替换。

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::storage::entry::Entry;
use crate::{KvError, Result};

/// 分段文件名前缀
pub const SEGMENT_PREFIX: &str = "segment-";

/// 可写分段的文件名后缀
pub const ACTIVE_SUFFIX: &str = "active";

/// 合并产物的文件名后缀
pub const MERGED_SUFFIX: &str = "merged";

/// 索引中的墓碑哨兵值
pub const DELETED: i64 = -1;

/// `key → 帧起始偏移 | DELETED` 映射
pub type HashIndex = HashMap<String, i64>;

/// 一个日志分段
#[derive(Debug, Clone)]
pub struct Segment {
    /// 分段文件路径
    pub path: PathBuf,
    /// 当前逻辑偏移 (= 引擎已知的文件长度)
    pub offset: i64,
    /// 本分段的内存索引
    pub index: HashIndex,
}

impl Segment {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            offset: 0,
            index: HashIndex::new(),
        }
    }

    /// 文件名中 `segment-` 之后的后缀
    pub fn suffix(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_prefix(SEGMENT_PREFIX))
            .unwrap_or("")
    }

    pub fn is_active(&self) -> bool {
        self.suffix() == ACTIVE_SUFFIX
    }

    /// 顺序回放文件重建索引 (仅在 open 期间调用, 无并发访问)
    pub fn recover(&mut self) -> Result<()> {
        let file = File::open(&self.path)?;
        let mut reader = BufReader::new(file);

        loop {
            let frame = Entry::read_from(&mut reader).map_err(|e| match e {
                KvError::CorruptedFile(msg) => {
                    KvError::CorruptedFile(format!("{}: {}", self.path.display(), msg))
                }
                other => other,
            })?;

            let (entry, n) = match frame {
                Some(f) => f,
                None => break,
            };

            if entry.is_tombstone() {
                self.index.insert(entry.key, DELETED);
            } else {
                self.index.insert(entry.key, self.offset);
            }
            self.offset += n as i64;
        }

        log::debug!(
            "Recovered segment {}: {} keys, {} bytes",
            self.path.display(),
            self.index.len(),
            self.offset
        );

        Ok(())
    }

    /// 按索引读取一个 key 的值
    pub fn get(&self, key: &str) -> Result<String> {
        let position = match self.index.get(key) {
            Some(p) => *p,
            None => return Err(KvError::NotFound),
        };

        if position == DELETED {
            return Err(KvError::ItemDeleted);
        }

        read_value_at(&self.path, position)
    }
}

/// 在指定偏移处解码一帧并返回其 value
pub fn read_value_at(path: &Path, position: i64) -> Result<String> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(position as u64))?;

    let mut reader = BufReader::new(file);
    match Entry::read_from(&mut reader)? {
        Some((entry, _)) => Ok(entry.value),
        // 偏移处没有完整帧: 文件在查索引与读文件之间被替换过
        None => Err(KvError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "no complete frame at recorded offset",
        ))),
    }
}

/// 恢复后的分段排序: active 最前 (最新), merged 最后 (最旧),
/// 其余 `segment-<N>` 按 N 降序排列。
pub fn compare(a: &Segment, b: &Segment) -> Ordering {
    rank(a).cmp(&rank(b))
}

/// (分组序, 组内序) — 数字分段组内按 -N 升序即 N 降序
fn rank(s: &Segment) -> (u8, i64) {
    let suffix = s.suffix();
    if suffix == ACTIVE_SUFFIX {
        return (0, 0);
    }
    if suffix == MERGED_SUFFIX {
        return (2, 0);
    }
    match suffix.parse::<i64>() {
        Ok(n) => (1, -n),
        // 无法识别的后缀排在数字分段之后, 合并分段之前
        Err(_) => (1, i64::MAX),
    }
}
