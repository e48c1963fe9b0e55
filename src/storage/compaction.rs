//! 后台合并 (compaction)
//!
//! 把全部封存分段重写为单个 `segment-merged`, 每个仍然存活的 key
//! 只保留最新一条记录。活跃分段不参与。产物先写到固定名字的临时
//! 文件, 依赖目录内 `rename` 的原子性换入, 旧文件在换入成功后才
//! 删除, 因此跨重启是幂等的。

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::atomic::Ordering;

use crate::storage::database::DbInner;
use crate::storage::entry::Entry;
use crate::storage::segment::{Segment, DELETED, MERGED_SUFFIX, SEGMENT_PREFIX};
use crate::Result;

/// 合并线程信号
pub enum MergeSignal {
    /// 触发一轮合并 (单槽通道, 多次触发会合并)
    Merge,
    /// 停止合并线程
    Shutdown,
}

/// 执行一轮合并
///
/// 封存分段不足两个时为 no-op。失败时数据库状态不变。
pub(crate) fn run_merge(inner: &DbInner) -> Result<()> {
    let _guard = inner.merge_mutex.lock();

    // 1. 快照封存分段 (下标 1 起); 之后发生的滚动只会在列表头部
    //    插入, 快照对应的始终是列表的尾部区间
    let sealed: Vec<Segment> = {
        let segments = inner.segments.read();
        segments[1..].to_vec()
    };

    if sealed.len() < 2 {
        return Ok(());
    }

    // 2. 从最旧到最新扫描, 构建 key → 所属分段; 墓碑把 key 从结果
    //    中整体剔除, 否则较旧的值会在合并产物里复活
    let mut owners: HashMap<String, usize> = HashMap::new();
    for (idx, seg) in sealed.iter().enumerate().rev() {
        for (key, pos) in &seg.index {
            if *pos == DELETED {
                owners.remove(key);
            } else {
                owners.insert(key.clone(), idx);
            }
        }
    }

    // 3. 写临时文件 (固定名字, 崩溃残留由 open 清理)
    let temp_path = inner.dir.join(SEGMENT_PREFIX);
    let mut temp_file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&temp_path)?;

    let mut merged = Segment::new(temp_path.clone());

    // 4. 逐 key 经所属分段读出当前值, 追加到临时文件
    for (key, owner) in &owners {
        let value = match sealed[*owner].get(key) {
            Ok(v) => v,
            // 封存分段在快照期间不可变, 到这里只可能是 IO 故障
            Err(e) => {
                log::error!("Merge read of {} failed: {}", key, e);
                return Err(e);
            }
        };

        let entry = Entry::new(key.clone(), value);
        let buf = entry.encode();
        temp_file.write_all(&buf)?;
        merged.index.insert(key.clone(), merged.offset);
        merged.offset += buf.len() as i64;
    }

    temp_file.sync_all()?;
    drop(temp_file);

    let merged_path = inner
        .dir
        .join(format!("{}{}", SEGMENT_PREFIX, MERGED_SUFFIX));

    // 5. 持排他锁换入: 重命名临时文件, 用单个合并分段替换快照区间
    {
        let mut segments = inner.segments.write();
        std::fs::rename(&temp_path, &merged_path)?;
        merged.path = merged_path.clone();

        let keep = segments.len() - sealed.len();
        segments.truncate(keep);
        segments.push(merged);
    }

    // 6. 锁外删除旧文件; 被 rename 覆盖的那个除外
    let mut removed = 0;
    for seg in &sealed {
        if seg.path == merged_path {
            continue;
        }
        match std::fs::remove_file(&seg.path) {
            Ok(()) => removed += 1,
            Err(e) => log::warn!(
                "Failed to unlink merged-away segment {}: {}",
                seg.path.display(),
                e
            ),
        }
    }

    inner.stats.merges.fetch_add(1, Ordering::Relaxed);
    log::info!(
        "Merge completed: {} sealed segments -> 1 ({} keys, {} files removed)",
        sealed.len(),
        owners.len(),
        removed
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::{Database, DbConfig};
    use crate::KvError;

    fn open_small(dir: &std::path::Path, block: u64) -> Database {
        Database::open(
            DbConfig::new(dir)
                .with_block_size(block)
                .with_auto_merge(false),
        )
        .unwrap()
    }

    #[test]
    fn test_merge_is_noop_with_one_sealed_segment() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_small(dir.path(), 50);

        for (k, v) in [("key1", "value1"), ("key2", "value2"), ("key3", "value3")] {
            db.put(k, v).unwrap();
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);

        db.merge().unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);

        db.close().unwrap();
    }

    #[test]
    fn test_merge_compacts_and_preserves_view() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_small(dir.path(), 44);

        for (k, v) in [("key1", "value1"), ("key2", "value2"), ("key3", "value3")] {
            db.put(k, v).unwrap();
        }
        for (k, v) in [("key2", "value3"), ("key3", "value4")] {
            db.put(k, v).unwrap();
        }

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 3);

        db.merge().unwrap();

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);

        // 合并产物只含封存分段里最新的值; key3=value4 仍在活跃分段
        let segments = db.segments_snapshot();
        assert_eq!(segments.len(), 2);
        let merged = &segments[1];
        assert_eq!(merged.suffix(), "merged");
        assert_eq!(merged.get("key1").unwrap(), "value1");
        assert_eq!(merged.get("key2").unwrap(), "value3");
        assert_eq!(merged.get("key3").unwrap(), "value3");

        // 对外视图不变
        assert_eq!(db.get("key1").unwrap(), "value1");
        assert_eq!(db.get("key2").unwrap(), "value3");
        assert_eq!(db.get("key3").unwrap(), "value4");

        db.close().unwrap();
    }

    #[test]
    fn test_sealed_tombstone_excluded_from_merge() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_small(dir.path(), 44);

        // 两个封存分段: {key1,key2} 与 {key3, key1 的墓碑}
        db.put("key1", "value1").unwrap();
        db.put("key2", "value2").unwrap();
        db.put("key3", "value3").unwrap();
        db.delete("key1").unwrap();
        // 再写两条把墓碑所在分段也封存掉
        db.put("key4", "value4").unwrap();
        db.put("key5", "value5").unwrap();

        let sealed_tombstone = db
            .segments_snapshot()
            .iter()
            .skip(1)
            .any(|s| s.index.get("key1") == Some(&DELETED));
        assert!(sealed_tombstone, "tombstone should be sealed before merge");

        db.merge().unwrap();

        let segments = db.segments_snapshot();
        let merged = segments.last().unwrap();
        assert_eq!(merged.suffix(), "merged");
        assert!(!merged.index.contains_key("key1"));
        assert!(matches!(db.get("key1"), Err(KvError::NotFound)));
        assert_eq!(db.get("key2").unwrap(), "value2");
        assert_eq!(db.get("key3").unwrap(), "value3");

        db.close().unwrap();
    }

    #[test]
    fn test_repeated_merge_with_previous_merged_segment() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_small(dir.path(), 44);

        for (k, v) in [("key1", "value1"), ("key2", "value2"), ("key3", "value3")] {
            db.put(k, v).unwrap();
        }
        for (k, v) in [("key2", "value3"), ("key3", "value4")] {
            db.put(k, v).unwrap();
        }
        db.merge().unwrap();

        // 旧的 merged 分段参与下一轮合并
        db.put("key4", "value4").unwrap();
        db.put("key5", "value5").unwrap();
        db.put("key6", "value6").unwrap();
        db.merge().unwrap();

        let segments = db.segments_snapshot();
        assert_eq!(segments.last().unwrap().suffix(), "merged");

        for (k, v) in [
            ("key1", "value1"),
            ("key2", "value3"),
            ("key4", "value4"),
            ("key5", "value5"),
        ] {
            assert_eq!(db.get(k).unwrap(), v, "key {}", k);
        }

        db.close().unwrap();
    }
}
