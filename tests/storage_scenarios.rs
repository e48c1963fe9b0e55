// 存储引擎端到端场景测试
//
// 测试流程:
// 1. 写入/读取/覆盖/删除的完整生命周期
// 2. 关闭重开后的持久性
// 3. 分段滚动与合并压缩对外部视图的不变性

use std::sync::Arc;

use qakv::storage::database::{Database, DbConfig};
use qakv::storage::segment::DELETED;
use qakv::KvError;

fn pairs() -> Vec<(&'static str, &'static str)> {
    vec![
        ("key1", "value1"),
        ("key2", "value2"),
        ("key3", "value3"),
    ]
}

fn more_pairs() -> Vec<(String, String)> {
    (1..=12)
        .map(|i| (format!("key{}", i), format!("value{}", i)))
        .collect()
}

#[test]
fn full_lifecycle_with_reopen() {
    let dir = tempfile::tempdir().unwrap();

    // 第一代进程: 写入并校验
    let db = Database::open_dir(dir.path()).unwrap();
    for (k, v) in pairs() {
        db.put(k, v).unwrap();
        assert_eq!(db.get(k).unwrap(), v);
    }

    // 覆盖写以后读到新值
    db.put("key2", "value2-new").unwrap();
    assert_eq!(db.get("key2").unwrap(), "value2-new");

    db.close().unwrap();
    drop(db);

    // 第二代进程: 视图完整保留
    let db = Database::open_dir(dir.path()).unwrap();
    assert_eq!(db.get("key1").unwrap(), "value1");
    assert_eq!(db.get("key2").unwrap(), "value2-new");
    assert_eq!(db.get("key3").unwrap(), "value3");
    db.close().unwrap();
}

#[test]
fn segmentation_keeps_all_keys_readable() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(
        DbConfig::new(dir.path())
            .with_block_size(50)
            .with_auto_merge(false),
    )
    .unwrap();

    for (k, v) in pairs() {
        db.put(k, v).unwrap();
    }

    let files = std::fs::read_dir(dir.path()).unwrap().count();
    assert!(files >= 2, "expected at least 2 segment files, got {}", files);

    for (k, v) in pairs() {
        assert_eq!(db.get(k).unwrap(), v);
    }
    db.close().unwrap();
}

#[test]
fn merge_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(
        DbConfig::new(dir.path())
            .with_block_size(44)
            .with_auto_merge(false),
    )
    .unwrap();

    for (k, v) in pairs() {
        db.put(k, v).unwrap();
    }
    for (k, v) in [("key2", "value3"), ("key3", "value4")] {
        db.put(k, v).unwrap();
    }

    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 3);

    db.merge().unwrap();

    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);

    // 合并分段里是封存数据中每个 key 的最新值
    let segments = db.segments_snapshot();
    let merged = &segments[1];
    for (k, v) in [("key1", "value1"), ("key2", "value3"), ("key3", "value3")] {
        assert_eq!(merged.get(k).unwrap(), v, "merged segment key {}", k);
    }

    // 合并前后对外视图一致
    assert_eq!(db.get("key1").unwrap(), "value1");
    assert_eq!(db.get("key2").unwrap(), "value3");
    assert_eq!(db.get("key3").unwrap(), "value4");

    // 合并结果在重开后仍然有效
    db.close().unwrap();
    drop(db);

    let db = Database::open(
        DbConfig::new(dir.path())
            .with_block_size(44)
            .with_auto_merge(false),
    )
    .unwrap();
    assert_eq!(db.get("key1").unwrap(), "value1");
    assert_eq!(db.get("key2").unwrap(), "value3");
    assert_eq!(db.get("key3").unwrap(), "value4");
    db.close().unwrap();
}

#[test]
fn delete_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(
        DbConfig::new(dir.path())
            .with_block_size(46)
            .with_auto_merge(false),
    )
    .unwrap();

    for (k, v) in more_pairs() {
        db.put(&k, &v).unwrap();
    }

    db.delete("key6").unwrap();
    assert!(matches!(db.get("key6"), Err(KvError::NotFound)));

    // 幂等删除
    db.delete("key6").unwrap();

    db.close().unwrap();
    drop(db);

    // 重开后删除仍然生效, 活跃分段索引里是墓碑哨兵
    let db = Database::open(
        DbConfig::new(dir.path())
            .with_block_size(46)
            .with_auto_merge(false),
    )
    .unwrap();
    assert!(matches!(db.get("key6"), Err(KvError::NotFound)));

    let segments = db.segments_snapshot();
    assert_eq!(segments[0].index["key6"], DELETED);
    assert!(matches!(
        segments[0].get("key6"),
        Err(KvError::ItemDeleted)
    ));

    // 再写两条把墓碑分段封存, 然后合并: key6 彻底从索引消失
    db.put("keyA", "valueA").unwrap();
    db.put("keyB", "valueB").unwrap();
    let tombstone_sealed = db
        .segments_snapshot()
        .iter()
        .skip(1)
        .any(|s| s.index.get("key6") == Some(&DELETED));
    assert!(tombstone_sealed);

    db.merge().unwrap();

    let segments = db.segments_snapshot();
    let merged = segments.last().unwrap();
    assert!(!merged.index.contains_key("key6"));
    assert!(matches!(db.get("key6"), Err(KvError::NotFound)));

    // 其余 key 不受影响
    for (k, v) in more_pairs() {
        if k == "key6" {
            continue;
        }
        assert_eq!(db.get(&k).unwrap(), v, "key {}", k);
    }

    db.close().unwrap();
}

#[test]
fn concurrent_pairs_observe_their_own_values() {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(
        Database::open(
            DbConfig::new(dir.path())
                .with_block_size(44)
                .with_auto_merge(true),
        )
        .unwrap(),
    );

    let mut handles = Vec::new();
    for (k, v) in more_pairs() {
        let db = db.clone();
        handles.push(std::thread::spawn(move || {
            db.put(&k, &v).unwrap();
            assert_eq!(db.get(&k).unwrap(), v);
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    for (k, v) in more_pairs() {
        assert_eq!(db.get(&k).unwrap(), v);
    }

    db.close().unwrap();
}

#[test]
fn merge_reduces_files_and_preserves_state() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(
        DbConfig::new(dir.path())
            .with_block_size(44)
            .with_auto_merge(false),
    )
    .unwrap();

    for (k, v) in more_pairs() {
        db.put(&k, &v).unwrap();
    }

    let files_before = std::fs::read_dir(dir.path()).unwrap().count();
    assert!(files_before > 2);

    db.merge().unwrap();

    let files_after = std::fs::read_dir(dir.path()).unwrap().count();
    assert!(
        files_after < files_before,
        "merge should reduce file count ({} -> {})",
        files_before,
        files_after
    );

    for (k, v) in more_pairs() {
        assert_eq!(db.get(&k).unwrap(), v, "key {}", k);
    }

    db.close().unwrap();
}
