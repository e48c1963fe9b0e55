//! 数据库门面 - open/get/put/delete/close
//!
//! **写入路径**: 所有写请求经由有界通道汇入单写者线程, 每个请求携带
//! 一次性回执通道。串行化保证写入偏移与索引记录一致, 无需回查文件
//! 位置。
//!
//! **读取路径**: 共享锁内只做索引查找, 文件 IO 在锁外进行; 读到的
//! 偏移只会指向已完整写入的帧。

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam::channel::{bounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use crate::storage::compaction::{self, MergeSignal};
use crate::storage::entry::Entry;
use crate::storage::segment::{
    self, Segment, ACTIVE_SUFFIX, DELETED, SEGMENT_PREFIX,
};
use crate::{KvError, Result};

/// 默认活跃分段滚动阈值 (10 MB)
pub const DEFAULT_ACTIVE_BLOCK_SIZE: u64 = 10 * 1024 * 1024;

/// 数据库配置
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// 分段文件目录
    pub dir: PathBuf,
    /// 活跃分段滚动阈值 (字节)
    pub active_block_size: u64,
    /// 封存分段超过两个时自动触发合并
    pub auto_merge: bool,
    /// 写入通道容量
    pub write_queue_size: usize,
}

impl DbConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            active_block_size: DEFAULT_ACTIVE_BLOCK_SIZE,
            auto_merge: true,
            write_queue_size: 1024,
        }
    }

    pub fn with_block_size(mut self, size: u64) -> Self {
        self.active_block_size = size;
        self
    }

    pub fn with_auto_merge(mut self, enabled: bool) -> Self {
        self.auto_merge = enabled;
        self
    }
}

/// 数据库统计信息
#[derive(Debug, Default)]
pub struct DbStats {
    pub puts: AtomicU64,
    pub gets: AtomicU64,
    pub deletes: AtomicU64,
    pub rotations: AtomicU64,
    pub merges: AtomicU64,
    pub bytes_written: AtomicU64,
}

/// 统计快照 (用于监控接口)
#[derive(Debug, Clone, Serialize)]
pub struct DbStatsSnapshot {
    pub puts: u64,
    pub gets: u64,
    pub deletes: u64,
    pub rotations: u64,
    pub merges: u64,
    pub bytes_written: u64,
    pub segments: usize,
}

/// 写者线程消息
enum WriterMessage {
    Put {
        entry: Entry,
        reply: Sender<Result<()>>,
    },
    Delete {
        key: String,
        reply: Sender<Result<()>>,
    },
    /// 关闭信号: 排在它前面的写入会先被处理
    Shutdown,
}

/// 数据库共享状态
pub(crate) struct DbInner {
    pub(crate) dir: PathBuf,
    pub(crate) active_block_size: u64,
    pub(crate) auto_merge: bool,
    /// 分段列表, 下标 0 恒为活跃分段, 下标越小越新
    pub(crate) segments: RwLock<Vec<Segment>>,
    /// 同一时刻至多一个合并在运行
    pub(crate) merge_mutex: Mutex<()>,
    pub(crate) stats: DbStats,
}

impl DbInner {
    pub(crate) fn active_path(&self) -> PathBuf {
        self.dir.join(format!("{}{}", SEGMENT_PREFIX, ACTIVE_SUFFIX))
    }
}

/// 追加式分段日志数据库
pub struct Database {
    inner: Arc<DbInner>,
    write_tx: Sender<WriterMessage>,
    merge_tx: Sender<MergeSignal>,
    writer_handle: Mutex<Option<JoinHandle<()>>>,
    merge_handle: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl Database {
    /// 以默认配置打开目录
    pub fn open_dir(dir: impl Into<PathBuf>) -> Result<Self> {
        Self::open(DbConfig::new(dir))
    }

    /// 打开数据库: 扫描目录, 回放所有分段重建索引, 启动后台线程
    pub fn open(config: DbConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.dir)?;

        // 合并中途崩溃会留下固定名字的临时文件, 启动时当垃圾清掉
        let temp_path = config.dir.join(SEGMENT_PREFIX);
        if temp_path.is_file() {
            log::warn!(
                "Removing orphan merge temp file {}",
                temp_path.display()
            );
            std::fs::remove_file(&temp_path)?;
        }

        let active_path = config.dir.join(format!("{}{}", SEGMENT_PREFIX, ACTIVE_SUFFIX));
        let out = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&active_path)?;

        let mut segments = Vec::new();
        for dir_entry in std::fs::read_dir(&config.dir)? {
            let dir_entry = dir_entry?;
            let path = dir_entry.path();
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(n) => n,
                None => continue,
            };
            if !name.starts_with(SEGMENT_PREFIX) || name == SEGMENT_PREFIX {
                continue;
            }

            let mut seg = Segment::new(path);
            seg.recover()?;
            segments.push(seg);
        }

        segments.sort_by(segment::compare);

        // active 文件在上面已保证存在, 此处只是崩溃残局兜底
        if segments.first().map(|s| s.is_active()) != Some(true) {
            segments.insert(0, Segment::new(active_path.clone()));
        }

        // 崩溃可能在活跃文件尾部留下半截帧; 截掉它, 否则后续追加的
        // 偏移会和索引记录错位
        let recovered_len = segments[0].offset as u64;
        let disk_len = out.metadata()?.len();
        if disk_len > recovered_len {
            log::warn!(
                "Truncating {} bytes of partial frame from {}",
                disk_len - recovered_len,
                active_path.display()
            );
            out.set_len(recovered_len)?;
        }

        let inner = Arc::new(DbInner {
            dir: config.dir,
            active_block_size: config.active_block_size,
            auto_merge: config.auto_merge,
            segments: RwLock::new(segments),
            merge_mutex: Mutex::new(()),
            stats: DbStats::default(),
        });

        let (write_tx, write_rx) = bounded(config.write_queue_size);
        let (merge_tx, merge_rx) = bounded(1);

        let writer_inner = inner.clone();
        let writer_merge_tx = merge_tx.clone();
        let writer_handle = std::thread::Builder::new()
            .name("qakv-writer".to_string())
            .spawn(move || writer_loop(writer_inner, write_rx, writer_merge_tx, out))
            .map_err(KvError::Io)?;

        let merge_inner = inner.clone();
        let merge_handle = std::thread::Builder::new()
            .name("qakv-merge".to_string())
            .spawn(move || merge_loop(merge_inner, merge_rx))
            .map_err(KvError::Io)?;

        log::info!(
            "✅ Database opened at {} ({} segments)",
            inner.dir.display(),
            inner.segments.read().len()
        );

        Ok(Self {
            inner,
            write_tx,
            merge_tx,
            writer_handle: Mutex::new(Some(writer_handle)),
            merge_handle: Mutex::new(Some(merge_handle)),
            closed: AtomicBool::new(false),
        })
    }

    /// 读取 key 的当前值
    ///
    /// 墓碑与缺失统一返回 `NotFound`。
    pub fn get(&self, key: &str) -> Result<String> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(KvError::Closed);
        }
        self.inner.stats.gets.fetch_add(1, Ordering::Relaxed);

        let result = match self.read_once(key) {
            // 查索引与打开文件之间分段可能被滚动或合并替换, 重查一次
            Err(KvError::Io(ref e))
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::NotFound | std::io::ErrorKind::UnexpectedEof
                ) =>
            {
                self.read_once(key)
            }
            other => other,
        };

        match result {
            Err(KvError::ItemDeleted) => Err(KvError::NotFound),
            other => other,
        }
    }

    fn read_once(&self, key: &str) -> Result<String> {
        let (path, position) = {
            let segments = self.inner.segments.read();
            let mut hit = None;
            for seg in segments.iter() {
                if let Some(pos) = seg.index.get(key) {
                    hit = Some((seg.path.clone(), *pos));
                    break;
                }
            }
            match hit {
                Some(h) => h,
                None => return Err(KvError::NotFound),
            }
        };

        if position == DELETED {
            return Err(KvError::ItemDeleted);
        }

        segment::read_value_at(&path, position)
    }

    /// 写入一条记录; 空 value 被拒绝 (保留给墓碑)
    pub fn put(&self, key: &str, value: &str) -> Result<()> {
        if value.is_empty() {
            return Err(KvError::InvalidValue);
        }
        self.submit(|reply| WriterMessage::Put {
            entry: Entry::new(key, value),
            reply,
        })
    }

    /// 删除一条记录; key 不存在或已删除时为幂等 no-op
    pub fn delete(&self, key: &str) -> Result<()> {
        self.submit(|reply| WriterMessage::Delete {
            key: key.to_string(),
            reply,
        })
    }

    fn submit<F>(&self, make: F) -> Result<()>
    where
        F: FnOnce(Sender<Result<()>>) -> WriterMessage,
    {
        if self.closed.load(Ordering::SeqCst) {
            return Err(KvError::Closed);
        }

        let (reply_tx, reply_rx) = bounded(1);
        self.write_tx
            .send(make(reply_tx))
            .map_err(|_| KvError::Closed)?;
        reply_rx.recv().map_err(|_| KvError::Closed)?
    }

    /// 同步执行一轮合并 (测试与管理接口用)
    pub fn merge(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(KvError::Closed);
        }
        compaction::run_merge(&self.inner)
    }

    /// 统计快照
    pub fn stats(&self) -> DbStatsSnapshot {
        let s = &self.inner.stats;
        DbStatsSnapshot {
            puts: s.puts.load(Ordering::Relaxed),
            gets: s.gets.load(Ordering::Relaxed),
            deletes: s.deletes.load(Ordering::Relaxed),
            rotations: s.rotations.load(Ordering::Relaxed),
            merges: s.merges.load(Ordering::Relaxed),
            bytes_written: s.bytes_written.load(Ordering::Relaxed),
            segments: self.inner.segments.read().len(),
        }
    }

    /// 当前分段列表的快照 (测试与诊断用)
    pub fn segments_snapshot(&self) -> Vec<Segment> {
        self.inner.segments.read().clone()
    }

    /// 数据目录
    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    /// 有序关闭: 排空写入队列, 停掉后台线程, 关闭活跃文件
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        // FIFO 通道保证哨兵之前的写入先被处理
        let _ = self.write_tx.send(WriterMessage::Shutdown);
        let _ = self.merge_tx.send(MergeSignal::Shutdown);

        if let Some(handle) = self.writer_handle.lock().take() {
            if handle.join().is_err() {
                log::error!("Writer worker panicked during close");
            }
        }
        if let Some(handle) = self.merge_handle.lock().take() {
            if handle.join().is_err() {
                log::error!("Merge worker panicked during close");
            }
        }

        log::info!("Database closed: {}", self.inner.dir.display());
        Ok(())
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::SeqCst) {
            if let Err(e) = self.close() {
                log::error!("Close on drop failed: {}", e);
            }
        }
    }
}

// ============================================================================
// 写者线程
// ============================================================================

fn writer_loop(
    inner: Arc<DbInner>,
    rx: Receiver<WriterMessage>,
    merge_tx: Sender<MergeSignal>,
    mut out: File,
) {
    log::debug!("Writer worker started");

    for msg in rx.iter() {
        match msg {
            WriterMessage::Put { entry, reply } => {
                let result = handle_put(&inner, &mut out, &merge_tx, entry);
                let _ = reply.send(result);
            }
            WriterMessage::Delete { key, reply } => {
                let result = handle_delete(&inner, &mut out, &key);
                let _ = reply.send(result);
            }
            WriterMessage::Shutdown => break,
        }
    }

    if let Err(e) = out.sync_all() {
        log::error!("Final sync of active segment failed: {}", e);
    }
    log::debug!("Writer worker stopped");
}

fn handle_put(
    inner: &Arc<DbInner>,
    out: &mut File,
    merge_tx: &Sender<MergeSignal>,
    entry: Entry,
) -> Result<()> {
    let buf = entry.encode();
    out.write_all(&buf)?;
    let n = buf.len() as i64;

    {
        let mut segments = inner.segments.write();
        let active = &mut segments[0];
        if entry.is_tombstone() {
            active.index.insert(entry.key, DELETED);
        } else {
            active.index.insert(entry.key, active.offset);
        }
        active.offset += n;
    }

    inner.stats.puts.fetch_add(1, Ordering::Relaxed);
    inner
        .stats
        .bytes_written
        .fetch_add(n as u64, Ordering::Relaxed);

    // 写入已落盘; stat/滚动失败只记日志, 不影响本次 put 的结果
    match out.metadata() {
        Ok(meta) if meta.len() >= inner.active_block_size => match rotate(inner, out) {
            Ok(()) => {
                inner.stats.rotations.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => log::error!("Segment rotation failed: {}", e),
        },
        Ok(_) => {}
        Err(e) => log::error!("Failed to stat active segment: {}", e),
    }

    if inner.auto_merge {
        let sealed = inner.segments.read().len().saturating_sub(1);
        if sealed > 2 {
            // 单槽信号, 满了说明合并已被安排
            let _ = merge_tx.try_send(MergeSignal::Merge);
        }
    }

    Ok(())
}

fn handle_delete(inner: &Arc<DbInner>, out: &mut File, key: &str) -> Result<()> {
    // 锁同时覆盖索引读取与墓碑追加, 与其他写入及合并线性化
    let mut segments = inner.segments.write();

    let mut present = false;
    for seg in segments.iter() {
        if let Some(pos) = seg.index.get(key) {
            if *pos == DELETED {
                return Ok(());
            }
            present = true;
            break;
        }
    }
    if !present {
        return Ok(());
    }

    let buf = Entry::tombstone(key).encode();
    out.write_all(&buf)?;
    let n = buf.len() as i64;

    let active = &mut segments[0];
    active.index.insert(key.to_string(), DELETED);
    active.offset += n;

    inner.stats.deletes.fetch_add(1, Ordering::Relaxed);
    inner
        .stats
        .bytes_written
        .fetch_add(n as u64, Ordering::Relaxed);

    Ok(())
}

/// 滚动活跃分段: 封存为 `segment-<N>` 并新开空的 active
fn rotate(inner: &Arc<DbInner>, out: &mut File) -> Result<()> {
    let mut segments = inner.segments.write();

    let next_n = segments
        .iter()
        .filter_map(|s| s.suffix().parse::<i64>().ok())
        .max()
        .map(|n| n + 1)
        .unwrap_or(0);

    let active_path = inner.active_path();
    let sealed_path = inner.dir.join(format!("{}{}", SEGMENT_PREFIX, next_n));

    out.sync_all()?;
    std::fs::rename(&active_path, &sealed_path)?;

    *out = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&active_path)?;

    // 原活跃分段只改文件名与列表位置, 索引原样保留
    segments[0].path = sealed_path.clone();
    segments.insert(0, Segment::new(active_path));

    log::info!(
        "Rotated active segment to {} ({} segments)",
        sealed_path.display(),
        segments.len()
    );

    Ok(())
}

// ============================================================================
// 合并线程
// ============================================================================

fn merge_loop(inner: Arc<DbInner>, rx: Receiver<MergeSignal>) {
    log::debug!("Merge worker started");

    for signal in rx.iter() {
        match signal {
            MergeSignal::Merge => {
                if let Err(e) = compaction::run_merge(&inner) {
                    // 失败不改变数据库状态, 等下一次触发重试
                    log::error!("Merge failed: {}", e);
                }
            }
            MergeSignal::Shutdown => break,
        }
    }

    log::debug!("Merge worker stopped");
}

// ============================================================================
// 测试模块
// ============================================================================
