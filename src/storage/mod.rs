//! 分段日志存储引擎
//!
//! **架构设计**: Bitcask 风格的追加式日志 + 内存 hash 索引
//!
//! ```text
//! put/delete ──→ 写入通道 ──→ 单写者线程
//!                               ├─ 追加写 segment-active
//!                               ├─ 持锁更新索引/偏移
//!                               ├─ 达到阈值时滚动分段
//!                               └─ 触发合并信号
//!                                        ↓
//!                              合并线程 (compaction/)
//!                               ├─ 快照已封存分段
//!                               ├─ 重写为 segment-merged
//!                               └─ 原子替换 + 清理旧文件
//! get ──→ 共享锁查索引 ──→ 锁外读文件
//! ```
//!
//! **磁盘布局**: 单目录即 manifest, 文件名决定恢复顺序
//! - `segment-active`  唯一可写分段
//! - `segment-<N>`     封存分段, N 越大越新
//! - `segment-merged`  最近一次合并的产物 (最旧)

pub mod compaction;
pub mod database;
pub mod entry;
pub mod segment;

pub use database::{Database, DbConfig, DbStats, DbStatsSnapshot};
pub use entry::Entry;
pub use segment::Segment;
