//! # QAKV
//!
//! 分布式 KV 演示系统 - 三个通过 HTTP 协作的独立组件
//!
//! ## 核心能力
//!
//! - **存储引擎**: 追加式分段日志 (hash 索引 / 崩溃恢复 / 后台合并 / 墓碑删除)
//! - **负载均衡**: 最少连接选择 + 周期健康探测 + 请求转发
//! - **对外服务**: HTTP API (基于 Actix-web)
//!
//! ## 架构设计
//!
//! ```text
//! 客户端
//!     ↓
//! 负载均衡器 (balancer/)   :8090
//!     ↓ 最少连接选择
//! 应用服务 (bin/qakv_app)  :8080
//!     ↓ GET /db/{key}
//! 存储服务 (service/)      :8080
//!     ↓
//! 分段日志引擎 (storage/)
//! ```
//!
//! ## 性能特征
//!
//! - 写入路径: 单写者线程串行化, 追加写 + 内存索引更新
//! - 读取路径: 共享锁查索引, 锁外做文件 IO, 可并行
//! - 合并压缩: 独立后台线程, 触发信号可合并去重

// ============================================================================
// 外部依赖
// ============================================================================

// Web 框架
pub use actix_web;

// 异步运行时
pub use futures;
pub use tokio;

// 并发工具
pub use crossbeam;
pub use parking_lot;

// 序列化
pub use serde;
pub use serde_json;

// 时间
pub use chrono;

// 日志
pub use log;

// 错误处理
pub use thiserror;

// ============================================================================
// 内部模块
// ============================================================================

/// 分段日志存储引擎
pub mod storage;

/// 最少连接负载均衡器
pub mod balancer;

/// 对外服务层 (HTTP)
pub mod service;

/// 工具模块
pub mod utils;

// ============================================================================
// 重导出常用类型
// ============================================================================

pub use balancer::pool::{Backend, BackendPool};
pub use storage::database::{Database, DbConfig};

// ============================================================================
// 全局错误类型
// ============================================================================

/// KV 系统错误类型
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    #[error("record does not exist")]
    NotFound,

    #[error("record is marked as deleted")]
    ItemDeleted,

    #[error("corrupted segment file: {0}")]
    CorruptedFile(String),

    #[error("empty values are reserved for tombstones")]
    InvalidValue,

    #[error("database is closed")]
    Closed,

    #[error("no available servers")]
    NoAvailableBackend,

    #[error("forward failed: {0}")]
    Forward(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, KvError>;

// ============================================================================
// 测试模块
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = KvError::NotFound;
        assert_eq!(e.to_string(), "record does not exist");

        let e = KvError::NoAvailableBackend;
        assert_eq!(e.to_string(), "no available servers");
    }
}
