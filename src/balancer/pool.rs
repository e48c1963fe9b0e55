//! 后端池与最少连接选择
//!
//! 连接计数的增减必须成对出现: `select` 在池锁内自增并返回下标,
//! 转发结束后经 `release` 二次加锁自减, 成败都要调用。

use std::fmt;

use parking_lot::Mutex;
use serde::Serialize;

use crate::{KvError, Result};

/// 一个上游后端
#[derive(Debug, Clone, Serialize)]
pub struct Backend {
    /// 地址 (host:port, 不含 scheme)
    pub url: String,
    /// 在途转发请求数
    pub connections: u32,
    /// 最近一次探测是否健康
    pub available: bool,
}

impl Backend {
    /// 初始乐观可用, 首轮探测会修正
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connections: 0,
            available: true,
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Url: {}; Conn: {}; Available: {}",
            self.url, self.connections, self.available
        )
    }
}

/// 固定后端列表 + 互斥锁
pub struct BackendPool {
    backends: Mutex<Vec<Backend>>,
}

impl BackendPool {
    pub fn new(urls: Vec<String>) -> Self {
        Self {
            backends: Mutex::new(urls.into_iter().map(Backend::new).collect()),
        }
    }

    pub fn len(&self) -> usize {
        self.backends.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.lock().is_empty()
    }

    /// 选出可用后端中连接数最小者 (平局取下标最小), 并自增其计数
    ///
    /// 返回下标而非引用, 保证与 `release` 的自减对称。
    pub fn select(&self) -> Result<(usize, String)> {
        let mut backends = self.backends.lock();

        let mut chosen: Option<usize> = None;
        for (idx, backend) in backends.iter().enumerate() {
            if !backend.available {
                continue;
            }
            match chosen {
                Some(best) if backends[best].connections <= backend.connections => {}
                _ => chosen = Some(idx),
            }
        }

        let idx = chosen.ok_or(KvError::NoAvailableBackend)?;
        backends[idx].connections += 1;
        Ok((idx, backends[idx].url.clone()))
    }

    /// 转发结束后归还连接计数
    pub fn release(&self, idx: usize) {
        let mut backends = self.backends.lock();
        if let Some(backend) = backends.get_mut(idx) {
            backend.connections = backend.connections.saturating_sub(1);
        }
    }

    /// 探测结果回写; 转为不可用时清零计数, 避免恢复后被旧计数拖累
    pub fn set_available(&self, idx: usize, available: bool) {
        let mut backends = self.backends.lock();
        if let Some(backend) = backends.get_mut(idx) {
            if backend.available && !available {
                backend.connections = 0;
            }
            backend.available = available;
        }
    }

    /// 池状态快照 (日志与诊断)
    pub fn snapshot(&self) -> Vec<Backend> {
        self.backends.lock().clone()
    }

    #[cfg(test)]
    fn with_backends(backends: Vec<Backend>) -> Self {
        Self {
            backends: Mutex::new(backends),
        }
    }
}

impl fmt::Display for BackendPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, backend) in self.backends.lock().iter().enumerate() {
            writeln!(f, "{}: {}", i, backend)?;
        }
        Ok(())
    }
}
