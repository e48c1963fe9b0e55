//! 周期健康探测
//!
//! 每个后端一个独立探测任务, 按固定间隔请求 `GET /health`,
//! 2xx 视为可用。探测失败不向客户端传播, 只更新池内状态。

use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;

use crate::balancer::pool::BackendPool;

/// 健康探测器
pub struct HealthProber {
    pool: Arc<BackendPool>,
    client: reqwest::Client,
    scheme: &'static str,
    probe_interval: Duration,
}

impl HealthProber {
    pub fn new(
        pool: Arc<BackendPool>,
        scheme: &'static str,
        timeout: Duration,
        probe_interval: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build probe http client");

        Self {
            pool,
            client,
            scheme,
            probe_interval,
        }
    }

    /// 为每个后端启动一个探测任务
    pub fn spawn(&self) {
        let count = self.pool.len();
        for idx in 0..count {
            let pool = self.pool.clone();
            let client = self.client.clone();
            let scheme = self.scheme;
            let probe_interval = self.probe_interval;

            tokio::spawn(async move {
                let mut ticker = interval(probe_interval);
                // 首次 tick 立即返回, 跳过以保持启动时的乐观可用
                ticker.tick().await;

                loop {
                    ticker.tick().await;

                    let url = match pool.snapshot().get(idx) {
                        Some(b) => b.url.clone(),
                        None => break,
                    };

                    let healthy = check_health(&client, scheme, &url).await;
                    let was = pool
                        .snapshot()
                        .get(idx)
                        .map(|b| b.available)
                        .unwrap_or(false);

                    if was && !healthy {
                        log::warn!("Backend {} is down", url);
                    } else if !was && healthy {
                        log::info!("Backend {} is back up", url);
                    }

                    pool.set_available(idx, healthy);
                }
            });
        }

        log::info!(
            "✅ Health prober started: {} backends, every {:?}",
            count,
            self.probe_interval
        );
    }
}

/// 单次探测: 2xx 即健康, 超时与传输错误都算不健康
pub async fn check_health(client: &reqwest::Client, scheme: &str, url: &str) -> bool {
    let health_url = format!("{}://{}/health", scheme, url);
    match client.get(&health_url).send().await {
        Ok(resp) => resp.status().is_success(),
        Err(e) => {
            log::debug!("Health probe to {} failed: {}", health_url, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_probe_marks_unreachable_backend_down() {
        // 无监听者的端口: 连接拒绝 → 不健康
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(300))
            .build()
            .unwrap();

        let healthy = check_health(&client, "http", "127.0.0.1:1").await;
        assert!(!healthy);
    }
}
