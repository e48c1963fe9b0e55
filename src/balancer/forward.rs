//! 请求转发
//!
//! 把进入的请求按原方法/路径/头/体转发到选中的后端, 并把响应
//! 状态/头/体原样拷回。传输失败或超时一律 503。

use std::sync::Arc;
use std::time::Duration;

use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse};

use crate::balancer::pool::BackendPool;

/// 逐跳头, 不随请求/响应转发
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "host",
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "upgrade",
    "content-length",
];

/// 请求转发器
pub struct Forwarder {
    pool: Arc<BackendPool>,
    client: reqwest::Client,
    scheme: &'static str,
    trace_enabled: bool,
}

impl Forwarder {
    pub fn new(
        pool: Arc<BackendPool>,
        scheme: &'static str,
        timeout: Duration,
        trace_enabled: bool,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build forward http client");

        Self {
            pool,
            client,
            scheme,
            trace_enabled,
        }
    }

    /// 均衡器入口: 选后端 → 转发 → 归还计数
    pub async fn handle(&self, req: HttpRequest, body: web::Bytes) -> HttpResponse {
        log::debug!("Backend pool:\n{}", self.pool);

        let (idx, backend_url) = match self.pool.select() {
            Ok(v) => v,
            Err(e) => {
                log::warn!("Cannot select backend: {}", e);
                return HttpResponse::ServiceUnavailable().body("no available servers");
            }
        };

        let response = self.forward(&backend_url, &req, body).await;
        self.pool.release(idx);
        response
    }

    async fn forward(&self, backend: &str, req: &HttpRequest, body: web::Bytes) -> HttpResponse {
        let path_and_query = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let target = format!("{}://{}{}", self.scheme, backend, path_and_query);

        let method = reqwest::Method::from_bytes(req.method().as_str().as_bytes())
            .unwrap_or(reqwest::Method::GET);

        let mut upstream = self.client.request(method, &target);
        for (name, value) in req.headers() {
            let name_str = name.as_str();
            if HOP_BY_HOP_HEADERS.contains(&name_str) {
                continue;
            }
            if let (Ok(n), Ok(v)) = (
                reqwest::header::HeaderName::from_bytes(name_str.as_bytes()),
                reqwest::header::HeaderValue::from_bytes(value.as_bytes()),
            ) {
                upstream = upstream.header(n, v);
            }
        }
        if !body.is_empty() {
            upstream = upstream.body(body.to_vec());
        }

        match upstream.send().await {
            Ok(resp) => {
                let status = StatusCode::from_u16(resp.status().as_u16())
                    .unwrap_or(StatusCode::BAD_GATEWAY);
                log::info!("fwd {} {}", status.as_u16(), target);

                let mut builder = HttpResponse::build(status);
                for (name, value) in resp.headers() {
                    if HOP_BY_HOP_HEADERS.contains(&name.as_str()) {
                        continue;
                    }
                    builder.insert_header((name.as_str(), value.as_bytes()));
                }
                if self.trace_enabled {
                    builder.insert_header(("lb-from", backend));
                }

                match resp.bytes().await {
                    Ok(bytes) => builder.body(bytes),
                    Err(e) => {
                        log::error!("Failed to read response body from {}: {}", backend, e);
                        HttpResponse::ServiceUnavailable().finish()
                    }
                }
            }
            Err(e) => {
                log::error!("Failed to get response from {}: {}", backend, e);
                HttpResponse::ServiceUnavailable().finish()
            }
        }
    }
}
