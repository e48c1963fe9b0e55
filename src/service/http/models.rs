//! HTTP API 请求/响应模型

use serde::{Deserialize, Serialize};

/// 写入请求体: `POST /db/{key}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbRequest {
    pub value: String,
}

/// 读取响应体: `GET /db/{key}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbResponse {
    pub key: String,
    pub value: String,
}
