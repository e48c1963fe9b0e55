//! 配置管理模块
//!
//! 三个服务各有一份 TOML 配置, 缺省值内置; 二进制入口还支持
//! 命令行参数覆盖关键项。

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// HTTP 监听配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_service_port")]
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_service_port(),
        }
    }
}

impl HttpConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 存储服务配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageServiceConfig {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub storage: EngineConfig,
}

/// 存储引擎配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_data_dir")]
    pub dir: String,
    #[serde(default = "default_active_block_size")]
    pub active_block_size: u64,
    #[serde(default = "default_true")]
    pub auto_merge: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dir: default_data_dir(),
            active_block_size: default_active_block_size(),
            auto_merge: true,
        }
    }
}

/// 应用服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppServiceConfig {
    #[serde(default)]
    pub http: HttpConfig,
    /// 存储服务基址
    #[serde(default = "default_storage_url")]
    pub storage_url: String,
    /// 启动时写入的种子 key
    #[serde(default = "default_seed_key")]
    pub seed_key: String,
}

impl Default for AppServiceConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            storage_url: default_storage_url(),
            seed_key: default_seed_key(),
        }
    }
}

/// 负载均衡器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalancerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_balancer_port")]
    pub port: u16,
    /// 转发与探测超时 (秒)
    #[serde(default = "default_timeout_sec")]
    pub timeout_sec: u64,
    /// 后端是否走 HTTPS
    #[serde(default)]
    pub https: bool,
    /// 是否在响应头写入 lb-from
    #[serde(default)]
    pub trace: bool,
    /// 健康探测间隔 (秒)
    #[serde(default = "default_probe_interval_sec")]
    pub health_check_interval_sec: u64,
    /// 后端地址列表 (host:port)
    #[serde(default = "default_backends")]
    pub backends: Vec<String>,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_balancer_port(),
            timeout_sec: default_timeout_sec(),
            https: false,
            trace: false,
            health_check_interval_sec: default_probe_interval_sec(),
            backends: default_backends(),
        }
    }
}

impl BalancerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn scheme(&self) -> &'static str {
        if self.https {
            "https"
        } else {
            "http"
        }
    }
}

// 默认值函数
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_service_port() -> u16 {
    8080
}
fn default_balancer_port() -> u16 {
    8090
}
fn default_data_dir() -> String {
    "/tmp/qakv/data".to_string()
}
fn default_active_block_size() -> u64 {
    10 * 1024 * 1024
}
fn default_true() -> bool {
    true
}
fn default_storage_url() -> String {
    "http://dbserver:8080".to_string()
}
fn default_seed_key() -> String {
    "startup-date".to_string()
}
fn default_timeout_sec() -> u64 {
    4
}
fn default_probe_interval_sec() -> u64 {
    10
}
fn default_backends() -> Vec<String> {
    vec![
        "server1:8080".to_string(),
        "server2:8080".to_string(),
        "server3:8080".to_string(),
    ]
}

impl StorageServiceConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        toml::from_str(&content).map_err(|e| format!("Failed to parse config file: {}", e))
    }

    pub fn load_default() -> Result<Self, String> {
        Self::load_from_file("config/storage.toml")
    }
}

impl AppServiceConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        toml::from_str(&content).map_err(|e| format!("Failed to parse config file: {}", e))
    }

    pub fn load_default() -> Result<Self, String> {
        Self::load_from_file("config/app.toml")
    }
}

impl BalancerConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        toml::from_str(&content).map_err(|e| format!("Failed to parse config file: {}", e))
    }

    pub fn load_default() -> Result<Self, String> {
        Self::load_from_file("config/balancer.toml")
    }
}
