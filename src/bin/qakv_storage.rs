//! QAKV 存储服务
//!
//! 分段日志引擎 + HTTP 适配层
//!
//! 运行: cargo run --bin qakv-storage

use std::io;
use std::sync::Arc;

use qakv::service::http::StorageHttpServer;
use qakv::storage::database::{Database, DbConfig};
use qakv::utils::config::StorageServiceConfig;

#[actix_web::main]
async fn main() -> io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // 1. 加载配置文件, 失败则退回内置默认值
    let mut config = match StorageServiceConfig::load_default() {
        Ok(cfg) => cfg,
        Err(e) => {
            log::warn!("Failed to load config file: {}, using defaults", e);
            StorageServiceConfig::default()
        }
    };

    // 2. 命令行覆盖
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        match args[i].as_str() {
            "--port" | "-p" => {
                if i + 1 < args.len() {
                    if let Ok(port) = args[i + 1].parse() {
                        config.http.port = port;
                    }
                }
            }
            "--dir" | "-d" => {
                if i + 1 < args.len() {
                    config.storage.dir = args[i + 1].clone();
                }
            }
            "--no-auto-merge" => {
                config.storage.auto_merge = false;
            }
            _ => {}
        }
    }

    log::info!("Configuration loaded");
    log::info!("  Data dir: {}", config.storage.dir);
    log::info!("  Block size: {} bytes", config.storage.active_block_size);
    log::info!("  Auto merge: {}", config.storage.auto_merge);

    // 3. 打开数据库 (恢复 + 启动写者/合并线程)
    let db_config = DbConfig::new(&config.storage.dir)
        .with_block_size(config.storage.active_block_size)
        .with_auto_merge(config.storage.auto_merge);

    let db = match Database::open(db_config) {
        Ok(db) => Arc::new(db),
        Err(e) => {
            log::error!("cannot create database instance: {}", e);
            return Err(io::Error::new(io::ErrorKind::Other, e.to_string()));
        }
    };

    let bind_address = config.http.bind_address();
    println!("\n🚀 QAKV Storage Service");
    println!("   • HTTP API:  http://{}/db/{{key}}", bind_address);
    println!("   • Health:    http://{}/health", bind_address);
    println!("   • Stats:     http://{}/db-admin/stats", bind_address);
    println!("   • Data dir:  {}\n", config.storage.dir);

    // 4. 启动 HTTP 服务器
    let server = StorageHttpServer::new(db.clone(), bind_address);
    let result = server.run().await;

    // 5. 有序关闭引擎 (排空写入队列, 停掉后台线程)
    if let Err(e) = db.close() {
        log::error!("Database close failed: {}", e);
    }

    result
}
