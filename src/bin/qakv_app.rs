//! QAKV 演示应用服务
//!
//! 无状态应用层: 健康检查 + 业务数据接口 (代理存储服务)
//!
//! 环境变量:
//! - `CONF_HEALTH_FAILURE=true`   健康检查返回 500 "FAILURE"
//! - `CONF_RESPONSE_DELAY_SEC=N`  业务接口延迟 N 秒响应 (0 < N < 300)
//!
//! 运行: cargo run --bin qakv-app

use std::io;
use std::time::Duration;

use actix_web::{middleware, web, App, HttpServer as ActixHttpServer};

use qakv::service::http::app::{self, AppServiceState};
use qakv::utils::config::AppServiceConfig;

#[actix_web::main]
async fn main() -> io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // 1. 加载配置文件, 失败则退回内置默认值
    let mut config = match AppServiceConfig::load_default() {
        Ok(cfg) => cfg,
        Err(e) => {
            log::warn!("Failed to load config file: {}, using defaults", e);
            AppServiceConfig::default()
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
            "--storage-url" | "-s" => {
                if i + 1 < args.len() {
                    config.storage_url = args[i + 1].clone();
                }
            }
            _ => {}
        }
    }

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .expect("failed to build http client");

    let bind_address = config.http.bind_address();
    let storage_url = config.storage_url.clone();

    log::info!("Starting app server at {}", bind_address);
    log::info!("  Storage service: {}", storage_url);

    let state_client = client.clone();
    let state_storage_url = storage_url.clone();
    let server = ActixHttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(AppServiceState {
                client: state_client.clone(),
                storage_url: state_storage_url.clone(),
            }))
            .wrap(middleware::Logger::default())
            .route("/health", web::get().to(app::health_check))
            .route("/api/v1/some-data", web::get().to(app::some_data))
    })
    .bind(&bind_address)?
    .run();

    println!("\n🚀 QAKV App Service");
    println!("   • Health:    http://{}/health", bind_address);
    println!(
        "   • Data API:  http://{}/api/v1/some-data?key=<k>\n",
        bind_address
    );

    // 3. 服务器起来后写入种子数据, 让演示链路有东西可查
    let seed_client = client.clone();
    let seed_key = config.seed_key.clone();
    tokio::spawn(async move {
        app::seed_startup_record(&seed_client, &storage_url, &seed_key).await;
    });

    server.await
}
