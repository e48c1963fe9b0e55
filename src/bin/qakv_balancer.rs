//! QAKV 负载均衡器
//!
//! 最少连接选择 + 周期健康探测, 任意路径整体转发
//!
//! 运行: cargo run --bin qakv-balancer

use std::io;
use std::sync::Arc;
use std::time::Duration;

use actix_web::{middleware, web, App, HttpRequest, HttpResponse, HttpServer as ActixHttpServer};

use qakv::balancer::{BackendPool, Forwarder, HealthProber};
use qakv::utils::config::BalancerConfig;

/// 均衡器入口处理器: 任何请求都交给转发器
async fn balance(
    forwarder: web::Data<Forwarder>,
    req: HttpRequest,
    body: web::Bytes,
) -> HttpResponse {
    forwarder.handle(req, body).await
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // 1. 加载配置文件, 失败则退回内置默认值
    let mut config = match BalancerConfig::load_default() {
        Ok(cfg) => cfg,
        Err(e) => {
            log::warn!("Failed to load config file: {}, using defaults", e);
            BalancerConfig::default()
        }
    };

    // 2. 命令行覆盖
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        match args[i].as_str() {
            "--port" | "-p" => {
                if i + 1 < args.len() {
                    if let Ok(port) = args[i + 1].parse() {
                        config.port = port;
                    }
                }
            }
            "--timeout-sec" => {
                if i + 1 < args.len() {
                    if let Ok(timeout) = args[i + 1].parse() {
                        config.timeout_sec = timeout;
                    }
                }
            }
            "--https" => {
                config.https = true;
            }
            "--trace" => {
                config.trace = true;
            }
            _ => {}
        }
    }

    let timeout = Duration::from_secs(config.timeout_sec);
    let scheme = config.scheme();

    log::info!("Starting load balancer...");
    log::info!("Tracing support enabled: {}", config.trace);
    log::info!("  Backends: {:?}", config.backends);
    log::info!("  Timeout: {:?}, scheme: {}", timeout, scheme);

    // 3. 构建后端池并启动探测任务
    let pool = Arc::new(BackendPool::new(config.backends.clone()));

    let prober = HealthProber::new(
        pool.clone(),
        scheme,
        timeout,
        Duration::from_secs(config.health_check_interval_sec),
    );
    prober.spawn();

    let forwarder = web::Data::new(Forwarder::new(pool, scheme, timeout, config.trace));

    let bind_address = config.bind_address();
    println!("\n🚀 QAKV Load Balancer");
    println!("   • Frontend:  http://{}", bind_address);
    println!("   • Backends:  {:?}\n", config.backends);

    // 4. 任意方法与路径都交给转发器
    ActixHttpServer::new(move || {
        App::new()
            .app_data(forwarder.clone())
            .wrap(middleware::Logger::default())
            .default_service(web::to(balance))
    })
    .bind(&bind_address)?
    .run()
    .await
}
