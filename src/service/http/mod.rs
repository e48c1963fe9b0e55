//! HTTP API 服务模块
//!
//! 存储服务的 RESTful 接口: KV 读写 + 健康检查 + 管理接口

pub mod app;
pub mod handlers;
pub mod models;
pub mod routes;

use actix_web::{middleware, web, App, HttpServer as ActixHttpServer};
use std::io;
use std::sync::Arc;

use crate::storage::database::Database;
use handlers::AppState;

/// 存储服务 HTTP 服务器
pub struct StorageHttpServer {
    /// 应用状态
    app_state: Arc<AppState>,

    /// 监听地址
    bind_address: String,
}

impl StorageHttpServer {
    pub fn new(db: Arc<Database>, bind_address: String) -> Self {
        Self {
            app_state: Arc::new(AppState { db }),
            bind_address,
        }
    }

    /// 启动 HTTP 服务器 (阻塞直到退出)
    pub async fn run(self) -> io::Result<()> {
        log::info!("Starting storage HTTP server at {}", self.bind_address);

        let app_state = self.app_state.clone();
        let bind_address = self.bind_address.clone();

        ActixHttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(app_state.clone()))
                .wrap(middleware::Logger::default())
                .wrap(
                    actix_cors::Cors::default()
                        .allow_any_origin()
                        .allow_any_method()
                        .allow_any_header()
                        .max_age(3600),
                )
                .configure(routes::configure)
        })
        .bind(&bind_address)?
        .run()
        .await
    }
}
