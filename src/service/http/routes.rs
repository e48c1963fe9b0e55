//! 存储服务路由配置

use actix_web::web;

use super::handlers;

/// 配置所有路由
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        // 健康检查
        .route("/health", web::get().to(handlers::health_check))
        // KV 读写
        .service(
            web::scope("/db")
                .route("/{key}", web::get().to(handlers::get_value))
                .route("/{key}", web::post().to(handlers::put_value))
                .route("/{key}", web::delete().to(handlers::delete_value)),
        )
        // 管理接口
        .service(
            web::scope("/db-admin")
                .route("/merge", web::post().to(handlers::trigger_merge))
                .route("/stats", web::get().to(handlers::db_stats)),
        );
}
