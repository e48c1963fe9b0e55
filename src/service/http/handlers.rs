//! 存储服务 HTTP 请求处理器

use std::sync::Arc;

use actix_web::{web, HttpResponse};

use super::models::{DbRequest, DbResponse};
use crate::storage::database::Database;
use crate::KvError;

/// 应用状态
pub struct AppState {
    pub db: Arc<Database>,
}

/// 健康检查
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().content_type("text/plain").body("OK")
}

/// 读取记录
pub async fn get_value(
    key: web::Path<String>,
    state: web::Data<Arc<AppState>>,
) -> HttpResponse {
    match state.db.get(&key) {
        Ok(value) if value.is_empty() => {
            log::info!("cannot find record: {} is empty", key);
            HttpResponse::NotFound().finish()
        }
        Ok(value) => HttpResponse::Ok().json(DbResponse {
            key: key.into_inner(),
            value,
        }),
        Err(KvError::NotFound) => {
            log::info!("cannot find record: {}", key);
            HttpResponse::NotFound().finish()
        }
        Err(e) => {
            log::error!("cannot get record {}: {}", key, e);
            HttpResponse::InternalServerError().finish()
        }
    }
}

/// 写入记录
pub async fn put_value(
    key: web::Path<String>,
    req: web::Json<DbRequest>,
    state: web::Data<Arc<AppState>>,
) -> HttpResponse {
    match state.db.put(&key, &req.value) {
        Ok(()) => HttpResponse::Ok().finish(),
        Err(KvError::InvalidValue) => {
            log::warn!("rejecting empty value for key {}", key);
            HttpResponse::BadRequest().body("value must not be empty")
        }
        Err(e) => {
            log::error!("cannot put value to database: {}", e);
            HttpResponse::InternalServerError().finish()
        }
    }
}

/// 删除记录
pub async fn delete_value(
    key: web::Path<String>,
    state: web::Data<Arc<AppState>>,
) -> HttpResponse {
    match state.db.delete(&key) {
        Ok(()) => HttpResponse::Ok().finish(),
        Err(e) => {
            log::error!("cannot delete record {}: {}", key, e);
            HttpResponse::InternalServerError().finish()
        }
    }
}

/// 手动触发一轮合并
pub async fn trigger_merge(state: web::Data<Arc<AppState>>) -> HttpResponse {
    match state.db.merge() {
        Ok(()) => HttpResponse::Ok().finish(),
        Err(e) => {
            log::error!("manual merge failed: {}", e);
            HttpResponse::InternalServerError().finish()
        }
    }
}

/// 存储统计
pub async fn db_stats(state: web::Data<Arc<AppState>>) -> HttpResponse {
    HttpResponse::Ok().json(state.db.stats())
}
