//! 演示应用服务的请求处理器
//!
//! 应用服务自身无状态, 数据一律从存储服务代理而来。健康检查与
//! 响应延迟通过环境变量控制, 每次请求时读取。

use std::collections::HashMap;
use std::time::Duration;

use actix_web::{web, HttpResponse};

use super::models::DbRequest;

/// 健康检查失败开关
pub const CONF_HEALTH_FAILURE: &str = "CONF_HEALTH_FAILURE";

/// 响应延迟秒数 (0 < delay < 300 时生效)
pub const CONF_RESPONSE_DELAY_SEC: &str = "CONF_RESPONSE_DELAY_SEC";

/// 应用服务状态
pub struct AppServiceState {
    pub client: reqwest::Client,
    /// 存储服务基址, 如 `http://dbserver:8080`
    pub storage_url: String,
}

/// 健康检查 (受 CONF_HEALTH_FAILURE 控制)
pub async fn health_check() -> HttpResponse {
    if std::env::var(CONF_HEALTH_FAILURE).as_deref() == Ok("true") {
        HttpResponse::InternalServerError()
            .content_type("text/plain")
            .body("FAILURE")
    } else {
        HttpResponse::Ok().content_type("text/plain").body("OK")
    }
}

/// 业务数据接口: 代理存储服务的 `GET /db/{key}`
pub async fn some_data(
    query: web::Query<HashMap<String, String>>,
    state: web::Data<AppServiceState>,
) -> HttpResponse {
    let key = match query.get("key") {
        Some(k) if !k.is_empty() => k.clone(),
        _ => {
            log::info!("Url Param 'key' is missing");
            return HttpResponse::BadRequest().finish();
        }
    };

    if let Ok(delay_str) = std::env::var(CONF_RESPONSE_DELAY_SEC) {
        if let Ok(delay_sec) = delay_str.parse::<u64>() {
            if delay_sec > 0 && delay_sec < 300 {
                tokio::time::sleep(Duration::from_secs(delay_sec)).await;
            }
        }
    }

    let target = format!("{}/db/{}", state.storage_url, key);
    match state.client.get(&target).send().await {
        Ok(resp) => {
            let status = actix_web::http::StatusCode::from_u16(resp.status().as_u16())
                .unwrap_or(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR);
            match resp.bytes().await {
                Ok(body) => HttpResponse::build(status)
                    .content_type("application/json")
                    .body(body),
                Err(e) => {
                    log::error!("Can't get body from storage response: {}", e);
                    HttpResponse::InternalServerError().finish()
                }
            }
        }
        Err(e) => {
            log::error!("Can't get data from storage service: {}", e);
            HttpResponse::InternalServerError().finish()
        }
    }
}

/// 启动时向存储服务写入当天日期, 让演示链路有数据可查
pub async fn seed_startup_record(
    client: &reqwest::Client,
    storage_url: &str,
    seed_key: &str,
) {
    let body = DbRequest {
        value: chrono::Local::now().format("%Y-%m-%d").to_string(),
    };

    let target = format!("{}/db/{}", storage_url, seed_key);
    match client.post(&target).json(&body).send().await {
        Ok(resp) if resp.status().is_success() => {
            log::info!("Seeded startup record {} = {}", seed_key, body.value);
        }
        Ok(resp) => {
            log::warn!("Seed request to {} returned {}", target, resp.status());
        }
        Err(e) => {
            log::warn!("Can't put seed data to storage service: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, App};

    #[actix_web::test]
    async fn test_health_check_ok() {
        std::env::remove_var(CONF_HEALTH_FAILURE);

        let app = test::init_service(
            App::new().route("/health", web::get().to(health_check)),
        )
        .await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let body = test::call_and_read_body(&app, req).await;
        assert_eq!(&body[..], b"OK");
    }

    #[actix_web::test]
    async fn test_some_data_requires_key() {
        let state = AppServiceState {
            client: reqwest::Client::new(),
            storage_url: "http://127.0.0.1:1".to_string(),
        };

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/api/v1/some-data", web::get().to(some_data)),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/v1/some-data").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::BAD_REQUEST);

        let req = test::TestRequest::get()
            .uri("/api/v1/some-data?key=")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_some_data_upstream_unreachable_returns_500() {
        let state = AppServiceState {
            client: reqwest::Client::new(),
            storage_url: "http://127.0.0.1:1".to_string(),
        };

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/api/v1/some-data", web::get().to(some_data)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/api/v1/some-data?key=demo")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(
            resp.status(),
            actix_web::http::StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
