//! Offline cache status and the asset route.
//!
//! Every path not claimed by an API route is an editor asset. GET requests go
//! through the active cache worker; everything else, and everything when no
//! worker is active, is proxied straight to the asset origin.

use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use mdpad_types::RpcResponse;

use crate::offline::{AssetRequest, CachedResponse, Intercepted, Served};
use crate::AppState;

/// GET /api/offline/status
async fn offline_status(data: web::Data<AppState>) -> impl Responder {
    match data.offline.status() {
        Ok(status) => HttpResponse::Ok().json(RpcResponse::ok(status)),
        Err(e) => {
            log::error!("[OFFLINE] Failed to read cache status: {}", e);
            HttpResponse::InternalServerError().json(RpcResponse::<()>::err(e.to_string()))
        }
    }
}

/// {any} /{path:.*}: serve an asset, cache-first
pub async fn serve_asset(
    data: web::Data<AppState>,
    req: HttpRequest,
    body: web::Bytes,
) -> HttpResponse {
    let path = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| req.path().to_string());

    let request = AssetRequest {
        method: req.method().as_str().to_string(),
        path,
        body: body.to_vec(),
    };

    match data.offline.handle(&request).await {
        Intercepted::Respond { response, source } => {
            let mut http = to_http_response(&response);
            http.headers_mut().insert(
                actix_web::http::header::HeaderName::from_static("x-mdpad-cache"),
                actix_web::http::header::HeaderValue::from_static(match source {
                    Served::Cache => "hit",
                    Served::Network => "miss",
                    Served::Unavailable => "unavailable",
                }),
            );
            http
        }
        Intercepted::Passthrough => match data.offline.fetcher().fetch(&request).await {
            Ok(response) => to_http_response(&response),
            Err(e) => {
                log::error!("[OFFLINE] Proxy error for {}: {}", request.path, e);
                HttpResponse::BadGateway().json(RpcResponse::<()>::err(format!(
                    "Could not reach asset origin: {}",
                    e
                )))
            }
        },
    }
}

fn to_http_response(response: &CachedResponse) -> HttpResponse {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut builder = HttpResponse::build(status);

    for (key, value) in &response.headers {
        if let Ok(name) = actix_web::http::header::HeaderName::from_bytes(key.as_bytes()) {
            if let Ok(value) = actix_web::http::header::HeaderValue::from_str(value) {
                builder.insert_header((name, value));
            }
        }
    }

    builder.body(response.body.clone())
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/offline/status").route(web::get().to(offline_status)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, App};
    use serde_json::Value;

    use crate::offline::manifest;

    #[actix_web::test]
    async fn test_asset_served_from_cache_when_origin_is_down() {
        let dir = tempfile::tempdir().unwrap();
        let (state, fetcher) = crate::controllers::test_state(&dir);
        fetcher.respond("/pad/md.js", 200, "console.log('md')");
        state
            .offline
            .register("v1", &["/pad/md.js"])
            .await
            .unwrap();
        fetcher.go_offline();

        let app = test::init_service(
            App::new()
                .app_data(state.clone())
                .configure(config)
                .default_service(web::to(serve_asset)),
        )
        .await;

        let req = test::TestRequest::get().uri("/pad/md.js").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get("x-mdpad-cache").unwrap(), "hit");
        assert_eq!(test::read_body(resp).await, "console.log('md')");

        let req = test::TestRequest::get().uri("/pad/unknown.js").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(test::read_body(resp).await, "<h1>Service unavailable</h1>");

        let req = test::TestRequest::get().uri("/api/offline/status").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["active_version"], "v1");
        assert_eq!(
            body["data"]["regions"][0],
            manifest::region_name("v1", manifest::FUNDAMENTALS)
        );
    }

    #[actix_web::test]
    async fn test_no_worker_proxies_to_origin() {
        let dir = tempfile::tempdir().unwrap();
        let (state, fetcher) = crate::controllers::test_state(&dir);
        fetcher.respond("/pad", 200, "<html>");

        let app = test::init_service(
            App::new()
                .app_data(state.clone())
                .default_service(web::to(serve_asset)),
        )
        .await;

        let req = test::TestRequest::get().uri("/pad").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers().get("x-mdpad-cache").is_none());

        fetcher.go_offline();
        let req = test::TestRequest::get().uri("/pad").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }
}
