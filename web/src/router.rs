use crate::controller::{health_check_controller, stats_controller};
use crate::ws::handler::ws_handler;
use axum::http::{header, HeaderValue, Method};
use axum::{routing::get, Router};
use log::*;
use service::{config::Config, AppState};
use tower_http::cors::{AllowOrigin, CorsLayer};

pub fn define_routes(app_state: AppState) -> Router {
    let cors = cors_layer(&app_state.config);

    Router::new()
        .merge(health_routes())
        .merge(stats_routes())
        .merge(ws_routes())
        .layer(cors)
        .with_state(app_state)
}

fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check_controller::health_check))
}

fn stats_routes() -> Router<AppState> {
    Router::new().route("/stats", get(stats_controller::read))
}

fn ws_routes() -> Router<AppState> {
    Router::new().route("/ws", get(ws_handler))
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {origin}");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{DashboardClaims, DashboardRole, JwtAuthenticator};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use jsonwebtoken::{encode, EncodingKey, Header};
    use realtime::Dispatcher;
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::{SystemTime, UNIX_EPOCH};
    use tower::ServiceExt;

    const SECRET: &str = "router-secret";

    fn app_state() -> AppState {
        let config = Config::from_args(["dashboard_realtime"]);
        let (dispatcher, event_publisher) = service::init_realtime(&config);
        AppState::new(
            config,
            dispatcher,
            event_publisher,
            Arc::new(JwtAuthenticator::new(SECRET, None)),
        )
    }

    fn token(role: DashboardRole, tenant: Option<&str>) -> String {
        let exp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as usize
            + 3600;
        let claims = DashboardClaims {
            sub: "user-1".into(),
            role,
            tenant: tenant.map(str::to_string),
            exp,
            iss: None,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    fn get_request(uri: &str, bearer: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_check_answers_ok() {
        let response = define_routes(app_state())
            .oneshot(get_request("/health", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn stats_without_credential_is_unauthorized() {
        let response = define_routes(app_state())
            .oneshot(get_request("/stats", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = json_body(response).await;
        assert_eq!(body["type"], "error");
        assert_eq!(body["data"]["code"], "authentication_rejected");
    }

    #[tokio::test]
    async fn stats_with_invalid_credential_is_unauthorized() {
        let response = define_routes(app_state())
            .oneshot(get_request("/stats", Some("not-a-jwt")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn stats_for_property_manager_is_forbidden() {
        let bearer = token(DashboardRole::PropertyManager, Some("P1"));
        let response = define_routes(app_state())
            .oneshot(get_request("/stats", Some(&bearer)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let body = json_body(response).await;
        assert_eq!(body["data"]["code"], "permission_denied");
    }

    #[tokio::test]
    async fn stats_for_hr_reports_live_counts() {
        let state = app_state();
        let dispatcher: Arc<Dispatcher> = state.dispatcher.clone();
        let (tx, _rx) = tokio::sync::mpsc::channel(8);
        dispatcher.connect(realtime::Principal::scoped("pm-1", "P1"), tx);

        let bearer = token(DashboardRole::Hr, None);
        let response = define_routes(state)
            .oneshot(get_request("/stats?token=ignored", Some(&bearer)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["status_code"], 200);
        assert_eq!(body["data"]["connections"], 1);
        assert_eq!(body["data"]["room_members"]["tenant-P1"], 1);
    }

    #[tokio::test]
    async fn stats_accepts_query_token() {
        let bearer = token(DashboardRole::Admin, None);
        let response = define_routes(app_state())
            .oneshot(get_request(&format!("/stats?token={bearer}"), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
