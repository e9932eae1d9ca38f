use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRequest, FromRequestParts, State,
    },
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use shared::{
    CreateReminderRequest, ErrorResponse, HealthResponse, InitCallRequest, ProfileResponse,
    ReminderListResponse, SuccessResponse, TriggerReminderResponse, UpdateProfileRequest,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::auth::require_api_key;
use crate::config::Config;
use crate::db::ProfileFields;
use crate::domain::{ProfileService, ReminderError, ReminderService};

/// Application state shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub profile_service: ProfileService,
    pub reminder_service: ReminderService,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        profile_service: ProfileService,
        reminder_service: ReminderService,
    ) -> Self {
        Self {
            config,
            profile_service,
            reminder_service,
        }
    }
}

/// Create the router: public health check plus the key-protected /api routes
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/initCall", post(init_call))
        .route("/updateProfile", post(update_profile))
        .route("/reminders", get(list_reminders).post(create_reminder))
        .route("/reminders/:id", delete(delete_reminder))
        .route("/reminders/:id/trigger", post(trigger_reminder))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .route("/health", get(health))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Deserialize, Debug)]
pub struct ReminderListQuery {
    pub caller_id: Option<String>,
}

/// Extractor rejections answered in the API's `{"error": ...}` shape
#[derive(Debug)]
pub struct ApiRejection(String);

impl From<JsonRejection> for ApiRejection {
    fn from(rejection: JsonRejection) -> Self {
        Self(rejection.body_text())
    }
}

impl From<PathRejection> for ApiRejection {
    fn from(rejection: PathRejection) -> Self {
        Self(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiRejection {
    fn from(rejection: QueryRejection) -> Self {
        Self(rejection.body_text())
    }
}

impl IntoResponse for ApiRejection {
    fn into_response(self) -> Response {
        info!("Rejected request: {}", self.0);
        error_response(StatusCode::BAD_REQUEST, self.0)
    }
}

#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiRejection))]
pub struct ApiJson<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiRejection))]
pub struct ApiPath<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiRejection))]
pub struct ApiQuery<T>(pub T);

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorResponse::new(message))).into_response()
}

fn reminder_error_response(e: &ReminderError) -> Response {
    let status = match e {
        ReminderError::Validation(_) => StatusCode::BAD_REQUEST,
        ReminderError::NotFound(_) => StatusCode::NOT_FOUND,
        ReminderError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        ReminderError::Scheduler(_) | ReminderError::Voice(_) => StatusCode::BAD_GATEWAY,
    };
    error_response(status, e.to_string())
}

/// Trimmed, non-empty caller id
fn caller_id(raw: &Option<String>) -> Option<&str> {
    raw.as_deref().map(str::trim).filter(|id| !id.is_empty())
}

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// POST /api/initCall
pub async fn init_call(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<InitCallRequest>,
) -> Response {
    let Some(phone) = caller_id(&request.caller_id) else {
        return error_response(StatusCode::BAD_REQUEST, "Missing caller_id");
    };
    info!("POST /api/initCall - caller_id: {}", phone);

    match state.profile_service.greet(phone).await {
        Ok(payload) => (StatusCode::OK, Json(payload)).into_response(),
        Err(e) => {
            error!("Error looking up caller {}: {:?}", phone, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// POST /api/updateProfile
pub async fn update_profile(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<UpdateProfileRequest>,
) -> Response {
    let Some(phone) = caller_id(&request.caller_id) else {
        return error_response(StatusCode::BAD_REQUEST, "Missing caller_id");
    };
    info!("POST /api/updateProfile - caller_id: {}", phone);

    let fields = ProfileFields {
        first_name: request.first_name.clone(),
        last_name: request.last_name.clone(),
        email: request.email.clone(),
        notes: request.notes.clone(),
    };
    if fields.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "No profile fields to update");
    }

    match state.profile_service.update_profile(phone, &fields).await {
        Ok(profile) => (
            StatusCode::OK,
            Json(ProfileResponse {
                success: true,
                profile,
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Error updating profile {}: {:?}", phone, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// POST /api/reminders
pub async fn create_reminder(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<CreateReminderRequest>,
) -> Response {
    let Some(phone) = caller_id(&request.caller_id) else {
        return error_response(StatusCode::BAD_REQUEST, "Missing caller_id");
    };
    info!(
        "POST /api/reminders - caller_id: {}, frequency: {:?}",
        phone, request.frequency
    );

    match state.reminder_service.create_reminder(phone, &request).await {
        Ok(response) => (StatusCode::CREATED, Json(response)).into_response(),
        Err(e) => {
            error!("Error creating reminder for {}: {}", phone, e);
            reminder_error_response(&e)
        }
    }
}

/// GET /api/reminders?caller_id=...
pub async fn list_reminders(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ReminderListQuery>,
) -> Response {
    let Some(phone) = caller_id(&query.caller_id) else {
        return error_response(StatusCode::BAD_REQUEST, "Missing caller_id");
    };
    info!("GET /api/reminders - caller_id: {}", phone);

    match state.reminder_service.list_reminders(phone).await {
        Ok(reminders) => (StatusCode::OK, Json(ReminderListResponse { reminders })).into_response(),
        Err(e) => {
            error!("Error listing reminders for {}: {:?}", phone, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// DELETE /api/reminders/:id
pub async fn delete_reminder(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Response {
    info!("DELETE /api/reminders/{}", id);

    match state.reminder_service.delete_reminder(id).await {
        Ok(()) => (StatusCode::OK, Json(SuccessResponse { success: true })).into_response(),
        Err(e) => {
            error!("Error deleting reminder {}: {}", id, e);
            reminder_error_response(&e)
        }
    }
}

/// POST /api/reminders/:id/trigger, called by the cron service
pub async fn trigger_reminder(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Response {
    info!("POST /api/reminders/{}/trigger", id);

    match state.reminder_service.trigger_reminder(id).await {
        Ok(result) => (
            StatusCode::OK,
            Json(TriggerReminderResponse {
                success: true,
                conversation_id: result.and_then(|call| call.conversation_id),
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Error triggering reminder {}: {}", id, e);
            reminder_error_response(&e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbConnection;
    use crate::scheduler::CronJobClient;
    use crate::voice::VoiceClient;
    use axum::{
        body::Body,
        http::{Method, Request},
    };
    use serde_json::{json, Value};
    use shared::{ConversationInitiation, CreateReminderResponse, Slot};
    use tower::util::ServiceExt; // for `oneshot`
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const KEY: &str = "test-api-key";

    struct TestApp {
        router: Router,
        db: DbConnection,
        cron: MockServer,
        voice: MockServer,
    }

    async fn setup_test_app() -> TestApp {
        let db = DbConnection::init_test().await.expect("Failed to create test database");
        let cron = MockServer::start().await;
        let voice = MockServer::start().await;
        let config = Arc::new(Config::for_test(&cron.uri(), &voice.uri()));

        let state = AppState::new(
            config.clone(),
            ProfileService::new(db.clone()),
            ReminderService::new(
                db.clone(),
                CronJobClient::new(&config.cron),
                VoiceClient::new(&config.voice),
                config.clone(),
            ),
        );

        TestApp {
            router: create_router(state),
            db,
            cron,
            voice,
        }
    }

    fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .header("x-api-key", KEY)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let app = setup_test_app().await;

        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app.router.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_api_requires_key() {
        let app = setup_test_app().await;

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/initCall")
            .header("content-type", "application/json")
            .body(Body::from(json!({"caller_id": "+420777000111"}).to_string()))
            .unwrap();
        let response = app.router.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"], "Invalid or missing API key");
    }

    #[tokio::test]
    async fn test_bearer_key_is_accepted() {
        let app = setup_test_app().await;

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/initCall")
            .header("content-type", "application/json")
            .header("authorization", format!("Bearer {}", KEY))
            .body(Body::from(json!({"caller_id": "+420777000111"}).to_string()))
            .unwrap();
        let response = app.router.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_init_call_missing_caller_id() {
        let app = setup_test_app().await;

        let response = app
            .router
            .oneshot(json_request(Method::POST, "/api/initCall", json!({})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "Missing caller_id");
    }

    #[tokio::test]
    async fn test_init_call_greets_returning_caller() {
        let app = setup_test_app().await;

        let response = app
            .router
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/api/updateProfile",
                json!({"caller_id": "+420777000111", "first_name": "Jana"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let updated: ProfileResponse = serde_json::from_value(body_json(response).await).unwrap();
        assert_eq!(updated.profile.first_name.as_deref(), Some("Jana"));

        let response = app
            .router
            .oneshot(json_request(
                Method::POST,
                "/api/initCall",
                json!({"caller_id": "+420777000111"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let payload: ConversationInitiation =
            serde_json::from_value(body_json(response).await).unwrap();
        assert_eq!(payload.kind, "conversation_initiation_client_data");
        assert_eq!(payload.dynamic_variables["caller_id"], "+420777000111");
        assert_eq!(
            payload.conversation_config_override.agent.first_message,
            "Welcome back, Jana!"
        );
    }

    #[tokio::test]
    async fn test_update_profile_requires_fields() {
        let app = setup_test_app().await;

        let response = app
            .router
            .oneshot(json_request(
                Method::POST,
                "/api/updateProfile",
                json!({"caller_id": "+420777000111"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "No profile fields to update");
    }

    #[tokio::test]
    async fn test_create_reminder() {
        let app = setup_test_app().await;

        Mock::given(method("PUT"))
            .and(path("/jobs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"jobId": 314})))
            .expect(1)
            .mount(&app.cron)
            .await;

        let response = app
            .router
            .oneshot(json_request(
                Method::POST,
                "/api/reminders",
                json!({
                    "caller_id": "+420777000111",
                    "text": "Call grandma",
                    "hour": 0,
                    "minute": 0,
                    "date": "2024-06-10",
                    "frequency": "weekly",
                    "weekdays": [2, 4]
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let created: CreateReminderResponse =
            serde_json::from_value(body_json(response).await).unwrap();
        assert_eq!(created.cron_job_id, 314);
        assert_eq!(created.schedule.weekdays, vec![Slot::At(2), Slot::At(4)]);
        assert_eq!(created.schedule.hours, vec![Slot::At(0)]);
        assert_eq!(created.schedule.expires_at, 0);

        let stored = app.db.get_reminder(created.reminder_id).await.unwrap().unwrap();
        assert_eq!(stored.cron_job_id, Some(314));
    }

    #[tokio::test]
    async fn test_create_reminder_missing_field() {
        let app = setup_test_app().await;

        let response = app
            .router
            .oneshot(json_request(
                Method::POST,
                "/api/reminders",
                json!({
                    "caller_id": "+420777000111",
                    "text": "Call grandma",
                    "minute": 0,
                    "date": "2024-06-10",
                    "frequency": "daily"
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "Missing hour");
    }

    #[tokio::test]
    async fn test_create_reminder_invalid_frequency() {
        let app = setup_test_app().await;

        let response = app
            .router
            .oneshot(json_request(
                Method::POST,
                "/api/reminders",
                json!({
                    "caller_id": "+420777000111",
                    "text": "Call grandma",
                    "hour": 10,
                    "minute": 0,
                    "date": "2024-06-10",
                    "frequency": "hourly"
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "Invalid frequency: hourly");
        assert!(app.db.list_reminders("+420777000111").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_reminder_scheduler_failure() {
        let app = setup_test_app().await;

        Mock::given(method("PUT"))
            .and(path("/jobs"))
            .respond_with(ResponseTemplate::new(429).set_body_string("Too many requests"))
            .mount(&app.cron)
            .await;

        let response = app
            .router
            .oneshot(json_request(
                Method::POST,
                "/api/reminders",
                json!({
                    "caller_id": "+420777000111",
                    "text": "Call grandma",
                    "hour": 10,
                    "minute": 0,
                    "date": "2024-06-10",
                    "frequency": "daily"
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let error = body_json(response).await["error"].as_str().unwrap().to_string();
        assert!(error.contains("Too many requests"));
    }

    #[tokio::test]
    async fn test_list_reminders() {
        let app = setup_test_app().await;

        Mock::given(method("PUT"))
            .and(path("/jobs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"jobId": 1})))
            .mount(&app.cron)
            .await;

        let create = json_request(
            Method::POST,
            "/api/reminders",
            json!({
                "caller_id": "+420777000111",
                "text": "Pay rent",
                "hour": 9,
                "minute": 0,
                "date": "2024-06-01",
                "endDate": "2024-12-01",
                "frequency": "monthly"
            }),
        );
        let response = app.router.clone().oneshot(create).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let request = Request::builder()
            .uri("/api/reminders?caller_id=%2B420777000111")
            .header("x-api-key", KEY)
            .body(Body::empty())
            .unwrap();
        let response = app.router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let list: ReminderListResponse = serde_json::from_value(body_json(response).await).unwrap();
        assert_eq!(list.reminders.len(), 1);
        assert_eq!(list.reminders[0].text, "Pay rent");
        assert_eq!(list.reminders[0].end_date.as_deref(), Some("2024-12-01"));
    }

    #[tokio::test]
    async fn test_wrongly_typed_field_is_json_error() {
        let app = setup_test_app().await;

        let response = app
            .router
            .oneshot(json_request(
                Method::POST,
                "/api/reminders",
                json!({
                    "caller_id": "+420777000111",
                    "text": "Call grandma",
                    "hour": "8",
                    "minute": 0,
                    "date": "2024-06-10",
                    "frequency": "daily"
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let error = body_json(response).await["error"].as_str().unwrap().to_string();
        assert!(error.contains("hour"));
    }

    #[tokio::test]
    async fn test_malformed_body_is_json_error() {
        let app = setup_test_app().await;

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/initCall")
            .header("content-type", "application/json")
            .header("x-api-key", KEY)
            .body(Body::from("not json"))
            .unwrap();
        let response = app.router.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn test_missing_content_type_is_json_error() {
        let app = setup_test_app().await;

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/updateProfile")
            .header("x-api-key", KEY)
            .body(Body::from(json!({"caller_id": "+420777000111"}).to_string()))
            .unwrap();
        let response = app.router.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn test_non_numeric_id_is_json_error() {
        let app = setup_test_app().await;

        let request = Request::builder()
            .method(Method::DELETE)
            .uri("/api/reminders/abc")
            .header("x-api-key", KEY)
            .body(Body::empty())
            .unwrap();
        let response = app.router.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let error = body_json(response).await["error"].as_str().unwrap().to_string();
        assert!(error.contains("abc"));
    }

    #[tokio::test]
    async fn test_trigger_and_delete_unknown_reminder() {
        let app = setup_test_app().await;

        let response = app
            .router
            .clone()
            .oneshot(json_request(Method::POST, "/api/reminders/12/trigger", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let request = Request::builder()
            .method(Method::DELETE)
            .uri("/api/reminders/12")
            .header("x-api-key", KEY)
            .body(Body::empty())
            .unwrap();
        let response = app.router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"], "Reminder 12 not found");
    }

    #[tokio::test]
    async fn test_trigger_places_call() {
        let app = setup_test_app().await;

        Mock::given(method("PUT"))
            .and(path("/jobs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"jobId": 8})))
            .mount(&app.cron)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/convai/twilio/outbound-call"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "message": "ok",
                "conversation_id": "conv_42"
            })))
            .expect(1)
            .mount(&app.voice)
            .await;

        let response = app
            .router
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/api/reminders",
                json!({
                    "caller_id": "+420777000111",
                    "text": "Feed the cat",
                    "hour": 7,
                    "minute": 45,
                    "date": "2024-06-10",
                    "frequency": "daily"
                }),
            ))
            .await
            .unwrap();
        let created: CreateReminderResponse =
            serde_json::from_value(body_json(response).await).unwrap();

        // The cron service posts an empty body
        let request = Request::builder()
            .method(Method::POST)
            .uri(format!("/api/reminders/{}/trigger", created.reminder_id))
            .header("authorization", format!("Bearer {}", KEY))
            .body(Body::empty())
            .unwrap();
        let response = app.router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: TriggerReminderResponse =
            serde_json::from_value(body_json(response).await).unwrap();
        assert!(body.success);
        assert_eq!(body.conversation_id.as_deref(), Some("conv_42"));
    }
}
