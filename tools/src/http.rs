//! REST surface over the CRM store and churn analytics.

use axum::{
    async_trait,
    extract::{
        rejection::{JsonRejection, PathRejection},
        FromRequest, FromRequestParts, Path, Query, Request, State,
    },
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use crm_core::{
    analytics::{ChurnAnalytics, ChurnMetricsSummary, EngagementSummary, ScoredCustomer},
    config::CrmConfig,
    entity::{
        ActivityLog, Customer, CustomerPatch, Deal, DealPatch, DealStage, NewActivityLog, NewCustomer, NewDeal,
        NewProduct, NewTicket, Product, ProductPatch, Ticket, TicketPatch,
    },
    error::CrmError,
    pipeline::PipelineSummary,
    rng::ScoringRng,
    store::CrmStore,
    types::EntityId,
};
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;

const DEFAULT_DASHBOARD_LIMIT: usize = 4;

pub struct AppState {
    pub store:  Mutex<CrmStore>,
    pub config: CrmConfig,
}

impl AppState {
    pub fn new(store: CrmStore, config: CrmConfig) -> Self {
        Self { store: Mutex::new(store), config }
    }

    fn rng(&self) -> ScoringRng {
        let rng = ScoringRng::from_optional_seed(self.config.rng_seed);
        log::debug!("http: scoring with seed {}", rng.seed());
        rng
    }
}

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub message: String,
    #[serde(skip)]
    pub status:  StatusCode,
}

impl ApiError {
    fn bad_request(message: String) -> Self {
        Self { message, status: StatusCode::BAD_REQUEST }
    }

    fn not_found(what: &str, id: EntityId) -> Self {
        Self {
            message: format!("{what} {id} not found"),
            status:  StatusCode::NOT_FOUND,
        }
    }
}

impl From<CrmError> for ApiError {
    fn from(err: CrmError) -> Self {
        let status = match &err {
            CrmError::CustomerNotFound { .. } => StatusCode::NOT_FOUND,
            e if e.is_client_error() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self { message: err.to_string(), status }
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::bad_request(format!("Invalid ID: {}", rejection.body_text()))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(format!("Invalid request body: {}", rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            log::error!("HTTP {}: {}", self.status.as_u16(), self.message);
        } else {
            log::warn!("HTTP {}: {}", self.status.as_u16(), self.message);
        }
        (self.status, Json(self)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ── Extractors ───────────────────────────────────────────────────────────────
//
// axum's own rejections answer in text/plain (and 422 for bad JSON); these
// wrappers route them through ApiError instead.

pub struct ApiPath<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

/// `?limit=` on dashboard lists. Missing, zero or unparsable falls back
/// to the default.
#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    limit: Option<String>,
}

impl LimitQuery {
    fn resolve(&self) -> usize {
        self.limit
            .as_deref()
            .and_then(|s| s.trim().parse::<usize>().ok())
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_DASHBOARD_LIMIT)
    }
}

// ── Router ───────────────────────────────────────────────────────────────────

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/analytics/customers/churn-risk", get(get_churn_risk))
        .route("/api/analytics/customers/:id/engagement", get(get_engagement))
        .route("/api/analytics/dashboard/churn-metrics", get(get_churn_metrics))
        .route("/api/analytics/deals/pipeline", get(get_pipeline))
        .route("/api/analytics/deals/by-stage/:stage", get(get_deals_by_stage))
        .route("/api/analytics/deals/by-assignee/:assignee", get(get_deals_by_assignee))
        .route("/api/dashboard/top-products", get(get_top_products))
        .route("/api/dashboard/recent-customers", get(get_recent_customers))
        .route("/api/customers", get(list_customers).post(create_customer))
        .route(
            "/api/customers/:id",
            get(get_customer).put(update_customer).delete(delete_customer),
        )
        .route("/api/products", get(list_products).post(create_product))
        .route(
            "/api/products/:id",
            get(get_product).put(update_product).delete(delete_product),
        )
        .route("/api/deals", get(list_deals).post(create_deal))
        .route("/api/deals/:id", get(get_deal).put(update_deal).delete(delete_deal))
        .route("/api/tickets", get(list_tickets).post(create_ticket))
        .route("/api/tickets/:id", get(get_ticket).put(update_ticket).delete(delete_ticket))
        .route("/api/activities", get(list_activities).post(create_activity))
        .with_state(state)
}

pub async fn serve(state: Arc<AppState>, port: u16) -> anyhow::Result<()> {
    let app = router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("crm-runner listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

// ── Analytics ────────────────────────────────────────────────────────────────
//
// Handlers lock the store, compute synchronously and release before
// returning; no guard lives across an await.

async fn get_churn_risk(State(state): State<Arc<AppState>>) -> ApiResult<Vec<ScoredCustomer>> {
    let store = state.store.lock();
    let analytics = ChurnAnalytics::new(&*store, &state.config);
    let at_risk = analytics.customers_with_churn_risk(Utc::now(), &mut state.rng())?;
    Ok(Json(at_risk))
}

async fn get_engagement(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<EntityId>,
) -> ApiResult<EngagementSummary> {
    let store = state.store.lock();
    let analytics = ChurnAnalytics::new(&*store, &state.config);
    analytics
        .customer_engagement(id, Utc::now(), &mut state.rng())?
        .map(Json)
        .ok_or_else(|| CrmError::CustomerNotFound { id }.into())
}

async fn get_churn_metrics(State(state): State<Arc<AppState>>) -> ApiResult<ChurnMetricsSummary> {
    let store = state.store.lock();
    let analytics = ChurnAnalytics::new(&*store, &state.config);
    Ok(Json(analytics.churn_metrics(Utc::now(), &mut state.rng())?))
}

async fn get_pipeline(State(state): State<Arc<AppState>>) -> ApiResult<PipelineSummary> {
    let deals = state.store.lock().list_deals()?;
    Ok(Json(PipelineSummary::from_deals(&deals)))
}

async fn get_deals_by_stage(
    State(state): State<Arc<AppState>>,
    ApiPath(stage): ApiPath<String>,
) -> ApiResult<Vec<Deal>> {
    let stage: DealStage = stage.parse()?;
    Ok(Json(state.store.lock().list_deals_by_stage(stage)?))
}

async fn get_deals_by_assignee(
    State(state): State<Arc<AppState>>,
    ApiPath(assignee): ApiPath<String>,
) -> ApiResult<Vec<Deal>> {
    Ok(Json(state.store.lock().list_deals_by_assignee(&assignee)?))
}

// ── Dashboard ────────────────────────────────────────────────────────────────

async fn get_top_products(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Vec<Product>> {
    Ok(Json(state.store.lock().top_products(query.resolve())?))
}

async fn get_recent_customers(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Vec<Customer>> {
    Ok(Json(state.store.lock().recent_customers(query.resolve())?))
}

// ── Customers ────────────────────────────────────────────────────────────────

async fn list_customers(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Customer>> {
    Ok(Json(state.store.lock().list_customers()?))
}

async fn get_customer(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<EntityId>,
) -> ApiResult<Customer> {
    state
        .store
        .lock()
        .get_customer(id)?
        .map(Json)
        .ok_or_else(|| CrmError::CustomerNotFound { id }.into())
}

async fn create_customer(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<NewCustomer>,
) -> Result<(StatusCode, Json<Customer>), ApiError> {
    let customer = state.store.lock().insert_customer(&body)?;
    Ok((StatusCode::CREATED, Json(customer)))
}

async fn update_customer(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<EntityId>,
    ApiJson(patch): ApiJson<CustomerPatch>,
) -> ApiResult<Customer> {
    state
        .store
        .lock()
        .update_customer(id, patch)?
        .map(Json)
        .ok_or_else(|| CrmError::CustomerNotFound { id }.into())
}

async fn delete_customer(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<EntityId>,
) -> Result<StatusCode, ApiError> {
    if state.store.lock().delete_customer(id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(CrmError::CustomerNotFound { id }.into())
    }
}

// ── Products ─────────────────────────────────────────────────────────────────

async fn list_products(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Product>> {
    Ok(Json(state.store.lock().list_products()?))
}

async fn get_product(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<EntityId>,
) -> ApiResult<Product> {
    state
        .store
        .lock()
        .get_product(id)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Product", id))
}

async fn create_product(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<NewProduct>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    let product = state.store.lock().insert_product(&body)?;
    Ok((StatusCode::CREATED, Json(product)))
}

async fn update_product(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<EntityId>,
    ApiJson(patch): ApiJson<ProductPatch>,
) -> ApiResult<Product> {
    state
        .store
        .lock()
        .update_product(id, patch)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Product", id))
}

async fn delete_product(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<EntityId>,
) -> Result<StatusCode, ApiError> {
    if state.store.lock().delete_product(id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("Product", id))
    }
}

// ── Deals ────────────────────────────────────────────────────────────────────

async fn list_deals(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Deal>> {
    Ok(Json(state.store.lock().list_deals()?))
}

async fn get_deal(State(state): State<Arc<AppState>>, ApiPath(id): ApiPath<EntityId>) -> ApiResult<Deal> {
    state
        .store
        .lock()
        .get_deal(id)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Deal", id))
}

async fn create_deal(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<NewDeal>,
) -> Result<(StatusCode, Json<Deal>), ApiError> {
    let deal = state.store.lock().insert_deal(&body, Utc::now())?;
    Ok((StatusCode::CREATED, Json(deal)))
}

async fn update_deal(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<EntityId>,
    ApiJson(patch): ApiJson<DealPatch>,
) -> ApiResult<Deal> {
    state
        .store
        .lock()
        .update_deal(id, patch, Utc::now())?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Deal", id))
}

async fn delete_deal(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<EntityId>,
) -> Result<StatusCode, ApiError> {
    if state.store.lock().delete_deal(id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("Deal", id))
    }
}

// ── Tickets ──────────────────────────────────────────────────────────────────

async fn list_tickets(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Ticket>> {
    Ok(Json(state.store.lock().list_tickets()?))
}

async fn get_ticket(State(state): State<Arc<AppState>>, ApiPath(id): ApiPath<EntityId>) -> ApiResult<Ticket> {
    state
        .store
        .lock()
        .get_ticket(id)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Ticket", id))
}

async fn create_ticket(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<NewTicket>,
) -> Result<(StatusCode, Json<Ticket>), ApiError> {
    let ticket = state.store.lock().insert_ticket(&body, Utc::now())?;
    Ok((StatusCode::CREATED, Json(ticket)))
}

async fn update_ticket(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<EntityId>,
    ApiJson(patch): ApiJson<TicketPatch>,
) -> ApiResult<Ticket> {
    state
        .store
        .lock()
        .update_ticket(id, patch, Utc::now())?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Ticket", id))
}

async fn delete_ticket(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<EntityId>,
) -> Result<StatusCode, ApiError> {
    if state.store.lock().delete_ticket(id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("Ticket", id))
    }
}

// ── Activities ───────────────────────────────────────────────────────────────

async fn list_activities(State(state): State<Arc<AppState>>) -> ApiResult<Vec<ActivityLog>> {
    Ok(Json(state.store.lock().list_activities()?))
}

async fn create_activity(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<NewActivityLog>,
) -> Result<(StatusCode, Json<ActivityLog>), ApiError> {
    let activity = state.store.lock().insert_activity(&body, Utc::now())?;
    Ok((StatusCode::CREATED, Json(activity)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{self, header, Method},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt; // for `oneshot`

    fn test_state() -> Arc<AppState> {
        let store = CrmStore::in_memory_migrated().expect("in-memory store");
        Arc::new(AppState::new(store, CrmConfig::default()))
    }

    async fn send(state: &Arc<AppState>, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = http::Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let response = router(state.clone())
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("response body is JSON")
        };
        (status, value)
    }

    fn customer_body(email: &str) -> Value {
        json!({ "name": "Ana Ruiz", "email": email, "companyName": "Acme", "totalSpent": 1200.0 })
    }

    #[tokio::test]
    async fn unknown_customer_engagement_is_404_with_message() {
        let state = test_state();
        let (status, body) = send(&state, Method::GET, "/api/analytics/customers/999/engagement", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Customer 999 not found");
    }

    #[tokio::test]
    async fn non_numeric_id_is_400_with_json_message() {
        let state = test_state();
        let (status, body) = send(&state, Method::GET, "/api/analytics/customers/abc/engagement", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let message = body["message"].as_str().expect("message field");
        assert!(message.starts_with("Invalid ID"), "got {message}");
    }

    #[tokio::test]
    async fn unknown_stage_is_400() {
        let state = test_state();
        let (status, body) = send(&state, Method::GET, "/api/analytics/deals/by-stage/won", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().contains("won"));

        let (status, body) = send(&state, Method::GET, "/api/analytics/deals/by-stage/lead", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn customer_lifecycle_over_http() {
        let state = test_state();

        let (status, created) = send(&state, Method::POST, "/api/customers", Some(customer_body("ana@acme.io"))).await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["id"].as_i64().expect("id");

        let (status, body) = send(&state, Method::POST, "/api/customers", Some(json!({ "name": "x" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "missing fields are a 400, not a 422");
        assert!(body["message"].as_str().unwrap().starts_with("Invalid request body"));

        let (status, updated) = send(
            &state,
            Method::PUT,
            &format!("/api/customers/{id}"),
            Some(json!({ "totalSpent": 5 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["totalSpent"], 5.0);
        assert_eq!(updated["name"], "Ana Ruiz", "absent fields keep their value");
        assert_eq!(updated["email"], "ana@acme.io");

        let (status, _) = send(&state, Method::PUT, "/api/customers/999", Some(json!({ "totalSpent": 5 }))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(&state, Method::DELETE, &format!("/api/customers/{id}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(body, Value::Null);

        let (status, body) = send(&state, Method::DELETE, &format!("/api/customers/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["message"].is_string());
    }

    #[tokio::test]
    async fn dashboard_lists_honour_limit() {
        let state = test_state();
        for (name, price) in [("Suite", 1_450_000.0), ("Support", 825_000.0), ("Storage", 675_000.0), ("API", 520_000.0), ("Docs", 10_000.0)] {
            let (status, _) = send(
                &state,
                Method::POST,
                "/api/products",
                Some(json!({ "name": name, "category": "Software", "price": price })),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (_, top) = send(&state, Method::GET, "/api/dashboard/top-products", None).await;
        let names: Vec<&str> = top.as_array().unwrap().iter().map(|p| p["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["Suite", "Support", "Storage", "API"]);

        let (_, top) = send(&state, Method::GET, "/api/dashboard/top-products?limit=2", None).await;
        assert_eq!(top.as_array().unwrap().len(), 2);
        let (_, top) = send(&state, Method::GET, "/api/dashboard/top-products?limit=abc", None).await;
        assert_eq!(top.as_array().unwrap().len(), 4, "bad limit falls back to the default");

        for i in 0..3 {
            send(&state, Method::POST, "/api/customers", Some(customer_body(&format!("c{i}@acme.io")))).await;
        }
        let (status, recent) = send(&state, Method::GET, "/api/dashboard/recent-customers?limit=1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(recent.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn product_update_merges_and_missing_is_404() {
        let state = test_state();
        let (_, created) = send(
            &state,
            Method::POST,
            "/api/products",
            Some(json!({ "name": "Suite", "category": "Software", "price": 100.0, "trend": 12.4 })),
        )
        .await;
        let id = created["id"].as_i64().unwrap();
        assert_eq!(created["currency"], "INR");

        let (status, updated) = send(&state, Method::PUT, &format!("/api/products/{id}"), Some(json!({ "price": 250.0 }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["price"], 250.0);
        assert_eq!(updated["trend"], 12.4);

        let (status, body) = send(&state, Method::GET, "/api/products/404", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Product 404 not found");
    }

    #[tokio::test]
    async fn deals_filter_by_assignee() {
        let state = test_state();
        for (title, owner) in [("Renewal", "sam"), ("Upsell", "priya"), ("Expansion", "sam")] {
            let (status, _) = send(
                &state,
                Method::POST,
                "/api/deals",
                Some(json!({
                    "customerId": 1, "title": title, "companyName": "Acme",
                    "stage": "proposal", "value": 1000.0, "assignedTo": owner
                })),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (status, deals) = send(&state, Method::GET, "/api/analytics/deals/by-assignee/sam", None).await;
        assert_eq!(status, StatusCode::OK);
        let titles: Vec<&str> = deals.as_array().unwrap().iter().map(|d| d["title"].as_str().unwrap()).collect();
        assert_eq!(titles, vec!["Renewal", "Expansion"]);

        let (_, none) = send(&state, Method::GET, "/api/analytics/deals/by-assignee/nobody", None).await;
        assert_eq!(none, json!([]));
    }
}
