//! In-process mock of the `PostgREST` table endpoints, served with axum.
//!
//! Each table is scripted with a [`TableBehavior`]; every request is
//! recorded so tests can assert on headers, query strings, and bodies.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Path, RawQuery, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};

/// How the mock answers for one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TableBehavior {
    /// SELECT 200, INSERT 201 with an id, DELETE 204.
    Open,
    /// SELECT 200, INSERT 201 but the body carries no id.
    OpenWithoutId,
    /// SELECT 200, INSERT 403 with SQLSTATE 42501.
    BlockInsert,
    /// SELECT 200, INSERT 403 with a plain-text RLS message and no code.
    BlockInsertTextOnly,
    /// SELECT and INSERT 401 with SQLSTATE 42501.
    BlockSelect,
    /// SELECT 200, INSERT 400 with SQLSTATE 23502.
    NotNull,
    /// SELECT 200, INSERT 409 with SQLSTATE 23503.
    ForeignKey,
    /// SELECT 200, INSERT 201, DELETE 403.
    CleanupDenied,
    /// SELECT answers 503 once, then behaves like `Open`.
    FlakySelect,
    /// INSERT answers 503 once, then behaves like `Open`.
    FlakyInsert,
    /// SELECT answers 200 after [`SLOW_RESPONSE`].
    Slow,
}

/// Delay used by [`TableBehavior::Slow`].
pub(crate) const SLOW_RESPONSE: std::time::Duration = std::time::Duration::from_secs(2);

/// One request as seen by the mock.
#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub method: &'static str,
    pub table: String,
    pub query: Option<String>,
    pub apikey: Option<String>,
    pub authorization: Option<String>,
    pub prefer: Option<String>,
    pub body: Option<Value>,
}

#[derive(Default)]
struct MockState {
    behaviors: HashMap<String, TableBehavior>,
    requests: Vec<RecordedRequest>,
    failures: HashMap<(&'static str, String), u32>,
    next_id: u64,
}

type Shared = Arc<Mutex<MockState>>;

/// Running mock server.
pub(crate) struct MockPostgrest {
    pub base_url: String,
    state: Shared,
}

impl MockPostgrest {
    /// Bind to an ephemeral port and serve `behaviors`. Unknown tables answer 404.
    pub(crate) async fn start(behaviors: &[(&str, TableBehavior)]) -> Self {
        let state: Shared = Arc::new(Mutex::new(MockState {
            behaviors: behaviors
                .iter()
                .map(|(table, behavior)| (table.to_string(), *behavior))
                .collect(),
            ..MockState::default()
        }));

        let app = Router::new()
            .route(
                "/rest/v1/{table}",
                get(select).post(insert).patch(update).delete(remove),
            )
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("mock server should bind");
        let addr = listener.local_addr().expect("bound address");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("mock server");
        });

        Self {
            base_url: format!("http://{addr}"),
            state,
        }
    }

    /// Every request received so far, in arrival order.
    pub(crate) fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().expect("mock state").requests.clone()
    }

    /// Requests for one table and method.
    pub(crate) fn requests_for(&self, method: &str, table: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.table == table)
            .collect()
    }
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn record(
    state: &Shared,
    method: &'static str,
    table: &str,
    query: Option<String>,
    headers: &HeaderMap,
    body: Option<Value>,
) -> Option<TableBehavior> {
    let mut state = state.lock().expect("mock state");
    state.requests.push(RecordedRequest {
        method,
        table: table.to_string(),
        query,
        apikey: header(headers, "apikey"),
        authorization: header(headers, "authorization"),
        prefer: header(headers, "prefer"),
        body,
    });
    state.behaviors.get(table).copied()
}

/// True on the first request of `method` for `table`.
fn first_attempt(state: &Shared, method: &'static str, table: &str) -> bool {
    let mut state = state.lock().expect("mock state");
    let seen = state.failures.entry((method, table.to_string())).or_insert(0);
    *seen += 1;
    *seen == 1
}

fn unavailable() -> Response {
    (StatusCode::SERVICE_UNAVAILABLE, "upstream unavailable").into_response()
}

fn missing_key() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"message": "No API key found in request"})),
    )
        .into_response()
}

fn not_found(table: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "code": "PGRST205",
            "message": format!("Could not find the table 'public.{table}' in the schema cache"),
        })),
    )
        .into_response()
}

fn rls_denied(table: &str) -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(json!({
            "code": "42501",
            "message": format!("new row violates row-level security policy for table \"{table}\""),
        })),
    )
        .into_response()
}

fn permission_denied(table: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "code": "42501",
            "message": format!("permission denied for table {table}"),
        })),
    )
        .into_response()
}

async fn select(
    State(state): State<Shared>,
    Path(table): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Response {
    let behavior = record(&state, "GET", &table, query, &headers, None);
    if header(&headers, "apikey").is_none() {
        return missing_key();
    }
    match behavior {
        None => not_found(&table),
        Some(TableBehavior::BlockSelect) => permission_denied(&table),
        Some(TableBehavior::FlakySelect) if first_attempt(&state, "GET", &table) => unavailable(),
        Some(TableBehavior::Slow) => {
            tokio::time::sleep(SLOW_RESPONSE).await;
            (StatusCode::OK, Json(json!([]))).into_response()
        }
        Some(_) => (StatusCode::OK, Json(json!([]))).into_response(),
    }
}

async fn insert(
    State(state): State<Shared>,
    Path(table): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let behavior = record(&state, "POST", &table, None, &headers, Some(body.clone()));
    if header(&headers, "apikey").is_none() {
        return missing_key();
    }
    match behavior {
        None => not_found(&table),
        Some(TableBehavior::BlockInsert) => rls_denied(&table),
        Some(TableBehavior::BlockInsertTextOnly) => (
            StatusCode::FORBIDDEN,
            format!("new row violates row-level security policy for table \"{table}\""),
        )
            .into_response(),
        Some(TableBehavior::BlockSelect) => permission_denied(&table),
        Some(TableBehavior::NotNull) => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "code": "23502",
                "message": "null value in column \"nombre\" violates not-null constraint",
            })),
        )
            .into_response(),
        Some(TableBehavior::ForeignKey) => (
            StatusCode::CONFLICT,
            Json(json!({
                "code": "23503",
                "message": format!("insert or update on table \"{table}\" violates foreign key constraint"),
            })),
        )
            .into_response(),
        Some(TableBehavior::FlakyInsert) if first_attempt(&state, "POST", &table) => unavailable(),
        Some(TableBehavior::OpenWithoutId) => {
            (StatusCode::CREATED, Json(json!([body]))).into_response()
        }
        Some(_) => {
            let id = {
                let mut state = state.lock().expect("mock state");
                state.next_id += 1;
                state.next_id
            };
            let mut row = body;
            if let Value::Object(map) = &mut row {
                map.insert("id".to_string(), json!(id.to_string()));
            }
            (StatusCode::CREATED, Json(json!([row]))).into_response()
        }
    }
}

async fn update(
    State(state): State<Shared>,
    Path(table): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    match record(&state, "PATCH", &table, query, &headers, Some(body)) {
        None => not_found(&table),
        Some(_) => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn remove(
    State(state): State<Shared>,
    Path(table): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Response {
    match record(&state, "DELETE", &table, query, &headers, None) {
        None => not_found(&table),
        Some(TableBehavior::CleanupDenied) => rls_denied(&table),
        Some(_) => StatusCode::NO_CONTENT.into_response(),
    }
}
