//! Integration tests for Fiat Parts.
//!
//! [`FakeBackend`] is an in-process HTTP server that speaks the part of the
//! hosted backend's REST, auth, and storage protocol the storefront uses.
//! Tests point a real `BackendClient` at it, so requests go over the wire
//! exactly as they would in production.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p fiat-parts-integration-tests
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! let backend = FakeBackend::start().await;
//! let user_id = backend.add_user("marco@officina.it", "correct-horse");
//! let client = backend.client(Arc::new(MemoryStore::new()));
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, RawQuery, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{DateTime, SecondsFormat, Utc};
use fiat_parts_storefront::backend::BackendClient;
use fiat_parts_storefront::cart::CartService;
use fiat_parts_storefront::catalog::CatalogService;
use fiat_parts_storefront::checkout::CheckoutService;
use fiat_parts_storefront::config::BackendConfig;
use fiat_parts_storefront::local_store::{LocalStore, MemoryStore};
use fiat_parts_storefront::models::Profile;
use fiat_parts_storefront::session::{AuthOutcome, SessionHolder};
use secrecy::SecretString;
use serde_json::{Map, Value, json};
use url::Url;

/// API key the fake accepts.
pub const ANON_KEY: &str = "fake-anon-key-7f3a9c2e81d4";

/// The only storage bucket the fake knows.
pub const BUCKET: &str = "part-images";

const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// 2026-01-01T00:00:00Z; row timestamps count up from here.
const CLOCK_EPOCH: i64 = 1_767_225_600;

/// Columns that reject duplicate values.
const UNIQUE_COLUMNS: &[(&str, &str)] = &[("categories", "slug"), ("parts", "part_number")];

type Row = Map<String, Value>;

// =============================================================================
// Recorded requests
// =============================================================================

/// One request the fake received.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub query: String,
    /// Owner of the bearer token; `None` when the anon key was sent.
    pub user_id: Option<String>,
}

impl RecordedRequest {
    /// Whether this was a REST call against `table`.
    #[must_use]
    pub fn is_table(&self, table: &str) -> bool {
        self.path == format!("/rest/v1/{table}")
    }

    /// Whether this request could have changed data.
    #[must_use]
    pub fn is_write(&self) -> bool {
        self.method != Method::GET
    }
}

// =============================================================================
// State
// =============================================================================

struct User {
    id: String,
    email: String,
    password: String,
}

struct FakeState {
    tables: HashMap<String, Vec<Row>>,
    users: Vec<User>,
    /// Access token to user ID.
    access_tokens: HashMap<String, String>,
    /// Refresh token to user ID.
    refresh_tokens: HashMap<String, String>,
    objects: HashMap<String, Vec<u8>>,
    requests: Vec<RecordedRequest>,
    failing: HashSet<String>,
    confirm_signups: bool,
    token_lifetime_secs: i64,
    clock: i64,
    token_seq: u64,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            tables: HashMap::new(),
            users: Vec::new(),
            access_tokens: HashMap::new(),
            refresh_tokens: HashMap::new(),
            objects: HashMap::new(),
            requests: Vec::new(),
            failing: HashSet::new(),
            confirm_signups: false,
            token_lifetime_secs: DEFAULT_TOKEN_LIFETIME_SECS,
            clock: 0,
            token_seq: 0,
        }
    }
}

/// In-process stand-in for the hosted backend.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct FakeBackend {
    addr: SocketAddr,
    state: Arc<Mutex<FakeState>>,
}

impl FakeBackend {
    /// Bind to an ephemeral port and start serving.
    ///
    /// # Panics
    ///
    /// Panics if the listener can't be bound.
    pub async fn start() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fake backend");
        let addr = listener.local_addr().expect("Fake backend has no address");

        let fake = Self {
            addr,
            state: Arc::new(Mutex::new(FakeState::default())),
        };
        let app = router(fake.clone());
        tokio::spawn(async move {
            axum::serve(listener, app)
                .await
                .expect("Fake backend server error");
        });
        fake
    }

    /// Base URL of the fake.
    ///
    /// # Panics
    ///
    /// Never in practice; the address always forms a valid URL.
    #[must_use]
    pub fn url(&self) -> Url {
        Url::parse(&format!("http://{}/", self.addr)).expect("Invalid fake backend URL")
    }

    /// Connection settings pointing at the fake.
    #[must_use]
    pub fn config(&self) -> BackendConfig {
        BackendConfig {
            url: self.url(),
            anon_key: SecretString::from(ANON_KEY),
            storage_bucket: BUCKET.to_string(),
            request_timeout: Duration::from_secs(5),
        }
    }

    /// A real client talking to the fake.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client can't be built.
    #[must_use]
    pub fn client(&self, store: Arc<dyn LocalStore>) -> BackendClient {
        BackendClient::new(&self.config(), store).expect("Failed to build backend client")
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().expect("Fake backend state poisoned")
    }

    // -------------------------------------------------------------------------
    // Seeding and inspection
    // -------------------------------------------------------------------------

    /// Insert a row directly, filling `id` and `created_at` when absent.
    ///
    /// # Panics
    ///
    /// Panics if `row` is not a JSON object.
    pub fn insert(&self, table: &str, row: Value) -> Value {
        let Value::Object(row) = row else {
            panic!("Seed rows must be JSON objects");
        };
        Value::Object(self.lock().insert_row(table, row))
    }

    /// Every row in a table, in insertion order.
    #[must_use]
    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.lock()
            .tables
            .get(table)
            .map(|rows| rows.iter().cloned().map(Value::Object).collect())
            .unwrap_or_default()
    }

    /// Register a confirmed user with an empty profile. Returns the user ID.
    pub fn add_user(&self, email: &str, password: &str) -> String {
        let mut state = self.lock();
        let id = uuid::Uuid::new_v4().to_string();
        state.users.push(User {
            id: id.clone(),
            email: email.to_lowercase(),
            password: password.to_string(),
        });
        let mut profile = Row::new();
        profile.insert("id".to_string(), json!(id));
        state.insert_row("profiles", profile);
        id
    }

    /// Give a user the admin role.
    pub fn grant_admin(&self, user_id: &str) {
        self.insert("user_roles", json!({"user_id": user_id, "role": "admin"}));
    }

    /// Seed a category. Returns its ID.
    pub fn add_category(&self, name: &str, slug: &str) -> String {
        let row = self.insert("categories", json!({"name": name, "slug": slug}));
        row["id"].as_str().unwrap_or_default().to_string()
    }

    /// Seed an active, in-stock used part. Returns its ID.
    pub fn add_part(&self, name: &str, price: f64, category_id: Option<&str>) -> String {
        let row = self.insert(
            "parts",
            json!({
                "name": name,
                "price": price,
                "condition": "used",
                "stock_quantity": 3,
                "category_id": category_id,
                "compatible_models": ["Panda"],
                "is_active": true,
            }),
        );
        row["id"].as_str().unwrap_or_default().to_string()
    }

    /// Stored object bytes by path inside the bucket.
    #[must_use]
    pub fn object(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().objects.get(path).cloned()
    }

    /// Paths of every stored object, sorted.
    #[must_use]
    pub fn object_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.lock().objects.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Requests received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    pub fn clear_requests(&self) {
        self.lock().requests.clear();
    }

    /// Answer every request to `target` with a 500 until restored.
    ///
    /// `target` is a table name, `auth`, or `storage`.
    pub fn fail(&self, target: &str) {
        self.lock().failing.insert(target.to_string());
    }

    pub fn restore(&self, target: &str) {
        self.lock().failing.remove(target);
    }

    /// Make sign-up return the bare user instead of a session.
    pub fn require_confirmation(&self, required: bool) {
        self.lock().confirm_signups = required;
    }

    /// Lifetime of tokens issued from now on.
    pub fn set_token_lifetime(&self, secs: i64) {
        self.lock().token_lifetime_secs = secs;
    }

    /// Invalidate every issued token, as a server-side sign-out would.
    pub fn revoke_tokens(&self) {
        let mut state = self.lock();
        state.access_tokens.clear();
        state.refresh_tokens.clear();
    }
}

// =============================================================================
// Storefront harness
// =============================================================================

/// Catalog cache lifetime used by the harness.
const CATALOG_TTL: Duration = Duration::from_secs(60);

/// How long to wait for background profile fetches.
const PROFILE_WAIT: Duration = Duration::from_secs(5);

/// Storefront services wired to a fake backend, as one page load builds them.
pub struct Storefront {
    pub backend: FakeBackend,
    pub store: Arc<dyn LocalStore>,
    pub client: BackendClient,
    pub session: SessionHolder,
}

impl Storefront {
    /// Fresh page load with empty local storage.
    pub async fn open(backend: &FakeBackend) -> Self {
        Self::with_store(backend, Arc::new(MemoryStore::new())).await
    }

    /// Page load over existing local storage.
    pub async fn with_store(backend: &FakeBackend, store: Arc<dyn LocalStore>) -> Self {
        let client = backend.client(Arc::clone(&store));
        let session = SessionHolder::init(Arc::new(client.clone())).await;
        Self {
            backend: backend.clone(),
            store,
            client,
            session,
        }
    }

    /// Reload the page: new client and session over the same local storage.
    pub async fn reopen(&self) -> Self {
        Self::with_store(&self.backend, Arc::clone(&self.store)).await
    }

    pub async fn login(&self, email: &str, password: &str) -> AuthOutcome {
        self.session
            .login(email, &SecretString::from(password.to_string()))
            .await
    }

    pub async fn cart(&self) -> CartService {
        CartService::new(
            &self.session,
            Arc::new(self.client.clone()),
            Arc::clone(&self.store),
        )
        .await
    }

    #[must_use]
    pub fn catalog(&self) -> CatalogService {
        CatalogService::new(self.client.clone(), CATALOG_TTL)
    }

    #[must_use]
    pub fn checkout(&self) -> CheckoutService {
        CheckoutService::new(self.client.clone())
    }

    /// Wait for the profile fetch that follows sign-in.
    pub async fn profile(&self) -> Option<Profile> {
        let mut rx = self.session.subscribe();
        let loaded = rx.wait_for(|s| s.profile.is_some());
        tokio::time::timeout(PROFILE_WAIT, loaded)
            .await
            .ok()
            .and_then(Result::ok)
            .and_then(|snapshot| snapshot.profile.clone())
    }
}

// =============================================================================
// Row storage
// =============================================================================

impl FakeState {
    fn tick(&mut self) -> String {
        self.clock += 1;
        DateTime::<Utc>::from_timestamp(CLOCK_EPOCH + self.clock, 0)
            .unwrap_or_default()
            .to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    fn insert_row(&mut self, table: &str, mut row: Row) -> Row {
        if !row.contains_key("id") {
            row.insert("id".to_string(), json!(uuid::Uuid::new_v4().to_string()));
        }
        if !row.contains_key("created_at") {
            let now = self.tick();
            row.insert("created_at".to_string(), json!(now));
        }
        self.tables
            .entry(table.to_string())
            .or_default()
            .push(row.clone());
        row
    }

    fn table(&self, table: &str) -> &[Row] {
        self.tables.get(table).map_or(&[], Vec::as_slice)
    }

    fn violates_unique(&self, table: &str, row: &Row, skip_id: Option<&Value>) -> Option<&'static str> {
        UNIQUE_COLUMNS
            .iter()
            .filter(|(t, _)| *t == table)
            .find(|(_, column)| {
                let Some(value) = row.get(*column).filter(|v| !v.is_null()) else {
                    return false;
                };
                self.table(table).iter().any(|existing| {
                    existing.get("id") != skip_id && existing.get(*column) == Some(value)
                })
            })
            .map(|(_, column)| *column)
    }

    fn select(&self, table: &str, params: &RestParams) -> Vec<Value> {
        let mut rows: Vec<&Row> = self
            .table(table)
            .iter()
            .filter(|row| params.matches(row))
            .collect();

        for (column, descending) in params.order.iter().rev() {
            rows.sort_by(|a, b| {
                let ord = compare(a.get(column), b.get(column));
                if *descending { ord.reverse() } else { ord }
            });
        }
        if let Some(limit) = params.limit {
            rows.truncate(limit);
        }

        let columns = params.columns();
        rows.into_iter()
            .map(|row| self.project(table, row, &columns))
            .collect()
    }

    fn project(&self, table: &str, row: &Row, columns: &[Column]) -> Value {
        let mut out = Row::new();
        for column in columns {
            match column {
                Column::All => out.extend(row.iter().map(|(k, v)| (k.clone(), v.clone()))),
                Column::Field(name) => {
                    out.insert(name.clone(), row.get(name).cloned().unwrap_or(Value::Null));
                }
                Column::Embed { relation, columns } => {
                    let embedded = self.embed(table, row, relation, columns);
                    out.insert(relation.clone(), embedded);
                }
            }
        }
        Value::Object(out)
    }

    fn embed(&self, table: &str, row: &Row, relation: &str, columns: &[Column]) -> Value {
        match join(table, relation) {
            Some(Join::ToOne { fk }) => row
                .get(fk)
                .filter(|v| !v.is_null())
                .and_then(|key| {
                    self.table(relation)
                        .iter()
                        .find(|candidate| candidate.get("id") == Some(key))
                })
                .map_or(Value::Null, |target| self.project(relation, target, columns)),
            Some(Join::ToMany { fk }) => Value::Array(
                self.table(relation)
                    .iter()
                    .filter(|child| child.get(fk).is_some() && child.get(fk) == row.get("id"))
                    .map(|child| self.project(relation, child, columns))
                    .collect(),
            ),
            None => Value::Null,
        }
    }
}

/// How an embedded relation joins to its parent row.
enum Join {
    /// Parent holds the foreign key.
    ToOne { fk: &'static str },
    /// Children hold a key pointing at the parent's `id`.
    ToMany { fk: &'static str },
}

fn join(parent: &str, relation: &str) -> Option<Join> {
    match (parent, relation) {
        ("parts", "categories") => Some(Join::ToOne { fk: "category_id" }),
        ("parts", "part_images") => Some(Join::ToMany { fk: "part_id" }),
        ("cart_items", "parts") => Some(Join::ToOne { fk: "part_id" }),
        ("orders", "order_items") => Some(Join::ToMany { fk: "order_id" }),
        _ => None,
    }
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        _ => {
            let a = a.and_then(text);
            let b = b.and_then(text);
            match (a, b) {
                // Nulls sort last
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => a.cmp(&b),
            }
        }
    }
}

// =============================================================================
// Query parameters
// =============================================================================

enum Filter {
    Eq(String),
    ILike(String),
    In(Vec<String>),
}

impl Filter {
    fn parse(raw: &str) -> Option<Self> {
        if let Some(value) = raw.strip_prefix("eq.") {
            return Some(Self::Eq(value.to_string()));
        }
        if let Some(pattern) = raw.strip_prefix("ilike.") {
            return Some(Self::ILike(pattern.trim_matches('*').to_lowercase()));
        }
        let list = raw.strip_prefix("in.(")?.strip_suffix(')')?;
        Some(Self::In(list.split(',').map(str::to_string).collect()))
    }

    fn matches(&self, value: Option<&Value>) -> bool {
        let Some(value) = value.and_then(text) else {
            return false;
        };
        match self {
            Self::Eq(expected) => &value == expected,
            Self::ILike(needle) => value.to_lowercase().contains(needle.as_str()),
            Self::In(options) => options.contains(&value),
        }
    }
}

enum Column {
    All,
    Field(String),
    Embed { relation: String, columns: Vec<Column> },
}

/// Split a select list on top-level commas.
fn parse_columns(select: &str) -> Vec<Column> {
    let mut parts = Vec::new();
    let mut depth = 0_usize;
    let mut current = String::new();
    for c in select.chars() {
        match c {
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => parts.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    parts.push(current);

    parts
        .into_iter()
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty())
        .map(|part| {
            if part == "*" {
                return Column::All;
            }
            match part.split_once('(') {
                Some((relation, rest)) => Column::Embed {
                    relation: relation.trim().to_string(),
                    columns: parse_columns(rest.strip_suffix(')').unwrap_or(rest)),
                },
                None => Column::Field(part),
            }
        })
        .collect()
}

#[derive(Default)]
struct RestParams {
    select: Option<String>,
    filters: Vec<(String, Filter)>,
    /// Column and whether it sorts descending.
    order: Vec<(String, bool)>,
    limit: Option<usize>,
}

impl RestParams {
    fn parse(query: &str) -> Result<Self, String> {
        let mut params = Self::default();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "select" => params.select = Some(value.into_owned()),
                "order" => {
                    for term in value.split(',') {
                        let (column, direction) = term.rsplit_once('.').unwrap_or((term, "asc"));
                        params.order.push((column.to_string(), direction == "desc"));
                    }
                }
                "limit" => {
                    params.limit = Some(
                        value
                            .parse()
                            .map_err(|_| format!("invalid limit: {value}"))?,
                    );
                }
                column => {
                    let filter = Filter::parse(&value)
                        .ok_or_else(|| format!("unsupported filter: {column}={value}"))?;
                    params.filters.push((column.to_string(), filter));
                }
            }
        }
        Ok(params)
    }

    fn matches(&self, row: &Row) -> bool {
        self.filters
            .iter()
            .all(|(column, filter)| filter.matches(row.get(column)))
    }

    fn columns(&self) -> Vec<Column> {
        parse_columns(self.select.as_deref().unwrap_or("*"))
    }
}

// =============================================================================
// HTTP
// =============================================================================

fn router(fake: FakeBackend) -> Router {
    Router::new()
        .route(
            "/rest/v1/{table}",
            get(rest).post(rest).patch(rest).delete(rest),
        )
        .route("/auth/v1/token", post(token))
        .route("/auth/v1/signup", post(signup))
        .route("/auth/v1/logout", post(logout))
        .route("/storage/v1/object/{bucket}", delete(remove_objects))
        .route("/storage/v1/object/{bucket}/{*path}", post(upload))
        .route("/storage/v1/object/public/{bucket}/{*path}", get(public_object))
        .with_state(fake)
}

fn error(status: StatusCode, body: Value) -> Response {
    (status, Json(body)).into_response()
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

impl FakeState {
    /// Record the request and resolve its user.
    fn begin(
        &mut self,
        target: &str,
        method: &Method,
        uri: &Uri,
        headers: &HeaderMap,
    ) -> Result<Option<String>, Response> {
        let token = bearer(headers);
        let user_id = token.and_then(|t| self.access_tokens.get(t).cloned());
        self.requests.push(RecordedRequest {
            method: method.clone(),
            path: uri.path().to_string(),
            query: uri.query().unwrap_or_default().to_string(),
            user_id: user_id.clone(),
        });

        if headers.get("apikey").and_then(|v| v.to_str().ok()) != Some(ANON_KEY) {
            return Err(error(
                StatusCode::UNAUTHORIZED,
                json!({"message": "Invalid API key"}),
            ));
        }
        if user_id.is_none() && token.is_some_and(|t| t != ANON_KEY) {
            return Err(error(
                StatusCode::UNAUTHORIZED,
                json!({"code": "PGRST301", "message": "JWT expired"}),
            ));
        }
        if self.failing.contains(target) {
            return Err(error(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"message": format!("injected failure for {target}")}),
            ));
        }
        Ok(user_id)
    }

    fn issue_session(&mut self, user_id: &str) -> Value {
        self.token_seq += 1;
        let access = format!("access-{}", self.token_seq);
        let refresh = format!("refresh-{}", self.token_seq);
        self.access_tokens
            .insert(access.clone(), user_id.to_string());
        self.refresh_tokens
            .insert(refresh.clone(), user_id.to_string());

        let email = self
            .users
            .iter()
            .find(|u| u.id == user_id)
            .map(|u| u.email.clone());
        json!({
            "access_token": access,
            "token_type": "bearer",
            "expires_in": self.token_lifetime_secs,
            "expires_at": Utc::now().timestamp() + self.token_lifetime_secs,
            "refresh_token": refresh,
            "user": {"id": user_id, "email": email},
        })
    }
}

/// Tables only a signed-in user may write.
const USER_TABLES: &[&str] = &["cart_items", "profiles"];

#[allow(clippy::too_many_lines)]
async fn rest(
    State(fake): State<FakeBackend>,
    method: Method,
    uri: Uri,
    Path(table): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut state = fake.lock();
    let user_id = match state.begin(&table, &method, &uri, &headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };
    if method != Method::GET && user_id.is_none() && USER_TABLES.contains(&table.as_str()) {
        return error(
            StatusCode::UNAUTHORIZED,
            json!({"code": "42501", "message": format!("permission denied for table {table}")}),
        );
    }

    let params = match RestParams::parse(query.as_deref().unwrap_or_default()) {
        Ok(params) => params,
        Err(message) => return error(StatusCode::BAD_REQUEST, json!({"message": message})),
    };
    let prefer = headers
        .get("prefer")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let representation = prefer.contains("return=representation");

    let payload: Value = if body.is_empty() {
        Value::Null
    } else {
        match serde_json::from_slice(&body) {
            Ok(value) => value,
            Err(e) => {
                return error(StatusCode::BAD_REQUEST, json!({"message": e.to_string()}));
            }
        }
    };

    match method {
        Method::GET => Json(state.select(&table, &params)).into_response(),
        Method::POST => {
            let rows: Vec<Row> = match payload {
                Value::Array(items) => items
                    .into_iter()
                    .filter_map(|v| match v {
                        Value::Object(row) => Some(row),
                        _ => None,
                    })
                    .collect(),
                Value::Object(row) => vec![row],
                _ => return error(StatusCode::BAD_REQUEST, json!({"message": "expected rows"})),
            };
            let merge = prefer.contains("resolution=merge-duplicates");

            let mut written = Vec::with_capacity(rows.len());
            for row in rows {
                let existing = merge
                    .then(|| row.get("id").cloned())
                    .flatten()
                    .and_then(|id| {
                        state
                            .tables
                            .get(&table)
                            .and_then(|rows| rows.iter().position(|r| r.get("id") == Some(&id)))
                    });
                if let Some(column) = state.violates_unique(&table, &row, row.get("id")) {
                    return error(
                        StatusCode::CONFLICT,
                        json!({
                            "code": "23505",
                            "message": format!("duplicate key value violates unique constraint \"{table}_{column}_key\""),
                        }),
                    );
                }
                match existing {
                    Some(idx) => {
                        if let Some(target) = state.tables.get_mut(&table).and_then(|t| t.get_mut(idx)) {
                            target.extend(row);
                            written.push(target.clone());
                        }
                    }
                    None => written.push(state.insert_row(&table, row)),
                }
            }

            if representation {
                let columns = params.columns();
                let body: Vec<Value> = written
                    .iter()
                    .map(|row| state.project(&table, row, &columns))
                    .collect();
                (StatusCode::CREATED, Json(body)).into_response()
            } else {
                StatusCode::CREATED.into_response()
            }
        }
        Method::PATCH => {
            let Value::Object(patch) = payload else {
                return error(StatusCode::BAD_REQUEST, json!({"message": "expected an object"}));
            };
            let targets: Vec<Row> = state
                .table(&table)
                .iter()
                .filter(|row| params.matches(row))
                .cloned()
                .collect();
            for target in &targets {
                let mut merged = target.clone();
                merged.extend(patch.clone());
                if let Some(column) = state.violates_unique(&table, &merged, target.get("id")) {
                    return error(
                        StatusCode::CONFLICT,
                        json!({
                            "code": "23505",
                            "message": format!("duplicate key value violates unique constraint \"{table}_{column}_key\""),
                        }),
                    );
                }
            }

            let mut updated = Vec::new();
            if let Some(rows) = state.tables.get_mut(&table) {
                for row in rows.iter_mut().filter(|row| params.matches(row)) {
                    row.extend(patch.clone());
                    updated.push(row.clone());
                }
            }
            if representation {
                let columns = params.columns();
                let body: Vec<Value> = updated
                    .iter()
                    .map(|row| state.project(&table, row, &columns))
                    .collect();
                Json(body).into_response()
            } else {
                StatusCode::NO_CONTENT.into_response()
            }
        }
        Method::DELETE => {
            if let Some(rows) = state.tables.get_mut(&table) {
                rows.retain(|row| !params.matches(row));
            }
            StatusCode::NO_CONTENT.into_response()
        }
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

fn invalid_grant(description: &str) -> Response {
    error(
        StatusCode::BAD_REQUEST,
        json!({"error": "invalid_grant", "error_description": description}),
    )
}

async fn token(
    State(fake): State<FakeBackend>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut state = fake.lock();
    if let Err(response) = state.begin("auth", &method, &uri, &headers) {
        return response;
    }
    let body: Value = serde_json::from_slice(&body).unwrap_or_default();
    let grant_type = url::form_urlencoded::parse(uri.query().unwrap_or_default().as_bytes())
        .find(|(key, _)| key == "grant_type")
        .map(|(_, value)| value.into_owned())
        .unwrap_or_default();

    match grant_type.as_str() {
        "password" => {
            let email = body["email"].as_str().unwrap_or_default().to_lowercase();
            let password = body["password"].as_str().unwrap_or_default();
            let user_id = state
                .users
                .iter()
                .find(|u| u.email == email && u.password == password)
                .map(|u| u.id.clone());
            match user_id {
                Some(id) => Json(state.issue_session(&id)).into_response(),
                None => invalid_grant("Invalid login credentials"),
            }
        }
        "refresh_token" => {
            let refresh = body["refresh_token"].as_str().unwrap_or_default();
            match state.refresh_tokens.remove(refresh) {
                Some(id) => Json(state.issue_session(&id)).into_response(),
                None => invalid_grant("Invalid Refresh Token: Refresh Token Not Found"),
            }
        }
        other => error(
            StatusCode::BAD_REQUEST,
            json!({"error": "unsupported_grant_type", "error_description": format!("unsupported grant type: {other}")}),
        ),
    }
}

async fn signup(
    State(fake): State<FakeBackend>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut state = fake.lock();
    if let Err(response) = state.begin("auth", &method, &uri, &headers) {
        return response;
    }
    let body: Value = serde_json::from_slice(&body).unwrap_or_default();
    let email = body["email"].as_str().unwrap_or_default().to_lowercase();
    let password = body["password"].as_str().unwrap_or_default();

    if password.len() < 6 {
        return error(
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({"code": 422, "msg": "Password should be at least 6 characters"}),
        );
    }
    if state.users.iter().any(|u| u.email == email) {
        return error(
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({"code": 422, "msg": "User already registered"}),
        );
    }

    let id = uuid::Uuid::new_v4().to_string();
    state.users.push(User {
        id: id.clone(),
        email: email.clone(),
        password: password.to_string(),
    });

    // The hosted backend creates the profile row from sign-up metadata
    let mut profile = Row::new();
    profile.insert("id".to_string(), json!(id));
    profile.insert("full_name".to_string(), body["data"]["full_name"].clone());
    profile.insert("phone".to_string(), body["data"]["phone"].clone());
    state.insert_row("profiles", profile);

    if state.confirm_signups {
        Json(json!({"id": id, "email": email})).into_response()
    } else {
        Json(state.issue_session(&id)).into_response()
    }
}

async fn logout(
    State(fake): State<FakeBackend>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let mut state = fake.lock();
    if let Err(response) = state.begin("auth", &method, &uri, &headers) {
        return response;
    }
    if let Some(token) = bearer(&headers) {
        if let Some(user_id) = state.access_tokens.remove(token) {
            state.refresh_tokens.retain(|_, owner| *owner != user_id);
        }
    }
    StatusCode::NO_CONTENT.into_response()
}

fn storage_error(status: StatusCode, error_name: &str, message: &str) -> Response {
    error(
        status,
        json!({"statusCode": status.as_u16().to_string(), "error": error_name, "message": message}),
    )
}

async fn upload(
    State(fake): State<FakeBackend>,
    method: Method,
    uri: Uri,
    Path((bucket, path)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut state = fake.lock();
    let user_id = match state.begin("storage", &method, &uri, &headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };
    if bucket != BUCKET {
        return storage_error(StatusCode::NOT_FOUND, "Bucket not found", "Bucket not found");
    }
    if user_id.is_none() {
        return storage_error(
            StatusCode::FORBIDDEN,
            "Unauthorized",
            "new row violates row-level security policy",
        );
    }
    let upsert = headers
        .get("x-upsert")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == "true");
    if !upsert && state.objects.contains_key(&path) {
        return storage_error(
            StatusCode::BAD_REQUEST,
            "Duplicate",
            "The resource already exists",
        );
    }

    state.objects.insert(path.clone(), body.to_vec());
    Json(json!({"Key": format!("{bucket}/{path}")})).into_response()
}

async fn remove_objects(
    State(fake): State<FakeBackend>,
    method: Method,
    uri: Uri,
    Path(bucket): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut state = fake.lock();
    let user_id = match state.begin("storage", &method, &uri, &headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };
    if bucket != BUCKET {
        return storage_error(StatusCode::NOT_FOUND, "Bucket not found", "Bucket not found");
    }
    if user_id.is_none() {
        return storage_error(
            StatusCode::FORBIDDEN,
            "Unauthorized",
            "new row violates row-level security policy",
        );
    }

    let body: Value = serde_json::from_slice(&body).unwrap_or_default();
    let removed: Vec<Value> = body["prefixes"]
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .filter_map(Value::as_str)
        .filter(|path| state.objects.remove(*path).is_some())
        .map(|path| json!({"name": path, "bucket_id": BUCKET}))
        .collect();
    Json(removed).into_response()
}

async fn public_object(
    State(fake): State<FakeBackend>,
    method: Method,
    uri: Uri,
    Path((bucket, path)): Path<(String, String)>,
) -> Response {
    let mut state = fake.lock();
    // Public objects need no API key
    state.requests.push(RecordedRequest {
        method,
        path: uri.path().to_string(),
        query: uri.query().unwrap_or_default().to_string(),
        user_id: None,
    });

    match state.objects.get(&path) {
        Some(bytes) if bucket == BUCKET => bytes.clone().into_response(),
        _ => storage_error(StatusCode::NOT_FOUND, "not_found", "Object not found"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(row) => row,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_parse_columns_nested() {
        let columns = parse_columns("part_id,quantity,parts(id,name,part_images(image_url))");
        assert_eq!(columns.len(), 3);
        let Some(Column::Embed { relation, columns }) = columns.get(2) else {
            panic!("expected an embed");
        };
        assert_eq!(relation, "parts");
        assert!(matches!(columns.get(2), Some(Column::Embed { relation, .. }) if relation == "part_images"));
    }

    #[test]
    fn test_filters() {
        let params =
            RestParams::parse("is_active=eq.true&name=ilike.*PANDA*&condition=in.(used,new)")
                .unwrap();
        assert!(params.matches(&row(json!({
            "is_active": true, "name": "Panda Mirror", "condition": "used"
        }))));
        assert!(!params.matches(&row(json!({
            "is_active": false, "name": "Panda Mirror", "condition": "used"
        }))));
        assert!(!params.matches(&row(json!({
            "is_active": true, "name": "Punto Mirror", "condition": "used"
        }))));
    }

    #[test]
    fn test_select_orders_limits_and_embeds() {
        let mut state = FakeState::default();
        let category = state.insert_row("categories", row(json!({"name": "Brakes", "slug": "brakes"})));
        for (name, price) in [("Pad", 20), ("Disc", 60), ("Caliper", 90)] {
            state.insert_row(
                "parts",
                row(json!({"name": name, "price": price, "category_id": category["id"]})),
            );
        }

        let params = RestParams::parse("select=name,categories(slug)&order=price.desc&limit=2").unwrap();
        let rows = state.select("parts", &params);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["name"], "Caliper");
        assert_eq!(rows[1]["name"], "Disc");
        assert_eq!(rows[0]["categories"]["slug"], "brakes");
        assert!(rows[0].get("price").is_none());
    }
}
