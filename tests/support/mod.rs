//! In-process fake of the Recipe Hub API, served with axum on a random port.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};

pub const USERNAME: &str = "anna";
pub const PASSWORD: &str = "Secret123";

#[derive(Default)]
pub struct Backend {
    pub access_token: String,
    pub refreshed_token: String,
    pub ratings: Vec<Value>,
    pub next_rating_id: u64,
    pub rating_puts: usize,
    pub throttled: bool,
    pub registrations: Vec<Value>,
}

pub type Shared = Arc<Mutex<Backend>>;

pub fn jwt(exp_secs: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(
        json!({
            "token_type": "access",
            "exp": exp_secs,
            "iat": exp_secs - 900,
            "jti": "abc",
            "user_id": 1,
            "username": USERNAME,
            "is_staff": false,
            "email": "anna@example.com"
        })
        .to_string(),
    );
    format!("{header}.{payload}.sig")
}

pub struct FakeApi {
    pub base_url: String,
    pub backend: Shared,
}

impl FakeApi {
    pub async fn start(access_token: String, refreshed_token: String) -> Self {
        let backend: Shared = Arc::new(Mutex::new(Backend {
            access_token,
            refreshed_token,
            next_rating_id: 100,
            ..Backend::default()
        }));

        let app = Router::new()
            .route("/api/token/", post(login))
            .route("/api/token/refresh/", post(refresh))
            .route("/api/auth/user/", get(current_user))
            .route("/api/auth/registration/", post(register))
            .route("/api/recipes/", get(list_recipes))
            .route(
                "/api/recipes/{recipe}/difficulty-ratings/",
                get(list_ratings).post(create_rating),
            )
            .route(
                "/api/recipes/{recipe}/difficulty-ratings/{rating}/",
                put(update_rating),
            )
            .with_state(backend.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}/api"),
            backend,
        }
    }

    pub fn set_throttled(&self, throttled: bool) {
        self.backend.lock().unwrap().throttled = throttled;
    }

    pub fn rating_puts(&self) -> usize {
        self.backend.lock().unwrap().rating_puts
    }

    pub fn seed_rating(&self, recipe: u64, rating: u8) -> u64 {
        let mut b = self.backend.lock().unwrap();
        let id = b.next_rating_id;
        b.next_rating_id += 1;
        b.ratings.push(rating_json(id, recipe, rating));
        id
    }
}

fn rating_json(id: u64, recipe: u64, rating: u8) -> Value {
    json!({
        "id": id,
        "recipe": recipe,
        "rating": rating,
        "rating_author": {"id": 1, "username": USERNAME, "email": "anna@example.com"},
        "created_at": "2024-11-02T10:15:00Z"
    })
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

fn authorized(b: &Backend, headers: &HeaderMap) -> bool {
    bearer(headers).is_some_and(|t| t == b.access_token || t == b.refreshed_token)
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"detail": "Authentication credentials were not provided."})),
    )
        .into_response()
}

fn throttled() -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({"detail": "Request was throttled."})),
    )
        .into_response()
}

async fn login(State(b): State<Shared>, Json(body): Json<Value>) -> Response {
    let b = b.lock().unwrap();
    if body["username"] != USERNAME || body["password"] != PASSWORD {
        return unauthorized();
    }
    Json(json!({"access": b.access_token, "refresh": "refresh-1"})).into_response()
}

async fn refresh(State(b): State<Shared>, Json(body): Json<Value>) -> Response {
    let b = b.lock().unwrap();
    if body["refresh"] != "refresh-1" {
        return unauthorized();
    }
    Json(json!({"access": b.refreshed_token})).into_response()
}

async fn current_user(State(b): State<Shared>, headers: HeaderMap) -> Response {
    let b = b.lock().unwrap();
    if !authorized(&b, &headers) {
        return unauthorized();
    }
    Json(json!({
        "id": 1,
        "username": USERNAME,
        "email": "anna@example.com",
        "is_staff": false
    }))
    .into_response()
}

async fn register(State(b): State<Shared>, Json(body): Json<Value>) -> Response {
    if body["password1"] != body["password2"] {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"password": "The two password fields didn't match."})),
        )
            .into_response();
    }
    b.lock().unwrap().registrations.push(body);
    (StatusCode::CREATED, Json(json!({}))).into_response()
}

async fn list_recipes() -> Response {
    Json(json!({
        "count": 1,
        "next": null,
        "previous": null,
        "results": [{
            "id": 7,
            "title": "Pizza Margherita",
            "description": "Classic Italian pizza",
            "ingredients": "Dough\nTomatoes",
            "instructions": "Bake",
            "cooking_time": 45,
            "created_at": "2024-11-02T10:15:00Z",
            "updated_at": "2024-11-02T10:15:00Z",
            "author": {"id": 1, "username": USERNAME, "email": "anna@example.com"},
            "comments": [],
            "comment_count": 0,
            "average_difficulty": null,
            "user_rating": null
        }]
    }))
    .into_response()
}

async fn list_ratings(State(b): State<Shared>, Path(recipe): Path<u64>) -> Response {
    let b = b.lock().unwrap();
    let ratings: Vec<Value> = b
        .ratings
        .iter()
        .filter(|r| r["recipe"] == recipe)
        .cloned()
        .collect();
    Json(Value::Array(ratings)).into_response()
}

async fn create_rating(
    State(b): State<Shared>,
    Path(recipe): Path<u64>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut b = b.lock().unwrap();
    if !authorized(&b, &headers) {
        return unauthorized();
    }
    if b.throttled {
        return throttled();
    }
    let id = b.next_rating_id;
    b.next_rating_id += 1;
    let rating = body["rating"].as_u64().unwrap_or(0) as u8;
    let value = rating_json(id, recipe, rating);
    b.ratings.push(value.clone());
    (StatusCode::CREATED, Json(value)).into_response()
}

async fn update_rating(
    State(b): State<Shared>,
    Path((recipe, rating_id)): Path<(u64, u64)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut b = b.lock().unwrap();
    if !authorized(&b, &headers) {
        return unauthorized();
    }
    if b.throttled {
        return throttled();
    }
    b.rating_puts += 1;
    let rating = body["rating"].as_u64().unwrap_or(0) as u8;
    let value = rating_json(rating_id, recipe, rating);
    if let Some(slot) = b.ratings.iter_mut().find(|r| r["id"] == rating_id) {
        *slot = value.clone();
    }
    Json(value).into_response()
}
