//! Thin client for the recipe REST API.
//!
//! Public reads go out without credentials. Protected calls attach the access
//! token currently in the store, read at call time so a login or logout in
//! another process is picked up.

use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::metrics::{API_LATENCY, API_REQUESTS, SERVER_THROTTLED};
use crate::models::{
    AccessToken, AccountInfo, Comment, CommentBody, Credentials, DifficultyRating, Paginated,
    RatingBody, Recipe, RecipeInput, RefreshRequest, Registration, TokenPair,
};
use crate::store::{ACCESS_TOKEN_KEY, KeyValueStore};

pub const DEFAULT_API_URL: &str = "http://localhost:8000/api";

#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    store: Arc<dyn KeyValueStore>,
}

impl ApiClient {
    pub fn new(base_url: &str, store: Arc<dyn KeyValueStore>) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Self::with_client(client, base_url, store)
    }

    pub fn with_client(
        client: reqwest::Client,
        base_url: &str,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self, ApiError> {
        let base_url = base_url.trim().trim_end_matches('/');
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ApiError::Url(base_url.to_string()));
        }
        Ok(Self {
            client,
            base_url: base_url.to_string(),
            store,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn recipes(&self) -> RecipeService<'_> {
        RecipeService { api: self }
    }

    pub fn comments(&self) -> CommentService<'_> {
        CommentService { api: self }
    }

    pub fn auth(&self) -> AuthService<'_> {
        AuthService { api: self }
    }

    pub fn ratings(&self) -> RatingService<'_> {
        RatingService { api: self }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn public(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        self.client.request(method, self.url(path))
    }

    fn authed(&self, method: reqwest::Method, path: &str) -> Result<RequestBuilder, ApiError> {
        let builder = self.public(method, path);
        Ok(match self.store.get(ACCESS_TOKEN_KEY)? {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        })
    }

    async fn execute(&self, builder: RequestBuilder) -> Result<Response, ApiError> {
        let start = Instant::now();
        let result = builder.send().await;
        API_LATENCY.observe(start.elapsed().as_secs_f64());

        let res = match result {
            Ok(res) => res,
            Err(e) => {
                API_REQUESTS.with_label_values(&["transport_error"]).inc();
                return Err(e.into());
            }
        };

        let status = res.status();
        debug!(url = %res.url(), status = status.as_u16(), "api response");

        if status == StatusCode::TOO_MANY_REQUESTS {
            API_REQUESTS.with_label_values(&["throttled"]).inc();
            SERVER_THROTTLED.inc();
            warn!(url = %res.url(), "server throttled request");
            return Err(ApiError::RateLimited);
        }
        if status == StatusCode::UNAUTHORIZED {
            API_REQUESTS.with_label_values(&["unauthorized"]).inc();
            return Err(ApiError::Unauthorized);
        }
        if !status.is_success() {
            API_REQUESTS.with_label_values(&["error"]).inc();
            let body = res.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                detail: error_detail(&body),
            });
        }

        API_REQUESTS.with_label_values(&["ok"]).inc();
        Ok(res)
    }

    async fn json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let res = self.execute(builder).await?;
        Ok(res.json::<T>().await?)
    }

    async fn empty(&self, builder: RequestBuilder) -> Result<(), ApiError> {
        self.execute(builder).await?;
        Ok(())
    }

    async fn get_public<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.json(self.public(reqwest::Method::GET, path)).await
    }

    async fn post_public<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.json(self.public(reqwest::Method::POST, path).json(body))
            .await
    }

    async fn send_authed<B: Serialize, T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.json(self.authed(method, path)?.json(body)).await
    }

    async fn delete_authed(&self, path: &str) -> Result<(), ApiError> {
        self.empty(self.authed(reqwest::Method::DELETE, path)?)
            .await
    }
}

// DRF errors come as {"detail": "..."}, field maps, or plain text
fn error_detail(body: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::Object(map)) => {
            if let Some(serde_json::Value::String(detail)) = map.get("detail") {
                return detail.clone();
            }
            serde_json::Value::Object(map).to_string()
        }
        Ok(other) => other.to_string(),
        Err(_) => body.trim().to_string(),
    }
}

pub struct RecipeService<'a> {
    api: &'a ApiClient,
}

impl RecipeService<'_> {
    pub async fn list(&self, page: u32) -> Result<Paginated<Recipe>, ApiError> {
        self.api
            .get_public(&format!("recipes/?page={}", page.max(1)))
            .await
    }

    pub async fn get(&self, id: u64) -> Result<Recipe, ApiError> {
        self.api.get_public(&format!("recipes/{id}/")).await
    }

    pub async fn create(&self, recipe: &RecipeInput) -> Result<Recipe, ApiError> {
        self.api
            .send_authed(reqwest::Method::POST, "recipes/", recipe)
            .await
    }

    pub async fn update(&self, id: u64, recipe: &RecipeInput) -> Result<Recipe, ApiError> {
        self.api
            .send_authed(reqwest::Method::PUT, &format!("recipes/{id}/"), recipe)
            .await
    }

    pub async fn delete(&self, id: u64) -> Result<(), ApiError> {
        self.api.delete_authed(&format!("recipes/{id}/")).await
    }
}

pub struct CommentService<'a> {
    api: &'a ApiClient,
}

impl CommentService<'_> {
    pub async fn create(&self, recipe_id: u64, content: &str) -> Result<Comment, ApiError> {
        let body = CommentBody {
            content: content.to_string(),
        };
        self.api
            .send_authed(
                reqwest::Method::POST,
                &format!("recipes/{recipe_id}/comments/"),
                &body,
            )
            .await
    }

    pub async fn update(
        &self,
        recipe_id: u64,
        comment_id: u64,
        content: &str,
    ) -> Result<Comment, ApiError> {
        let body = CommentBody {
            content: content.to_string(),
        };
        self.api
            .send_authed(
                reqwest::Method::PUT,
                &format!("recipes/{recipe_id}/comments/{comment_id}/"),
                &body,
            )
            .await
    }

    pub async fn delete(&self, recipe_id: u64, comment_id: u64) -> Result<(), ApiError> {
        self.api
            .delete_authed(&format!("recipes/{recipe_id}/comments/{comment_id}/"))
            .await
    }
}

pub struct AuthService<'a> {
    api: &'a ApiClient,
}

impl AuthService<'_> {
    pub async fn login(&self, username: &str, password: &str) -> Result<TokenPair, ApiError> {
        self.api
            .post_public("token/", &Credentials { username, password })
            .await
    }

    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password1: &str,
        password2: &str,
    ) -> Result<(), ApiError> {
        let body = Registration {
            username,
            email,
            password1,
            password2,
        };
        self.api
            .empty(
                self.api
                    .public(reqwest::Method::POST, "auth/registration/")
                    .json(&body),
            )
            .await
    }

    pub async fn refresh(&self, refresh: &str) -> Result<AccessToken, ApiError> {
        self.api
            .post_public("token/refresh/", &RefreshRequest { refresh })
            .await
    }

    // Uses the given token rather than the stored one
    pub async fn current_user(&self, token: &str) -> Result<AccountInfo, ApiError> {
        self.api
            .json(
                self.api
                    .public(reqwest::Method::GET, "auth/user/")
                    .bearer_auth(token),
            )
            .await
    }
}

pub struct RatingService<'a> {
    api: &'a ApiClient,
}

impl RatingService<'_> {
    pub async fn list(&self, recipe_id: u64) -> Result<Vec<DifficultyRating>, ApiError> {
        self.api
            .get_public(&format!("recipes/{recipe_id}/difficulty-ratings/"))
            .await
    }

    pub async fn create(&self, recipe_id: u64, rating: u8) -> Result<DifficultyRating, ApiError> {
        self.api
            .send_authed(
                reqwest::Method::POST,
                &format!("recipes/{recipe_id}/difficulty-ratings/"),
                &RatingBody { rating },
            )
            .await
    }

    pub async fn update(
        &self,
        recipe_id: u64,
        rating_id: u64,
        rating: u8,
    ) -> Result<DifficultyRating, ApiError> {
        self.api
            .send_authed(
                reqwest::Method::PUT,
                &format!("recipes/{recipe_id}/difficulty-ratings/{rating_id}/"),
                &RatingBody { rating },
            )
            .await
    }

    pub async fn delete(&self, recipe_id: u64, rating_id: u64) -> Result<(), ApiError> {
        self.api
            .delete_authed(&format!(
                "recipes/{recipe_id}/difficulty-ratings/{rating_id}/"
            ))
            .await
    }
}
