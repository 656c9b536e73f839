use std::sync::Arc;

use crate::api::ApiClient;
use crate::clock::Clock;
use crate::error::{ApiError, RatingError};
use crate::rating::{RatingFlow, RatingOutcome};
use crate::session::SessionManager;
use crate::store::KeyValueStore;
use crate::throttle::{ThrottleConfig, UpdateThrottle};

// client's owned state, built once per run and passed to whatever needs it
pub struct AppState {
    pub store: Arc<dyn KeyValueStore>,
    pub clock: Arc<dyn Clock>,
    pub api: ApiClient,
    pub throttle: Arc<UpdateThrottle>,
    pub session: SessionManager,
    ratings: RatingFlow,
}

impl AppState {
    pub fn new(
        api_url: &str,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        throttle: ThrottleConfig,
    ) -> Result<Self, ApiError> {
        let api = ApiClient::new(api_url, store.clone())?;
        Ok(Self::with_api(api, store, clock, throttle))
    }

    pub fn with_api(
        api: ApiClient,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        throttle: ThrottleConfig,
    ) -> Self {
        let throttle = Arc::new(UpdateThrottle::new(store.clone(), clock.clone(), throttle));
        let session = SessionManager::new(store.clone(), api.clone(), clock.clone());
        let ratings = RatingFlow::new(api.clone(), throttle.clone());
        Self {
            store,
            clock,
            api,
            throttle,
            session,
            ratings,
        }
    }

    // Restore credentials, dropping them if the token has already lapsed
    pub async fn init(&mut self) {
        self.session.restore().await;
        self.session.expire_if_needed();
    }

    pub async fn rate(&mut self, recipe_id: u64, rating: u8) -> Result<RatingOutcome, RatingError> {
        self.session.expire_if_needed();
        self.ratings
            .submit(self.session.user(), recipe_id, rating)
            .await
    }
}
