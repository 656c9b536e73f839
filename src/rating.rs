use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::api::ApiClient;
use crate::error::RatingError;
use crate::models::DifficultyRating;
use crate::session::User;
use crate::throttle::{Decision, UpdateThrottle};

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

#[derive(Debug, Clone, PartialEq)]
pub enum RatingOutcome {
    // First rating for the recipe; never throttled
    Created(DifficultyRating),
    // Existing rating changed. `advisory` is what the next update will face
    Updated {
        rating: DifficultyRating,
        advisory: Decision,
    },
    // Refused locally, nothing was sent
    Blocked { seconds_remaining: u64 },
}

impl RatingOutcome {
    pub fn message(&self) -> Option<String> {
        match self {
            RatingOutcome::Created(_) => None,
            RatingOutcome::Updated { advisory, .. } => advisory.message(),
            RatingOutcome::Blocked { seconds_remaining } => Decision::Block {
                seconds_remaining: *seconds_remaining,
            }
            .message(),
        }
    }
}

/// Submits difficulty ratings, consulting the update throttle before any
/// change to an existing rating.
pub struct RatingFlow {
    api: ApiClient,
    throttle: Arc<UpdateThrottle>,
    // (username, recipe) -> rating id
    known: HashMap<(String, u64), u64>,
}

impl RatingFlow {
    pub fn new(api: ApiClient, throttle: Arc<UpdateThrottle>) -> Self {
        Self {
            api,
            throttle,
            known: HashMap::new(),
        }
    }

    pub async fn submit(
        &mut self,
        user: Option<&User>,
        recipe_id: u64,
        rating: u8,
    ) -> Result<RatingOutcome, RatingError> {
        if !(MIN_RATING..=MAX_RATING).contains(&rating) {
            return Err(RatingError::OutOfRange(rating));
        }
        let user = user.ok_or(RatingError::NotAuthenticated)?;

        match self.existing_rating(&user.username, recipe_id).await? {
            Some(rating_id) => {
                if let Decision::Block { seconds_remaining } =
                    self.throttle.evaluate(recipe_id, false)
                {
                    info!(recipe_id, seconds_remaining, "rating update blocked locally");
                    return Ok(RatingOutcome::Blocked { seconds_remaining });
                }

                let updated = self
                    .api
                    .ratings()
                    .update(recipe_id, rating_id, rating)
                    .await?;
                let advisory = self.throttle.record_and_evaluate(recipe_id);
                debug!(recipe_id, rating, "rating updated");
                Ok(RatingOutcome::Updated {
                    rating: updated,
                    advisory,
                })
            }
            None => {
                let created = self.api.ratings().create(recipe_id, rating).await?;
                self.known
                    .insert((user.username.clone(), recipe_id), created.id);
                debug!(recipe_id, rating, "rating created");
                Ok(RatingOutcome::Created(created))
            }
        }
    }

    pub async fn existing_rating(
        &mut self,
        username: &str,
        recipe_id: u64,
    ) -> Result<Option<u64>, RatingError> {
        let key = (username.to_string(), recipe_id);
        if let Some(id) = self.known.get(&key) {
            return Ok(Some(*id));
        }

        let found = self
            .api
            .ratings()
            .list(recipe_id)
            .await?
            .into_iter()
            .find(|r| r.rating_author.username == username)
            .map(|r| r.id);
        if let Some(id) = found {
            self.known.insert(key, id);
        }
        Ok(found)
    }
}
