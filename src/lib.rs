//! Recipe Hub client core.
//!
//! Durable client storage, the rating update throttle, session handling for
//! JWT credentials and a typed client for the Recipe Hub REST API.

pub mod api;
pub mod clock;
pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod rating;
pub mod session;
pub mod session_clock;
pub mod state;
pub mod store;
pub mod throttle;

pub use api::ApiClient;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ApiError, RatingError, SessionError, StoreError};
pub use rating::{RatingFlow, RatingOutcome};
pub use session::{Session, SessionManager, User};
pub use session_clock::SessionClock;
pub use state::AppState;
pub use store::{FileStore, KeyValueStore, MemoryStore};
pub use throttle::{Decision, ThrottleConfig, UpdateRecord, UpdateThrottle};
