pub mod models;
pub mod repository;
pub mod store;

pub use models::*;
pub use repository::*;
pub use store::{FixtureStore, SqliteFixtureStore, SqliteSubscriptionStore, SubscriptionStore};
