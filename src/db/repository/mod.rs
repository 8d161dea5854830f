pub mod saved_fixture;
pub mod subscription;
pub mod user;

pub use saved_fixture::SavedFixtureRepository;
pub use subscription::SubscriptionRepository;
pub use user::UserRepository;
