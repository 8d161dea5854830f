//! Database models, one file per table.

pub mod saved_fixture;
pub mod subscription;
pub mod user;

pub use self::saved_fixture::*;
pub use self::subscription::*;
pub use self::user::*;
