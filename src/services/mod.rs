pub mod feed_cache;
pub mod filter;
pub mod football;
pub mod ics;
pub mod init;
pub mod sync;
