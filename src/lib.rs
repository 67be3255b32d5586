//! Counter consistency core for a social content backend.
//!
//! Posts and comments carry denormalized `likes_count`, `comments_count` and
//! `reposts_count` columns. Likes are adjusted inside the write transaction;
//! comment and repost counts are either adjusted the same way or accumulated
//! in a shared buffer after commit and drained by a lock-guarded
//! reconciliation job.

pub mod buffer;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod hooks;
pub mod policy;
pub mod reconcile;
pub mod repository;
pub mod tx;
pub mod use_cases;
