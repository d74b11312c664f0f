//! # feedline-store
//!
//! Local SQLite backend for Feedline.
//!
//! [`Database`] holds the same four tables the hosted data service exposes
//! (`posts`, `profiles`, `likes`, `comments`), a small users table for
//! password sign-in, and a content-addressed blob table that plays the
//! object upload service. Every write is broadcast on an in-process change
//! feed, so the client core behaves the same against this file as against
//! the hosted services. It backs offline development and the test suites.

pub mod blobs;
pub mod comments;
pub mod database;
pub mod likes;
pub mod migrations;
pub mod posts;
pub mod profiles;
pub mod realtime;
pub mod service;
pub mod users;

mod error;

pub use database::Database;
pub use error::StoreError;
