//! # feedline-shared
//!
//! Types shared by every Feedline crate: identifiers, the domain records the
//! hosted tables hold, the realtime change-feed vocabulary and the service
//! traits that the local store and the hosted clients both implement.

pub mod constants;
pub mod display;
pub mod error;
pub mod models;
pub mod realtime;
pub mod service;
pub mod types;

pub use error::{ServiceError, ServiceResult};
