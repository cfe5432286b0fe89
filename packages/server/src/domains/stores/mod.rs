//! Stores domain: tenant-visible store resources, admission of
//! provision/teardown requests, and the rate limiter guarding admission.

pub mod admission;
pub mod models;
pub mod rate_limit;

pub use admission::{AdmissionError, AdmissionService, EnqueueReceipt};
pub use rate_limit::RateLimiter;
