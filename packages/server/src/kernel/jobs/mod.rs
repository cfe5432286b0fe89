//! Job infrastructure for asynchronous store provisioning.
//!
//! This module provides the kernel-level job engine:
//! - [`ProvisioningJob`] - durable job model with lease-based dispatch
//! - [`ProvisioningWorker`] - long-running service that recovers stale
//!   leases, leases QUEUED jobs under row locks, and drives them through the
//!   orchestrator adapters
//!
//! # Architecture
//!
//! ```text
//! ProvisioningWorker
//!     │
//!     ├─► startup: requeue stale IN_PROGRESS leases
//!     ├─► poll DB (lease oldest QUEUED job, FOR UPDATE SKIP LOCKED)
//!     ├─► spawn worker task per job (bounded by max_concurrency)
//!     │       └─► provision / teardown via helm + kubectl + readiness probe
//!     └─► commit outcome (SUCCEEDED / retry requeue / FAILED)
//! ```
//!
//! The database is the queue of record: multiple worker processes can share
//! it safely because dispatch relies on per-row locks, not coordination.

mod job;
mod worker;

pub use job::{JobAction, JobStatus, ProvisioningJob};
pub use worker::ProvisioningWorker;
