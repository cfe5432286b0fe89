// Kernel - core infrastructure with dependency injection
//
// The ServerKernel holds all server dependencies (database, orchestrator
// adapters) and provides dependency injection through traits for testability.
//
// IMPORTANT: Kernel is for INFRASTRUCTURE only, not business logic.
// Business logic belongs in domain layers.

pub mod error;
pub mod helm_client;
pub mod jobs;
pub mod kube_client;
mod process;
pub mod readiness;
pub mod server_kernel;
pub mod test_dependencies;
pub mod traits;

pub use error::{CommandError, ReadinessError};
pub use helm_client::HelmClient;
pub use kube_client::KubeClient;
pub use readiness::ReadinessProbe;
pub use server_kernel::ServerKernel;
pub use test_dependencies::{
    MockHelmClient, MockKubeClient, MockReadinessProbe, TestDependencies,
};
pub use traits::*;
