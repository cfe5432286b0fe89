//! Test harness with testcontainers for integration testing.
//!
//! One Postgres container is shared across the whole test run; every test
//! gets its own freshly migrated database inside it, so tests stay
//! parallel-safe while container startup cost is paid once.

use std::sync::Arc;

use anyhow::{Context, Result};
use server_core::domains::stores::AdmissionService;
use server_core::kernel::jobs::ProvisioningWorker;
use server_core::kernel::{ServerKernel, TestDependencies};
use server_core::Config;
use sqlx::PgPool;
use test_context::AsyncTestContext;
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use uuid::Uuid;

// =============================================================================
// Shared Test Infrastructure
// =============================================================================

/// Shared infrastructure that persists across all tests: the container plus
/// an admin connection for creating per-test databases.
struct SharedTestInfra {
    base_url: String,
    admin_pool: PgPool,
    // Keep the container alive for the entire test run
    _postgres: ContainerAsync<Postgres>,
}

/// Global shared infrastructure - initialized once, reused by all tests.
static SHARED_INFRA: OnceCell<SharedTestInfra> = OnceCell::const_new();

impl SharedTestInfra {
    async fn init() -> Result<Self> {
        // Initialize tracing subscriber to respect RUST_LOG.
        // Run tests with: RUST_LOG=debug cargo test -- --nocapture
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let postgres = Postgres::default()
            .start()
            .await
            .context("Failed to start Postgres container")?;

        let host = postgres.get_host().await?;
        let port = postgres.get_host_port_ipv4(5432).await?;
        let base_url = format!("postgres://postgres:postgres@{host}:{port}");

        let admin_pool = PgPool::connect(&format!("{base_url}/postgres"))
            .await
            .context("Failed to connect to Postgres for database creation")?;

        Ok(Self {
            base_url,
            admin_pool,
            _postgres: postgres,
        })
    }

    async fn get() -> &'static Self {
        SHARED_INFRA
            .get_or_init(|| async {
                Self::init()
                    .await
                    .expect("Failed to initialize shared test infrastructure")
            })
            .await
    }
}

// =============================================================================
// Test Harness
// =============================================================================

/// Test harness: an isolated database, mock orchestrator adapters, and the
/// kernel built from them.
///
/// # Example using test-context
///
/// ```ignore
/// #[test_context(TestHarness)]
/// #[tokio::test]
/// async fn my_test(ctx: &TestHarness) {
///     let receipt = ctx.admission().create_store(...).await.unwrap();
///     ctx.worker().run_ready_jobs().await.unwrap();
/// }
/// ```
pub struct TestHarness {
    /// Database pool - use this for test fixtures.
    pub db_pool: PgPool,
    /// Test dependencies for accessing and scripting the mocks.
    pub deps: TestDependencies,
    /// Kernel backed by the mocks.
    pub kernel: Arc<ServerKernel>,
    /// Worker/admission configuration (defaults unless overridden).
    pub config: Arc<Config>,
}

impl TestHarness {
    pub async fn new() -> Result<Self> {
        Self::with_config(Config::default()).await
    }

    /// Create a harness with custom limits (capacity, rate limits, attempts).
    pub async fn with_config(config: Config) -> Result<Self> {
        let infra = SharedTestInfra::get().await;

        // A dedicated database per test keeps the shared worker queue from
        // leaking between concurrently running tests.
        let db_name = format!("test_{}", Uuid::new_v4().simple());
        sqlx::query(&format!(r#"CREATE DATABASE "{db_name}""#))
            .execute(&infra.admin_pool)
            .await
            .context("Failed to create test database")?;

        let db_pool = PgPool::connect(&format!("{}/{db_name}", infra.base_url))
            .await
            .context("Failed to connect to test database")?;

        sqlx::migrate!("./migrations")
            .run(&db_pool)
            .await
            .context("Failed to run migrations")?;

        let deps = TestDependencies::new();
        let kernel = Arc::new(deps.clone().into_kernel(db_pool.clone()));

        Ok(Self {
            db_pool,
            deps,
            kernel,
            config: Arc::new(config),
        })
    }

    /// Admission service wired to this harness's database and config.
    pub fn admission(&self) -> AdmissionService {
        AdmissionService::new(self.db_pool.clone(), &self.config)
    }

    /// Provisioning worker wired to the mock kernel.
    pub fn worker(&self) -> ProvisioningWorker {
        ProvisioningWorker::new(Arc::clone(&self.kernel), Arc::clone(&self.config))
    }
}

impl AsyncTestContext for TestHarness {
    async fn setup() -> Self {
        Self::new().await.expect("Failed to create test harness")
    }

    async fn teardown(self) {
        self.db_pool.close().await;
    }
}
