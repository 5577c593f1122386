//! Embedded PostgreSQL helpers for adapter integration tests.
//!
//! Every test receives its own temporary database on a cluster shared by the
//! whole test binary. The schema comes from the crate's embedded migrations,
//! so tests never drift from what the CLI applies with `--migrate`.
//!
//! Set `SKIP_TEST_CLUSTER=1` where the cluster cannot start; suites then
//! print a skip marker instead of failing.

use std::time::Duration;

use pg_embedded_setup_unpriv::{ClusterHandle, TemporaryDatabase};
use user_accounts::outbound::persistence::apply_migrations;

const SHARED_CLUSTER_RETRIES: usize = 5;
const SHARED_CLUSTER_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Returns the process-wide embedded cluster, starting it on first use.
pub fn shared_cluster() -> Result<&'static ClusterHandle, String> {
    let mut attempt = 1;
    loop {
        match pg_embedded_setup_unpriv::test_support::shared_cluster_handle() {
            Ok(handle) => return Ok(handle),
            Err(_) if attempt < SHARED_CLUSTER_RETRIES => {
                std::thread::sleep(SHARED_CLUSTER_RETRY_DELAY);
                attempt += 1;
            }
            Err(error) => return Err(format!("start shared cluster: {error:?}")),
        }
    }
}

/// Creates an empty database on `cluster` and applies every migration.
pub fn migrated_database(cluster: &ClusterHandle) -> Result<TemporaryDatabase, String> {
    let database = cluster
        .create_temporary_database()
        .map_err(|error| format!("create temporary database: {error:?}"))?;
    apply_migrations(database.url()).map_err(|error| error.to_string())?;
    Ok(database)
}

/// Returns true when `SKIP_TEST_CLUSTER` is "1", "true", or "yes".
pub fn should_skip_test_cluster() -> bool {
    std::env::var("SKIP_TEST_CLUSTER")
        .map(|value| matches!(value.to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

/// Skips the caller when the cluster is opted out, and panics otherwise so
/// CI breakage stays visible.
pub fn handle_cluster_setup_failure<T>(reason: impl std::fmt::Display) -> Option<T> {
    if should_skip_test_cluster() {
        eprintln!("SKIP-TEST-CLUSTER: {reason}");
        None
    } else {
        panic!("Test cluster setup failed: {reason}. Set SKIP_TEST_CLUSTER=1 to skip.");
    }
}
