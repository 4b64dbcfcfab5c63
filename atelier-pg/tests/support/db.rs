use atelier_pg::{DbConfig, PgDataAccess};

pub async fn test_data_access() -> PgDataAccess {
    let config = DbConfig::from_env();
    let access = PgDataAccess::from_config(&config).expect("Failed to create data access");
    access.bootstrap().await.expect("Failed to bootstrap schema");
    access
}

/// Suffix that keeps names and ids from colliding across test runs.
pub fn unique_suffix() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    (nanos % 1_000_000_000_000) as u64
}
