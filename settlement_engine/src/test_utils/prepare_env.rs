use log::*;
use sqlx::{migrate, migrate::MigrateDatabase, Sqlite};

use crate::SqliteDatabase;

/// Creates a fresh, migrated SQLite database at `url` and initialises logging for the test run.
pub async fn prepare_test_env(url: &str) {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    debug!("🗃️ Preparing test database at {url}");
    create_database(url).await;
    run_migrations(url).await;
}

/// A database URL in the system temp directory that no other test is using.
pub fn random_db_path() -> String {
    let path = std::env::temp_dir().join(format!("lms_test_store_{}.db", rand::random::<u64>()));
    format!("sqlite://{}", path.display())
}

pub async fn run_migrations(url: &str) {
    let db = SqliteDatabase::new_with_url(url, 2).await.expect("Could not connect to the test database");
    migrate!("./src/db/sqlite/migrations").run(db.pool()).await.expect("Could not run the database migrations");
    trace!("🗃️ Migrations complete for {url}");
}

pub async fn create_database(url: &str) {
    if Sqlite::database_exists(url).await.unwrap_or(false) {
        if let Err(e) = Sqlite::drop_database(url).await {
            warn!("🗃️ Could not drop the stale test database {url}: {e:?}");
        }
    }
    Sqlite::create_database(url).await.expect("Could not create the test database");
    trace!("🗃️ Created test database {url}");
}

/// Deletes the test database file. Errors are ignored, since the file lives in the temp directory anyway.
pub async fn drop_database(url: &str) {
    let _ = Sqlite::drop_database(url).await;
}
