//! Thin driver: open the database (running recovery if a log exists) and
//! shut it down cleanly.

use granite_bin::Database;
use strata::Config;

fn main() -> std::io::Result<()> {
    let db_path = std::env::var("GRANITE_DB_PATH").unwrap_or("granite.db".to_string());
    let log_path = std::env::var("GRANITE_WAL_PATH").unwrap_or("granite.wal".to_string());

    let db = Database::open(&Config::default(), &db_path, &log_path)?;
    println!("Granite is up: data={db_path} wal={log_path}");
    db.shutdown()
}
