use anyhow::{bail, Result};
use reader_store::Database;

pub async fn run_ping(db: &Database) -> Result<()> {
    if db.ping().await {
        println!("database reachable");
        Ok(())
    } else {
        bail!("database unreachable (see log for details)")
    }
}
