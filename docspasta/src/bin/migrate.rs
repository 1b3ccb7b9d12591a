//! Runs pending SQLx migrations against `DATABASE_URL`. A Docker entrypoint
//! step before starting the server, same role as the teacher's
//! `run_migrations.rs`.

use sqlx::postgres::PgPoolOptions;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    println!("running migrations against {database_url}");

    let pool = PgPoolOptions::new().max_connections(2).connect(&database_url).await?;
    sqlx::migrate!("../migrations").run(&pool).await?;

    println!("migrations complete");
    Ok(())
}
