use std::env;

use anyhow::{bail, Context, Result};
use diesel::prelude::*;
use uuid::Uuid;

use lumindoc::{
    auth::password::hash_password,
    config::AppConfig,
    db,
    documents::set_summary_status,
    init_tracing,
    jobs::enqueue_summarize_document,
    models::{Document, NewUser, SummaryStatus},
    schema::{documents, users},
};

const USAGE: &str = "Usage:\n  maintenance create-user <username> <password> [role]\n  maintenance resummarize-failed";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let mut args = env::args().skip(1);
    match args.next().as_deref() {
        Some("create-user") => {
            let username = args.next().context(USAGE)?;
            let password = args.next().context(USAGE)?;
            let role = args.next().unwrap_or_else(|| "user".to_string());
            create_user(&username, &password, &role)?;
        }
        Some("resummarize-failed") => resummarize_failed()?,
        Some(cmd) => {
            eprintln!("Unknown command: {cmd}\n{USAGE}");
            std::process::exit(1);
        }
        None => {
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    }

    Ok(())
}

fn connect() -> Result<db::PgPool> {
    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "maintenance",
        database_url = %config.redacted_database_url(),
        "loaded configuration"
    );
    let pool = db::init_pool(&config.database_url)?;
    db::run_migrations(&pool)?;
    Ok(pool)
}

fn create_user(username: &str, password: &str, role: &str) -> Result<()> {
    let username = username.trim();
    if username.is_empty() {
        bail!("username must not be empty");
    }
    if password.len() < 8 {
        bail!("password must be at least 8 characters");
    }

    let pool = connect()?;
    let mut conn = pool.get().context("failed to get database connection")?;

    let new_user = NewUser {
        id: Uuid::new_v4(),
        username: username.to_string(),
        password_hash: hash_password(password)?,
        role: role.to_string(),
    };

    diesel::insert_into(users::table)
        .values(&new_user)
        .execute(&mut conn)
        .with_context(|| format!("failed to create user {username}"))?;

    println!("Created user {username} ({})", new_user.id);
    Ok(())
}

fn resummarize_failed() -> Result<()> {
    let pool = connect()?;
    let mut conn = pool.get().context("failed to get database connection")?;

    let failed: Vec<Document> = documents::table
        .filter(documents::summary_status.eq(SummaryStatus::Error.as_str()))
        .load(&mut conn)
        .context("failed to load failed documents")?;

    if failed.is_empty() {
        println!("No failed summaries found.");
        return Ok(());
    }

    println!("Requeueing {} documents…", failed.len());

    let mut requeued = 0usize;
    for document in &failed {
        let result = conn.transaction::<_, anyhow::Error, _>(|conn| {
            set_summary_status(conn, document, SummaryStatus::Pending, None)?;
            enqueue_summarize_document(conn, document.id)?;
            Ok(())
        });
        match result {
            Ok(()) => requeued += 1,
            Err(err) => eprintln!("Failed to requeue document {}: {err}", document.id),
        }
    }

    println!("Requeued {requeued} documents.");
    Ok(())
}
