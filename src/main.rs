use anyhow::Context;
use clap::Parser;

mod app;
mod attributes;
mod cli;
mod config;
mod db;
mod error;
mod images;
mod recipes;
mod state;
mod storage;
mod users;

#[cfg(test)]
mod test_utils;

use crate::cli::{Cli, Command};
use crate::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "recipe_api=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let app_state = state::AppState::init().await?;
            let app = app::build_app(app_state);
            app::serve(app).await?;
        }
        Command::CreateSuperuser { email, password } => {
            let config = AppConfig::from_env()?;
            let db = db::connect(&config.database_url).await?;
            let user = users::services::create_superuser(&db, &email, &password)
                .await
                .map_err(|e| anyhow::anyhow!("{e:?}"))
                .context("create superuser")?;
            tracing::info!(user_id = user.id, email = %user.email, "superuser created");
        }
    }

    Ok(())
}
