mod albums;
mod app;
mod auth;
mod cart;
mod coins;
mod config;
mod error;
mod extract;
mod photos;
mod slips;
mod social;
mod state;
mod storage;
mod tags;
mod uploads;

#[cfg(test)]
mod test_support;

use anyhow::Context;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "photomart=debug,axum=info,tower_http=info".to_string());
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

    let app_state = state::AppState::init().await?;

    sqlx::migrate!("./migrations")
        .run(&app_state.db)
        .await
        .context("run migrations")?;

    let _sweeper = auth::session::spawn_expiry_sweeper(app_state.db.clone());

    app::serve(app::build_app(app_state)).await
}
