use tracing_subscriber::EnvFilter;

use userhub::{app, config::AppConfig, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env()?;
    init_tracing(&config);

    tracing::info!(env = ?config.app_env, storage = ?config.storage, "starting userhub");

    let state = AppState::init(&config).await?;
    let app = app::build_app(state);

    app::serve(app, config.addr()?).await
}

fn init_tracing(config: &AppConfig) {
    let default_level = if config.app_env.is_production() && !config.log_debug {
        "info"
    } else {
        "debug"
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "userhub={default_level},axum=info,tower_http=info,sqlx=warn"
        ))
    });

    if config.app_env.is_production() {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }
}
