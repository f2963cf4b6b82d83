use simple_blog_deploy::config::config_path_from_env;
use simple_blog_deploy::logging::setup_logging;
use simple_blog_deploy::{AppState, api, load_config};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let config_path = config_path_from_env();
    let config = match load_config(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let _log_guard = match setup_logging(&config.log) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to set up logging: {}", e);
            std::process::exit(1);
        }
    };
    info!("Using config at {:?}", config_path);
    info!(
        "Deploying {} site from {:?} to {:?}",
        config.blog_app,
        config.repo_dir,
        config.deploy_target()
    );

    let bind_address = config.bind_address();
    let state = Arc::new(AppState::new(config));

    // The first deploy must succeed before any webhook is accepted.
    if let Err(e) = state.startup().await {
        error!("Initial deploy failed: {}", e);
        std::process::exit(1);
    }

    let app = api::router(state.clone());
    let listener = match tokio::net::TcpListener::bind(bind_address).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", bind_address, e);
            std::process::exit(1);
        }
    };
    info!(
        "Listening on {} (POST {})",
        bind_address, state.config.listen_url_path
    );

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
    info!("Shut down");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received, shutting down...");
}
