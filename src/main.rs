//! anvil-console 主入口

use anvil_console::{
    adapters::AdapterRegistry,
    config::{AppConfig, StoreBackend},
    db,
    handlers::health,
    middleware::AppState,
    remote::{AnvilApi, AnvilClient},
    repository::{MemoryStore, PgStore, Store},
    routes, telemetry,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 {
        match args[1].as_str() {
            "--version" => {
                println!("anvil-console {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" => {
                print_help();
                return Ok(());
            }
            other => {
                eprintln!("未知参数: {}", other);
                print_help();
                std::process::exit(1);
            }
        }
    }

    // 开发环境从 .env 文件加载，生产环境直接设置环境变量
    dotenv::from_filename(".env.local").ok();
    dotenv::dotenv().ok();

    health::set_start_time();

    // 1. 配置
    let config = AppConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        anyhow::anyhow!("Failed to load configuration: {}", e)
    })?;

    // 2. 日志
    telemetry::init_telemetry(&config);

    // 3. 本地存储
    let store: Arc<dyn Store> = match config.database.backend {
        StoreBackend::Postgres => {
            let pool = db::create_pool(&config.database).await?;
            db::run_migrations(&pool).await?;
            Arc::new(PgStore::new(pool))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory entity store; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    // 4. 远端客户端与工作区类型
    let api: Arc<dyn AnvilApi> = Arc::new(AnvilClient::new(&config.remote)?);
    let adapters = Arc::new(AdapterRegistry::from_config(&config.adapters)?);
    tracing::info!(
        workspace_types = ?adapters.registered_names().keys().collect::<Vec<_>>(),
        "Workspace adapters registered"
    );

    // 5. 路由
    let state = Arc::new(AppState::new(config.clone(), store, api, adapters));
    let app = routes::create_router(state);

    // 6. 启动
    let listener = TcpListener::bind(&config.server.addr).await?;
    tracing::info!(addr = %config.server.addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(config.server.graceful_shutdown_timeout_secs))
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// 收到信号后开始优雅关闭，超时后强制退出
async fn shutdown_signal(timeout_secs: u64) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Ctrl+C received, starting graceful shutdown"),
        _ = terminate => tracing::info!("Terminate signal received, starting graceful shutdown"),
    }

    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_secs(timeout_secs)).await;
        tracing::warn!("Graceful shutdown timeout reached, forcing exit");
        std::process::exit(1);
    });
}

fn print_help() {
    println!("anvil-console {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("用法: anvil-console [选项]");
    println!();
    println!("选项:");
    println!("  --version     打印版本信息并退出");
    println!("  --help        打印此帮助信息并退出");
    println!();
    println!("环境变量:");
    println!("  配置项使用 ANVIL_ 前缀，例如 ANVIL_REMOTE__ACCESS_TOKEN");
    println!("  也可以在工作目录放置 anvil-console.toml");
}
