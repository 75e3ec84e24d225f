//! Gophermart 积分服务
//!
//! 提供用户、订单、余额 REST API，并在后台与积分系统对账。

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use gophermart::{
    MIGRATOR,
    accrual::HttpAccrualClient,
    auth::JwtManager,
    repository::{PgStore, Store},
    routes,
    shutdown,
    state::AppState,
    worker::{Reconciler, ReconcilerConfig},
};
use gophermart_shared::{
    config::{AppConfig, Cli},
    database::Database,
    observability,
    retry::RetryPolicy,
};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(&cli).context("加载配置失败")?;

    let _guard = observability::init(&config.observability).await?;

    info!("Starting gophermart on {}", config.listen_addr());

    if config.jwt.secret == gophermart_shared::config::JwtSettings::default().secret {
        warn!("Using default JWT secret - set JWT_SECRET for production");
    }

    // 初始化基础设施
    let db = Database::connect_with_retry(
        config.database_uri(),
        &config.database,
        &RetryPolicy::startup(),
    )
    .await?;
    db.run_migrations(&MIGRATOR).await?;

    let store: Arc<dyn Store> = Arc::new(PgStore::new(db.pool().clone()));
    let state = AppState::new(store.clone(), JwtManager::new(config.jwt.clone().into()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // 收到 SIGTERM 或 Ctrl+C 后同时通知 HTTP 服务与 Worker
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let mut handles = Vec::new();

    // 启动订单对账 Worker；未配置积分系统地址时只提供 API
    match config.accrual_system_address.as_deref() {
        Some(address) if !address.is_empty() => {
            let client = HttpAccrualClient::new(
                address,
                Duration::from_secs(config.reconciler.scorer_timeout_secs),
            )?;
            info!("Accrual system at {}", client.base_url());

            let reconciler = Reconciler::new(
                store.clone(),
                Arc::new(client),
                ReconcilerConfig::from(&config.reconciler),
            );
            handles.push(tokio::spawn(reconciler.run(shutdown_rx.clone())));
        }
        _ => warn!("ACCRUAL_SYSTEM_ADDRESS not set - order reconciliation disabled"),
    }

    let app = routes::build_router(
        state,
        Duration::from_secs(config.server.request_timeout_secs),
    );

    let listener = TcpListener::bind(config.listen_addr()).await?;
    info!("Listening on {}", config.listen_addr());

    // 优雅关闭：停止接收新连接并等待已有请求处理完毕
    let mut http_shutdown = shutdown_rx.clone();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = http_shutdown.wait_for(|stop| *stop).await;
            })
            .await
    });

    let mut stop = shutdown_rx;
    tokio::select! {
        result = &mut server => {
            // 未收到关闭信号时服务退出视为故障
            result.context("HTTP 服务任务异常退出")??;
            return Err(anyhow::anyhow!("HTTP 服务意外退出"));
        }
        _ = stop.wait_for(|stop| *stop) => {}
    }

    // HTTP 在途请求与在途积分查询共用一个宽限期
    let grace = Duration::from_secs(config.server.shutdown_grace_secs);
    handles.push(tokio::spawn(async move {
        match server.await {
            Ok(Err(e)) => error!(error = %e, "HTTP 服务关闭出错"),
            Err(e) => error!(error = %e, "HTTP 服务任务异常退出"),
            Ok(Ok(())) => {}
        }
    }));

    if !shutdown::join_all_within(grace, handles).await {
        warn!("Shutdown did not finish within {:?}", grace);
        return Ok(());
    }

    db.close().await;
    info!("Server shutdown complete");

    Ok(())
}

/// 监听关闭信号
///
/// 收到 SIGTERM 或 Ctrl+C 后返回。
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "注册 Ctrl+C 处理器失败");
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
                warn!(error = %e, "注册 SIGTERM 处理器失败");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
    }
}
