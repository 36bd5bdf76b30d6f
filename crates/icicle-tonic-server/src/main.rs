use clap::Parser;
use icicle::SystemClock;
use icicle_coord::{Coordinator, MemoryCoordination};
use icicle_tonic_core::proto::snowflake_rpc_server::SnowflakeRpcServer;
use icicle_tonic_server::server::{
    config::{CliArgs, ServerConfig},
    registry,
    service::SnowflakeService,
    telemetry::init_telemetry,
};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::task::JoinSet;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    init_telemetry();

    tracing::info!("icicle service start");
    run(config).await?;
    tracing::info!("icicle service stop");
    Ok(())
}

async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let coordination = MemoryCoordination::new();
    let (session, mut session_events) = coordination.connect(config.session_timeout);
    tokio::spawn(async move {
        while let Some(event) = session_events.recv().await {
            tracing::info!(?event, "coordination session event");
        }
    });

    let clock = SystemClock;
    let registration = registry::register(session.as_ref(), &config, &clock).await?;
    tracing::info!(claimed = ?registration.claimed, "registration complete");

    let service = SnowflakeService::new(&registration.claimed, config.datacenter_id, clock)?;

    let shutdown = CancellationToken::new();
    let mut serves = JoinSet::new();
    for bind in &config.rpc_bind {
        let listener = TcpListener::bind(bind).await?;
        tracing::info!(addr = %bind, "rpc listening");
        let incoming = TcpListenerStream::new(listener);
        let svc = SnowflakeRpcServer::new(service.clone());
        let token = shutdown.clone();
        serves.spawn(async move {
            Server::builder()
                .add_service(svc)
                .serve_with_incoming_shutdown(incoming, token.cancelled_owned())
                .await
        });
    }

    shutdown_signal().await;
    tracing::info!("shutdown signal received, terminating gracefully");

    // Close the session first: the claims vanish for peers immediately, then
    // the listeners drain.
    session.close().await;
    shutdown.cancel();
    while let Some(serve) = serves.join_next().await {
        serve??;
    }
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received ctrl-c");
        },
        () = terminate => {
            tracing::info!("received SIGTERM");
        },
    }
}
