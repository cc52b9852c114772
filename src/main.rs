//! Wallet Copilot API Server
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Client (Frontend)                     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum Web Server                         │
//! │  ┌─────────────────────────────────────────────────────────┐│
//! │  │                      Routes Layer                        ││
//! │  │  /health  /ready  /api/v1/wallet/:address/{summary,analyze}│
//! │  └─────────────────────────────────────────────────────────┘│
//! │  ┌─────────────────────────────────────────────────────────┐│
//! │  │                    Services Layer                        ││
//! │  │  WalletService  StreamingRelay  RpcClient  AlchemyProvider││
//! │  └─────────────────────────────────────────────────────────┘│
//! │  ┌─────────────────────────────────────────────────────────┐│
//! │  │                    Data Layer                            ││
//! │  │  PostgreSQL (snapshot upserts, audit)   Redis (cache)    ││
//! │  └─────────────────────────────────────────────────────────┘│
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │            Alchemy Data API / JSON-RPC      LLM API          │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// 라이브러리에서 가져오기
use wallet_copilot_api::{
    routes,
    services::{AlchemyProvider, CacheStore, ChatCompletionsAgent, RedisStore, RpcClient, WalletService},
    AppState, Config, Database,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 환경변수 로드
    dotenvy::dotenv().ok();

    // 로깅 초기화
    // RUST_LOG=debug,sqlx=warn 형태로 레벨 제어 가능
    // 감사 로그만 보려면 RUST_LOG=audit=info
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "wallet_copilot_api=debug,audit=info,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("🚀 Starting Wallet Copilot API Server");

    // 설정 로드
    let config = Config::from_env()?;
    tracing::info!("📋 Configuration loaded");

    // 데이터베이스 연결
    let db = Arc::new(Database::connect(&config.database_url).await?);
    tracing::info!("🗄️  Database connected");

    // 마이그레이션 실행
    db.run_migrations().await?;
    tracing::info!("📦 Migrations completed");

    // Redis 연결
    let redis = RedisStore::connect(&config.redis_url).await?;
    tracing::info!("🧊 Redis connected");

    // 서비스 초기화
    // HTTP 클라이언트는 하나만 만들어 커넥션 풀 공유
    let http = reqwest::Client::builder()
        .user_agent(concat!("wallet-copilot-api/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let rpc = RpcClient::new(
        http.clone(),
        format!("{}/{}", config.alchemy_rpc_url.trim_end_matches('/'), config.alchemy_api_key),
        config.retry_policy(),
    );
    let provider = AlchemyProvider::new(http.clone(), &config.alchemy_data_url, &config.alchemy_api_key, rpc);
    let wallet_service = WalletService::new(
        Arc::new(provider),
        CacheStore::new(Arc::new(redis)),
        db.clone(),
    );
    tracing::info!("🔗 Wallet service initialized");

    let agent = ChatCompletionsAgent::new(http, &config.ai_base_url, &config.ai_api_key, &config.ai_model);
    tracing::info!(model = %config.ai_model, "🤖 Analysis agent configured");

    // 앱 상태 구성
    let state = AppState {
        wallet_service: Arc::new(wallet_service),
        agent: Arc::new(agent),
        repo: db,
        config: Arc::new(config.clone()),
    };

    // 라우터 구성
    let app = create_app(state);

    // 서버 시작
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("🌐 Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("👋 Server stopped");
    Ok(())
}

/// 라우터 + 미들웨어
fn create_app(state: AppState) -> Router {
    // CORS 설정
    // 프로덕션에서는 특정 도메인만 허용
    // 개발 환경에서는 localhost 허용
    let cors = if state.config.is_production() {
        // 프로덕션: 특정 도메인만 허용 (환경변수로 설정)
        let allowed_origins = std::env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "https://yourdomain.com".to_string());
        let origins: Vec<HeaderValue> = allowed_origins
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET])
            .allow_headers([axum::http::header::CONTENT_TYPE])
    } else {
        // 개발: localhost 허용
        CorsLayer::new()
            .allow_origin([
                HeaderValue::from_static("http://localhost:5173"),  // Vite dev server
                HeaderValue::from_static("http://localhost:3000"),  // Alternative
                HeaderValue::from_static("http://127.0.0.1:5173"),
            ])
            .allow_methods(Any)
            .allow_headers(Any)
    };

    routes::create_router(state)
        // 미들웨어
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Ctrl+C / SIGTERM 수신 시 종료
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
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

    tracing::info!("🛑 Shutdown signal received");
}
