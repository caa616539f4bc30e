use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, instrument, warn};

use super::handler::RequestHandler;
use super::listener::ServerListener;
use super::pipeline::Pipeline;
use super::Result;
use crate::settings::Settings;

/// 게이트웨이 프로세스 하나를 구성하고 실행합니다.
pub struct ServerManager {
    pub settings: Arc<Settings>,
    pipeline: Pipeline,
}

impl ServerManager {
    #[instrument(skip(settings), level = "debug", err)]
    pub fn new(settings: Settings) -> Result<Self> {
        let pipeline = Pipeline::build(&settings)?;
        Ok(Self {
            settings: Arc::new(settings),
            pipeline,
        })
    }

    pub fn from_pipeline(settings: Settings, pipeline: Pipeline) -> Self {
        Self {
            settings: Arc::new(settings),
            pipeline,
        }
    }

    /// Ctrl-C를 받을 때까지 서버를 실행합니다.
    pub async fn start(self) -> Result<()> {
        self.run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "종료 신호 대기 실패");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.settings.server.http_port));
        let listener = ServerListener::bind(addr).await?;
        self.serve(listener, shutdown).await
    }

    /// 이미 바인딩된 리스너로 실행합니다.
    pub async fn serve<F>(self, listener: ServerListener, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let tasks = self.pipeline.spawn_background_tasks();
        let Pipeline { chain, .. } = self.pipeline;
        let handler = Arc::new(RequestHandler::new(chain));

        info!(
            environment = %self.settings.environment,
            routes = self.settings.routes.len(),
            "게이트웨이 시작"
        );
        let result = listener.run(handler, shutdown).await;

        for task in tasks {
            task.abort();
        }
        info!("게이트웨이 종료");
        result
    }
}
