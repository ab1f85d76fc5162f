use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use crate::{
    analysis::{
        provider::{AnalysisProvider, HttpAnalysisProvider},
        repo::{AnalysisStore, MemoryAnalysisStore, PgAnalysisStore},
    },
    auth::{
        jwt::JwtKeys,
        password::PasswordPolicy,
        repo::{MemoryUserStore, PgUserStore, UserStore},
    },
    config::AppConfig,
    db,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserStore>,
    pub analyses: Arc<dyn AnalysisStore>,
    pub provider: Arc<dyn AnalysisProvider>,
    pub keys: JwtKeys,
    pub passwords: PasswordPolicy,
}

impl AppState {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let config = Arc::new(config);

        let provider = Arc::new(
            HttpAnalysisProvider::from_config(&config.ai).context("build AI provider client")?,
        ) as Arc<dyn AnalysisProvider>;

        let (users, analyses): (Arc<dyn UserStore>, Arc<dyn AnalysisStore>) =
            match config.database_url.as_deref() {
                Some(url) => {
                    let pool = db::connect(url, config.db_max_connections).await?;
                    db::run_migrations(&pool).await;
                    info!("using postgres stores");
                    (
                        Arc::new(PgUserStore::new(pool.clone())),
                        Arc::new(PgAnalysisStore::new(pool)),
                    )
                }
                None => {
                    warn!("DATABASE_URL not set; using in-memory stores, data is lost on restart");
                    (
                        Arc::new(MemoryUserStore::new()),
                        Arc::new(MemoryAnalysisStore::new()),
                    )
                }
            };

        Self::from_parts(config, users, analyses, provider)
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn UserStore>,
        analyses: Arc<dyn AnalysisStore>,
        provider: Arc<dyn AnalysisProvider>,
    ) -> anyhow::Result<Self> {
        let keys = JwtKeys::from_config(&config.jwt);
        let passwords =
            PasswordPolicy::from_config(&config.password).context("argon2 cost settings")?;
        Ok(Self {
            config,
            users,
            analyses,
            provider,
            keys,
            passwords,
        })
    }

    /// Memory stores and test config around the given provider.
    #[cfg(test)]
    pub fn fake(provider: Arc<dyn AnalysisProvider>) -> Self {
        Self::from_parts(
            Arc::new(crate::config::test_config()),
            Arc::new(MemoryUserStore::new()),
            Arc::new(MemoryAnalysisStore::new()),
            provider,
        )
        .expect("test config builds a valid state")
    }
}
