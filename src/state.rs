use std::sync::Arc;

use tracing::warn;

use crate::auth::jwt::TokenService;
use crate::config::AppConfig;
use crate::store::{MemoryUserStore, PgUserStore, UserStore};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn UserStore>,
    pub tokens: TokenService,
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Connect to Postgres when configured, otherwise fall back to an
    /// in-memory store. Also returns the pool so `main` can run migrations.
    pub async fn init(config: AppConfig) -> anyhow::Result<(Self, Option<PgUserStore>)> {
        let config = Arc::new(config);

        let pg = match config.database_url.as_deref() {
            Some(url) => Some(PgUserStore::connect(url, config.max_connections).await?),
            None => {
                warn!("DATABASE_URL not set; users are kept in memory and lost on restart");
                None
            }
        };
        let store = match &pg {
            Some(pg) => Arc::new(pg.clone()) as Arc<dyn UserStore>,
            None => Arc::new(MemoryUserStore::new()) as Arc<dyn UserStore>,
        };

        if config.jwt.secret.is_none() {
            warn!("JWT_SECRET not set; every token operation will fail");
        }

        Ok((Self::from_parts(store, config), pg))
    }

    pub fn from_parts(store: Arc<dyn UserStore>, config: Arc<AppConfig>) -> Self {
        let tokens = TokenService::new(&config.jwt);
        Self {
            store,
            tokens,
            config,
        }
    }
}
