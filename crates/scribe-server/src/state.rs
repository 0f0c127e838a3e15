use std::sync::Arc;

use scribe_align::{AlignClient, ArtifactWriter};
use scribe_core::{create_pool, DbConnection, DbPool, Result, ScribeError};
use scribe_timing::BaselineSource;

use crate::config::ServerConfig;

/// Shared per-process state: configuration, the connection pool (schema
/// already migrated), the aligner client, and the artifact writer.
pub struct AppState {
    pub config: ServerConfig,
    pub pool: DbPool,
    pub align: AlignClient,
    pub artifacts: ArtifactWriter,
    /// Optional baseline transcript provider consulted when a document has
    /// no stored prior version. None in the standalone deployment.
    pub baseline: Option<Arc<dyn BaselineSource>>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(config: ServerConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let sqlite_path = config.sqlite_path();
        let sqlite_path = sqlite_path
            .to_str()
            .ok_or_else(|| ScribeError::InvalidInput("non-utf8 sqlite path".into()))?;
        let pool = create_pool(sqlite_path)?;
        let align = AlignClient::new(config.align_endpoint.clone());
        let artifacts = ArtifactWriter::new(config.audio_log_dir.clone(), config.audio_log_native);

        Ok(Self {
            config,
            pool,
            align,
            artifacts,
            baseline: None,
        })
    }

    pub fn conn(&self) -> Result<DbConnection> {
        Ok(self.pool.get()?)
    }
}
