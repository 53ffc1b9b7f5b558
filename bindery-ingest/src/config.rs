//! Assembles the default extractor chain and pipeline from `TomlConfig`

use crate::db::{init_database_pool, SqliteSessionStore};
use crate::error::{Error, Result};
use crate::extractors::{
    CatalogOptions, ChainedExtractor, ComicCatalogClient, ComicInfoExtractor, EpubExtractor,
    FilenameExtractor, OpenLibraryClient, PdfExtractor,
};
use crate::normalize::{PathNormalizer, SuffixCollisionResolver};
use crate::pipeline::{Pipeline, PipelineConfig};
use crate::store::{LocalObjectStore, MemorySessionStore, ObjectStore, SessionStore};
use bindery_common::{CatalogSettings, TomlConfig};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn catalog_options(settings: &CatalogSettings) -> CatalogOptions {
    CatalogOptions::new(&settings.base_url, Duration::from_secs(settings.timeout_secs))
        .with_api_key(settings.api_key.clone())
}

/// Standard chain, highest priority first:
/// filename → PDF → EPUB → ComicInfo → Open Library → comics catalog
///
/// With `offline` set, or a catalog disabled in config, the remote lookups
/// are left out.
pub fn build_extractor_chain(config: &TomlConfig, offline: bool) -> Result<ChainedExtractor> {
    let mut chain = ChainedExtractor::new(vec![
        Arc::new(FilenameExtractor::new()),
        Arc::new(PdfExtractor::new()),
        Arc::new(EpubExtractor::new()),
        Arc::new(ComicInfoExtractor::new()),
    ]);

    if offline {
        tracing::info!("Offline mode: remote catalog lookups disabled");
        return Ok(chain);
    }

    if config.open_library.enabled {
        let client = OpenLibraryClient::with_options(catalog_options(&config.open_library))
            .map_err(|e| Error::InvalidConfig(format!("Open Library client: {}", e)))?;
        chain.push(Arc::new(client));
    }

    if config.comic_catalog.enabled {
        if config.comic_catalog.api_key.is_none() {
            tracing::warn!("Comic catalog enabled without an API key; requests may be rejected");
        }
        let client = ComicCatalogClient::with_options(catalog_options(&config.comic_catalog))
            .map_err(|e| Error::InvalidConfig(format!("comic catalog client: {}", e)))?;
        chain.push(Arc::new(client));
    }

    tracing::debug!(extractors = ?chain.names(), "Extractor chain assembled");
    Ok(chain)
}

/// Normalizer rooted at `path_root`, with suffix collision resolution when
/// `pipeline.resolve_collisions` is on
pub fn build_normalizer(config: &TomlConfig, store: Arc<dyn ObjectStore>) -> PathNormalizer {
    let normalizer = PathNormalizer::new().with_root(&config.path_root);
    if config.pipeline.resolve_collisions {
        normalizer.with_collision_resolver(Arc::new(SuffixCollisionResolver::new(store)))
    } else {
        normalizer
    }
}

/// Session store: SQLite when a database path is known, otherwise in-memory
pub async fn build_session_store(database: Option<&Path>) -> Result<Arc<dyn SessionStore>> {
    match database {
        Some(path) => {
            let pool = init_database_pool(path).await?;
            tracing::info!(database = %path.display(), "Persisting sessions to SQLite");
            Ok(Arc::new(SqliteSessionStore::new(pool)))
        }
        None => {
            tracing::info!("No database configured; sessions kept in memory");
            Ok(Arc::new(MemorySessionStore::new()))
        }
    }
}

/// Fully wired pipeline writing into `store_root`
pub async fn build_pipeline(
    config: &TomlConfig,
    store_root: &Path,
    database: Option<&Path>,
    offline: bool,
) -> Result<Pipeline> {
    let object_store: Arc<dyn ObjectStore> = Arc::new(LocalObjectStore::new(store_root));
    let session_store = build_session_store(database).await?;

    Pipeline::new(
        PipelineConfig::from(&config.pipeline),
        build_extractor_chain(config, offline)?,
        build_normalizer(config, object_store.clone()),
        object_store,
        session_store,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_chain_order() {
        let chain = build_extractor_chain(&TomlConfig::default(), false).unwrap();
        assert_eq!(
            chain.names(),
            vec!["filename", "pdf", "epub", "comic_info", "open_library"]
        );
    }

    #[test]
    fn test_offline_chain_has_no_catalogs() {
        let chain = build_extractor_chain(&TomlConfig::default(), true).unwrap();
        assert_eq!(chain.names(), vec!["filename", "pdf", "epub", "comic_info"]);
    }

    #[test]
    fn test_comic_catalog_opt_in() {
        let config = TomlConfig::from_toml_str(
            r#"
            [comic_catalog]
            enabled = true
            base_url = "http://127.0.0.1:1"
            api_key = "k"
            "#,
        )
        .unwrap();
        let chain = build_extractor_chain(&config, false).unwrap();
        assert_eq!(chain.names().last(), Some(&"comic_catalog"));
    }

    #[test]
    fn test_normalizer_follows_config() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(LocalObjectStore::new(dir.path()));

        let mut config = TomlConfig::default();
        assert!(!build_normalizer(&config, store.clone()).has_collision_resolver());

        config.pipeline.resolve_collisions = true;
        assert!(build_normalizer(&config, store).has_collision_resolver());
    }

    #[tokio::test]
    async fn test_build_pipeline_with_database() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("sessions.db");
        let pipeline = build_pipeline(&TomlConfig::default(), &dir.path().join("store"), Some(&db), true)
            .await
            .unwrap();
        assert_eq!(pipeline.config().concurrency, 4);
        assert!(db.exists());
    }
}
