//! One configured pyramid build: output setup, worker run, teardown.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::config::{Config, OutputFormat};
use crate::error::Result;
use crate::manager::{BuildManager, BuildReport};
use crate::pyramid::{GridEnumerator, SerializeOptions};
use crate::sink::{DirectorySink, MbTilesSink, OutputSink};
use crate::storage::TileStore;
use crate::terrain::FlatTerrainSource;

/// Payload format recorded in the MBTiles metadata.
pub const TILE_FORMAT: &str = "heightmap-1.0";

pub struct BuildJob {
    config: Config,
    store: Option<Arc<TileStore>>,
    source: Arc<FlatTerrainSource>,
}

impl BuildJob {
    /// Open the output and, for MBTiles, write the metadata table.
    pub fn open(config: Config) -> Result<Self> {
        let store = match config.output.format {
            OutputFormat::Mbtiles => {
                let store = TileStore::open(&config.output.path)?;
                write_metadata(&store, &config)?;
                Some(Arc::new(store))
            }
            OutputFormat::Directory => None,
        };
        let source = Arc::new(FlatTerrainSource::new(
            config.terrain.height,
            config.pyramid.start_zoom,
        ));
        Ok(Self { config, store, source })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> Option<&Arc<TileStore>> {
        self.store.as_ref()
    }

    /// Manager sized from the `[workers]` section.
    pub fn manager(&self) -> BuildManager {
        BuildManager::new(
            self.config.workers.threads,
            SerializeOptions { water_mask: self.config.terrain.water_mask },
            self.config.workers.abort_on_error,
        )
    }

    /// Run the workers. Blocks until every thread has finished.
    pub fn run(&self, manager: &BuildManager) -> Result<BuildReport> {
        let pyramid = &self.config.pyramid;
        let output = &self.config.output;
        info!(
            profile = pyramid.profile.name(),
            start_zoom = pyramid.start_zoom,
            end_zoom = pyramid.end_zoom,
            total_tiles = pyramid.profile.tiles_between(pyramid.start_zoom, pyramid.end_zoom),
            output = ?output.path,
            resume = output.resume,
            "Building pyramid"
        );

        manager.run(
            || {
                GridEnumerator::new(
                    self.source.clone(),
                    pyramid.profile,
                    pyramid.start_zoom,
                    pyramid.end_zoom,
                )
            },
            || {
                Ok(match &self.store {
                    Some(store) => OutputSink::MbTiles(MbTilesSink::new(store.clone(), output.resume)),
                    None => OutputSink::Directory(DirectorySink::new(
                        &output.path,
                        &output.extension,
                        output.resume,
                    )),
                })
            },
        )
    }

    /// Close the store, if any.
    pub fn finish(self) -> Result<()> {
        if let Some(store) = &self.store {
            store.close()?;
        }
        Ok(())
    }
}

/// Standard entries first, then the user's `[metadata]` table on top.
fn write_metadata(store: &TileStore, config: &Config) -> Result<()> {
    let name = config
        .output
        .path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "tiles".into());

    store.set_metadata("name", &name)?;
    store.set_metadata("format", TILE_FORMAT)?;
    store.set_metadata("scheme", "tms")?;
    store.set_metadata("profile", config.pyramid.profile.name())?;
    store.set_metadata("minzoom", &config.pyramid.end_zoom.to_string())?;
    store.set_metadata("maxzoom", &config.pyramid.start_zoom.to_string())?;
    store.set_metadata("generated_at", &Utc::now().to_rfc3339())?;
    for (key, value) in &config.metadata {
        store.set_metadata(key, value)?;
    }
    Ok(())
}
