//! Shared service state handed to every request handler.

use std::sync::Arc;

use heli_core::{BoundingBox, RegionQuantizer};
use heli_upstream::UpstreamAdapter;

use crate::cache::RegionalCache;
use crate::config::Config;

pub struct AppState {
    cache: Arc<RegionalCache>,
    default_bbox: BoundingBox,
}

impl AppState {
    pub fn new(cache: Arc<RegionalCache>, default_bbox: BoundingBox) -> Self {
        Self {
            cache,
            default_bbox,
        }
    }

    /// Wire the cache around `adapter` using the configured quantization and TTL.
    pub fn from_config(config: &Config, adapter: Arc<dyn UpstreamAdapter>) -> Self {
        let quantizer = RegionQuantizer::new(config.cache_precision, config.cell_radius_nm);
        let cache = RegionalCache::new(adapter, quantizer, config.cache_ttl);
        Self::new(Arc::new(cache), config.default_bbox)
    }

    pub fn cache(&self) -> &Arc<RegionalCache> {
        &self.cache
    }

    pub fn default_bbox(&self) -> BoundingBox {
        self.default_bbox
    }
}
