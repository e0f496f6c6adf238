//! Session configuration.

use crate::cache::CacheConfig;
use crate::resolver::ResolverOptions;

pub const DEFAULT_MESH_BUDGET_BYTES: u64 = 256 * 1024 * 1024;
pub const DEFAULT_TEXTURE_BUDGET_BYTES: u64 = 512 * 1024 * 1024;

/// Tuning for one viewer session. Textures get the larger default budget;
/// they dominate resident bytes in practice.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub mesh_cache: CacheConfig,
    pub texture_cache: CacheConfig,
    pub resolver: ResolverOptions,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mesh_cache: CacheConfig::default().with_budget_bytes(DEFAULT_MESH_BUDGET_BYTES),
            texture_cache: CacheConfig::default()
                .with_budget_bytes(DEFAULT_TEXTURE_BUDGET_BYTES),
            resolver: ResolverOptions::default(),
        }
    }
}

impl SessionConfig {
    pub fn with_mesh_cache(mut self, config: CacheConfig) -> Self {
        self.mesh_cache = config;
        self
    }

    pub fn with_texture_cache(mut self, config: CacheConfig) -> Self {
        self.texture_cache = config;
        self
    }

    pub fn with_resolver(mut self, options: ResolverOptions) -> Self {
        self.resolver = options;
        self
    }
}
