use crate::config::StoreConfig;
use crate::error::Result;
use crate::layout::StoreLayout;
use crate::manifest::Manifest;

/// Report the store's durable state.
pub fn run(config: &StoreConfig) -> Result<Manifest> {
    let layout = StoreLayout::new(&config.path);
    Manifest::load(&layout.manifest_path())
}
