//! Entry point for loading `BoardConfig` from layered sources.

use super::merge::merge_policy;
use super::sources::{global_file, workspace_file};
use super::BoardConfig;
use crate::error::PipelineError;
use config::File;
use std::path::Path;

/// Loads configuration; validation is left to the caller.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Defaults, global file, workspace files, then `TILEBOARD__*` environment variables.
    pub fn load(workspace_root: &Path) -> Result<BoardConfig, PipelineError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, workspace_root)?;
        let config = builder
            .add_source(merge_policy::environment_source())
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// A single explicit file over the built-in defaults.
    pub fn load_from_file(path: &Path) -> Result<BoardConfig, PipelineError> {
        if !path.exists() {
            return Err(PipelineError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        let config = merge_policy::builder_with_defaults()?
            .add_source(File::from(path))
            .build()?;
        Ok(config.try_deserialize()?)
    }
}
