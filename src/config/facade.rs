//! Config loading entry points.

use super::merge::merge_policy;
use super::sources::{environment, global_file, project_file};
use super::QuerypipeConfig;
use crate::error::ClientError;
use config::File;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Loads [`QuerypipeConfig`] from defaults, files and the environment
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for a project rooted at `root`.
    ///
    /// Precedence, lowest first: defaults, global file, `<root>/querypipe.toml`,
    /// `QUERYPIPE__*` environment variables.
    pub fn load(root: &Path) -> Result<QuerypipeConfig, ClientError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = project_file::add_to_builder(builder, root)?;
        let builder = environment::add_to_builder(builder);

        let config: QuerypipeConfig = builder.build()?.try_deserialize()?;
        debug!(root = %root.display(), url = %config.client.url, "Configuration loaded");
        Ok(config)
    }

    /// Load configuration with an explicit file in place of the project file.
    /// The file must exist.
    pub fn load_from_file(path: &Path) -> Result<QuerypipeConfig, ClientError> {
        if !path.exists() {
            return Err(ClientError::Config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = builder.add_source(File::from(path).required(true));
        let builder = environment::add_to_builder(builder);

        let config: QuerypipeConfig = builder.build()?.try_deserialize()?;
        debug!(path = %path.display(), url = %config.client.url, "Configuration loaded");
        Ok(config)
    }

    /// Path of the global config file, if `HOME` is set
    pub fn global_config_path() -> Option<PathBuf> {
        global_file::global_config_path()
    }
}
