use crate::models::SolverConfig;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// File name of the solver settings inside the config directory.
pub const SOLVER_CONFIG_FILE: &str = "nqueensfaf.yaml";

/// Configuration manager for loading and saving the YAML solver settings.
///
/// Keys missing from the file fall back to [`SolverConfig::default()`], and
/// a loaded configuration is validated before it is handed out.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    solver_config_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager with the specified configuration directory.
    ///
    /// The directory is created if it doesn't exist.
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            solver_config_path: config_dir.join(SOLVER_CONFIG_FILE),
            config_dir,
        })
    }

    /// Load the solver configuration file.
    ///
    /// # Returns
    /// The loaded SolverConfig, or defaults if the file doesn't exist
    ///
    /// # Errors
    /// Fails if the file can't be read, isn't valid YAML, or holds values
    /// outside their allowed ranges.
    pub fn load_solver_config(&self) -> Result<SolverConfig> {
        if !self.solver_config_path.exists() {
            tracing::warn!(
                "Solver config file not found at {}, using defaults",
                self.solver_config_path
            );
            return Ok(SolverConfig::default());
        }

        let file_contents = fs::read_to_string(&self.solver_config_path).with_context(|| {
            format!("Failed to read solver config: {}", self.solver_config_path)
        })?;

        let loaded: SolverConfig = serde_yaml_ng::from_str(&file_contents).with_context(|| {
            format!("Failed to parse solver config: {}", self.solver_config_path)
        })?;

        let mut config = SolverConfig::default();
        config.merge_from(&loaded);
        config
            .ensure_valid()
            .with_context(|| format!("Rejected solver config: {}", self.solver_config_path))?;

        tracing::info!("Loaded solver config from {}", self.solver_config_path);
        Ok(config)
    }

    /// Save the solver configuration file.
    ///
    /// Invalid configurations are refused so the file always loads back.
    pub fn save_solver_config(&self, config: &SolverConfig) -> Result<()> {
        config
            .ensure_valid()
            .context("Refusing to save invalid solver config")?;

        let yaml_string =
            serde_yaml_ng::to_string(config).context("Failed to serialize solver config to YAML")?;

        fs::write(&self.solver_config_path, yaml_string).with_context(|| {
            format!("Failed to write solver config: {}", self.solver_config_path)
        })?;

        tracing::info!("Saved solver config to {}", self.solver_config_path);
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    /// Get the solver configuration file path.
    pub fn solver_config_path(&self) -> &Utf8Path {
        &self.solver_config_path
    }
}
