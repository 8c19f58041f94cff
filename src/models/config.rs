use crate::error::{Result, SolverError};
use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};

/// Placeholder in [`SolverConfig::auto_save_path`] replaced by the board size.
pub const BOARD_SIZE_PLACEHOLDER: &str = "{N}";

/// Upper bound for the autosave path length accepted when decoding.
const MAX_SAVE_PATH_LEN: usize = 4096;

/// Run-time tunables for a search.
///
/// Loaded from `nqueensfaf.yaml` by [`ConfigManager`](crate::config::ConfigManager)
/// and embedded in every checkpoint. A search takes a snapshot of the config
/// when it starts, so later edits to the caller's copy have no effect on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Search steps between progress samples.
    #[serde(default = "default_update_interval")]
    pub update_interval: i64,

    #[serde(default)]
    pub auto_save_enabled: bool,

    /// Remove the checkpoint once the search completes.
    #[serde(default)]
    pub auto_delete_enabled: bool,

    /// Progress (in percent) between two checkpoints.
    #[serde(default = "default_auto_save_percentage_step")]
    pub auto_save_percentage_step: f32,

    /// Checkpoint path template, `{N}` is replaced by the board size.
    #[serde(default = "default_auto_save_path")]
    pub auto_save_path: String,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            update_interval: default_update_interval(),
            auto_save_enabled: false,
            auto_delete_enabled: false,
            auto_save_percentage_step: default_auto_save_percentage_step(),
            auto_save_path: default_auto_save_path(),
        }
    }
}

fn default_update_interval() -> i64 {
    128
}

fn default_auto_save_percentage_step() -> f32 {
    10.0
}

fn default_auto_save_path() -> String {
    format!("nqueensfaf{}.dat", BOARD_SIZE_PLACEHOLDER)
}

impl SolverConfig {
    /// Check every field against its allowed range.
    pub fn validate(&self) -> bool {
        self.validation_error().is_none()
    }

    /// Like [`validate()`](Self::validate) but names the offending field.
    pub fn ensure_valid(&self) -> Result<()> {
        match self.validation_error() {
            Some(reason) => Err(SolverError::ConfigValidation(reason)),
            None => Ok(()),
        }
    }

    fn validation_error(&self) -> Option<String> {
        if self.update_interval <= 0 {
            return Some(format!(
                "update_interval must be positive, got {}",
                self.update_interval
            ));
        }
        // NaN fails both comparisons
        let step = self.auto_save_percentage_step;
        if !(step > 0.0 && step <= 100.0) {
            return Some(format!(
                "auto_save_percentage_step must be in (0, 100], got {}",
                step
            ));
        }
        if self.auto_save_path.is_empty() {
            return Some("auto_save_path must not be empty".to_string());
        }
        if self.auto_save_path.len() > MAX_SAVE_PATH_LEN {
            return Some(format!(
                "auto_save_path is {} bytes, at most {} allowed",
                self.auto_save_path.len(),
                MAX_SAVE_PATH_LEN
            ));
        }
        None
    }

    /// Copy every field from `other`. The result is not validated.
    pub fn merge_from(&mut self, other: &SolverConfig) {
        self.update_interval = other.update_interval;
        self.auto_save_enabled = other.auto_save_enabled;
        self.auto_delete_enabled = other.auto_delete_enabled;
        self.auto_save_percentage_step = other.auto_save_percentage_step;
        self.auto_save_path.clone_from(&other.auto_save_path);
    }

    /// Resolve the checkpoint path for a board of size `n`.
    pub fn resolve_save_path(&self, n: u32) -> Utf8PathBuf {
        Utf8PathBuf::from(
            self.auto_save_path
                .replace(BOARD_SIZE_PLACEHOLDER, &n.to_string()),
        )
    }

    /// Write the config block of a checkpoint (little-endian, fixed order).
    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let path = self.auto_save_path.as_bytes();
        if path.len() > MAX_SAVE_PATH_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("autosave path length {} exceeds {}", path.len(), MAX_SAVE_PATH_LEN),
            ));
        }
        let path_len = path.len() as u32;

        out.write_all(&self.update_interval.to_le_bytes())?;
        out.write_all(&[self.auto_save_enabled as u8])?;
        out.write_all(&[self.auto_delete_enabled as u8])?;
        out.write_all(&self.auto_save_percentage_step.to_le_bytes())?;
        out.write_all(&path_len.to_le_bytes())?;
        out.write_all(path)?;
        Ok(())
    }

    /// Read a config block written by [`write_to()`](Self::write_to).
    pub fn read_from<R: Read>(input: &mut R) -> io::Result<Self> {
        let mut i64_bytes = [0u8; 8];
        input.read_exact(&mut i64_bytes)?;
        let update_interval = i64::from_le_bytes(i64_bytes);

        let auto_save_enabled = read_flag(input)?;
        let auto_delete_enabled = read_flag(input)?;

        let mut f32_bytes = [0u8; 4];
        input.read_exact(&mut f32_bytes)?;
        let auto_save_percentage_step = f32::from_le_bytes(f32_bytes);

        let mut len_bytes = [0u8; 4];
        input.read_exact(&mut len_bytes)?;
        let path_len = u32::from_le_bytes(len_bytes) as usize;
        if path_len > MAX_SAVE_PATH_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("autosave path length {} exceeds {}", path_len, MAX_SAVE_PATH_LEN),
            ));
        }

        let mut path = vec![0u8; path_len];
        input.read_exact(&mut path)?;
        let auto_save_path = String::from_utf8(path).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidData, "autosave path is not UTF-8")
        })?;

        Ok(Self {
            update_interval,
            auto_save_enabled,
            auto_delete_enabled,
            auto_save_percentage_step,
            auto_save_path,
        })
    }
}

fn read_flag<R: Read>(input: &mut R) -> io::Result<bool> {
    let mut byte = [0u8; 1];
    input.read_exact(&mut byte)?;
    match byte[0] {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("invalid flag byte {}", other),
        )),
    }
}
