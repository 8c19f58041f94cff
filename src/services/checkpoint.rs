//! Binary checkpoint codec.
//!
//! A checkpoint is a little-endian record holding everything needed to resume
//! a search with identical future behavior:
//!
//! ```text
//! magic           4 bytes  "NQFF"
//! format version  u16
//! n               u32
//! row             u32
//! steps taken     u64
//! solutions found u64
//! placements      row x u32
//! config block    see SolverConfig::write_to
//! ```
//!
//! Attack-line masks are not stored. [`decode()`] rebuilds them from the
//! placement stack, which doubles as the corruption check.

use crate::error::{Result, SolverError};
use crate::models::{MAX_BOARD_SIZE, SearchState, SolverConfig};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs::{self, File};
use std::io::{self, Read, Write};

pub const CHECKPOINT_MAGIC: [u8; 4] = *b"NQFF";
pub const CHECKPOINT_VERSION: u16 = 1;

/// Serialize `state` and `config` into a checkpoint record.
pub fn encode(state: &SearchState, config: &SolverConfig) -> io::Result<Vec<u8>> {
    let capacity = 32 + 4 * state.placements().len() + config.auto_save_path.len() + 18;
    let mut bytes = Vec::with_capacity(capacity);

    bytes.extend_from_slice(&CHECKPOINT_MAGIC);
    bytes.extend_from_slice(&CHECKPOINT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&state.n().to_le_bytes());
    bytes.extend_from_slice(&state.row().to_le_bytes());
    bytes.extend_from_slice(&state.steps_taken().to_le_bytes());
    bytes.extend_from_slice(&state.solutions_found().to_le_bytes());
    for col in state.placements() {
        bytes.extend_from_slice(&col.to_le_bytes());
    }
    config.write_to(&mut bytes)?;

    Ok(bytes)
}

/// Parse a checkpoint record produced by [`encode()`].
///
/// # Errors
/// - [`SolverError::MalformedCheckpoint`] for a bad magic, unknown version,
///   truncated or oversized record, or an invalid embedded config
/// - [`SolverError::SearchStateCorruption`] if the placements are inconsistent
pub fn decode(bytes: &[u8]) -> Result<(SearchState, SolverConfig)> {
    let mut input = bytes;

    let mut magic = [0u8; 4];
    input.read_exact(&mut magic).map_err(malformed)?;
    if magic != CHECKPOINT_MAGIC {
        return Err(SolverError::MalformedCheckpoint(format!(
            "bad magic {:02x?}",
            magic
        )));
    }

    let version = u16::from_le_bytes(read_array(&mut input)?);
    if version != CHECKPOINT_VERSION {
        return Err(SolverError::MalformedCheckpoint(format!(
            "unsupported format version {} (expected {})",
            version, CHECKPOINT_VERSION
        )));
    }

    let n = u32::from_le_bytes(read_array(&mut input)?);
    if n == 0 || n > MAX_BOARD_SIZE {
        return Err(SolverError::MalformedCheckpoint(format!(
            "board size {} out of range",
            n
        )));
    }
    let row = u32::from_le_bytes(read_array(&mut input)?);
    let steps_taken = u64::from_le_bytes(read_array(&mut input)?);
    let solutions_found = u64::from_le_bytes(read_array(&mut input)?);

    // a row past the board is an invariant failure, but reading it would
    // misparse the rest of the record
    if row > n {
        return Err(SolverError::SearchStateCorruption(format!(
            "row {} exceeds board size {}",
            row, n
        )));
    }
    let mut placements = Vec::with_capacity(row as usize);
    for _ in 0..row {
        placements.push(u32::from_le_bytes(read_array(&mut input)?));
    }

    let config = SolverConfig::read_from(&mut input).map_err(malformed)?;
    if !input.is_empty() {
        return Err(SolverError::MalformedCheckpoint(format!(
            "{} trailing bytes",
            input.len()
        )));
    }
    config
        .ensure_valid()
        .map_err(|e| SolverError::MalformedCheckpoint(e.to_string()))?;

    let state = SearchState::restore(n, row, &placements, steps_taken, solutions_found)?;
    Ok((state, config))
}

/// Write a checkpoint to `path`, replacing any previous one atomically.
///
/// The record goes to a sibling temp file first and is renamed over `path`
/// only once fully synced, so a failed write leaves the old checkpoint intact.
pub fn save(state: &SearchState, config: &SolverConfig, path: &Utf8Path) -> Result<()> {
    let write_error = |source: io::Error| SolverError::IoWrite {
        path: path.to_path_buf(),
        source,
    };

    let bytes = encode(state, config).map_err(write_error)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_str().is_empty()) {
        if !parent.exists() {
            fs::create_dir_all(parent).map_err(write_error)?;
        }
    }

    let temp_path = temp_path_for(path);
    let written = File::create(&temp_path).and_then(|mut file| {
        file.write_all(&bytes)?;
        file.sync_all()
    });
    if let Err(e) = written.and_then(|_| fs::rename(&temp_path, path)) {
        let _ = fs::remove_file(&temp_path);
        return Err(write_error(e));
    }

    tracing::debug!(
        "Saved checkpoint to {} (row {}, {} solutions, {} steps)",
        path,
        state.row(),
        state.solutions_found(),
        state.steps_taken()
    );
    Ok(())
}

/// Read and decode the checkpoint at `path`.
pub fn load(path: &Utf8Path) -> Result<(SearchState, SolverConfig)> {
    let bytes = fs::read(path).map_err(|source| SolverError::IoRead {
        path: path.to_path_buf(),
        source,
    })?;

    let (state, config) = decode(&bytes)?;
    tracing::info!(
        "Loaded checkpoint from {}: n={}, row={}, {} solutions, {} steps",
        path,
        state.n(),
        state.row(),
        state.solutions_found(),
        state.steps_taken()
    );
    Ok((state, config))
}

/// Remove the checkpoint at `path` if it exists.
pub fn delete(path: &Utf8Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            tracing::info!("Deleted checkpoint {}", path);
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(SolverError::IoWrite {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn temp_path_for(path: &Utf8Path) -> Utf8PathBuf {
    let mut name = path.file_name().unwrap_or("checkpoint").to_string();
    name.push_str(".tmp");
    path.with_file_name(name)
}

fn read_array<const N: usize>(input: &mut &[u8]) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    input.read_exact(&mut buf).map_err(malformed)?;
    Ok(buf)
}

fn malformed(e: io::Error) -> SolverError {
    match e.kind() {
        io::ErrorKind::UnexpectedEof => {
            SolverError::MalformedCheckpoint("record is truncated".to_string())
        }
        _ => SolverError::MalformedCheckpoint(e.to_string()),
    }
}
