//! Convenience board constructors.

use crate::backend::{LocalFs, TempBackend};
use crate::board::Board;
use crate::config::{default_data_root, BoardConfig};
use crate::error::Result;
use std::path::PathBuf;
use std::sync::Arc;

/// Board over a local directory, created if missing.
///
/// Local boards skip the cache: the backend already is local disk.
pub fn board_folder(path: impl Into<PathBuf>) -> Result<Board> {
    board_folder_with(path, BoardConfig::uncached())
}

/// [`board_folder`] with an explicit configuration.
pub fn board_folder_with(path: impl Into<PathBuf>, config: BoardConfig) -> Result<Board> {
    let backend = LocalFs::new(path)?;
    Board::new(Arc::new(backend), config)
}

/// Board over a fresh temporary directory.
///
/// The returned backend handle owns the directory; call
/// [`TempBackend::close`] to delete it deterministically, or let the last
/// handle's drop do it.
pub fn board_temp() -> Result<(Board, Arc<TempBackend>)> {
    let backend = Arc::new(TempBackend::new()?);
    let board = Board::new(backend.clone(), BoardConfig::uncached())?;
    Ok((board, backend))
}

/// Board under the platform data directory, for pins private to this user
/// and machine.
pub fn board_local(config: BoardConfig) -> Result<Board> {
    board_folder_with(default_data_root(), config)
}
