//! 引擎错误定义

use thiserror::Error;

use geocad_core::error::{CrsError, StoreError};
use geocad_file::FileError;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    File(#[from] FileError),

    #[error(transparent)]
    Crs(#[from] CrsError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("drawing is not georeferenced")]
    NotGeoreferenced,

    #[error("insertion entity has no insertion point")]
    MissingInsertionPoint,

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
