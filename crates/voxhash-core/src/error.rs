//! Error types for index construction.

use thiserror::Error;

/// Index-wide error type.
///
/// Every variant is fatal: construction aborts and nothing is returned.
#[derive(Error, Debug)]
pub enum Error {
    /// Bounding box is empty on some axis or not finite
    #[error("Invalid bounds: {0}")]
    InvalidBounds(String),

    /// Target grid resolution cannot produce a voxel size
    #[error("Invalid resolution: {0} fine voxels per axis")]
    InvalidResolution(u32),

    /// Nominal table size came out as zero for a non-empty input
    #[error("Degenerate hash table size for {points} points")]
    DegenerateTableSize { points: usize },

    /// A bucket table was asked for zero primary slots
    #[error("Hash table needs at least one primary slot")]
    EmptyTable,

    /// A chain walk did not terminate within the map size
    #[error("Chain cycle detected at bucket {index}")]
    ChainCycleDetected { index: usize },

    /// A chain link leaves the map or lands on an unused bucket
    #[error("Broken chain link from bucket {from} to {to}")]
    BrokenChain { from: usize, to: usize },

    /// Position and color channels disagree in length
    #[error("Missing channel data: {positions} positions but {colors} colors")]
    MissingChannelData { positions: usize, colors: usize },

    /// Input point is NaN or infinite
    #[error("Non-finite position at point {index}")]
    NonFinitePosition { index: usize },

    /// Hash-box coordinates do not fit a 16-bit key
    #[error("Hash box of point {index} is outside the 16-bit key range")]
    KeyOutOfRange { index: usize },

    /// A 32-bit index or offset would overflow
    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(&'static str),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
