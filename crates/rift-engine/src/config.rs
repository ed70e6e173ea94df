//! Validated engine configuration.

use rift_geom::HyperRect;
use std::error::Error;
use std::fmt;

/// Default width of the rolling tick-cost window.
pub const DEFAULT_WINDOW: usize = 20;

/// Configuration for one rift world.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// The world rectangle.
    pub world: HyperRect,
    /// Number of workers; must be `1 (mod 2^D − 1)`.
    pub workers: usize,
    /// Halo thickness per dimension.
    pub aoi: Vec<i32>,
    /// Whether coordinates wrap at the world edges.
    pub toroidal: bool,
    /// Rolling window (in ticks) for the rebalance-runtime timer.
    pub window: usize,
}

impl EngineConfig {
    /// A configuration with the default timing window.
    pub fn new(world: HyperRect, workers: usize, aoi: &[i32], toroidal: bool) -> Self {
        Self {
            world,
            workers,
            aoi: aoi.to_vec(),
            toroidal,
            window: DEFAULT_WINDOW,
        }
    }

    /// Check the configuration before any worker state is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ndim = self.world.ndim();
        let size = self.world.size();
        for d in 0..ndim {
            if size[d] <= 0 {
                return Err(ConfigError::EmptyWorld { dim: d });
            }
        }
        if self.aoi.len() != ndim {
            return Err(ConfigError::AoiDimensionMismatch {
                expected: ndim,
                got: self.aoi.len(),
            });
        }
        if self.aoi.iter().any(|&a| a < 0) {
            return Err(ConfigError::NegativeAoi);
        }
        let fanout = 1usize << ndim;
        if self.workers == 0 || self.workers % (fanout - 1) != 1 {
            return Err(ConfigError::InadmissibleWorkers {
                workers: self.workers,
                fanout,
            });
        }
        if self.window == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        Ok(())
    }
}

/// Errors from configuration validation and startup partitioning.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// The world collapses along a dimension.
    EmptyWorld {
        /// The collapsed dimension.
        dim: usize,
    },
    /// The halo-thickness vector has the wrong dimensionality.
    AoiDimensionMismatch {
        /// The world's dimensionality.
        expected: usize,
        /// Entries provided.
        got: usize,
    },
    /// A negative halo thickness.
    NegativeAoi,
    /// The worker count cannot tile a `2^D`-way tree.
    InadmissibleWorkers {
        /// Rejected count.
        workers: usize,
        /// `2^D` for the world's dimensionality.
        fanout: usize,
    },
    /// The timing window must cover at least one tick.
    ZeroWindow,
    /// After the initial uniform split some partition is too thin for
    /// its halo: every side must exceed twice the halo thickness so the
    /// private region stays non-empty.
    PartitionThinnerThanHalo {
        /// Rank whose partition is too thin.
        rank: usize,
        /// The violating dimension.
        dim: usize,
        /// The partition's extent there.
        side: i32,
        /// The halo thickness there.
        aoi: i32,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyWorld { dim } => write!(f, "world is empty along dimension {dim}"),
            Self::AoiDimensionMismatch { expected, got } => {
                write!(f, "aoi has {got} entries for a {expected}-dimensional world")
            }
            Self::NegativeAoi => write!(f, "halo thickness must be non-negative"),
            Self::InadmissibleWorkers { workers, fanout } => {
                write!(f, "worker count {workers} is not 1 modulo {}", fanout - 1)
            }
            Self::ZeroWindow => write!(f, "timing window must be at least one tick"),
            Self::PartitionThinnerThanHalo { rank, dim, side, aoi } => write!(
                f,
                "rank {rank}'s partition spans {side} cells in dimension {dim}, \
                 not enough for a halo of {aoi} on each side"
            ),
        }
    }
}

impl Error for ConfigError {}
