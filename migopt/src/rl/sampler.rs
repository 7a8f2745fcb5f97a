// src/rl/sampler.rs
//
// Training circuit sampler.
//
// Picks which circuit description to open at each reset. Draws are uniform
// over the pool from a seeded ChaCha8Rng, so the same seed yields the same
// circuit sequence. A draw that fails to load is logged and redrawn from the
// circuits not yet tried, up to `max_attempts` per reset; exhausting the bound
// or the pool is reported, never masked.

use std::fmt;
use std::path::PathBuf;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::circuit::CircuitState;
use crate::optimizer::{LoadError, OptimizerFactory};

#[derive(Debug, Clone, PartialEq)]
pub enum SamplerError {
    /// No circuits to draw from.
    EmptyPool,
    /// Every attempt failed to load.
    NoViableCircuit { attempts: u32, last_error: LoadError },
}

impl fmt::Display for SamplerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SamplerError::EmptyPool => write!(f, "Circuit pool is empty"),
            SamplerError::NoViableCircuit {
                attempts,
                last_error,
            } => write!(
                f,
                "No viable circuit after {} attempts (last error: {})",
                attempts, last_error
            ),
        }
    }
}

impl std::error::Error for SamplerError {}

#[derive(Debug, Clone)]
pub struct CircuitSampler {
    circuits: Vec<PathBuf>,
    max_attempts: u32,
    rng: ChaCha8Rng,
}

impl CircuitSampler {
    pub fn new(circuits: Vec<PathBuf>, max_attempts: u32, seed: u64) -> Self {
        Self {
            circuits,
            max_attempts: max_attempts.max(1),
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Reseed the sampler.
    pub fn reseed(&mut self, seed: u64) {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
    }

    pub fn circuits(&self) -> &[PathBuf] {
        &self.circuits
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Draw and load a circuit, redrawing on load failure.
    ///
    /// A circuit that failed is not drawn again within the same call, so a
    /// draw stops early once every circuit in the pool has been tried.
    pub fn draw(&mut self, factory: &dyn OptimizerFactory) -> Result<CircuitState, SamplerError> {
        if self.circuits.is_empty() {
            return Err(SamplerError::EmptyPool);
        }

        let mut untried: Vec<usize> = (0..self.circuits.len()).collect();
        let mut last_error = None;
        let mut attempts = 0;

        while attempts < self.max_attempts && !untried.is_empty() {
            attempts += 1;
            let slot = self.rng.gen_range(0..untried.len());
            let idx = untried.swap_remove(slot);
            let path = self.circuits[idx].clone();

            match CircuitState::load(factory, &path) {
                Ok(state) => return Ok(state),
                Err(e) => {
                    eprintln!(
                        "[sampler] WARN: attempt {}/{} failed: {}",
                        attempts, self.max_attempts, e
                    );
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(last_error) => Err(SamplerError::NoViableCircuit {
                attempts,
                last_error,
            }),
            None => Err(SamplerError::EmptyPool),
        }
    }
}
