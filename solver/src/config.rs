use env_param::{Describe, EnvParam};
use std::num::NonZeroUsize;
use std::time::Duration;

/// Width of the Mode A beam.
pub static BEAM_WIDTH: EnvParam<usize> = EnvParam::new("COVERING_BEAM_WIDTH", "40", "states kept per beam iteration");
/// Maximum number of beam iterations for Mode A.
pub static BEAM_ITERATIONS: EnvParam<usize> =
    EnvParam::new("COVERING_BEAM_ITERATIONS", "200", "maximum number of beam iterations");
/// Fraction of all j-combinations an s-subset must newly cover to be picked in the first preprocessing phase.
pub static PHASE1_GAIN: EnvParam<f64> =
    EnvParam::new("COVERING_PHASE1_GAIN", "0.05", "gain floor of the big-step preprocessing phase");
/// Gain floor, as a fraction of all j-combinations, of the second preprocessing phase.
pub static PHASE2_GAIN: EnvParam<f64> =
    EnvParam::new("COVERING_PHASE2_GAIN", "0.001", "gain floor of the low-overlap preprocessing phase");
/// Minimum Jaccard distance to previous selections required in the second preprocessing phase.
pub static PHASE2_DISTANCE: EnvParam<f64> = EnvParam::new(
    "COVERING_PHASE2_DISTANCE",
    "0.5",
    "minimum Jaccard distance of the low-overlap preprocessing phase",
);
/// Minimum number of combinations a parallel enumeration worker is given.
pub static PAR_MIN_COMBINATIONS: EnvParam<usize> = EnvParam::new(
    "COVERING_PAR_MIN_COMBINATIONS",
    "1000",
    "minimum number of combinations emitted by a parallel enumeration worker",
);
/// Minimum number of j-combinations a coverage worker is given.
pub static PAR_MIN_J: EnvParam<usize> = EnvParam::new(
    "COVERING_PAR_MIN_J",
    "100",
    "minimum number of j-combinations evaluated by a coverage worker",
);
/// Largest enumeration a solve may materialize, for each of the groups, j-combinations and s-subsets.
pub static MAX_COMBINATIONS: EnvParam<u64> = EnvParam::new(
    "COVERING_MAX_COMBINATIONS",
    "10000000",
    "maximum number of combinations in a single enumeration",
);

/// Enumeration budget, never above what a dense `u32` id can address.
pub fn max_combinations() -> u64 {
    MAX_COMBINATIONS.get().min(u32::MAX as u64)
}

/// All tunables of the crate, for display purposes.
pub fn tunables() -> [&'static dyn Describe; 8] {
    [
        &BEAM_WIDTH,
        &BEAM_ITERATIONS,
        &PHASE1_GAIN,
        &PHASE2_GAIN,
        &PHASE2_DISTANCE,
        &PAR_MIN_COMBINATIONS,
        &PAR_MIN_J,
        &MAX_COMBINATIONS,
    ]
}

/// Runtime configuration of a solve.
#[derive(Clone, Debug)]
pub struct Config {
    /// If false, enumeration and coverage evaluation run on the calling thread only.
    pub parallel: bool,
    /// Upper bound on the number of workers. `None` defaults to the hardware concurrency.
    pub num_workers: Option<usize>,
    /// Zero means no limit.
    pub time_limit: Duration,
    pub cache: bool,
    /// Maximum number of (length, arity) enumerations kept by the combination cache.
    pub max_cache_entries: usize,
    /// Shuffle the candidate groups before selection, which changes tie-breaking.
    pub randomize: bool,
    pub seed: Option<u64>,
    /// Display elements as letters (`A`, `B`, ...) by their position in the universe.
    pub letters: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            parallel: true,
            num_workers: None,
            time_limit: Duration::ZERO,
            cache: true,
            max_cache_entries: 64,
            randomize: false,
            seed: None,
            letters: false,
        }
    }
}

impl Config {
    /// A configuration running everything on the calling thread.
    pub fn sequential() -> Self {
        Config {
            parallel: false,
            ..Default::default()
        }
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = Some(num_workers);
        self
    }

    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = limit;
        self
    }

    pub fn with_cache(mut self, enabled: bool, max_entries: usize) -> Self {
        self.cache = enabled;
        self.max_cache_entries = max_entries;
        self
    }

    pub fn with_randomization(mut self, seed: Option<u64>) -> Self {
        self.randomize = true;
        self.seed = seed;
        self
    }

    pub fn with_letters(mut self, letters: bool) -> Self {
        self.letters = letters;
        self
    }

    /// Number of workers available to parallel operations, at least one.
    pub fn worker_budget(&self) -> usize {
        if !self.parallel {
            return 1;
        }
        let hardware = std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1);
        self.num_workers.unwrap_or(hardware).clamp(1, hardware.max(1))
    }

    /// Cache capacity, `None` when caching is disabled.
    pub fn cache_capacity(&self) -> Option<NonZeroUsize> {
        if self.cache {
            NonZeroUsize::new(self.max_cache_entries)
        } else {
            None
        }
    }

    pub fn deadline(&self, start: std::time::Instant) -> Option<std::time::Instant> {
        if self.time_limit.is_zero() {
            None
        } else {
            Some(start + self.time_limit)
        }
    }
}
