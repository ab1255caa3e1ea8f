//! Command line interface.

use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use clap::Parser;
use covering::config::tunables;
use covering::{generate_random_samples, Config, Elem, Mode, Params, Solution, Solver, Status, Universe};
use itertools::Itertools;

/// Command line arguments.
#[derive(Parser, Debug)]
#[command(
    version,
    about = "Approximate minimum covering designs.",
    long_about = None
)]
pub struct Args {
    /// Size of the sample domain, samples are drawn from 1..=m.
    #[arg(short, default_value_t = 45)]
    pub m: usize,

    /// Number of samples.
    #[arg(short)]
    pub n: usize,

    /// Size of each selected group.
    #[arg(short)]
    pub k: usize,

    /// Size of the subsets that must be covered.
    #[arg(short)]
    pub s: usize,

    /// Size of the combinations whose subsets are covered.
    #[arg(short)]
    pub j: usize,

    /// Number of distinct s-subsets each j-combination needs.
    #[arg(short = 'N', long = "cover", default_value_t = 1)]
    pub cover: usize,

    /// Force a mode (a, b or c) instead of deriving it from N.
    #[arg(long)]
    pub mode: Option<Mode>,

    /// Comma separated samples. Drawn at random when absent.
    #[arg(long, value_delimiter = ',')]
    pub samples: Option<Vec<Elem>>,

    /// Seed of the random sample draw and of the candidate shuffle.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Shuffle candidate groups before selection.
    #[arg(long)]
    pub randomize: bool,

    /// Maximum number of worker threads.
    #[arg(long)]
    pub threads: Option<usize>,

    /// Run everything on the main thread.
    #[arg(long)]
    pub no_parallel: bool,

    /// Disable the combination cache.
    #[arg(long)]
    pub no_cache: bool,

    #[arg(long, default_value_t = 64)]
    pub cache_size: usize,

    /// Time limit in seconds, 0 for none.
    #[arg(long, default_value_t = 0.0)]
    pub timeout: f64,

    /// Print elements as letters by their rank among the samples.
    #[arg(long)]
    pub letters: bool,

    /// Print the tunable parameters and their current values, then exit.
    #[arg(long)]
    pub tunables: bool,

    /// Logging level to use: one of "error", "warn", "info", "debug", "trace"
    #[arg(long, default_value = "warn")]
    pub log_level: tracing::Level,
}

/// Return command line args.
pub fn parse_args() -> Args {
    Args::parse()
}

impl Args {
    pub fn config(&self) -> anyhow::Result<Config> {
        if !self.timeout.is_finite() || self.timeout < 0.0 {
            bail!("invalid time limit: {}", self.timeout);
        }
        let mut config = Config::default()
            .with_parallel(!self.no_parallel)
            .with_cache(!self.no_cache, self.cache_size)
            .with_time_limit(Duration::from_secs_f64(self.timeout))
            .with_letters(self.letters);
        if let Some(threads) = self.threads {
            config = config.with_workers(threads);
        }
        if self.randomize {
            config = config.with_randomization(self.seed);
        }
        Ok(config)
    }

    pub fn params(&self) -> anyhow::Result<Params> {
        let mut params = Params::new(self.m, self.n, self.k, self.s, self.j, self.cover);
        let samples = match &self.samples {
            Some(samples) => samples.clone(),
            None => generate_random_samples(self.m, self.n, self.seed).context("Unable to draw samples")?,
        };
        params = params.with_samples(samples);
        if let Some(mode) = self.mode {
            params = params.with_mode(mode);
        }
        Ok(params)
    }
}

/// Run the solver with the given args.
pub fn run(args: &Args) -> anyhow::Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_timer(tracing_subscriber::fmt::time::Uptime::from(Instant::now()))
        .with_thread_ids(true)
        .with_max_level(args.log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if args.tunables {
        for t in tunables() {
            println!("{:<32} {:<10} {}", t.var(), t.current(), t.doc());
        }
        return Ok(());
    }

    let solver = Solver::new(args.config()?);
    let params = args.params()?;
    let solution = solver.solve(&params);
    print!("{}", report(&params, &solution, solver.config().letters));

    match solution.status {
        Status::Success => Ok(()),
        status => bail!("{status}: {}", solution.message),
    }
}

/// Human readable account of a solution.
pub fn report(params: &Params, solution: &Solution, letters: bool) -> String {
    let mut out = String::new();
    let mode = solution.mode.unwrap_or_else(|| params.mode());
    out += &format!(
        "m={} n={} k={} s={} j={} N={} mode={mode}\n",
        params.m, params.n, params.k, params.s, params.j, params.cover
    );
    // a failed solve has no validated universe, fall back to plain numbers
    let universe = Universe::new(params.m, solution.samples.len(), &solution.samples).ok();
    let format = |group: &[Elem]| match &universe {
        Some(u) => u.format_group(group, letters),
        None => format!("[{}]", group.iter().join(",")),
    };
    if !solution.samples.is_empty() {
        out += &format!("samples: {}\n", format(&solution.samples));
    }
    for (i, group) in solution.groups.iter().enumerate() {
        out += &format!("{:>4}: {}\n", i + 1, format(group));
    }
    out += &format!(
        "status: {}  groups: {}  coverage: {:.2}%  time: {:.3}s\n",
        solution.status,
        solution.total_groups,
        solution.coverage_ratio * 100.0,
        solution.elapsed.as_secs_f64()
    );
    if let Some(metrics) = &solution.metrics {
        out += &format!(
            "avg group size: {:.2}  similarity: {:.4}  candidates: {}\n",
            metrics.avg_group_size, metrics.inter_group_similarity, metrics.total_combinations
        );
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;

    fn args(line: &str) -> Args {
        Args::try_parse_from(line.split_whitespace()).unwrap()
    }

    #[test]
    fn parses_problem() {
        let a = args("covering -m 45 -n 7 -k 5 -s 3 -j 4 --samples 1,2,3,4,5,6,7");
        assert_eq!((a.m, a.n, a.k, a.s, a.j, a.cover), (45, 7, 5, 3, 4, 1));
        assert_eq!(a.samples, Some(vec![1, 2, 3, 4, 5, 6, 7]));
        assert_eq!(a.log_level, tracing::Level::WARN);
        let params = a.params().unwrap();
        assert_eq!(params.mode(), Mode::A);
    }

    #[test]
    fn mode_and_cover() {
        let a = args("covering -n 8 -k 6 -s 3 -j 5 -N 4 --mode c --seed 3");
        assert_eq!(a.cover, 4);
        assert_eq!(a.mode, Some(Mode::C));
        let params = a.params().unwrap();
        assert_eq!(params.mode(), Mode::C);
        assert_eq!(params.samples.as_ref().map(Vec::len), Some(8));
        assert!(Args::try_parse_from("covering -n 8 -k 6 -s 3 -j 5 --mode z".split_whitespace()).is_err());
    }

    #[test]
    fn config_flags() {
        let conf = args("covering -n 7 -k 5 -s 3 -j 4 --no-parallel --no-cache --timeout 1.5 --randomize --seed 9")
            .config()
            .unwrap();
        assert!(!conf.parallel);
        assert!(conf.cache_capacity().is_none());
        assert_eq!(conf.time_limit, Duration::from_millis(1500));
        assert!(conf.randomize);
        assert_eq!(conf.seed, Some(9));
        assert!(!conf.letters);
        assert!(args("covering -n 7 -k 5 -s 3 -j 4 --timeout=-1").config().is_err());
    }

    #[test]
    fn report_lists_groups() {
        let a = args("covering -n 7 -k 5 -s 3 -j 4 --samples 3,9,12,18,25,31,40 --letters");
        let params = a.params().unwrap();
        let solver = Solver::new(a.config().unwrap());
        assert!(solver.config().letters);
        let solution = solver.solve(&params);
        assert_eq!(solution.status, Status::Success);
        let text = report(&params, &solution, solver.config().letters);
        assert!(text.contains("samples: [ABCDEFG]"));
        assert!(text.contains("status: success"));
        assert_eq!(text.lines().filter(|l| l.contains(": [")).count(), solution.groups.len() + 1);
    }

    #[test]
    fn report_of_failure() {
        let params = Params::new(45, 7, 8, 3, 3, 1).with_samples((1..=7).collect());
        let solution = Solver::default().solve(&params);
        let text = report(&params, &solution, false);
        assert!(text.contains("status: no-solution"));
    }
}
