//! # Configuration Logic
//!
//! ## Role
//! CLI argument parsing and validation.
//!
//! ## Validation
//! - `nhalo_min >= 1`
//! - `nthreads >= 1` when given
//! - `match_bins >= 1`
//! - the input run file exists
//!
//! ## Example CLI
//! ```bash
//! galsampler --input run.json --out selection.json --nhalo-min 5 --seed 43
//! ```

use std::path::PathBuf;

use clap::Parser;

use crate::error::{GalsamplerError, Result};
use crate::utils::threading::default_threads;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "galsampler",
    version,
    about = "Populate target halos with galaxies resampled from a source catalog"
)]
pub struct Config {
    /// JSON run file: bins, source halos, source galaxies, target halos
    #[arg(long)]
    pub input: PathBuf,

    /// Output JSON file for the selected galaxy indices
    #[arg(long)]
    pub out: PathBuf,

    /// Minimum source halos for a cell to be used without fallback
    #[arg(long, default_value_t = 1)]
    pub nhalo_min: usize,

    /// Random seed (OS entropy when absent)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Worker threads (default: all cores)
    #[arg(long)]
    pub nthreads: Option<usize>,

    /// Match this secondary property within each cell instead of drawing
    /// uniformly; `richness` uses the computed source occupation
    #[arg(long)]
    pub match_property: Option<String>,

    /// Histogram bins used by distribution matching
    #[arg(long, default_value_t = 10)]
    pub match_bins: usize,

    /// Do not broadcast target halo ids to the selected galaxies
    #[arg(long)]
    pub no_track_ids: bool,

    /// Print hierarchical timing spans
    #[arg(long)]
    pub profile: bool,

    /// Seconds between heartbeat lines
    #[arg(long, default_value_t = 30)]
    pub heartbeat_secs: u64,
}

impl Config {
    pub fn parse_and_validate() -> Result<Self> {
        let config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.nhalo_min == 0 {
            return Err(GalsamplerError::config("--nhalo-min must be at least 1"));
        }
        if self.nthreads == Some(0) {
            return Err(GalsamplerError::config("--nthreads must be at least 1"));
        }
        if self.match_bins == 0 {
            return Err(GalsamplerError::config("--match-bins must be at least 1"));
        }
        if !self.input.exists() {
            return Err(GalsamplerError::config(format!(
                "input file {} does not exist",
                self.input.display()
            )));
        }
        Ok(())
    }

    pub fn nthreads(&self) -> usize {
        self.nthreads.unwrap_or_else(default_threads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Config::try_parse_from(std::iter::once("galsampler").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&["--input", "run.json", "--out", "out.json"]);
        assert_eq!(config.nhalo_min, 1);
        assert_eq!(config.match_bins, 10);
        assert_eq!(config.seed, None);
        assert!(!config.no_track_ids);
        assert!(config.nthreads() >= 1);
    }

    #[test]
    fn test_validation() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap();

        assert!(parse(&["--input", path, "--out", "o.json"]).validate().is_ok());
        assert!(parse(&["--input", path, "--out", "o.json", "--nhalo-min", "0"])
            .validate()
            .is_err());
        assert!(parse(&["--input", path, "--out", "o.json", "--nthreads", "0"])
            .validate()
            .is_err());
        assert!(matches!(
            parse(&["--input", "/nonexistent.json", "--out", "o.json"]).validate(),
            Err(GalsamplerError::Config { .. })
        ));
    }
}
