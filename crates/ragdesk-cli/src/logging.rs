// Logging and verbosity control

use std::sync::atomic::{AtomicU8, Ordering};

use tracing::Level;

/// Global verbosity level
static VERBOSITY: AtomicU8 = AtomicU8::new(1);

/// Verbosity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum VerbosityLevel {
    /// Quiet mode - results only
    Quiet = 0,
    /// Normal mode - standard output
    Normal = 1,
    /// Verbose mode - detailed output
    Verbose = 2,
}

impl VerbosityLevel {
    /// Get the current verbosity level
    pub fn current() -> Self {
        match VERBOSITY.load(Ordering::Relaxed) {
            0 => VerbosityLevel::Quiet,
            1 => VerbosityLevel::Normal,
            _ => VerbosityLevel::Verbose,
        }
    }

    /// Set the verbosity level
    pub fn set(level: Self) {
        VERBOSITY.store(level as u8, Ordering::Relaxed);
    }

    pub fn from_flags(verbose: bool, quiet: bool) -> Self {
        if quiet {
            VerbosityLevel::Quiet
        } else if verbose {
            VerbosityLevel::Verbose
        } else {
            VerbosityLevel::Normal
        }
    }
}

/// Tracing level for the subscriber
///
/// `--verbose` forces debug, `--quiet` forces error; otherwise the
/// configured `log_level` applies (warn when unrecognised).
pub fn tracing_level(level: VerbosityLevel, configured: &str) -> Level {
    match level {
        VerbosityLevel::Verbose => Level::DEBUG,
        VerbosityLevel::Quiet => Level::ERROR,
        VerbosityLevel::Normal => configured.parse().unwrap_or(Level::WARN),
    }
}

/// Initialize logging based on CLI flags and the configured level
///
/// Diagnostics go to stderr so command output stays pipeable.
pub fn init_logging(verbose: bool, quiet: bool, configured: &str) {
    let level = VerbosityLevel::from_flags(verbose, quiet);
    VerbosityLevel::set(level);

    // A second initialisation (tests) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing_level(level, configured))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
