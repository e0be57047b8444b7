use anyhow::{Context, Result};
use clap::ValueEnum;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::cli::Cli;
use crate::scan::{ArchiveFilter, DEFAULT_EXTENSIONS};

pub const DIR_ENV: &str = "JAVADOC_DIR";

const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(150);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, ValueEnum)]
pub enum WatchMode {
    /// OS filesystem notifications.
    #[default]
    Notify,
    /// Periodic directory rescans.
    Poll,
    /// Keep the initial index.
    Off,
}

/// What to do when filesystem notifications cannot be set up.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, ValueEnum)]
pub enum WatchFallback {
    #[default]
    Poll,
    Static,
    Fail,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub dir: PathBuf,
    pub extensions: Vec<String>,
    pub watch: WatchMode,
    pub fallback: WatchFallback,
    pub debounce: Duration,
    pub poll_interval: Duration,
}

impl StoreConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            watch: WatchMode::default(),
            fallback: WatchFallback::default(),
            debounce: DEFAULT_DEBOUNCE,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_watch(mut self, watch: WatchMode) -> Self {
        self.watch = watch;
        self
    }

    pub fn with_fallback(mut self, fallback: WatchFallback) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.max(Duration::from_millis(10));
        self
    }

    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    pub fn filter(&self) -> ArchiveFilter {
        ArchiveFilter::new(&self.extensions)
    }
}

/// `--dir`, then `$JAVADOC_DIR`, then the per-user data directory.
pub fn resolve_archive_dir(cli: &Cli) -> Result<PathBuf> {
    if let Some(p) = cli.dir.clone() {
        return Ok(p);
    }

    if let Ok(p) = env::var(DIR_ENV)
        && !p.trim().is_empty()
    {
        return Ok(PathBuf::from(p));
    }

    Ok(javadoc_store_home()?.join("archives"))
}

pub fn store_config(cli: &Cli) -> Result<StoreConfig> {
    let mut config = StoreConfig::new(resolve_archive_dir(cli)?);
    if !cli.extensions.is_empty() {
        config = config.with_extensions(cli.extensions.iter().cloned());
    }
    Ok(config)
}

fn javadoc_store_home() -> Result<PathBuf> {
    let base = dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .context("Failed to resolve data directory")?;
    Ok(base.join("javadoc-store"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn explicit_dir_and_extensions_win() -> Result<()> {
        let cli = Cli::parse_from([
            "javadoc-store",
            "--dir",
            "/tmp/javadocs",
            "--extensions",
            "zip,jdoc",
            "archives",
        ]);
        let config = store_config(&cli)?;
        assert_eq!(config.dir, PathBuf::from("/tmp/javadocs"));
        assert_eq!(config.extensions, vec!["zip".to_string(), "jdoc".to_string()]);
        assert!(config.filter().matches(std::path::Path::new("/tmp/javadocs/a.jdoc")));
        assert!(!config.filter().matches(std::path::Path::new("/tmp/javadocs/a.jar")));
        Ok(())
    }

    #[test]
    fn defaults_watch_with_notifications() {
        let config = StoreConfig::new("/tmp/x").with_poll_interval(Duration::ZERO);
        assert_eq!(config.watch, WatchMode::Notify);
        assert_eq!(config.fallback, WatchFallback::Poll);
        assert_eq!(config.poll_interval, Duration::from_millis(10));
        assert_eq!(config.extensions, vec!["zip".to_string(), "jar".to_string()]);
    }
}
