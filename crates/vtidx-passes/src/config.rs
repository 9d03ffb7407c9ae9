// src/config.rs
//
// Options shared by every pass.

use std::num::NonZeroUsize;
use std::str::FromStr;

use miette::Diagnostic;
use thiserror::Error;

pub const THREADS_ENV: &str = "VTIDX_THREADS";
pub const TABLE_PREFIX_ENV: &str = "VTIDX_TABLE_PREFIX";

const DEFAULT_TABLE_PREFIX: &str = "vtable";

#[derive(Error, Debug, Diagnostic, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid thread count '{value}'")]
    #[diagnostic(
        code(E4101),
        help("use 'auto', 0 or 1 for sequential, or a positive number of threads")
    )]
    InvalidThreads { value: String },

    #[error("invalid table prefix '{value}'")]
    #[diagnostic(
        code(E4102),
        help("the prefix must be non-empty and contain no whitespace")
    )]
    InvalidTablePrefix { value: String },
}

/// How function bodies are scheduled during a pass's parallel phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Parallelism {
    Sequential,
    /// One worker per available core.
    #[default]
    Auto,
    Threads(NonZeroUsize),
}

impl Parallelism {
    pub fn thread_count(self) -> usize {
        match self {
            Parallelism::Sequential => 1,
            Parallelism::Auto => std::thread::available_parallelism().map_or(1, NonZeroUsize::get),
            Parallelism::Threads(n) => n.get(),
        }
    }
}

impl FromStr for Parallelism {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("auto") {
            return Ok(Parallelism::Auto);
        }
        match s.parse::<usize>() {
            Ok(0 | 1) => Ok(Parallelism::Sequential),
            Ok(n) => Ok(NonZeroUsize::new(n).map_or(Parallelism::Sequential, Parallelism::Threads)),
            Err(_) => Err(ConfigError::InvalidThreads {
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassOptions {
    pub parallelism: Parallelism,
    /// Prefix for the names of synthesized dispatch tables.
    pub table_prefix: String,
}

impl Default for PassOptions {
    fn default() -> Self {
        Self {
            parallelism: Parallelism::Auto,
            table_prefix: DEFAULT_TABLE_PREFIX.to_string(),
        }
    }
}

impl PassOptions {
    /// Defaults overridden by `VTIDX_THREADS` and `VTIDX_TABLE_PREFIX`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like `from_env`, reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut options = Self::default();
        if let Some(threads) = lookup(THREADS_ENV) {
            options.parallelism = threads.parse()?;
        }
        if let Some(prefix) = lookup(TABLE_PREFIX_ENV) {
            options = options.with_table_prefix(prefix)?;
        }
        Ok(options)
    }

    pub fn with_parallelism(mut self, parallelism: Parallelism) -> Self {
        self.parallelism = parallelism;
        self
    }

    pub fn with_table_prefix(mut self, prefix: impl Into<String>) -> Result<Self, ConfigError> {
        let prefix = prefix.into();
        if prefix.is_empty() || prefix.chars().any(char::is_whitespace) {
            return Err(ConfigError::InvalidTablePrefix { value: prefix });
        }
        self.table_prefix = prefix;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key: &str| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn defaults_without_environment() {
        let options = PassOptions::from_lookup(lookup(&[])).unwrap();
        assert_eq!(options, PassOptions::default());
        assert_eq!(options.table_prefix, "vtable");
        assert_eq!(options.parallelism, Parallelism::Auto);
    }

    #[test]
    fn parses_thread_counts() {
        assert_eq!("0".parse::<Parallelism>().unwrap(), Parallelism::Sequential);
        assert_eq!("1".parse::<Parallelism>().unwrap(), Parallelism::Sequential);
        assert_eq!("AUTO".parse::<Parallelism>().unwrap(), Parallelism::Auto);
        assert_eq!(
            "4".parse::<Parallelism>().unwrap(),
            Parallelism::Threads(NonZeroUsize::new(4).unwrap())
        );
        assert_eq!(
            "many".parse::<Parallelism>(),
            Err(ConfigError::InvalidThreads {
                value: "many".into()
            })
        );
    }

    #[test]
    fn environment_overrides_defaults() {
        let options = PassOptions::from_lookup(lookup(&[
            (THREADS_ENV, "3"),
            (TABLE_PREFIX_ENV, "dispatch"),
        ]))
        .unwrap();
        assert_eq!(options.parallelism.thread_count(), 3);
        assert_eq!(options.table_prefix, "dispatch");
    }

    #[test]
    fn rejects_bad_prefix() {
        let err = PassOptions::from_lookup(lookup(&[(TABLE_PREFIX_ENV, "two words")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTablePrefix { .. }));
        assert!(PassOptions::default().with_table_prefix("").is_err());
    }

    #[test]
    fn sequential_uses_one_thread() {
        assert_eq!(Parallelism::Sequential.thread_count(), 1);
        assert!(Parallelism::Auto.thread_count() >= 1);
    }
}
