//! Tracing setup for the dbtools binary.

use tracing_subscriber::EnvFilter;

use crate::error::{DbToolsError, DbToolsResult};

const DEFAULT_LOG_FILTER: &str = "dbtools=warn";
const VERBOSE_LOG_FILTER: &str = "dbtools=debug";

/// Filter used when `RUST_LOG` is unset.
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        VERBOSE_LOG_FILTER
    } else {
        DEFAULT_LOG_FILTER
    }
}

/// Install a stderr subscriber. `RUST_LOG` overrides the default filter.
pub fn init_logging(verbose: bool) -> DbToolsResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| DbToolsError::Config(format!("Cannot initialize logging: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        assert_eq!(default_filter(false), "dbtools=warn");
        assert_eq!(default_filter(true), "dbtools=debug");
    }
}
