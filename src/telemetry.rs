//! Logging setup for applications embedding the client.
//!
//! The library itself only emits `tracing` events and spans; nothing is
//! printed unless the host application installs a subscriber, either its own
//! or the one built here.

use anyhow::Result;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    Pretty,
    Json,
}

/// Map a verbosity count (`-v` repetitions) to a level.
#[must_use]
pub fn verbosity_level(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        3 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// `RUST_LOG` takes precedence over `level`.
/// # Errors
/// Returns an error if a built-in directive fails to parse.
pub fn env_filter(level: Level) -> Result<EnvFilter> {
    Ok(EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy()
        .add_directive("hyper=error".parse()?)
        .add_directive("hyper_util=error".parse()?)
        .add_directive("reqwest=warn".parse()?))
}

/// Install a global subscriber.
/// # Errors
/// Returns an error if a subscriber is already installed.
pub fn init(verbosity_level: Option<Level>, format: Format) -> Result<()> {
    let filter = env_filter(verbosity_level.unwrap_or(Level::ERROR))?;

    match format {
        Format::Pretty => {
            let fmt_layer = fmt::layer()
                .with_file(false)
                .with_line_number(false)
                .with_thread_ids(false)
                .with_target(false)
                .pretty();
            let subscriber = Registry::default().with(fmt_layer).with(filter);
            tracing::subscriber::set_global_default(subscriber)?;
        }
        Format::Json => {
            let fmt_layer = fmt::layer()
                .with_target(false)
                .json()
                .with_current_span(true)
                .with_span_list(true);
            let subscriber = Registry::default().with(fmt_layer).with(filter);
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_levels() {
        assert_eq!(verbosity_level(0), Level::ERROR);
        assert_eq!(verbosity_level(1), Level::WARN);
        assert_eq!(verbosity_level(2), Level::INFO);
        assert_eq!(verbosity_level(3), Level::DEBUG);
        assert_eq!(verbosity_level(4), Level::TRACE);
        assert_eq!(verbosity_level(u8::MAX), Level::TRACE);
    }

    #[test]
    fn env_filter_uses_level_as_default() -> Result<()> {
        temp_env::with_var("RUST_LOG", None::<&str>, || -> Result<()> {
            let filter = env_filter(Level::DEBUG)?;
            assert!(filter.to_string().contains("debug"));
            Ok(())
        })
    }

    #[test]
    fn env_filter_honours_rust_log() -> Result<()> {
        temp_env::with_var("RUST_LOG", Some("mfa_push=trace"), || -> Result<()> {
            let filter = env_filter(Level::ERROR)?;
            assert!(filter.to_string().contains("mfa_push=trace"));
            Ok(())
        })
    }
}
