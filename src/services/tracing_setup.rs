//! Tracing subscriber setup
//!
//! Shared by the `tmbind` binary and tests.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global tracing subscriber.
///
/// Logs go to `log_file_path` when given, stderr otherwise. `RUST_LOG`
/// overrides `default_directive`.
pub fn init_global(log_file_path: Option<&Path>, default_directive: &str) -> std::io::Result<()> {
    let log_file = log_file_path.map(File::create).transpose()?;
    let subscriber = build_subscriber(log_file, default_directive);
    subscriber.init();
    Ok(())
}

/// Build a subscriber writing to `log_file`, or stderr when `None`.
pub fn build_subscriber(
    log_file: Option<File>,
    default_directive: &str,
) -> impl tracing::Subscriber + Send + Sync {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let writer = match log_file {
        Some(file) => BoxMakeWriter::new(Arc::new(file)),
        None => BoxMakeWriter::new(std::io::stderr),
    };
    let fmt_layer = fmt::layer().with_writer(writer).with_ansi(false);

    tracing_subscriber::registry().with(fmt_layer).with(env_filter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_subscriber_writes_to_log_file() {
        let log_file = NamedTempFile::new().unwrap();
        let subscriber = build_subscriber(Some(log_file.reopen().unwrap()), "debug");

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("Built grammar set with 3 grammars");
        });

        let contents = std::fs::read_to_string(log_file.path()).unwrap();
        assert!(contents.contains("INFO"));
        assert!(contents.contains("Built grammar set with 3 grammars"));
    }
}
