//! Log subscriber setup
//!
//! Human-readable lines on stderr. Every formatted line goes through a
//! [`Redactor`] before it is written, so a credential that slips into a log
//! field is still masked.

use crate::command::Redactor;
use std::io::{self, Write};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is not set.
pub fn default_filter(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "daily_workbook=info",
        1 => "daily_workbook=debug",
        _ => "daily_workbook=trace",
    }
}

/// Install the global subscriber. A second call is a no-op.
pub fn init(verbosity: u8, redactor: Redactor) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbosity)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(RedactingMakeWriter::new(redactor, io::stderr))
        .try_init();
}

/// Hands out [`RedactingWriter`]s around whatever `make` produces.
#[derive(Clone)]
pub struct RedactingMakeWriter<F> {
    redactor: Redactor,
    make: F,
}

impl<F> RedactingMakeWriter<F> {
    pub fn new(redactor: Redactor, make: F) -> Self {
        Self { redactor, make }
    }
}

impl<'a, F, W> MakeWriter<'a> for RedactingMakeWriter<F>
where
    F: Fn() -> W + 'static,
    W: Write,
{
    type Writer = RedactingWriter<'a, W>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter {
            redactor: &self.redactor,
            inner: (self.make)(),
        }
    }
}

/// Masks secrets in each buffer before passing it on. The fmt layer writes one
/// whole event per call.
pub struct RedactingWriter<'a, W: Write> {
    redactor: &'a Redactor,
    inner: W,
}

impl<W: Write> Write for RedactingWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let text = String::from_utf8_lossy(buf);
        self.inner
            .write_all(self.redactor.redact(&text).as_bytes())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
