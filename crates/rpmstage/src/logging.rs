use std::fmt;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing::{Event, Subscriber};
use tracing_subscriber::{EnvFilter, Layer};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

use crate::error::{Error, Result};

/// `2024-05-01 12:00:00 : [INFO] message`, the layout of `package.log`.
pub struct PackageLogFormat;

impl<S, N> FormatEvent<S, N> for PackageLogFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(
            writer,
            "{} : [{}] ",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            event.metadata().level()
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

fn filter_for(level: Option<&str>) -> Result<EnvFilter> {
    match level {
        Some(l) => EnvFilter::try_new(l)
            .map_err(|e| Error::config(format!("invalid log level '{l}': {e}"))),
        None => Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))),
    }
}

pub fn init(level: Option<&str>, log_file: Option<&Path>) -> Result<()> {
    let stderr = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(filter_for(level)?);

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                crate::util::ensure_dir(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| Error::fs(format!("failed to open log {}: {e}", path.display())))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .event_format(PackageLogFormat)
                    .with_filter(filter_for(level)?),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(stderr)
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::config(format!("failed to install logger: {e}")))
}
