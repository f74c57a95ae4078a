//! Tracing/logging setup shared by binaries.

pub mod logging;

pub use logging::{LogFormat, UnknownLogFormat};

/// Initialize process-wide logging, format taken from `LOG_FORMAT`.
///
/// An unrecognized value falls back to JSON and is reported once the
/// subscriber is up. Safe to call multiple times; later calls are no-ops.
pub fn init() {
    let resolved = resolve_format(std::env::var("LOG_FORMAT").ok().as_deref());
    let format = resolved.clone().unwrap_or_default();
    logging::init(format);

    if let Err(e) = resolved {
        tracing::warn!(error = %e, fallback = ?format, "ignoring LOG_FORMAT");
    }
}

/// Parse an optional `LOG_FORMAT` value; unset means the default format.
pub fn resolve_format(raw: Option<&str>) -> Result<LogFormat, UnknownLogFormat> {
    raw.map_or(Ok(LogFormat::default()), str::parse::<LogFormat>)
}
