//! Logging in both directions across the plugin boundary
//!
//! Plugin diagnostics arrive through `extern "C"` callbacks and are re-emitted
//! on the `log` facade under [`NATIVE_TARGET`]. Application records can be
//! forwarded to the host with [`HostLogForwarder`].

use crate::api::{to_cstring, RenderStreamApi};
use log::{Level, Log, Metadata, Record};
use std::ffi::{c_char, CStr};
use std::sync::Arc;

/// Log target for messages that originate inside the plugin
pub const NATIVE_TARGET: &str = "renderstream::native";

fn native_message(message: *const c_char) -> String {
    if message.is_null() {
        return String::new();
    }
    // Safety: the plugin passes a NUL-terminated string valid for the call
    unsafe { CStr::from_ptr(message) }
        .to_string_lossy()
        .into_owned()
}

pub(crate) extern "C" fn log_info(message: *const c_char) {
    log::info!(target: NATIVE_TARGET, "{}", native_message(message));
}

pub(crate) extern "C" fn log_error(message: *const c_char) {
    log::error!(target: NATIVE_TARGET, "{}", native_message(message));
}

pub(crate) extern "C" fn log_verbose(message: *const c_char) {
    log::debug!(target: NATIVE_TARGET, "{}", native_message(message));
}

/// Prefix a message with the host's severity markers
pub fn format_for_host(level: Level, message: &str) -> String {
    match level {
        Level::Error => format!("!!!!! {}", message),
        Level::Warn => format!("!!! {}", message),
        _ => message.to_string(),
    }
}

/// A `log::Log` wrapper that also sends records to the host
pub struct HostLogForwarder<L: Log> {
    inner: L,
    host: Arc<dyn RenderStreamApi>,
}

impl<L: Log> HostLogForwarder<L> {
    pub fn new(inner: L, host: Arc<dyn RenderStreamApi>) -> Self {
        Self { inner, host }
    }

    /// Whether a record is sent to the host
    pub fn forwards(&self, record: &Record) -> bool {
        // Records from the plugin itself would loop back
        record.target() != NATIVE_TARGET && self.host.is_available()
    }
}

impl<L: Log + 'static> HostLogForwarder<L> {
    /// Install as the global logger
    pub fn install(self, max_level: log::LevelFilter) -> Result<(), log::SetLoggerError> {
        log::set_boxed_logger(Box::new(self))?;
        log::set_max_level(max_level);
        Ok(())
    }
}

impl<L: Log> Log for HostLogForwarder<L> {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        self.inner.log(record);

        if !self.forwards(record) {
            return;
        }
        let message = format_for_host(record.level(), &record.args().to_string());
        // Messages with interior NULs are dropped for the host only
        if let Ok(message) = to_cstring(&message) {
            self.host.log_to_host(&message);
        }
    }

    fn flush(&self) {
        self.inner.flush();
    }
}
