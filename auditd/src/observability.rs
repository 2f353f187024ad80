//! Tracing initialization and the logging context handed to every component

use tracing_subscriber::EnvFilter;

use crate::error::{ErrorCode, Result};

/// Initialize JSON tracing output filtered by `log_level`
///
/// Falls back to `info` when the filter directive cannot be parsed. Calling
/// this twice is harmless: the second subscriber is simply not installed.
pub fn init_tracing(log_level: &str) -> Result<()> {
    let installed = tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("Tracing initialized at level {}", log_level);
    }

    Ok(())
}

/// Identity attached to every diagnostic the pipeline emits
///
/// Passed by value into each component constructor instead of living in a
/// process-wide static, so two pipelines in one process log independently.
#[derive(Debug, Clone)]
pub struct LogContext {
    service_name: String,
    hostname: String,
}

impl LogContext {
    /// Create a context for the given service and host
    pub fn new(service_name: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            hostname: hostname.into(),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Centralized error reporting
    ///
    /// Every failure in the crate is surfaced here exactly once, keyed by its
    /// code plus an optional context string (a path, a payload, a field name).
    pub fn report(&self, code: ErrorCode, context: Option<&str>) {
        match context {
            Some(context) => tracing::warn!(
                service_name = %self.service_name,
                hostname = %self.hostname,
                error.kind = %code.kind(),
                error.code = %code,
                "{}: {}",
                code.message(),
                context
            ),
            None => tracing::warn!(
                service_name = %self.service_name,
                hostname = %self.hostname,
                error.kind = %code.kind(),
                error.code = %code,
                "{}",
                code.message()
            ),
        }
    }
}

impl Default for LogContext {
    fn default() -> Self {
        Self::new("auditd", "localhost")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_twice_is_harmless() {
        assert!(init_tracing("debug").is_ok());
        assert!(init_tracing("not a [valid filter").is_ok());
    }

    #[test]
    fn test_log_context_accessors() {
        let ctx = LogContext::new("auditd", "node-1.example.com");
        assert_eq!(ctx.service_name(), "auditd");
        assert_eq!(ctx.hostname(), "node-1.example.com");
        ctx.report(ErrorCode::JsonParsing, Some("{not json"));
        ctx.report(ErrorCode::CreateThread, None);
    }
}
