//! Leveled logger collaborator for the dispatch loop.
//!
//! The loop logs through the [`Logger`] trait so tests can capture what was
//! logged at which severity. [`TracingLogger`] is the production
//! implementation, forwarding each severity to the matching `tracing` macro.

use switchyard_core::LogLevel;

/// Leveled string logger.
pub trait Logger: Send + Sync {
    /// Finest severity, below debug.
    fn verbose(&self, message: &str);
    fn debug(&self, message: &str);
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);

    /// Dispatches to the method matching `level`.
    fn at(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Verbose => self.verbose(message),
            LogLevel::Debug => self.debug(message),
            LogLevel::Info => self.info(message),
            LogLevel::Warn => self.warn(message),
            LogLevel::Error => self.error(message),
        }
    }
}

/// Logger backed by the `tracing` macros; verbose maps to TRACE.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn verbose(&self, message: &str) {
        tracing::trace!("{message}");
    }

    fn debug(&self, message: &str) {
        tracing::debug!("{message}");
    }

    fn info(&self, message: &str) {
        tracing::info!("{message}");
    }

    fn warn(&self, message: &str) {
        tracing::warn!("{message}");
    }

    fn error(&self, message: &str) {
        tracing::error!("{message}");
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingLogger {
        lines: Mutex<Vec<(LogLevel, String)>>,
    }

    impl Logger for RecordingLogger {
        fn verbose(&self, message: &str) {
            self.lines.lock().push((LogLevel::Verbose, message.to_string()));
        }

        fn debug(&self, message: &str) {
            self.lines.lock().push((LogLevel::Debug, message.to_string()));
        }

        fn info(&self, message: &str) {
            self.lines.lock().push((LogLevel::Info, message.to_string()));
        }

        fn warn(&self, message: &str) {
            self.lines.lock().push((LogLevel::Warn, message.to_string()));
        }

        fn error(&self, message: &str) {
            self.lines.lock().push((LogLevel::Error, message.to_string()));
        }
    }

    #[test]
    fn at_dispatches_to_matching_level() {
        let logger = RecordingLogger::default();
        logger.at(LogLevel::Verbose, "v");
        logger.at(LogLevel::Debug, "d");
        logger.at(LogLevel::Info, "i");
        logger.at(LogLevel::Warn, "w");
        logger.at(LogLevel::Error, "e");

        let lines = logger.lines.lock();
        assert_eq!(
            *lines,
            vec![
                (LogLevel::Verbose, "v".to_string()),
                (LogLevel::Debug, "d".to_string()),
                (LogLevel::Info, "i".to_string()),
                (LogLevel::Warn, "w".to_string()),
                (LogLevel::Error, "e".to_string()),
            ]
        );
    }
}
