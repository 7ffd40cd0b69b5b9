//! Audit trail for failed unlock attempts.
//!
//! One syslog record per failure, carrying the username only. The attempted
//! secret never leaves the prompt.

use std::sync::Mutex;

use syslog::{Facility, Formatter3164};
use tracing::{debug, error, warn};

/// Syslog tag for audit records.
pub const SYSLOG_TAG: &str = "tss";

/// Receives one call per failed attempt.
pub trait AuditSink {
    fn failed_login(&self, username: &str);
}

/// Audit sink backed by the local syslog daemon.
pub struct SyslogAudit {
    /// `None` when syslog was unreachable at startup
    writer: Option<Mutex<syslog::Logger<syslog::LoggerBackend, Formatter3164>>>,
}

impl SyslogAudit {
    /// Connect to syslog, falling back to a sink that only traces.
    pub fn connect() -> Self {
        let formatter = Formatter3164 {
            facility: Facility::LOG_USER,
            hostname: None,
            process: SYSLOG_TAG.to_string(),
            pid: std::process::id(),
        };

        match syslog::unix(formatter) {
            Ok(writer) => {
                debug!("Connected to syslog with tag '{}'", SYSLOG_TAG);
                Self {
                    writer: Some(Mutex::new(writer)),
                }
            }
            Err(e) => {
                warn!("Failed to connect to syslog, audit records will only be traced: {}", e);
                Self { writer: None }
            }
        }
    }
}

impl AuditSink for SyslogAudit {
    fn failed_login(&self, username: &str) {
        let message = failed_login_message(username);
        warn!("{}", message);

        let Some(ref writer) = self.writer else {
            return;
        };
        match writer.lock() {
            Ok(mut writer) => {
                if let Err(e) = writer.notice(&message) {
                    error!("Failed to write to syslog: {}", e);
                }
            }
            Err(e) => {
                error!("Failed to acquire syslog writer lock: {}", e);
            }
        }
    }
}

fn failed_login_message(username: &str) -> String {
    format!("Failed login attempt for user \"{}\"", username)
}
