use crate::state::Task;

/// Interval used when no check interval is configured.
pub const DEFAULT_CHECK_INTERVAL: &str = "10s";

/// Timeout used by the fallback TCP check.
pub const DEFAULT_CHECK_TIMEOUT: &str = "2s";

/// What the registry probes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckKind {
    /// HTTP GET against a URL.
    Http(String),
    /// Script executed by the registry agent.
    Script(String),
    /// Time-to-live the service must refresh itself.
    Ttl(String),
    /// TCP connect against `host:port`.
    Tcp(String),
}

/// Health check attached to a registered service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheck {
    kind: CheckKind,
    interval: String,
    timeout: Option<String>,
}

impl HealthCheck {
    /// Creates an HTTP check.
    #[must_use]
    pub fn http(url: impl Into<String>, interval: impl Into<String>) -> Self {
        Self {
            kind: CheckKind::Http(url.into()),
            interval: interval.into(),
            timeout: None,
        }
    }

    /// Creates a script check run by the registry agent.
    #[must_use]
    pub fn script(script: impl Into<String>, interval: impl Into<String>) -> Self {
        Self {
            kind: CheckKind::Script(script.into()),
            interval: interval.into(),
            timeout: None,
        }
    }

    /// Creates a TTL check. TTL checks carry no probe timeout.
    #[must_use]
    pub fn ttl(ttl: impl Into<String>, interval: impl Into<String>) -> Self {
        Self {
            kind: CheckKind::Ttl(ttl.into()),
            interval: interval.into(),
            timeout: None,
        }
    }

    /// Creates the fallback TCP check.
    #[must_use]
    pub fn tcp(host: &str, port: u16) -> Self {
        Self {
            kind: CheckKind::Tcp(format!("{host}:{port}")),
            interval: DEFAULT_CHECK_INTERVAL.to_owned(),
            timeout: Some(DEFAULT_CHECK_TIMEOUT.to_owned()),
        }
    }

    /// Returns the probe kind.
    #[must_use]
    pub fn kind(&self) -> &CheckKind {
        &self.kind
    }

    /// Returns the probe interval.
    #[must_use]
    pub fn interval(&self) -> &str {
        self.interval.as_str()
    }

    /// Returns the probe timeout, when one applies.
    #[must_use]
    pub fn timeout(&self) -> Option<&str> {
        self.timeout.as_deref()
    }
}

/// Builds the check for one task from its labels.
///
/// Recognized keys are `check_http`, `check_script`, `check_ttl` and
/// `check_interval`, matched case-insensitively. `{host}` and `{port}` are
/// substituted in check targets. Labels are scanned once in order, so a later
/// check directive replaces an earlier one of a different kind. Without any
/// directive the service gets a TCP check against `host:port`.
#[must_use]
pub fn derive_check(task: &Task, host: &str, port: u16) -> HealthCheck {
    let mut kind = None;
    let mut interval = None;

    for label in &task.labels {
        match label.key.to_lowercase().as_str() {
            "check_http" => kind = Some(CheckKind::Http(interpolate(&label.value, host, port))),
            "check_script" => {
                kind = Some(CheckKind::Script(interpolate(&label.value, host, port)));
            }
            "check_ttl" => kind = Some(CheckKind::Ttl(interpolate(&label.value, host, port))),
            "check_interval" => interval = Some(label.value.trim().to_owned()),
            _ => {}
        }
    }

    let interval = interval.unwrap_or_else(|| DEFAULT_CHECK_INTERVAL.to_owned());
    match kind {
        Some(CheckKind::Http(url)) => HealthCheck {
            timeout: Some(DEFAULT_CHECK_TIMEOUT.to_owned()),
            ..HealthCheck::http(url, interval)
        },
        Some(CheckKind::Script(script)) => HealthCheck::script(script, interval),
        Some(CheckKind::Ttl(ttl)) => HealthCheck::ttl(ttl, interval),
        Some(CheckKind::Tcp(_)) | None => HealthCheck {
            interval,
            ..HealthCheck::tcp(host, port)
        },
    }
}

fn interpolate(template: &str, host: &str, port: u16) -> String {
    template
        .replace("{host}", host)
        .replace("{port}", port.to_string().as_str())
}
