use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::{AppError, AppResult};

/// A host (name or IP literal) and TCP port pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostPort {
    host: String,
    port: u16,
}

impl HostPort {
    /// Creates an endpoint from a non-empty host and a port.
    pub fn new(host: impl Into<String>, port: u16) -> AppResult<Self> {
        let host = host.into();
        let host = host.trim();
        if host.is_empty() {
            return Err(AppError::Validation(
                "endpoint host must not be empty".to_owned(),
            ));
        }

        Ok(Self {
            host: host.to_owned(),
            port,
        })
    }

    /// Parses a `type@host:port` process identifier as used by Mesos.
    ///
    /// The `type@` part is optional.
    pub fn parse_pid(pid: &str) -> AppResult<Self> {
        let address = pid.rsplit_once('@').map_or(pid, |(_, address)| address);
        let (host, port) = address.rsplit_once(':').ok_or_else(|| {
            AppError::Decode(format!("process identifier '{pid}' has no port"))
        })?;
        let port = port.parse::<u16>().map_err(|error| {
            AppError::Decode(format!("process identifier '{pid}' has invalid port: {error}"))
        })?;

        Self::new(host, port)
    }

    /// Returns the host part.
    #[must_use]
    pub fn host(&self) -> &str {
        self.host.as_str()
    }

    /// Returns the port part.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Display for HostPort {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}:{}", self.host, self.port)
    }
}
