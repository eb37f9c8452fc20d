use std::env;
use std::path::PathBuf;
use std::time::Duration;

use mesosync_core::{AppError, AppResult};
use mesosync_domain::{RegistrationPolicy, RegistrationPolicyInput};
use mesosync_infrastructure::{ConsulRegistryOptions, ZookeeperUri};
use tracing_subscriber::EnvFilter;

const LIST_SEPARATOR: char = ';';

/// Immutable process configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub zookeeper: ZookeeperUri,
    pub refresh_interval: Duration,
    pub miss_threshold: u32,
    pub http_timeout: Duration,
    pub policy: RegistrationPolicy,
    pub registry: ConsulRegistryOptions,
}

impl BridgeConfig {
    pub fn load() -> AppResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = EnvReader { lookup };

        let zookeeper = ZookeeperUri::parse(vars.required("MESOS_ZK")?.as_str())?;
        let refresh_interval = Duration::from_secs(vars.positive_u64("REFRESH_INTERVAL_SECONDS", 60)?);
        let miss_threshold = u32::try_from(vars.positive_u64("MISS_THRESHOLD", 1)?).map_err(|_| {
            AppError::Validation("MISS_THRESHOLD is out of range".to_owned())
        })?;
        let http_timeout = Duration::from_secs(vars.positive_u64("HTTP_TIMEOUT_SECONDS", 15)?);

        let address_order = match vars.list("IP_ORDER") {
            order if order.is_empty() => vec![
                "netinfo".to_owned(),
                "mesos".to_owned(),
                "host".to_owned(),
            ],
            order => order,
        };
        let policy = RegistrationPolicy::new(RegistrationPolicyInput {
            service_id_prefix: vars.string_or("SERVICE_ID_PREFIX", "mesos-consul"),
            host_service_name: vars.string_or("MASTER_SERVICE_NAME", "mesos"),
            address_order,
            framework_allow: vars.list("FRAMEWORK_WHITELIST"),
            framework_deny: vars.list("FRAMEWORK_BLACKLIST"),
            task_allow: vars.list("TASK_WHITELIST"),
            task_deny: vars.list("TASK_BLACKLIST"),
            separator: vars.optional("SEPARATOR").unwrap_or_default(),
            task_tags: vars.list("TASK_TAGS"),
            name_patterns: vars.list("NAME_PATTERNS"),
        })?;

        let port = vars
            .optional("REGISTRY_PORT")
            .map(|value| {
                value.parse::<u16>().map_err(|error| {
                    AppError::Validation(format!("invalid REGISTRY_PORT value '{value}': {error}"))
                })
            })
            .transpose()?
            .unwrap_or(8500);
        let basic_auth = vars.optional("REGISTRY_AUTH").map(|value| {
            match value.split_once(':') {
                Some((user, password)) => (user.to_owned(), Some(password.to_owned())),
                None => (value, None),
            }
        });
        let registry = ConsulRegistryOptions {
            port,
            use_tls: vars.bool_or("REGISTRY_SSL", false)?,
            verify_tls: vars.bool_or("REGISTRY_SSL_VERIFY", true)?,
            ca_cert: vars.optional("REGISTRY_SSL_CACERT").map(PathBuf::from),
            client_cert: vars.optional("REGISTRY_SSL_CERT").map(PathBuf::from),
            token: vars.optional("REGISTRY_TOKEN"),
            basic_auth,
        };

        Ok(Self {
            zookeeper,
            refresh_interval,
            miss_threshold,
            http_timeout,
            policy,
            registry,
        })
    }
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
    }

    fn required(&self, name: &str) -> AppResult<String> {
        self.optional(name)
            .ok_or_else(|| AppError::Validation(format!("{name} is required")))
    }

    fn string_or(&self, name: &str, default: &str) -> String {
        self.optional(name).unwrap_or_else(|| default.to_owned())
    }

    fn list(&self, name: &str) -> Vec<String> {
        self.optional(name)
            .map(|value| {
                value
                    .split(LIST_SEPARATOR)
                    .map(str::trim)
                    .filter(|entry| !entry.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn positive_u64(&self, name: &str, default: u64) -> AppResult<u64> {
        let value = match self.optional(name) {
            Some(value) => value.parse::<u64>().map_err(|error| {
                AppError::Validation(format!("invalid {name} value '{value}': {error}"))
            })?,
            None => default,
        };

        if value == 0 {
            return Err(AppError::Validation(format!(
                "{name} must be greater than zero"
            )));
        }

        Ok(value)
    }

    fn bool_or(&self, name: &str, default: bool) -> AppResult<bool> {
        match self.optional(name) {
            Some(value) => match value.to_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(true),
                "false" | "0" | "no" => Ok(false),
                _ => Err(AppError::Validation(format!(
                    "invalid {name} value '{value}', expected true or false"
                ))),
            },
            None => Ok(default),
        }
    }
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}
