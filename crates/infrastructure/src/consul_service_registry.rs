use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use mesosync_application::ServiceRegistry;
use mesosync_core::{AppError, AppResult};
use mesosync_domain::{
    CheckKind, HealthCheck, ServiceDescriptor, ServiceDescriptorInput, has_service_id_prefix,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

const TOKEN_HEADER: &str = "X-Consul-Token";

/// Connection settings shared by every registry agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsulRegistryOptions {
    /// Agent HTTP port.
    pub port: u16,
    /// Whether agents are reached over HTTPS.
    pub use_tls: bool,
    /// Whether agent certificates are verified.
    pub verify_tls: bool,
    /// Optional PEM bundle trusted in addition to the system roots.
    pub ca_cert: Option<PathBuf>,
    /// Optional PEM file holding the client certificate and its private key.
    pub client_cert: Option<PathBuf>,
    /// Optional ACL token.
    pub token: Option<String>,
    /// Optional basic auth user and password.
    pub basic_auth: Option<(String, Option<String>)>,
}

impl Default for ConsulRegistryOptions {
    fn default() -> Self {
        Self {
            port: 8500,
            use_tls: false,
            verify_tls: true,
            ca_cert: None,
            client_cert: None,
            token: None,
            basic_auth: None,
        }
    }
}

/// Registry adapter talking to the Consul agent that owns each service.
pub struct ConsulServiceRegistry {
    http_client: reqwest::Client,
    options: ConsulRegistryOptions,
}

impl ConsulServiceRegistry {
    /// Creates a registry adapter with its own HTTP client.
    pub fn new(options: ConsulRegistryOptions, timeout: Duration) -> AppResult<Self> {
        let mut builder = reqwest::Client::builder().timeout(timeout);

        if let Some(path) = options.ca_cert.as_ref() {
            let pem = read_pem(path, "CA bundle")?;
            let certificate = reqwest::Certificate::from_pem(&pem).map_err(|error| {
                AppError::Validation(format!(
                    "invalid registry CA bundle '{}': {error}",
                    path.display()
                ))
            })?;
            builder = builder.add_root_certificate(certificate);
        }
        if let Some(path) = options.client_cert.as_ref() {
            let pem = read_pem(path, "client certificate")?;
            let identity = reqwest::Identity::from_pem(&pem).map_err(|error| {
                AppError::Validation(format!(
                    "invalid registry client certificate '{}': {error}",
                    path.display()
                ))
            })?;
            builder = builder.identity(identity);
        }
        if !options.verify_tls {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let http_client = builder.build().map_err(|error| {
            AppError::Internal(format!("failed to build registry HTTP client: {error}"))
        })?;

        Ok(Self {
            http_client,
            options,
        })
    }

    fn endpoint(&self, host: &str, segments: &[&str]) -> AppResult<Url> {
        agent_endpoint(&self.options, host, segments)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = match self.options.token.as_deref() {
            Some(token) => builder.header(TOKEN_HEADER, token),
            None => builder,
        };

        match self.options.basic_auth.as_ref() {
            Some((user, password)) => builder.basic_auth(user, password.as_ref()),
            None => builder,
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder, what: &str) -> AppResult<reqwest::Response> {
        let response = self
            .authorize(builder)
            .send()
            .await
            .map_err(|error| AppError::Registry(format!("{what} failed: {error}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<response body unavailable>".to_owned());
        Err(AppError::Registry(format!(
            "{what} failed with status {status}: {body}"
        )))
    }

    async fn get_json<T>(&self, url: Url, what: &str) -> AppResult<T>
    where
        T: DeserializeOwned,
    {
        self.send(self.http_client.get(url), what)
            .await?
            .json::<T>()
            .await
            .map_err(|error| AppError::Registry(format!("{what} returned invalid JSON: {error}")))
    }
}

fn read_pem(path: &Path, what: &str) -> AppResult<Vec<u8>> {
    std::fs::read(path).map_err(|error| {
        AppError::Validation(format!(
            "failed to read registry {what} '{}': {error}",
            path.display()
        ))
    })
}

fn agent_endpoint(options: &ConsulRegistryOptions, host: &str, segments: &[&str]) -> AppResult<Url> {
    let scheme = if options.use_tls { "https" } else { "http" };
    let mut url = Url::parse(&format!("{scheme}://{host}:{}/", options.port)).map_err(|error| {
        AppError::Registry(format!("invalid registry agent address '{host}': {error}"))
    })?;

    url.path_segments_mut()
        .map_err(|()| AppError::Registry(format!("registry agent address '{host}' has no path")))?
        .pop_if_empty()
        .extend(segments);

    Ok(url)
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct AgentServiceRegistration<'a> {
    #[serde(rename = "ID")]
    id: &'a str,
    #[serde(rename = "Name")]
    name: &'a str,
    #[serde(rename = "Address")]
    address: &'a str,
    #[serde(rename = "Port", skip_serializing_if = "Option::is_none")]
    port: Option<u16>,
    #[serde(rename = "Tags", skip_serializing_if = "has_no_tags")]
    tags: &'a [String],
    #[serde(rename = "Check", skip_serializing_if = "Option::is_none")]
    check: Option<AgentServiceCheck<'a>>,
}

fn has_no_tags(tags: &&[String]) -> bool {
    tags.is_empty()
}

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
struct AgentServiceCheck<'a> {
    #[serde(rename = "HTTP", skip_serializing_if = "Option::is_none")]
    http: Option<&'a str>,
    #[serde(rename = "TCP", skip_serializing_if = "Option::is_none")]
    tcp: Option<&'a str>,
    #[serde(rename = "Args", skip_serializing_if = "Option::is_none")]
    args: Option<[&'a str; 3]>,
    #[serde(rename = "TTL", skip_serializing_if = "Option::is_none")]
    ttl: Option<&'a str>,
    #[serde(rename = "Interval", skip_serializing_if = "Option::is_none")]
    interval: Option<&'a str>,
    #[serde(rename = "Timeout", skip_serializing_if = "Option::is_none")]
    timeout: Option<&'a str>,
}

impl<'a> AgentServiceCheck<'a> {
    fn from_check(check: &'a HealthCheck) -> Self {
        let interval = Some(check.interval());
        let timeout = check.timeout();

        match check.kind() {
            CheckKind::Http(url) => Self {
                http: Some(url.as_str()),
                interval,
                timeout,
                ..Self::default()
            },
            CheckKind::Tcp(address) => Self {
                tcp: Some(address.as_str()),
                interval,
                timeout,
                ..Self::default()
            },
            CheckKind::Script(script) => Self {
                args: Some(["/bin/sh", "-c", script.as_str()]),
                interval,
                timeout,
                ..Self::default()
            },
            // Consul rejects TTL checks that also carry an interval.
            CheckKind::Ttl(ttl) => Self {
                ttl: Some(ttl.as_str()),
                ..Self::default()
            },
        }
    }
}

impl<'a> AgentServiceRegistration<'a> {
    fn from_descriptor(service: &'a ServiceDescriptor) -> Self {
        Self {
            id: service.id(),
            name: service.name(),
            address: service.address(),
            port: service.port(),
            tags: service.tags(),
            check: service.check().map(AgentServiceCheck::from_check),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CatalogService {
    #[serde(rename = "Address", default)]
    node_address: String,
    #[serde(rename = "ServiceID")]
    service_id: String,
    #[serde(rename = "ServiceName")]
    service_name: String,
    #[serde(rename = "ServiceAddress", default)]
    service_address: String,
    #[serde(rename = "ServicePort", default)]
    service_port: u16,
    #[serde(rename = "ServiceTags", default)]
    service_tags: Option<Vec<String>>,
}

impl CatalogService {
    fn into_descriptor(self) -> AppResult<ServiceDescriptor> {
        let address = if self.service_address.trim().is_empty() {
            self.node_address.clone()
        } else {
            self.service_address
        };

        ServiceDescriptor::new(ServiceDescriptorInput {
            id: self.service_id,
            name: self.service_name,
            address,
            port: (self.service_port != 0).then_some(self.service_port),
            tags: self.service_tags.unwrap_or_default(),
            check: None,
            agent: self.node_address,
        })
    }
}

#[async_trait]
impl ServiceRegistry for ConsulServiceRegistry {
    async fn register(&self, service: &ServiceDescriptor) -> AppResult<()> {
        let url = self.endpoint(service.agent(), &["v1", "agent", "service", "register"])?;
        let registration = AgentServiceRegistration::from_descriptor(service);

        self.send(
            self.http_client.put(url).json(&registration),
            &format!("registering '{}'", service.id()),
        )
        .await
        .map(|_| ())
    }

    async fn deregister(&self, service: &ServiceDescriptor) -> AppResult<()> {
        let url = self.endpoint(
            service.agent(),
            &["v1", "agent", "service", "deregister", service.id()],
        )?;

        self.send(
            self.http_client.put(url),
            &format!("deregistering '{}'", service.id()),
        )
        .await
        .map(|_| ())
    }

    async fn list_services(
        &self,
        registry_host: &str,
        id_prefix: &str,
    ) -> AppResult<Vec<ServiceDescriptor>> {
        let url = self.endpoint(registry_host, &["v1", "catalog", "services"])?;
        let names = self
            .get_json::<HashMap<String, Vec<String>>>(url, "listing catalog services")
            .await?;

        let mut names = names.into_keys().collect::<Vec<_>>();
        names.sort();

        let mut services = Vec::new();
        for name in names {
            let url = self.endpoint(registry_host, &["v1", "catalog", "service", name.as_str()])?;
            let entries = self
                .get_json::<Vec<CatalogService>>(url, &format!("listing catalog service '{name}'"))
                .await?;

            for entry in entries {
                if !has_service_id_prefix(entry.service_id.as_str(), id_prefix) {
                    continue;
                }

                let service_id = entry.service_id.clone();
                match entry.into_descriptor() {
                    Ok(service) => services.push(service),
                    Err(error) => {
                        debug!(service_id = %service_id, error = %error, "skipping catalog entry");
                    }
                }
            }
        }

        Ok(services)
    }
}
