// ── Native service discovery ──
//
// Resolves service addresses without a sidecar: an `SDV_<SERVICE>_ADDRESS`
// environment variable wins, then the `[services]` table of the settings
// file, then the built-in defaults for well-known services.

use std::collections::BTreeMap;
use std::fmt;

use tracing::{error, warn};
use vsig_core::{SdkError, ServiceDiscovery, ServiceMetadata};

use crate::ENV_PREFIX;

const DEFAULT_LOCATIONS: &[(&str, &str)] = &[
    ("mqtt", "localhost:1883"),
    ("vehicledatabroker", "localhost:55555"),
];

type EnvLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

pub struct NativeDiscovery {
    services: BTreeMap<String, String>,
    env: EnvLookup,
}

impl NativeDiscovery {
    /// Discovery over `services`, reading the process environment.
    pub fn new(services: BTreeMap<String, String>) -> Self {
        Self {
            services,
            env: Box::new(|name| std::env::var(name).ok()),
        }
    }

    /// Replace the environment lookup.
    pub fn with_env_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Box::new(lookup);
        self
    }

    /// `SDV_<SERVICE>_ADDRESS` for `service`.
    pub fn env_var_name(service: &str) -> String {
        format!("{ENV_PREFIX}{}_ADDRESS", service.to_uppercase())
    }

    pub fn default_location(service: &str) -> Option<&'static str> {
        let service = service.to_lowercase();
        DEFAULT_LOCATIONS
            .iter()
            .find(|(name, _)| *name == service)
            .map(|(_, location)| *location)
    }
}

impl Default for NativeDiscovery {
    fn default() -> Self {
        Self::new(BTreeMap::new())
    }
}

impl ServiceDiscovery for NativeDiscovery {
    fn location(&self, service: &str) -> Result<String, SdkError> {
        let var = Self::env_var_name(service);
        if let Some(address) = (self.env)(&var).filter(|a| !a.is_empty()) {
            return Ok(address);
        }
        if let Some(address) = self.services.get(service) {
            return Ok(address.clone());
        }

        if let Some(address) = Self::default_location(service) {
            warn!(
                env_var = %var,
                service,
                default = address,
                "service location not configured, taking default"
            );
            return Ok(address.to_owned());
        }

        error!(env_var = %var, service, "service location not configured, please define it");
        Err(SdkError::Config {
            message: format!("no location configured for service '{service}' (set {var})"),
        })
    }

    fn metadata(&self, _service: &str) -> Result<ServiceMetadata, SdkError> {
        Ok(ServiceMetadata::new())
    }
}

impl fmt::Debug for NativeDiscovery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeDiscovery")
            .field("services", &self.services)
            .finish_non_exhaustive()
    }
}
