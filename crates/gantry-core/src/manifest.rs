//! gantry.toml service manifest parser.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::types::{
    BuilderKind, DatabaseSpec, EnvVar, ResourceDefinition, ResourceLimits, VolumeMount,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceManifest {
    pub service: ServiceSection,
    pub build: Option<BuildSection>,
    pub deploy: Option<DeploySection>,
    pub database: Option<DatabaseSection>,
    pub env: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSection {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSection {
    pub builder: Option<BuilderKind>,
    pub branch: Option<String>,
    pub registry_credential: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploySection {
    pub replicas: Option<u32>,
    pub ports: Option<Vec<u16>>,
    pub hosts: Option<Vec<String>>,
    pub public: Option<bool>,
    pub image: Option<String>,
    pub resources: Option<ResourcesSection>,
    pub volumes: Option<Vec<VolumeSection>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourcesSection {
    pub cpu_request_millis: Option<u32>,
    pub cpu_limit_millis: Option<u32>,
    pub memory_request_mb: Option<u32>,
    pub memory_limit_mb: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeSection {
    pub name: String,
    pub mount_path: String,
    pub size_gb: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub engine: String,
    pub version: String,
}

impl ServiceManifest {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let manifest: ServiceManifest = toml::from_str(&content)?;
        Ok(manifest)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Scaffold a minimal gantry.toml for a new service.
    pub fn scaffold(name: &str) -> Self {
        ServiceManifest {
            service: ServiceSection {
                name: name.to_string(),
                description: None,
            },
            build: Some(BuildSection {
                builder: Some(BuilderKind::Railpack),
                branch: Some("main".to_string()),
                registry_credential: None,
            }),
            deploy: Some(DeploySection {
                replicas: Some(1),
                ports: Some(vec![8080]),
                hosts: None,
                public: Some(false),
                image: None,
                resources: None,
                volumes: None,
            }),
            database: None,
            env: None,
        }
    }

    /// Resolve the manifest into the canonical workload document,
    /// filling defaults for omitted sections. Env vars are sorted by
    /// name so the resulting document is deterministic.
    pub fn resource_definition(&self) -> ResourceDefinition {
        let build = self.build.clone().unwrap_or(BuildSection {
            builder: None,
            branch: None,
            registry_credential: None,
        });
        let deploy = self.deploy.clone().unwrap_or(DeploySection {
            replicas: None,
            ports: None,
            hosts: None,
            public: None,
            image: None,
            resources: None,
            volumes: None,
        });

        let resources = match deploy.resources {
            Some(r) => {
                let defaults = ResourceLimits::default();
                ResourceLimits {
                    cpu_request_millis: r.cpu_request_millis.unwrap_or(defaults.cpu_request_millis),
                    cpu_limit_millis: r.cpu_limit_millis.unwrap_or(defaults.cpu_limit_millis),
                    memory_request_mb: r.memory_request_mb.unwrap_or(defaults.memory_request_mb),
                    memory_limit_mb: r.memory_limit_mb.unwrap_or(defaults.memory_limit_mb),
                }
            }
            None => ResourceLimits::default(),
        };

        let volumes = deploy
            .volumes
            .unwrap_or_default()
            .into_iter()
            .map(|v| VolumeMount {
                name: v.name,
                mount_path: v.mount_path,
                size_gb: v.size_gb.unwrap_or(1),
            })
            .collect();

        let mut env: Vec<EnvVar> = self
            .env
            .clone()
            .unwrap_or_default()
            .into_iter()
            .map(|(name, value)| EnvVar { name, value })
            .collect();
        env.sort_by(|a, b| a.name.cmp(&b.name));

        ResourceDefinition {
            builder: build.builder.unwrap_or_default(),
            branch: build.branch.unwrap_or_else(|| "main".to_string()),
            database: self.database.clone().map(|d| DatabaseSpec {
                engine: d.engine,
                version: d.version,
            }),
            replicas: deploy.replicas.unwrap_or(1),
            ports: deploy.ports.unwrap_or_default(),
            hosts: deploy.hosts.unwrap_or_default(),
            public: deploy.public.unwrap_or(false),
            resources,
            volumes,
            image_override: deploy.image,
            env,
            registry_credential: build.registry_credential,
        }
    }
}
