// ABOUTME: Custom serde deserializers for config types.
// ABOUTME: Handles validated names, git refs, targets, and service lists.

use nonempty::NonEmpty;
use serde::Deserialize;

use super::SshTarget;
use crate::services::{ServiceAction, ServiceTarget};
use crate::types::{GitRef, ServiceName};

pub fn deserialize_service_name<'de, D>(deserializer: D) -> Result<ServiceName, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    ServiceName::new(&s).map_err(serde::de::Error::custom)
}

pub fn deserialize_git_ref<'de, D>(deserializer: D) -> Result<GitRef, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    GitRef::new(&s).map_err(serde::de::Error::custom)
}

pub fn deserialize_git_ref_option<'de, D>(deserializer: D) -> Result<Option<GitRef>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    opt.map(|s| GitRef::new(&s).map_err(serde::de::Error::custom))
        .transpose()
}

pub fn deserialize_target<'de, D>(deserializer: D) -> Result<Option<SshTarget>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<TargetEntry> = Option::deserialize(deserializer)?;
    opt.map(|entry| entry.into_target().map_err(serde::de::Error::custom))
        .transpose()
}

pub fn deserialize_services<'de, D>(deserializer: D) -> Result<NonEmpty<ServiceTarget>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let values: Vec<ServiceEntry> = Vec::deserialize(deserializer)?;
    let services = values
        .into_iter()
        .map(ServiceEntry::into_target)
        .collect::<Result<Vec<_>, _>>()
        .map_err(serde::de::Error::custom)?;

    NonEmpty::from_vec(services)
        .ok_or_else(|| serde::de::Error::custom("at least one service is required"))
}

pub fn deserialize_services_option<'de, D>(
    deserializer: D,
) -> Result<Option<NonEmpty<ServiceTarget>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<Vec<ServiceEntry>> = Option::deserialize(deserializer)?;
    match opt {
        None => Ok(None),
        Some(values) => {
            let services = values
                .into_iter()
                .map(ServiceEntry::into_target)
                .collect::<Result<Vec<_>, _>>()
                .map_err(serde::de::Error::custom)?;

            let nonempty = NonEmpty::from_vec(services).ok_or_else(|| {
                serde::de::Error::custom("destination services list cannot be empty")
            })?;
            Ok(Some(nonempty))
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TargetEntry {
    Simple(String),
    Detailed(SshTarget),
}

impl TargetEntry {
    fn into_target(self) -> Result<SshTarget, String> {
        match self {
            TargetEntry::Simple(s) => SshTarget::parse(&s),
            TargetEntry::Detailed(t) => Ok(t),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ServiceEntry {
    Simple(String),
    Detailed {
        name: String,
        #[serde(default = "default_rebuild")]
        rebuild: bool,
        #[serde(default)]
        action: ServiceAction,
    },
}

fn default_rebuild() -> bool {
    true
}

impl ServiceEntry {
    fn into_target(self) -> Result<ServiceTarget, String> {
        match self {
            ServiceEntry::Simple(s) => {
                Ok(ServiceTarget::new(ServiceName::new(&s).map_err(|e| e.to_string())?))
            }
            ServiceEntry::Detailed {
                name,
                rebuild,
                action,
            } => Ok(ServiceTarget {
                name: ServiceName::new(&name).map_err(|e| e.to_string())?,
                action,
                rebuild,
            }),
        }
    }
}
