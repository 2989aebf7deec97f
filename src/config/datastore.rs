// ABOUTME: Datastore connection settings for the data patcher.
// ABOUTME: Credentials are EnvValues so they can stay out of the config file.

use serde::Deserialize;

use super::EnvValue;
use crate::compose::ComposeCli;
use crate::error::Result;
use crate::patch::PsqlClient;
use crate::types::ServiceName;

#[derive(Debug, Clone, Deserialize)]
pub struct DatastoreConfig {
    /// Compose service running PostgreSQL.
    #[serde(
        default = "default_service",
        deserialize_with = "super::deserialize::deserialize_service_name"
    )]
    pub service: ServiceName,
    pub user: EnvValue,
    #[serde(default)]
    pub password: Option<EnvValue>,
    pub database: EnvValue,
}

fn default_service() -> ServiceName {
    ServiceName::default_datastore()
}

impl DatastoreConfig {
    /// Resolve credentials and build the psql client.
    pub fn client(&self, compose: ComposeCli) -> Result<PsqlClient> {
        let password = self.password.as_ref().map(EnvValue::resolve).transpose()?;
        Ok(PsqlClient::new(
            compose,
            self.service.clone(),
            self.user.resolve()?,
            password,
            self.database.resolve()?,
        ))
    }

    /// A password written in plain text into the file.
    pub fn has_literal_password(&self) -> bool {
        self.password.as_ref().is_some_and(EnvValue::is_literal)
    }
}
