// ABOUTME: Config scaffolding for new projects.
// ABOUTME: Creates a commented deckhand.yml template.

use std::path::Path;

use crate::error::{Error, Result};
use crate::types::ServiceName;

use super::{CONFIG_FILENAME, Config};

/// Scaffold written by `deckhand init`; `my-app` is replaced by the project name.
pub const TEMPLATE: &str = r#"project: my-app

# Omit target to run on this machine.
target:
  host: server.example.com
  user: deploy
  # SSH host key verification (default: false for security)
  # Set to true to enable Trust-On-First-Use, or pre-populate ~/.ssh/known_hosts
  # trust_first_connection: true

workdir: /opt/my-app
compose_file: docker-compose.yml

source:
  remote: origin
  ref: main
  dirty: fail

services:
  - backend

grace_period: 10s
ready_timeout: 60s

healthchecks:
  - name: backend
    http:
      url: http://localhost:8000/health
      via_target: true
    retries: 3
    backoff: 5s

# datastore:
#   service: db
#   user: { env: DECKHAND_DB_USER, default: postgres }
#   password: { env: DECKHAND_DB_PASSWORD }
#   database: { env: DECKHAND_DB_NAME }
#
# patches:
#   - name: add-status
#     add_enum_value: { type: order_status, value: refunded }
"#;

pub fn init_config(dir: &Path, project: Option<&str>, force: bool) -> Result<()> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    let yaml = match project {
        Some(name) => {
            let name = ServiceName::new(name).map_err(|e| Error::InvalidConfig(e.to_string()))?;
            TEMPLATE.replacen("project: my-app", &format!("project: {}", name), 1)
        }
        None => TEMPLATE.to_string(),
    };

    Config::from_yaml(&yaml)?.validate()?;
    std::fs::write(&config_path, yaml)?;

    Ok(())
}
