// ABOUTME: Integration tests for configuration parsing and validation.
// ABOUTME: Tests YAML parsing, env-sourced credentials, destination merging, and discovery.

use deckhand::config::*;
use deckhand::patch::Statement;
use deckhand::services::ServiceAction;
use deckhand::sync::DirtyPolicy;
use std::time::Duration;

mod parsing {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let yaml = r#"
project: bot
workdir: /opt/bot
services: [backend]
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.project.as_str(), "bot");
        assert!(config.target.is_none());
        assert!(config.source.is_none());
        assert_eq!(config.compose_command, "docker compose");
        assert_eq!(config.compose_file, "docker-compose.yml");
        assert_eq!(config.grace_period, Duration::from_secs(10));
        assert_eq!(config.services.len(), 1);
        config.validate().unwrap();
    }

    #[test]
    fn parse_full_config() {
        let yaml = r#"
project: bot
target: deploy@vps.example.com:2222
workdir: /opt/bot
compose_file: docker-compose.prod.yml
compose_command: docker-compose
source:
  remote: upstream
  ref: release/2026-10
  dirty: stash
services:
  - backend
  - { name: router, rebuild: false }
  - { name: waha, action: stop }
grace_period: 15s
ready_timeout: 2m
command_timeout: 30m
lock_stale_after: 3h
healthchecks:
  - name: api
    http: { url: "http://localhost:8000/health", expect_body: ok, via_target: true }
  - name: waha-session
    optional: true
    retries: 5
    backoff: 2s
    log: { service: waha, pattern: "WORKING", window: 200 }
"#;
        let config = Config::from_yaml(yaml).unwrap();
        config.validate().unwrap();

        let target = config.target.as_ref().unwrap();
        assert_eq!(target.host, "vps.example.com");
        assert_eq!(target.port, 2222);
        assert_eq!(target.user.as_deref(), Some("deploy"));

        let source = config.source.as_ref().unwrap();
        assert_eq!(source.remote, "upstream");
        assert_eq!(source.reference.as_str(), "release/2026-10");
        assert_eq!(source.dirty, DirtyPolicy::Stash);

        let services: Vec<_> = config.services.iter().collect();
        assert!(!services[1].rebuild);
        assert_eq!(services[2].action, ServiceAction::Stop);

        assert_eq!(config.ready_timeout, Duration::from_secs(120));
        assert_eq!(config.lock_stale_after, Duration::from_secs(3 * 3600));
        let checks = config.health_checks().unwrap();
        assert_eq!(checks.len(), 2);
        assert!(checks[1].optional);
        assert_eq!(checks[1].retries, 5);
    }

    #[test]
    fn parse_detailed_target() {
        let yaml = r#"
project: bot
target:
  host: 10.0.0.5
  user: ops
  key: ~/.ssh/deploy_ed25519
  trust_first_connection: true
workdir: /opt/bot
services: [backend]
"#;
        let config = Config::from_yaml(yaml).unwrap();
        let target = config.target.unwrap();
        assert!(target.trust_first_connection);
        assert_eq!(target.port, 22);
    }

    #[test]
    fn parse_patches_of_every_kind() {
        let yaml = r#"
project: shop
workdir: /opt/shop
services: [backend]
datastore:
  user: { env: SHOP_DB_USER, default: postgres }
  password: { env: SHOP_DB_PASSWORD }
  database: shop
patches:
  - name: refunded-status
    add_enum_value: { type: order_status, value: refunded }
  - name: purge
    delete: { table: leads, where: "created_at < now() - interval '1 year'", max_rows: 500 }
  - name: seed
    insert: { table: plans, columns: [code], rows: [[basic]], conflict: [code] }
  - name: reindex
    sql: { statement: "REINDEX TABLE leads" }
verify_queries:
  - { name: plans, query: "SELECT count(*) FROM plans", expect: "1" }
"#;
        let config = Config::from_yaml(yaml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.patches.len(), 4);
        assert!(matches!(
            config.patches[1].statement,
            Statement::Delete {
                max_rows: Some(500),
                ..
            }
        ));
        assert_eq!(config.verify_queries[0].expect, "1");
    }

    #[test]
    fn empty_services_rejected() {
        let yaml = "project: bot\nworkdir: /opt/bot\nservices: []\n";
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn invalid_service_name_rejected() {
        let yaml = "project: bot\nworkdir: /opt/bot\nservices: [\"Back End\"]\n";
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn unsafe_ref_rejected() {
        let yaml = r#"
project: bot
workdir: /opt/bot
source: { ref: "main; reboot" }
services: [backend]
"#;
        assert!(Config::from_yaml(yaml).is_err());
    }
}

mod validation {
    use super::*;

    fn config(extra: &str) -> Config {
        Config::from_yaml(&format!(
            "project: shop\nworkdir: /opt/shop\nservices: [backend, router]\n{extra}"
        ))
        .unwrap()
    }

    #[test]
    fn duplicate_services_rejected() {
        let config = Config::from_yaml(
            "project: shop\nworkdir: /opt/shop\nservices: [backend, backend]\n",
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn https_requires_via_target() {
        let config = config(
            "healthchecks:\n  - name: api\n    http: { url: \"https://shop.example.com/health\" }\n",
        );
        let err = config.validate().unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn check_needs_exactly_one_probe() {
        let config = config("healthchecks:\n  - name: nothing\n");
        assert!(config.validate().is_err());
    }

    #[test]
    fn patches_need_a_datastore() {
        let config = config("patches:\n  - name: x\n    sql: { statement: \"SELECT 1\" }\n");
        assert!(config.validate().is_err());
    }

    #[test]
    fn duplicate_patch_names_rejected() {
        let config = config(
            "datastore: { user: u, database: d }\npatches:\n  - name: x\n    sql: { statement: \"SELECT 1\" }\n  - name: x\n    sql: { statement: \"SELECT 2\" }\n",
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn select_services_keeps_configured_order() {
        let config = config("");
        let selected = config
            .select_services(&["router".to_string(), "backend".to_string()])
            .unwrap();
        let names: Vec<&str> = selected.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["backend", "router"]);
    }

    #[test]
    fn select_unknown_service_rejected() {
        let config = config("");
        assert!(config.select_services(&["worker".to_string()]).is_err());
    }
}

mod credentials {
    use super::*;

    const YAML: &str = r#"
project: shop
workdir: /opt/shop
services: [backend]
datastore:
  user: { env: DECKHAND_IT_DB_USER, default: postgres }
  password: { env: DECKHAND_IT_DB_PASSWORD }
  database: shop
"#;

    #[test]
    fn password_resolved_from_environment() {
        temp_env::with_var("DECKHAND_IT_DB_PASSWORD", Some("s3cret"), || {
            let config = Config::from_yaml(YAML).unwrap();
            let psql = config.psql().unwrap().unwrap();
            assert!(!format!("{psql:?}").contains("s3cret"));
            assert!(!config.datastore.as_ref().unwrap().has_literal_password());
        });
    }

    #[test]
    fn missing_password_is_a_config_error() {
        temp_env::with_var_unset("DECKHAND_IT_DB_PASSWORD", || {
            let config = Config::from_yaml(YAML).unwrap();
            let err = config.psql().unwrap_err();
            assert!(err.to_string().contains("DECKHAND_IT_DB_PASSWORD"));
            assert_eq!(err.exit_code(), 2);
        });
    }

    #[test]
    fn literal_password_is_flagged() {
        let yaml = YAML.replace(
            "password: { env: DECKHAND_IT_DB_PASSWORD }",
            "password: hunter2",
        );
        let config = Config::from_yaml(&yaml).unwrap();
        assert!(config.datastore.unwrap().has_literal_password());
    }
}

mod destinations {
    use super::*;

    const YAML: &str = r#"
project: bot
target: deploy@prod.example.com
workdir: /opt/bot
source: { ref: main }
services: [backend, router]
destinations:
  staging:
    target: deploy@staging.example.com
    workdir: /opt/bot-staging
    source: { ref: develop, dirty: stash }
    services: [backend]
"#;

    #[test]
    fn destination_overrides_fields() {
        let config = Config::from_yaml(YAML).unwrap();
        let staging = config.for_destination("staging").unwrap();

        assert_eq!(staging.target.unwrap().host, "staging.example.com");
        assert_eq!(staging.workdir, "/opt/bot-staging");
        let source = staging.source.unwrap();
        assert_eq!(source.reference.as_str(), "develop");
        assert_eq!(source.dirty, DirtyPolicy::Stash);
        assert_eq!(source.remote, "origin");
        assert_eq!(staging.services.len(), 1);
    }

    #[test]
    fn unknown_destination_is_an_error() {
        let config = Config::from_yaml(YAML).unwrap();
        assert!(config.for_destination("qa").is_err());
    }
}

mod discovery {
    use super::*;
    use std::fs;

    #[test]
    fn discover_finds_alternate_names() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join(".deckhand")).unwrap();
        fs::write(
            dir.path().join(".deckhand/config.yml"),
            "project: bot\nworkdir: /opt/bot\nservices: [backend]\n",
        )
        .unwrap();

        let config = Config::discover(dir.path()).unwrap();
        assert_eq!(config.project.as_str(), "bot");
    }

    #[test]
    fn discover_reports_missing_config() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::discover(dir.path()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn init_writes_a_valid_template() {
        let dir = tempfile::tempdir().unwrap();
        init_config(dir.path(), Some("shop"), false).unwrap();

        let config = Config::discover(dir.path()).unwrap();
        assert_eq!(config.project.as_str(), "shop");
        config.validate().unwrap();
        assert!(init_config(dir.path(), None, false).is_err());
        init_config(dir.path(), None, true).unwrap();
    }
}
