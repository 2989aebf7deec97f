// ABOUTME: Integration tests for the data patcher against a scripted datastore container.
// ABOUTME: Covers the destructive-statement guard, max_rows caps, dry runs, and verify queries.

mod support;

use deckhand::compose::ComposeCli;
use deckhand::exec::CommandOutput;
use deckhand::patch::{
    DataPatcher, Patch, PatchFailure, PatchOptions, PsqlClient, SqlValue, Statement, VerifyQuery,
};
use deckhand::types::ServiceName;
use support::ScriptedExecutor;

fn psql() -> PsqlClient {
    PsqlClient::new(
        ComposeCli::new("docker compose", "docker-compose.yml", "/opt/shop"),
        ServiceName::new("db").unwrap(),
        "shop",
        Some("s3cret".to_string()),
        "shop",
    )
}

fn bounded_delete(max_rows: Option<u64>) -> Patch {
    Patch {
        name: "purge-test-plans".to_string(),
        statement: Statement::Delete {
            table: "plans".to_string(),
            predicate: "price < 100000".to_string(),
            max_rows,
        },
    }
}

fn seed_insert() -> Patch {
    Patch {
        name: "seed-plans".to_string(),
        statement: Statement::Insert {
            table: "plans".to_string(),
            columns: vec!["code".to_string(), "price".to_string()],
            rows: vec![
                vec![SqlValue::Text("basic".to_string()), SqlValue::Int(150000)],
                vec![SqlValue::Text("pro".to_string()), SqlValue::Int(300000)],
            ],
            conflict: Some(vec!["code".to_string()]),
        },
    }
}

#[tokio::test]
async fn unbounded_delete_is_refused_before_anything_runs() {
    let exec = ScriptedExecutor::new();
    let psql = psql();

    let err = DataPatcher::new(&exec, &psql, PatchOptions::default())
        .apply(&[seed_insert(), bounded_delete(None)])
        .await
        .unwrap_err();

    assert!(matches!(err.reason, PatchFailure::Refused));
    assert_eq!(err.statement, "purge-test-plans");
    assert!(err.applied.is_empty());
    assert!(exec.commands().is_empty());
}

#[tokio::test]
async fn allow_destructive_lets_unbounded_delete_run() {
    let exec = ScriptedExecutor::new().on("DELETE FROM plans", CommandOutput::ok("DELETE 12\n"));
    let psql = psql();
    let options = PatchOptions {
        allow_destructive: true,
        ..Default::default()
    };

    let report = DataPatcher::new(&exec, &psql, options)
        .apply(&[bounded_delete(None)])
        .await
        .unwrap();

    assert_eq!(report.outcomes[0].affected, Some(12));
}

fn deleted(rows: u64) -> CommandOutput {
    CommandOutput {
        exit_code: 0,
        stdout: "DO\n".to_string(),
        stderr: format!("NOTICE:  deckhand deleted {rows}\n"),
    }
}

#[tokio::test]
async fn max_rows_guard_rolls_back_when_too_many_match() {
    let exec = ScriptedExecutor::new().on(
        "DELETE FROM plans",
        CommandOutput::failed(
            3,
            "ERROR:  deckhand max_rows exceeded: 40 > 10\n\
             CONTEXT:  PL/pgSQL function inline_code_block line 1 at RAISE\n",
        ),
    );
    let psql = psql();

    let err = DataPatcher::new(&exec, &psql, PatchOptions::default())
        .apply(&[bounded_delete(Some(10))])
        .await
        .unwrap_err();

    assert!(matches!(
        err.reason,
        PatchFailure::TooManyRows {
            matched: 40,
            max_rows: 10
        }
    ));
    assert!(err.applied.is_empty());
    // the count and the delete are one statement in one transaction
    let commands = exec.commands();
    assert_eq!(commands.len(), 1);
    assert!(commands[0].contains(" -1 -c "));
    assert!(commands[0].contains("GET DIAGNOSTICS n = ROW_COUNT"));
    assert!(!exec.ran("SELECT count(*)"));
}

#[tokio::test]
async fn bounded_delete_reports_rows_removed() {
    let exec = ScriptedExecutor::new().on("DELETE FROM plans", deleted(4));
    let psql = psql();

    let report = DataPatcher::new(&exec, &psql, PatchOptions::default())
        .apply(&[bounded_delete(Some(10))])
        .await
        .unwrap();

    assert_eq!(report.outcomes[0].affected, Some(4));
}

#[tokio::test]
async fn failure_reports_patches_already_applied() {
    let exec = ScriptedExecutor::new()
        .on("INSERT INTO plans", CommandOutput::ok("INSERT 0 2\n"))
        .on(
            "DELETE FROM plans",
            CommandOutput::failed(3, "ERROR:  permission denied for table plans"),
        );
    let psql = psql();

    let err = DataPatcher::new(&exec, &psql, PatchOptions::default())
        .apply(&[seed_insert(), bounded_delete(Some(10))])
        .await
        .unwrap_err();

    assert_eq!(err.applied, vec!["seed-plans"]);
    assert!(err.tail().unwrap().contains("permission denied"));
    assert!(err.to_string().contains("already applied: seed-plans"));
}

#[tokio::test]
async fn applying_the_same_patches_twice_changes_nothing_the_second_time() {
    let exec = ScriptedExecutor::new()
        .on_sequence(
            "ALTER TYPE order_status",
            vec![CommandOutput::ok("ALTER TYPE\n"), CommandOutput::ok("ALTER TYPE\n")],
        )
        .on_sequence("DELETE FROM plans", vec![deleted(3), deleted(0)])
        .on_sequence(
            "ON CONFLICT",
            vec![CommandOutput::ok("INSERT 0 2\n"), CommandOutput::ok("INSERT 0 0\n")],
        )
        .on_sequence(
            "WHERE NOT EXISTS",
            vec![
                CommandOutput::ok("INSERT 0 1\n"),
                CommandOutput::ok("INSERT 0 0\n"),
            ],
        );
    let psql = psql();
    let patches = vec![
        Patch {
            name: "status-enum".to_string(),
            statement: Statement::AddEnumValue {
                type_name: "order_status".to_string(),
                value: "refunded".to_string(),
            },
        },
        bounded_delete(Some(10)),
        seed_insert(),
        Patch {
            name: "default-coupon".to_string(),
            statement: Statement::Insert {
                table: "coupons".to_string(),
                columns: vec!["code".to_string()],
                rows: vec![vec![SqlValue::Text("WELCOME".to_string())]],
                conflict: None,
            },
        },
    ];
    let patcher = DataPatcher::new(&exec, &psql, PatchOptions::default());

    let first = patcher.apply(&patches).await.unwrap();
    let first_commands = exec.commands();
    let second = patcher.apply(&patches).await.unwrap();
    let second_commands = exec.commands()[first_commands.len()..].to_vec();

    let affected = |r: &deckhand::patch::PatchReport| -> Vec<Option<u64>> {
        r.outcomes.iter().map(|o| o.affected).collect()
    };
    assert_eq!(affected(&first), vec![None, Some(3), Some(2), Some(1)]);
    assert_eq!(affected(&second), vec![None, Some(0), Some(0), Some(0)]);
    assert_eq!(first_commands, second_commands);
    assert!(second_commands[0].contains("ADD VALUE IF NOT EXISTS"));
    assert!(second_commands[2].contains("ON CONFLICT (code) DO NOTHING"));
    assert!(second_commands[3].contains("WHERE NOT EXISTS"));
}

#[tokio::test]
async fn dry_run_estimates_and_changes_nothing() {
    let exec = ScriptedExecutor::new()
        .on("SELECT count(*) FROM plans", CommandOutput::ok("7\n"))
        .on("NOT EXISTS", CommandOutput::ok("t\nf\n"));
    let psql = psql();
    let options = PatchOptions {
        dry_run: true,
        ..Default::default()
    };

    let report = DataPatcher::new(&exec, &psql, options)
        .apply(&[bounded_delete(None), seed_insert()])
        .await
        .unwrap();

    assert!(report.dry_run);
    assert_eq!(report.outcomes[0].affected, Some(7));
    assert_eq!(
        report.outcomes[0].note.as_deref(),
        Some("requires --allow-destructive")
    );
    assert!(!exec.ran("DELETE FROM"));
    assert!(!exec.ran("INSERT INTO"));
}

#[tokio::test]
async fn password_never_appears_in_recorded_commands() {
    let exec = ScriptedExecutor::new().on("INSERT INTO", CommandOutput::ok("INSERT 0 2\n"));
    let psql = psql();

    DataPatcher::new(&exec, &psql, PatchOptions::default())
        .apply(&[seed_insert()])
        .await
        .unwrap();

    let commands = exec.commands();
    assert!(commands.iter().all(|c| !c.contains("s3cret")));
    assert!(commands[0].contains("PGPASSWORD=***"));
}

#[tokio::test]
async fn verify_queries_compare_trimmed_output() {
    let exec = ScriptedExecutor::new()
        .on("count(*) FROM plans", CommandOutput::ok("5\n"))
        .on("count(*) FROM leads", CommandOutput::ok("0\n"));
    let psql = psql();
    let queries = vec![
        VerifyQuery {
            name: "seed-rows".to_string(),
            query: "SELECT count(*) FROM plans".to_string(),
            expect: "5".to_string(),
        },
        VerifyQuery {
            name: "leads".to_string(),
            query: "SELECT count(*) FROM leads".to_string(),
            expect: "3".to_string(),
        },
    ];

    let results = DataPatcher::new(&exec, &psql, PatchOptions::default())
        .check(&queries)
        .await;

    assert!(results[0].passed);
    assert!(!results[1].passed);
    assert!(!results[1].optional);
    assert!(results[1].detail.as_deref().unwrap().contains("expected \"3\""));
}
