// ABOUTME: Property-based tests for step ordering and shell quoting.
// ABOUTME: Uses proptest to drive arbitrary operation sequences and inputs.

use deckhand::deploy::{StepKind, StepLog, StepStatus};
use deckhand::exec::{Executor, LocalExecutor, ShellCommand, shell_quote};
use proptest::prelude::*;

#[derive(Debug, Clone, Copy)]
enum Op {
    Begin,
    Succeed,
    Fail,
    Skip,
}

fn op() -> impl Strategy<Value = (Op, StepKind)> {
    (
        prop::sample::select(vec![Op::Begin, Op::Succeed, Op::Fail, Op::Skip]),
        prop::sample::select(StepKind::ALL.to_vec()),
    )
}

fn apply(log: &mut StepLog, (op, kind): (Op, StepKind)) {
    let _ = match op {
        Op::Begin => log.begin(kind),
        Op::Succeed => log.succeed(kind, None),
        Op::Fail => log.fail(kind, "boom"),
        Op::Skip => log.skip(kind, "not needed"),
    };
}

fn is_done(status: StepStatus) -> bool {
    matches!(status, StepStatus::Succeeded | StepStatus::Skipped)
}

proptest! {
    /// No step ever leaves pending before every earlier step has succeeded or been skipped.
    #[test]
    fn steps_never_run_out_of_order(ops in prop::collection::vec(op(), 0..40)) {
        let mut log = StepLog::new();
        for o in ops {
            apply(&mut log, o);
            let records = log.records();
            for (i, record) in records.iter().enumerate() {
                if record.status != StepStatus::Pending {
                    prop_assert!(
                        records[..i].iter().all(|r| is_done(r.status)),
                        "{} is {} with an unfinished earlier step",
                        record.kind,
                        record.status
                    );
                }
            }
            prop_assert!(
                records.iter().filter(|r| r.status == StepStatus::Running).count() <= 1
            );
        }
    }

    /// Quoted words contain no unescaped single quote and are never empty.
    #[test]
    fn shell_quote_output_is_well_formed(word in ".{0,40}") {
        let quoted = shell_quote(&word);
        prop_assert!(!quoted.is_empty());
        if quoted != word {
            prop_assert!(quoted.starts_with('\'') && quoted.ends_with('\''));
            let inner = &quoted[1..quoted.len() - 1];
            prop_assert_eq!(inner.replace("'\\''", ""), word.replace('\'', ""));
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// `sh` reads a quoted word back unchanged.
    #[test]
    fn shell_quote_survives_the_shell(word in "[ -~]{0,30}") {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let output = runtime
            .block_on(
                LocalExecutor::default()
                    .run(&ShellCommand::new(format!("printf %s {}", shell_quote(&word)))),
            )
            .unwrap();
        prop_assert!(output.success());
        prop_assert_eq!(output.stdout, word);
    }
}
