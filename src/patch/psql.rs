// ABOUTME: psql invocation inside the datastore container via `compose exec`.
// ABOUTME: The password travels as a redacted PGPASSWORD environment variable.

use crate::compose::ComposeCli;
use crate::exec::{ExecError, Executor, ShellCommand, shell_quote};
use crate::types::ServiceName;

/// Resolved datastore connection for one run.
#[derive(Clone)]
pub struct PsqlClient {
    compose: ComposeCli,
    service: ServiceName,
    user: String,
    password: Option<String>,
    database: String,
}

impl std::fmt::Debug for PsqlClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PsqlClient")
            .field("service", &self.service)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("database", &self.database)
            .finish_non_exhaustive()
    }
}

impl PsqlClient {
    pub fn new(
        compose: ComposeCli,
        service: ServiceName,
        user: impl Into<String>,
        password: Option<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            compose,
            service,
            user: user.into(),
            password,
            database: database.into(),
        }
    }

    /// The compose service hosting the datastore.
    pub fn service(&self) -> &ServiceName {
        &self.service
    }

    /// Succeeds once the datastore accepts connections.
    pub fn ready_probe(&self) -> ShellCommand {
        self.compose.command(&format!(
            "exec -T {} pg_isready -U {} -d {}",
            self.service,
            shell_quote(&self.user),
            shell_quote(&self.database)
        ))
    }

    /// `psql` running `statements` in order; `single_transaction` wraps them with `-1`.
    pub fn command(&self, statements: &[String], single_transaction: bool) -> ShellCommand {
        let mut args = String::from("exec -T ");
        if self.password.is_some() {
            args.push_str("-e PGPASSWORD ");
        }
        args.push_str(&format!(
            "{} psql -U {} -d {} -v ON_ERROR_STOP=1 -tA",
            self.service,
            shell_quote(&self.user),
            shell_quote(&self.database)
        ));
        if single_transaction {
            args.push_str(" -1");
        }
        for sql in statements {
            args.push_str(" -c ");
            args.push_str(&shell_quote(sql));
        }

        let cmd = self.compose.command(&args);
        match &self.password {
            Some(password) => cmd.secret_env("PGPASSWORD", password.clone()),
            None => cmd,
        }
    }

    /// Run read-only queries and return their output.
    pub async fn query(
        &self,
        exec: &dyn Executor,
        statements: &[String],
    ) -> Result<String, ExecError> {
        let output = exec.run_checked(&self.command(statements, false)).await?;
        Ok(output.stdout)
    }
}

/// Rows affected according to psql command tags (`DELETE 3`, `INSERT 0 2`).
pub fn affected_rows(output: &str) -> u64 {
    output
        .lines()
        .filter_map(|line| {
            let mut words = line.split_whitespace();
            let tag = words.next()?;
            if !matches!(tag, "INSERT" | "DELETE" | "UPDATE" | "MERGE" | "COPY") {
                return None;
            }
            words.last()?.parse::<u64>().ok()
        })
        .sum()
}
