//! Interactive terminal session.
//!
//! Plain text is a question. Lines starting with `:` are commands, see
//! [`HELP`]. Safe statements run immediately; unsafe ones wait for
//! `:confirm` or `:cancel`.

use super::{SharedSession, Transport, wait_for_signal};
use crate::error::{ExplorerError, ExplorerResult};
use crate::format::{OutputFormat, format_columns, format_decision, format_table_list, render};
use crate::safety::GateDecision;
use std::fmt::Write as _;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

pub const HELP: &str = "\
Type a question in plain English, or one of:
  :connect <url|sqlite|postgres>  connect to a database
  :disconnect                     close the connection
  :tables                         list tables
  :schema <table>                 show a table's columns and keys
  :reindex                        re-read the schema and rebuild the index
  :sql <statement>                screen and run your own SQL
  :run                            run the last statement again
  :confirm                        run the pending unsafe statement
  :cancel                         discard the pending unsafe statement
  :demo                           create the teacher/class/student demo tables
  :help                           show this help
  :quit                           leave
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ask(String),
    Connect(String),
    Disconnect,
    Tables,
    Schema(String),
    Reindex,
    Sql(String),
    Run,
    Confirm,
    Cancel,
    Demo,
    Help,
    Quit,
}

/// Parse one input line. `None` for blank lines.
pub fn parse_command(line: &str) -> ExplorerResult<Option<Command>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let Some(rest) = line.strip_prefix(':') else {
        return Ok(Some(Command::Ask(line.to_string())));
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    let name = name.to_ascii_lowercase();
    let required = |what: &str| {
        if arg.is_empty() {
            Err(ExplorerError::invalid_input(format!(":{} needs {}", name, what)))
        } else {
            Ok(arg.to_string())
        }
    };

    let command = match name.as_str() {
        "connect" | "c" => Command::Connect(required("a connection URL or section name")?),
        "disconnect" => Command::Disconnect,
        "tables" | "t" => Command::Tables,
        "schema" | "s" => Command::Schema(required("a table name")?),
        "reindex" => Command::Reindex,
        "sql" => Command::Sql(required("a SQL statement")?),
        "run" | "r" => Command::Run,
        "confirm" | "yes" | "y" => Command::Confirm,
        "cancel" | "no" | "n" => Command::Cancel,
        "demo" => Command::Demo,
        "help" | "h" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => {
            return Err(ExplorerError::invalid_input(format!(
                "Unknown command ':{}'. Type :help for the list",
                other
            )));
        }
    };
    Ok(Some(command))
}

/// REPL state between lines.
pub struct Repl {
    session: SharedSession,
    /// Blocked statement waiting for :confirm / :cancel
    pending: Option<GateDecision>,
    last_sql: Option<String>,
    format: OutputFormat,
}

impl Repl {
    pub fn new(session: SharedSession) -> Self {
        Self {
            session,
            pending: None,
            last_sql: None,
            format: OutputFormat::Table,
        }
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Read lines until EOF or `:quit`.
    pub async fn run<R, W>(&mut self, reader: R, mut writer: W) -> ExplorerResult<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        loop {
            let prompt = self.prompt().await;
            write_out(&mut writer, &prompt).await?;

            let Some(line) = lines
                .next_line()
                .await
                .map_err(|e| ExplorerError::internal(format!("Failed to read input: {}", e)))?
            else {
                write_out(&mut writer, "\n").await?;
                break;
            };

            let (output, keep_going) = self.handle_line(&line).await;
            write_out(&mut writer, &output).await?;
            if !keep_going {
                break;
            }
        }
        Ok(())
    }

    async fn prompt(&self) -> String {
        let session = self.session.lock().await;
        let name = session.database_id().unwrap_or("not connected");
        if self.pending.is_some() {
            format!("{} (confirm/cancel)> ", name)
        } else {
            format!("{}> ", name)
        }
    }

    /// Handle one line and return what to print, plus whether to continue.
    pub async fn handle_line(&mut self, line: &str) -> (String, bool) {
        let mut out = String::new();
        let command = match parse_command(line) {
            Ok(Some(command)) => command,
            Ok(None) => return (out, true),
            Err(e) => {
                report_error(&mut out, &e);
                return (out, true);
            }
        };
        debug!(command = ?command, "REPL command");

        if command == Command::Quit {
            return (out, false);
        }
        if let Err(e) = self.dispatch(command, &mut out).await {
            report_error(&mut out, &e);
            if e.is_fatal() {
                self.pending = None;
                self.session.lock().await.disconnect().await;
                out.push_str("Session closed. Use :connect to start again.\n");
            }
        }
        (out, true)
    }

    async fn dispatch(&mut self, command: Command, out: &mut String) -> ExplorerResult<()> {
        match command {
            Command::Ask(question) => {
                self.discard_pending(out);
                let proposal = self.session.lock().await.ask(&question).await?;
                if !proposal.retrieved.is_empty() {
                    let tables: Vec<&str> = proposal
                        .retrieved
                        .iter()
                        .map(|h| h.fragment.table_name.as_str())
                        .collect();
                    let _ = writeln!(out, "Context: {}", tables.join(", "));
                }
                self.decide(proposal.decision, out).await
            }
            Command::Sql(sql) => {
                self.discard_pending(out);
                let decision = self.session.lock().await.screen(&sql)?;
                self.decide(decision, out).await
            }
            Command::Run => {
                self.discard_pending(out);
                let sql = self
                    .last_sql
                    .clone()
                    .ok_or_else(|| ExplorerError::invalid_input("No statement to run yet"))?;
                let decision = self.session.lock().await.screen(&sql)?;
                self.decide(decision, out).await
            }
            Command::Confirm => {
                let decision = self.pending.take().ok_or_else(|| {
                    ExplorerError::invalid_input("Nothing is waiting for confirmation")
                })?;
                warn!(sql = %decision.sql(), "User confirmed unsafe statement");
                let approved = decision.confirm().approve()?;
                let result = self.session.lock().await.execute(&approved).await?;
                out.push_str(&render(&result, self.format));
                Ok(())
            }
            Command::Cancel => {
                if self.pending.take().is_some() {
                    out.push_str("Cancelled.\n");
                } else {
                    out.push_str("Nothing to cancel.\n");
                }
                Ok(())
            }
            Command::Connect(input) => {
                self.pending = None;
                self.last_sql = None;
                let mut session = self.session.lock().await;
                let target = session.settings().resolve_target(&input)?;
                let report = session.connect(target).await?;
                let _ = writeln!(
                    out,
                    "Connected to {} ({}): {} tables, {}.",
                    report.database_id, report.db_type, report.tables, report.index
                );
                if let Some(warning) = report.warning {
                    let _ = writeln!(out, "Warning: {}", warning);
                }
                Ok(())
            }
            Command::Disconnect => {
                self.pending = None;
                self.session.lock().await.disconnect().await;
                out.push_str("Disconnected.\n");
                Ok(())
            }
            Command::Tables => {
                let session = self.session.lock().await;
                if !session.is_connected() {
                    return Err(ExplorerError::NotConnected);
                }
                out.push_str(&format_table_list(session.fragments()));
                Ok(())
            }
            Command::Schema(table) => {
                let session = self.session.lock().await;
                if !session.is_connected() {
                    return Err(ExplorerError::NotConnected);
                }
                let fragment = session.fragment(&table).ok_or_else(|| {
                    ExplorerError::invalid_input(format!("Unknown table '{}'", table))
                })?;
                out.push_str(&format_columns(fragment));
                Ok(())
            }
            Command::Reindex => {
                let outcome = self.session.lock().await.reindex().await?;
                let _ = writeln!(out, "Index {}.", outcome);
                Ok(())
            }
            Command::Demo => {
                let report = self.session.lock().await.seed_demo().await?;
                let _ = writeln!(
                    out,
                    "Created {} teachers, {} classes and {} students; {}.",
                    report.summary.teachers,
                    report.summary.classes,
                    report.summary.students,
                    report.index
                );
                Ok(())
            }
            Command::Help => {
                out.push_str(HELP);
                Ok(())
            }
            Command::Quit => Ok(()),
        }
    }

    /// Print the decision; run it when safe, park it when blocked.
    async fn decide(&mut self, decision: GateDecision, out: &mut String) -> ExplorerResult<()> {
        out.push_str(&format_decision(&decision));
        self.last_sql = Some(decision.sql().to_string());

        if decision.verdict().is_blocked() {
            out.push_str("Not executed. Type :confirm to run it anyway, or :cancel.\n");
            self.pending = Some(decision);
            return Ok(());
        }

        let approved = decision.approve()?;
        let result = self.session.lock().await.execute(&approved).await?;
        out.push_str(&render(&result, self.format));
        Ok(())
    }

    fn discard_pending(&mut self, out: &mut String) {
        if self.pending.take().is_some() {
            out.push_str("Discarded the pending statement.\n");
        }
    }
}

fn report_error(out: &mut String, err: &ExplorerError) {
    let _ = writeln!(out, "Error: {}", err);
    if let Some(suggestion) = err.suggestion() {
        let _ = writeln!(out, "Hint: {}", suggestion);
    }
}

async fn write_out<W: AsyncWrite + Unpin>(writer: &mut W, text: &str) -> ExplorerResult<()> {
    writer
        .write_all(text.as_bytes())
        .await
        .map_err(|e| ExplorerError::internal(format!("Failed to write output: {}", e)))?;
    writer
        .flush()
        .await
        .map_err(|e| ExplorerError::internal(format!("Failed to write output: {}", e)))
}

/// REPL over stdin/stdout.
pub struct ReplTransport {
    session: SharedSession,
    format: OutputFormat,
}

impl ReplTransport {
    pub fn new(session: SharedSession, format: OutputFormat) -> Self {
        Self { session, format }
    }
}

impl Transport for ReplTransport {
    async fn run(&self) -> ExplorerResult<()> {
        info!("Starting interactive session");
        let mut repl = Repl::new(self.session.clone()).with_format(self.format);

        let interrupted = tokio::select! {
            result = repl.run(BufReader::new(tokio::io::stdin()), tokio::io::stdout()) => {
                result?;
                false
            }
            _ = wait_for_signal() => true,
        };

        self.session.lock().await.disconnect().await;
        info!("Interactive session ended");

        if interrupted {
            // A pending stdin read cannot be cancelled; exit instead of waiting on it
            std::process::exit(0);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "repl"
    }
}
