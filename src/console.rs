//! Interactive console over a [`Database`].

use crate::backend::{Database, DatabaseBackend, QueryResult};
use crate::error::{OrmError, Result};
use crate::indent::{Aligner, Pad};
use crate::schema::validate_identifier;
use serde_json::Value;
use std::str::FromStr;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

const COMMANDS: &[(&str, &str)] = &[
    ("exit", "Exit the ORM console"),
    ("last cmd", "Get the last command written"),
    ("all cmd", "Get all the commands written"),
    ("tables", "Get all the tables name"),
    ("clean -t <table>", "Delete every row of a table"),
    ("show -t <table> [-s <start>] [-e <end>]", "Display the rows of a table"),
    ("help", "Display all the commands"),
];

const PROMPT: &str = "cmd: ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Exit,
    LastCommand,
    AllCommands,
    Tables,
    Clean {
        table: String,
    },
    Show {
        table: String,
        start: usize,
        end: Option<usize>,
    },
    Help,
    Unknown(String),
}

impl FromStr for ConsoleCommand {
    type Err = OrmError;

    fn from_str(line: &str) -> Result<Self> {
        let words: Vec<&str> = line.split_whitespace().collect();

        let command = match words.as_slice() {
            ["exit"] => ConsoleCommand::Exit,
            ["last", "cmd"] => ConsoleCommand::LastCommand,
            ["all", "cmd"] => ConsoleCommand::AllCommands,
            ["tables"] => ConsoleCommand::Tables,
            ["help"] => ConsoleCommand::Help,
            ["clean", args @ ..] => {
                let flags = parse_flags(args)?;
                ConsoleCommand::Clean {
                    table: required_table(&flags)?,
                }
            }
            ["show", args @ ..] => {
                let flags = parse_flags(args)?;
                let start = match flag(&flags, "-s") {
                    Some(value) => parse_position("-s", value)?,
                    None => 0,
                };
                let end = flag(&flags, "-e")
                    .map(|value| parse_position("-e", value))
                    .transpose()?;

                ConsoleCommand::Show {
                    table: required_table(&flags)?,
                    start,
                    end,
                }
            }
            _ => ConsoleCommand::Unknown(line.trim().to_string()),
        };

        Ok(command)
    }
}

fn parse_flags<'a>(args: &[&'a str]) -> Result<Vec<(&'a str, &'a str)>> {
    let mut flags = Vec::new();
    let mut args = args.iter();

    while let Some(name) = args.next() {
        if !matches!(*name, "-t" | "-s" | "-e") {
            return Err(OrmError::Parameter(format!("Unknown option {}", name)));
        }
        let value = args
            .next()
            .ok_or_else(|| OrmError::Parameter(format!("Option {} needs a value", name)))?;
        flags.push((*name, *value));
    }

    Ok(flags)
}

fn flag<'a>(flags: &[(&str, &'a str)], name: &str) -> Option<&'a str> {
    flags.iter().rev().find(|(n, _)| *n == name).map(|(_, v)| *v)
}

fn required_table(flags: &[(&str, &str)]) -> Result<String> {
    let table = flag(flags, "-t")
        .ok_or_else(|| OrmError::Parameter("Option -t <table> is required".to_string()))?;
    validate_identifier(table)?;
    Ok(table.to_string())
}

fn parse_position(name: &str, value: &str) -> Result<usize> {
    value.parse().map_err(|_| {
        OrmError::Parameter(format!("Option {} expects a position, got {}", name, value))
    })
}

/// Text to print after a command, and whether the console should stop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub exit: bool,
}

pub struct Console<B: DatabaseBackend> {
    db: Database<B>,
    history: Vec<String>,
    aligner: Aligner,
}

impl<B: DatabaseBackend> Console<B> {
    pub fn new(db: Database<B>) -> Self {
        Self {
            db,
            history: Vec::new(),
            aligner: Aligner::new(),
        }
    }

    /// Commands entered so far, without immediate repeats
    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn last_command(&self) -> &str {
        self.history.last().map(String::as_str).unwrap_or_default()
    }

    /// Run one line and record it in the history
    pub async fn execute(&mut self, line: &str) -> Reply {
        let line = line.trim();

        let reply = match line.parse::<ConsoleCommand>() {
            Ok(command) => {
                let exit = command == ConsoleCommand::Exit;
                match self.dispatch(command).await {
                    Ok(text) => Reply { text, exit },
                    Err(e) => {
                        tracing::warn!(command = line, error = %e, "console command failed");
                        Reply {
                            text: format!("Error: {}", e),
                            exit,
                        }
                    }
                }
            }
            Err(e) => Reply {
                text: format!("Error: {}", e),
                exit: false,
            },
        };

        if !line.is_empty() && line != self.last_command() {
            self.history.push(line.to_string());
        }

        reply
    }

    async fn dispatch(&mut self, command: ConsoleCommand) -> Result<String> {
        match command {
            ConsoleCommand::Exit => Ok("ORM console closing".to_string()),
            ConsoleCommand::LastCommand => Ok(format!("The last cmd was: {}", self.last_command())),
            ConsoleCommand::AllCommands => Ok(format!("Commands historic:{}", bullet_list(&self.history))),
            ConsoleCommand::Tables => {
                let tables = self.db.lock().await.list_tables().await?;
                Ok(format!("Tables name: {}", bullet_list(&tables)))
            }
            ConsoleCommand::Clean { table } => {
                let removed = self.db.lock().await.truncate_table(&table).await?;
                tracing::info!(table = %table, removed, "table cleaned");
                Ok(format!("Table {} cleaned", table))
            }
            ConsoleCommand::Show { table, start, end } => {
                let rows = self.db.lock().await.dump_table(&table, start, end).await?;
                self.render_rows(&table, &rows)
            }
            ConsoleCommand::Help => self.render_help(),
            ConsoleCommand::Unknown(line) => Ok(format!(
                "The command : \"{}\" is not recognized as a command, type help to display all the commands",
                line
            )),
        }
    }

    fn render_help(&mut self) -> Result<String> {
        let names: Vec<&str> = COMMANDS.iter().map(|(name, _)| *name).collect();
        self.aligner.set_max_size("commands", &names, 0);

        let mut out = "List of all commands\n".to_string();
        for (name, description) in COMMANDS {
            out.push_str(&format!(
                "{} : {}\n",
                self.aligner.smart_align(name, &["commands"], 0, Pad::Right)?,
                description
            ));
        }

        Ok(out)
    }

    fn render_rows(&mut self, table: &str, rows: &QueryResult) -> Result<String> {
        let Some(first) = rows.first() else {
            return Ok(format!("Table {} has no row in this range", table));
        };

        let columns: Vec<&String> = first.columns.keys().collect();
        let mut categories = Vec::with_capacity(columns.len());

        for column in &columns {
            let mut cells = vec![column.to_string()];
            cells.extend(rows.iter().map(|row| {
                row.columns.get(*column).map(cell).unwrap_or_default()
            }));

            let category = format!("{}.{}", table, column);
            self.aligner.set_max_size(&category, &cells, 0);
            categories.push(category);
        }

        let render_line = |aligner: &Aligner, cells: Vec<String>| -> Result<String> {
            let mut padded = Vec::with_capacity(cells.len());
            for (value, category) in cells.iter().zip(&categories) {
                padded.push(aligner.smart_align(value, &[category.as_str()], 0, Pad::Right)?);
            }
            Ok(padded.join(" | ").trim_end().to_string())
        };

        let mut out = render_line(&self.aligner, columns.iter().map(|c| c.to_string()).collect())?;
        out.push('\n');
        for row in rows {
            let cells = columns
                .iter()
                .map(|c| row.columns.get(*c).map(cell).unwrap_or_default())
                .collect();
            out.push_str(&render_line(&self.aligner, cells)?);
            out.push('\n');
        }

        Ok(out)
    }

    /// Read commands until `exit` or end of input
    pub async fn run<R, W>(&mut self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        writer
            .write_all(b"\nWelcome to the ORM in console\n\n")
            .await?;

        let mut lines = reader.lines();
        loop {
            writer.write_all(PROMPT.as_bytes()).await?;
            writer.flush().await?;

            let Some(line) = lines.next_line().await? else {
                break;
            };

            let reply = self.execute(&line).await;
            writer
                .write_all(format!("\n{}\n\n", reply.text.trim_end()).as_bytes())
                .await?;

            if reply.exit {
                break;
            }
        }

        writer.flush().await?;
        Ok(())
    }
}

fn bullet_list<S: AsRef<str>>(items: &[S]) -> String {
    items
        .iter()
        .map(|item| format!("\n- {}", item.as_ref()))
        .collect()
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
