use crate::chart::render_chart;
use crate::command_palette::CommandPalette;
use crate::core::db::{
    format_column_definition, record_from_json, ColumnChange, ColumnSpec, QueryExecutor,
    QueryResult, RecordAccessor, SchemaManager, Value,
};
use crate::core::{CommandResult, DashError, Result};
use crate::data_mill::{create_initial_tables, DataGenerator};
use crate::insights::{catalog, find_insight, run_insight, ChartView};
use crate::record_form::{ColumnKind, RecordForm};
use crate::results_grid::ResultsGrid;
use crate::schema_navigator::SchemaNavigator;
use crate::session::Session;
use indexmap::IndexMap;
use rusqlite::Connection;
use std::io::{self, BufRead, Write};
use tracing::debug;

/// Represents a parsed REPL command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Connect(String),
    Tables,
    Describe(String),
    Init,
    Generate(Option<usize>),
    Read { table: String, page: usize },
    Get { table: String, id: String },
    Insert { table: String, data: String },
    Update { table: String, id: String, data: String },
    Delete { table: String, id: String },
    CreateTable { table: String, columns: String },
    AddColumn { table: String, columns: String },
    ModifyColumn { table: String, changes: String },
    DropColumn { table: String, column: String },
    RenameTable { old: String, new: String },
    Truncate(String),
    DropTable(String),
    Form(String),
    Insights,
    /// Select an insight by number or name, optionally in a given chart style
    Insight {
        query: Option<String>,
        view: Option<ChartView>,
    },
    Next,
    Prev,
    Help,
    Quit,
    Sql(String),
    Unknown(String),
}

/// Splits off up to `count - 1` leading words; the remainder is the last part.
fn split_args(input: &str, count: usize) -> Vec<&str> {
    let mut parts = Vec::with_capacity(count);
    let mut rest = input.trim();
    while parts.len() + 1 < count && !rest.is_empty() {
        match rest.find(char::is_whitespace) {
            Some(pos) => {
                parts.push(&rest[..pos]);
                rest = rest[pos..].trim_start();
            }
            None => {
                parts.push(rest);
                rest = "";
            }
        }
    }
    if !rest.is_empty() {
        parts.push(rest);
    }
    parts
}

/// Exactly `N` arguments, the last one taking the rest of the line.
fn args<const N: usize>(rest: &str) -> Option<[String; N]> {
    let parts = split_args(rest, N);
    if parts.len() != N {
        return None;
    }
    parts
        .into_iter()
        .map(String::from)
        .collect::<Vec<_>>()
        .try_into()
        .ok()
}

fn no_args(rest: &str, command: Command) -> Option<Command> {
    rest.is_empty().then_some(command)
}

fn parse_insight(rest: &str) -> Command {
    if rest.is_empty() {
        return Command::Insight {
            query: None,
            view: None,
        };
    }
    if let Some(view) = ChartView::parse(rest) {
        return Command::Insight {
            query: None,
            view: Some(view),
        };
    }
    let (query, view) = match rest.rsplit_once(char::is_whitespace) {
        Some((head, last)) => match ChartView::parse(last) {
            Some(view) => (head.trim(), Some(view)),
            None => (rest, None),
        },
        None => (rest, None),
    };
    Command::Insight {
        query: Some(query.to_string()),
        view,
    }
}

/// Parses a user input string into a corresponding `Command`.
///
/// If the input starts with a colon (`:`), it is interpreted as a command.
/// Otherwise, it is treated as a SQL query.
pub fn parse_command(input: &str) -> Command {
    let input = input.trim();
    if !input.starts_with(':') {
        return Command::Sql(input.to_string());
    }
    let body = &input[1..];
    let (name, rest) = match body.find(char::is_whitespace) {
        Some(pos) => (&body[..pos], body[pos..].trim()),
        None => (body, ""),
    };

    let command = match name {
        "connect" => args::<1>(rest).map(|[path]| Command::Connect(path)),
        "tables" => no_args(rest, Command::Tables),
        "describe" => args::<1>(rest).map(|[table]| Command::Describe(table)),
        "init" => no_args(rest, Command::Init),
        "generate" => {
            if rest.is_empty() {
                Some(Command::Generate(None))
            } else {
                rest.parse::<usize>().ok().map(|n| Command::Generate(Some(n)))
            }
        }
        "read" => match split_args(rest, 2).as_slice() {
            [table] => Some(Command::Read {
                table: table.to_string(),
                page: 1,
            }),
            [table, page] => page
                .parse::<usize>()
                .ok()
                .filter(|page| *page >= 1)
                .map(|page| Command::Read {
                    table: table.to_string(),
                    page,
                }),
            _ => None,
        },
        "get" => args::<2>(rest).map(|[table, id]| Command::Get { table, id }),
        "insert" => args::<2>(rest).map(|[table, data]| Command::Insert { table, data }),
        "update" => args::<3>(rest).map(|[table, id, data]| Command::Update { table, id, data }),
        "delete" => args::<2>(rest).map(|[table, id]| Command::Delete { table, id }),
        "create-table" => {
            args::<2>(rest).map(|[table, columns]| Command::CreateTable { table, columns })
        }
        "add-column" => args::<2>(rest).map(|[table, columns]| Command::AddColumn { table, columns }),
        "modify-column" => {
            args::<2>(rest).map(|[table, changes]| Command::ModifyColumn { table, changes })
        }
        "drop-column" => {
            args::<2>(rest).map(|[table, column]| Command::DropColumn { table, column })
        }
        "rename-table" => args::<2>(rest).map(|[old, new]| Command::RenameTable { old, new }),
        "truncate" => args::<1>(rest).map(|[table]| Command::Truncate(table)),
        "drop-table" => args::<1>(rest).map(|[table]| Command::DropTable(table)),
        "form" => args::<1>(rest).map(|[table]| Command::Form(table)),
        "insights" => no_args(rest, Command::Insights),
        "insight" => Some(parse_insight(rest)),
        "next" => no_args(rest, Command::Next),
        "prev" => no_args(rest, Command::Prev),
        "help" => Some(Command::Help),
        "quit" | "exit" => Some(Command::Quit),
        _ => None,
    };
    command.unwrap_or_else(|| Command::Unknown(input.to_string()))
}

/// Message for input that did not parse: usage of the command when the name
/// is known, otherwise suggestions.
fn unknown_command(palette: &CommandPalette, input: &str) -> String {
    let name = input
        .trim_start_matches(':')
        .split_whitespace()
        .next()
        .unwrap_or("");
    if let Some(command) = palette.lookup(name) {
        return format!("usage: {}", command.usage);
    }
    let suggestions: Vec<String> = palette
        .filter_commands(name)
        .into_iter()
        .take(5)
        .map(|c| format!(":{}", c.name))
        .collect();
    if name.is_empty() || suggestions.is_empty() {
        format!("Unknown command '{}'. Type :help for the list of commands.", input)
    } else {
        format!(
            "Unknown command '{}'. Did you mean: {}?",
            input,
            suggestions.join(", ")
        )
    }
}

/// Finds the column rows are addressed by and converts `raw_id` to its kind.
///
/// The first primary key column is used, or a column named `id` when the
/// table has no primary key.
fn row_key(conn: &Connection, table: &str, raw_id: &str) -> Result<(String, String, Value)> {
    let descriptor = SchemaManager::new(conn).describe_table(table)?;
    let column = descriptor
        .columns
        .iter()
        .find(|c| c.is_primary())
        .or_else(|| descriptor.column("id"))
        .ok_or_else(|| {
            DashError::data(format!(
                "table '{}' has no primary key to address rows by",
                descriptor.name
            ))
        })?;
    let id = ColumnKind::from_declared_type(&column.declared_type).parse_input(raw_id, false)?;
    Ok((descriptor.name.clone(), column.name.clone(), id))
}

fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("1 {}", noun)
    } else {
        format!("{} {}s", count, noun)
    }
}

fn render_grid(grid: &ResultsGrid) -> String {
    format!("{}\n{}", grid.render(), grid.footer())
}

/// Runs the selected insight and renders its table and chart.
fn show_insight(session: &mut Session) -> CommandResult {
    let insight = session.insights.current();
    let views = insight.chart.views();
    let view = session.chart_view.unwrap_or(views[0]);
    if !views.contains(&view) {
        session.chart_view = None;
        let names: Vec<&str> = views.iter().map(|v| v.name()).collect();
        return Err(DashError::Command(format!(
            "'{}' can be drawn as: {}",
            insight.label,
            names.join(", ")
        )));
    }
    let heading = session.insights.heading();
    let page_size = session.config().ui.page_size;
    let width = session.config().ui.chart_width;

    let result = run_insight(session.connection()?, insight)?;
    let shown = QueryResult::new(
        result.columns.clone(),
        result.rows.iter().take(page_size).cloned().collect(),
    );
    let grid = ResultsGrid::from_query_result(&shown).with_window(0, result.row_count);
    let chart = render_chart(&result, view, width)?;

    let mut output = format!("{}\n{}\n\n{}\n\n{}", heading, insight.description, render_grid(&grid), chart);
    if views.len() > 1 {
        let names: Vec<&str> = views.iter().map(|v| v.name()).collect();
        output.push_str(&format!("\n\nchart styles: {}", names.join(", ")));
    }
    Ok(Some(output))
}

fn list_insights(session: &Session) -> String {
    let mut output = String::from("Insights:\n");
    for (index, insight) in catalog().iter().enumerate() {
        let marker = if index == session.insights.index() { '>' } else { ' ' };
        output.push_str(&format!(
            "{} {:>2}. {} [{}]\n",
            marker,
            index + 1,
            insight.label,
            insight.chart.views()[0].name()
        ));
    }
    output.push_str("\nRun one with :insight <number | name>, then :next / :prev.");
    output
}

fn describe(conn: &Connection, table: &str) -> CommandResult {
    let descriptor = SchemaManager::new(conn).describe_table(table)?;
    let mut grid = ResultsGrid::new(
        ["column", "type", "nullable", "default", "key", "extra"]
            .iter()
            .map(|h| h.to_string())
            .collect(),
    );
    for column in &descriptor.columns {
        grid.add_row(vec![
            Value::Text(column.name.clone()),
            Value::Text(column.declared_type.clone()),
            Value::Text(if column.nullable { "YES" } else { "NO" }.to_string()),
            column.default.clone().map_or(Value::Null, Value::Text),
            Value::Text(if column.is_primary() { "PRI" } else { "" }.to_string()),
            column.extra.clone().map_or(Value::Null, Value::Text),
        ]);
    }
    let definitions: Vec<String> = descriptor
        .columns
        .iter()
        .map(|c| format!("  {}", format_column_definition(c)))
        .collect();
    Ok(Some(format!(
        "Table: {}\n{}\nDefinitions:\n{}",
        descriptor.name,
        grid.render(),
        definitions.join("\n")
    )))
}

/// Lists the fields `:form` will ask for.
fn describe_form(conn: &Connection, table: &str) -> Result<RecordForm> {
    let descriptor = SchemaManager::new(conn).describe_table(table)?;
    Ok(RecordForm::for_table(&descriptor.name, &descriptor.columns))
}

/// Executes every command that does not need further input.
pub fn execute_command(session: &mut Session, command: &Command) -> CommandResult {
    debug!("Executing {:?}", command);
    match command {
        Command::Connect(path) => {
            session.connect(path)?;
            Ok(Some(format!("Connected to {}", path)))
        }
        Command::Tables => {
            let navigator = SchemaNavigator::from_connection(session.connection()?)?;
            if navigator.is_empty() {
                Ok(Some("No tables yet. Run :init to create the sample tables.".to_string()))
            } else {
                Ok(Some(navigator.render().trim_end().to_string()))
            }
        }
        Command::Describe(table) => describe(session.connection()?, table),
        Command::Init => {
            let created = create_initial_tables(&SchemaManager::new(session.connection()?))?;
            if created.is_empty() {
                Ok(Some("Sample tables already exist.".to_string()))
            } else {
                Ok(Some(format!("Created tables: {}", created.join(", "))))
            }
        }
        Command::Generate(count) => {
            let generator_config = session.config().generator.clone();
            let count = count.unwrap_or(generator_config.records_per_table);
            let conn = session.connection()?;
            create_initial_tables(&SchemaManager::new(conn))?;
            let summary = DataGenerator::new(count, generator_config.seed).insert_data(conn)?;
            let per_table: Vec<String> = summary
                .counts
                .iter()
                .map(|(table, n)| format!("{} {}", table, n))
                .collect();
            Ok(Some(format!(
                "Inserted {}: {}",
                plural(summary.total(), "row"),
                per_table.join(", ")
            )))
        }
        Command::Read { table, page } => {
            let page_size = session.config().ui.page_size;
            let accessor = RecordAccessor::open(session.connection()?, table)?;
            let total = accessor.count()?;
            let offset = (page - 1)
                .checked_mul(page_size)
                .filter(|offset| i64::try_from(*offset).is_ok())
                .ok_or_else(|| DashError::Command(format!("page {} is out of range", page)))?;
            let rows = accessor.read_many(page_size, offset)?;
            let grid = ResultsGrid::from_page(&rows).with_window(offset, total);
            Ok(Some(render_grid(&grid)))
        }
        Command::Get { table, id } => {
            let conn = session.connection()?;
            let (table, id_column, id) = row_key(conn, table, id)?;
            match RecordAccessor::open(conn, &table)?.read(&id, &id_column)? {
                Some(record) => Ok(Some(ResultsGrid::from_record(&record).render())),
                None => Ok(Some(format!("No row in {} with {} = {}", table, id_column, id))),
            }
        }
        Command::Insert { table, data } => {
            let record = record_from_json(data)?;
            let accessor = RecordAccessor::open(session.connection()?, table)?;
            let inserted = accessor.create(&record)?;
            Ok(Some(format!(
                "Inserted {} into {} (rowid {})",
                plural(inserted, "row"),
                accessor.table(),
                accessor.last_insert_id()
            )))
        }
        Command::Update { table, id, data } => {
            let record = record_from_json(data)?;
            let conn = session.connection()?;
            let (table, id_column, id) = row_key(conn, table, id)?;
            let updated = RecordAccessor::open(conn, &table)?.update(&id, &record, &id_column)?;
            Ok(Some(format!("Updated {} in {}", plural(updated, "row"), table)))
        }
        Command::Delete { table, id } => {
            let conn = session.connection()?;
            let (table, id_column, id) = row_key(conn, table, id)?;
            let deleted = RecordAccessor::open(conn, &table)?.delete(&id, &id_column)?;
            Ok(Some(format!("Deleted {} from {}", plural(deleted, "row"), table)))
        }
        Command::CreateTable { table, columns } => {
            let definitions = ColumnSpec::parse(columns)?;
            SchemaManager::new(session.connection()?).create_table(table, definitions)?;
            Ok(Some(format!("Created table {}", table)))
        }
        Command::AddColumn { table, columns } => {
            let definitions = ColumnSpec::parse(columns)?;
            SchemaManager::new(session.connection()?).add_column(table, definitions)?;
            Ok(Some(format!("Added columns to {}", table)))
        }
        Command::ModifyColumn { table, changes } => {
            let changes = ColumnChange::parse_list(changes)?;
            SchemaManager::new(session.connection()?).modify_column(table, &changes)?;
            Ok(Some(format!(
                "Modified {} of {}",
                plural(changes.len(), "column"),
                table
            )))
        }
        Command::DropColumn { table, column } => {
            SchemaManager::new(session.connection()?).drop_column(table, column)?;
            Ok(Some(format!("Dropped column {} from {}", column, table)))
        }
        Command::RenameTable { old, new } => {
            SchemaManager::new(session.connection()?).rename_table(old, new)?;
            Ok(Some(format!("Renamed table {} to {}", old, new)))
        }
        Command::Truncate(table) => {
            SchemaManager::new(session.connection()?).truncate_table(table)?;
            Ok(Some(format!("Truncated {}", table)))
        }
        Command::DropTable(table) => {
            SchemaManager::new(session.connection()?).drop_table(table)?;
            Ok(Some(format!("Dropped table {}", table)))
        }
        Command::Form(table) => Ok(Some(
            describe_form(session.connection()?, table)?
                .describe()
                .trim_end()
                .to_string(),
        )),
        Command::Insights => Ok(Some(list_insights(session))),
        Command::Insight { query, view } => {
            if let Some(query) = query {
                let index = find_insight(query).ok_or_else(|| {
                    DashError::Command(format!("no insight matches '{}'; see :insights", query))
                })?;
                session.insights.select(index);
            }
            session.chart_view = *view;
            show_insight(session)
        }
        Command::Next => {
            session.insights.next();
            session.chart_view = None;
            show_insight(session)
        }
        Command::Prev => {
            session.insights.prev();
            session.chart_view = None;
            show_insight(session)
        }
        Command::Help => Ok(Some(CommandPalette::new().help_text())),
        Command::Quit => Ok(None),
        Command::Sql(sql) => {
            if sql.trim().is_empty() {
                return Ok(None);
            }
            let result = QueryExecutor::new(session.connection()?).execute(sql)?;
            Ok(Some(render_grid(&ResultsGrid::from_query_result(&result))))
        }
        Command::Unknown(input) => Err(DashError::Command(unknown_command(
            &CommandPalette::new(),
            input,
        ))),
    }
}

/// Asks for every field of the table's form on `lines`, then inserts the row.
///
/// Invalid values are reported and asked for again.
fn run_form<I, W>(session: &mut Session, table: &str, lines: &mut I, output: &mut W) -> CommandResult
where
    I: Iterator<Item = io::Result<String>>,
    W: Write,
{
    let conn = session.connection()?;
    let form = describe_form(conn, table)?;
    writeln!(output, "{}", form.describe().trim_end())?;
    writeln!(output, "Leave optional fields blank to use their default.")?;

    let mut inputs = IndexMap::new();
    for field in &form.fields {
        loop {
            write!(output, "{}: ", field.name)?;
            output.flush()?;
            let line = match lines.next() {
                Some(line) => line?,
                None => {
                    return Err(DashError::Command(
                        "input ended before the form was complete".to_string(),
                    ))
                }
            };
            let value = line.trim().to_string();
            let accepted = if value.is_empty() && field.is_optional() {
                Ok(())
            } else {
                field.parse(&value).map(|_| ())
            };
            match accepted {
                Ok(()) => {
                    inputs.insert(field.name.clone(), value);
                    break;
                }
                Err(e) => writeln!(output, "  {}", e)?,
            }
        }
    }

    let record = form.fill(&inputs)?;
    let accessor = RecordAccessor::open(conn, &form.table)?;
    let inserted = accessor.create(&record)?;
    Ok(Some(format!(
        "Inserted {} into {} (rowid {})",
        plural(inserted, "row"),
        form.table,
        accessor.last_insert_id()
    )))
}

/// Runs the REPL over `input` until `:quit` or end of input, writing prompts,
/// results and errors to `output`.
pub fn run_repl<R: BufRead, W: Write>(session: &mut Session, input: R, mut output: W) -> Result<()> {
    writeln!(
        output,
        "Welcome to sqldash! Database: {}. Type :help for commands, :quit to exit.",
        session.database_path()
    )?;
    let mut lines = input.lines();

    loop {
        write!(output, "> ")?;
        output.flush()?;
        let line = match lines.next() {
            Some(line) => line?,
            None => break,
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let command = parse_command(trimmed);
        let outcome = match &command {
            Command::Quit => break,
            Command::Form(table) => run_form(session, table, &mut lines, &mut output),
            other => execute_command(session, other),
        };
        match outcome {
            Ok(Some(message)) => writeln!(output, "{}", message)?,
            Ok(None) => {}
            Err(e) => writeln!(output, "Error: {}", e)?,
        }
    }

    writeln!(output)?;
    Ok(())
}
