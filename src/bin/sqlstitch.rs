//! sqlstitch: compile and run SQL templates
//!
//! # Usage
//!
//! ```bash
//! # Show the native command for SQL Server
//! sqlstitch compile "SELECT * FROM Users WHERE Id = {@Id}" --dialect sqlserver --param Id:int64=42
//!
//! # Stage a temporary table and run it against SQLite
//! sqlstitch run "SELECT Value FROM {#Ids}" --values Ids:int64=1,2,3 --database-url sqlite::memory:
//!
//! # Convert a value between kinds
//! sqlstitch convert 2024-03-01T10:00:00 --from datetime --to date
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::*;
use serde_json::json;
use sqlstitch::cancel::CancellationSignal;
use sqlstitch::command::{CommandOptions, compile_and_prepare};
use sqlstitch::compiler::{CompiledStatement, compile};
use sqlstitch::config::{EnumSerialization, Settings};
use sqlstitch::dialect::{ColumnDefinition, Dialect, DialectAdapter, SessionProfile};
use sqlstitch::engine::SqlxConnection;
use sqlstitch::fragment::{ParameterValue, Statement, TemplateArgs, TemporaryTableRequest};
use sqlstitch::native::{NativeConnection, NativeRow};
use sqlstitch::value::text::{format_text, parse_text};
use sqlstitch::value::{Scalar, ScalarKind, convert};

#[derive(Parser)]
#[command(name = "sqlstitch")]
#[command(version)]
#[command(about = "Compile SQL templates into native commands", long_about = None)]
#[command(after_help = "EXAMPLES:
    sqlstitch compile 'SELECT * FROM T WHERE Id = {@Id}' -d postgres -p Id:int64=7
    sqlstitch compile 'SELECT * FROM T WHERE Id IN (SELECT Value FROM {#Ids})' -d oracle --values Ids:int32=1,2
    sqlstitch run 'SELECT COUNT(*) FROM {#Ids}' --values Ids=a,b --database-url sqlite::memory:
    sqlstitch convert 1.2.3.4 --from text --to int32")]
struct Cli {
    /// Settings file (defaults to <config dir>/sqlstitch/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct TemplateInput {
    /// Template with {@Param} and {#Table} placeholders
    template: String,

    /// Parameter binding: NAME[:KIND]=VALUE. A VALUE of NULL binds null.
    #[arg(short, long = "param")]
    params: Vec<String>,

    /// Temporary table of values: NAME[:KIND]=a,b,c
    #[arg(long = "values")]
    tables: Vec<String>,

    /// Override the enum serialization setting
    #[arg(long, value_enum)]
    enums: Option<EnumPolicy>,
}

#[derive(Clone, Copy, ValueEnum)]
enum EnumPolicy {
    Integers,
    Text,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a template without connecting
    Compile {
        #[command(flatten)]
        input: TemplateInput,

        /// Target dialect
        #[arg(short, long, value_parser = parse_dialect)]
        dialect: Dialect,

        /// Compile as if the server had no temporary tables
        #[arg(long)]
        no_temp_tables: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Compile, stage and run a template against a database
    Run {
        #[command(flatten)]
        input: TemplateInput,

        /// Database connection URL
        #[arg(long, env = "SQLSTITCH_DATABASE_URL")]
        database_url: String,

        /// Report affected rows instead of printing result rows
        #[arg(long)]
        execute: bool,

        /// Command timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// List supported dialects
    Dialects,
    /// Convert a value between scalar kinds
    Convert {
        value: String,

        #[arg(long, value_parser = parse_kind, default_value = "text")]
        from: ScalarKind,

        #[arg(long, value_parser = parse_kind)]
        to: ScalarKind,
    },
}

fn parse_dialect(s: &str) -> std::result::Result<Dialect, String> {
    s.parse().map_err(|e: sqlstitch::Error| e.to_string())
}

fn parse_kind(s: &str) -> std::result::Result<ScalarKind, String> {
    ScalarKind::from_name(s).ok_or_else(|| format!("Unknown kind '{}'", s))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "sqlstitch=debug" } else { "sqlstitch=warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Compile {
            input,
            dialect,
            no_temp_tables,
            format,
        } => {
            let settings = load_settings(cli.config.as_ref(), input.enums)?;
            compile_template(&input, dialect, no_temp_tables, format, &settings)
        }
        Commands::Run {
            input,
            database_url,
            execute,
            timeout,
            format,
        } => {
            let settings = load_settings(cli.config.as_ref(), input.enums)?;
            let statement = build_statement(&input)?;
            run_template(&statement, &database_url, execute, timeout, format, &settings).await
        }
        Commands::Dialects => {
            show_dialects();
            Ok(())
        }
        Commands::Convert { value, from, to } => convert_value(&value, from, to),
    }
}

fn load_settings(path: Option<&PathBuf>, enums: Option<EnumPolicy>) -> Result<Settings> {
    let settings = match path {
        Some(path) => Settings::load(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => Settings::load_default().context("loading default settings")?,
    };
    Ok(match enums {
        Some(EnumPolicy::Integers) => settings.with_enum_serialization(EnumSerialization::AsIntegers),
        Some(EnumPolicy::Text) => settings.with_enum_serialization(EnumSerialization::AsText),
        None => settings,
    })
}

/// Split `NAME[:KIND]=VALUE`. The kind defaults to text.
fn split_binding(binding: &str) -> Result<(&str, ScalarKind, &str)> {
    let (head, value) = binding
        .split_once('=')
        .ok_or_else(|| anyhow!("expected NAME[:KIND]=VALUE, got '{}'", binding))?;
    let (name, kind) = match head.split_once(':') {
        Some((name, kind)) => (
            name,
            ScalarKind::from_name(kind).ok_or_else(|| anyhow!("unknown kind '{}'", kind))?,
        ),
        None => (head, ScalarKind::Text),
    };
    Ok((name.trim(), kind, value))
}

fn parse_value(text: &str, kind: ScalarKind) -> Result<Option<Scalar>> {
    if text == "NULL" {
        return Ok(None);
    }
    Ok(Some(parse_text(text, kind)?))
}

fn build_statement(input: &TemplateInput) -> Result<Statement> {
    let mut args = TemplateArgs::new();
    for binding in &input.params {
        let (name, kind, text) = split_binding(binding)?;
        let value = parse_value(text, kind).with_context(|| format!("parameter '{}'", name))?;
        args = args.param_value(name, ParameterValue { kind, value });
    }
    for binding in &input.tables {
        let (name, kind, list) = split_binding(binding)?;
        let values = list
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| parse_value(v, kind))
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("temporary table '{}'", name))?;
        args = args.table(name, TemporaryTableRequest::of_scalars(name, kind, values));
    }
    Ok(sqlstitch::parse(&input.template, &args)?)
}

fn compile_template(
    input: &TemplateInput,
    dialect: Dialect,
    no_temp_tables: bool,
    format: OutputFormat,
    settings: &Settings,
) -> Result<()> {
    let statement = build_statement(input)?;
    let adapter = dialect.adapter();
    let mut profile = SessionProfile::offline(dialect);
    if no_temp_tables {
        profile = profile.without_temporary_tables();
    }
    let compiled = compile(&statement, adapter, &profile, settings)?;

    match format {
        OutputFormat::Json => {
            let report = compiled_json(&compiled, adapter, settings)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => print_compiled(&compiled, adapter, settings)?,
    }
    Ok(())
}

fn table_ddl(
    request: &TemporaryTableRequest,
    quoted_name: &str,
    adapter: &dyn DialectAdapter,
    settings: &Settings,
) -> Result<(String, String)> {
    let definitions = request
        .columns()
        .into_iter()
        .map(|(name, kind)| -> Result<ColumnDefinition> {
            Ok(ColumnDefinition {
                name: adapter.quote_identifier(name),
                type_name: adapter.native_type_name(kind, settings.enum_serialization)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok((
        adapter.create_temporary_table_sql(quoted_name, &definitions),
        adapter.drop_temporary_table_sql(quoted_name),
    ))
}

fn display_value(value: Option<&Scalar>) -> String {
    value.map(format_text).unwrap_or_else(|| "NULL".to_string())
}

fn print_compiled(
    compiled: &CompiledStatement,
    adapter: &dyn DialectAdapter,
    settings: &Settings,
) -> Result<()> {
    println!("{} {}", "Dialect:".dimmed(), adapter.dialect().to_string().cyan());
    println!();
    println!("{}", "Command:".green().bold());
    println!("  {}", compiled.text.white());

    if !compiled.parameters.is_empty() {
        println!();
        println!("{}", "Parameters:".cyan());
        for parameter in &compiled.parameters {
            let type_name = adapter
                .native_type_name(parameter.kind, settings.enum_serialization)
                .unwrap_or_else(|_| format!("{:?}", parameter.native_type));
            println!(
                "  {:20} {:24} = {}",
                parameter.placeholder.yellow(),
                type_name.dimmed(),
                display_value(parameter.value.as_ref())
            );
        }
    }

    if !compiled.temporary_tables.is_empty() {
        println!();
        println!("{}", "Temporary tables:".cyan());
        for plan in &compiled.temporary_tables {
            let (create, drop) = table_ddl(&plan.request, &plan.quoted_name, adapter, settings)?;
            println!(
                "  {} ({} rows)",
                plan.quoted_name.yellow(),
                plan.request.len().to_string().cyan()
            );
            println!("    {}", create.white());
            println!("    {}", drop.dimmed());
        }
    }
    Ok(())
}

fn compiled_json(
    compiled: &CompiledStatement,
    adapter: &dyn DialectAdapter,
    settings: &Settings,
) -> Result<serde_json::Value> {
    let parameters: Vec<_> = compiled
        .parameters
        .iter()
        .map(|p| {
            json!({
                "name": p.name,
                "placeholder": p.placeholder,
                "native_type": format!("{:?}", p.native_type),
                "value": p.value.as_ref().map(scalar_json),
            })
        })
        .collect();

    let mut tables = Vec::with_capacity(compiled.temporary_tables.len());
    for plan in &compiled.temporary_tables {
        let (create, drop) = table_ddl(&plan.request, &plan.quoted_name, adapter, settings)?;
        tables.push(json!({
            "name": plan.request.name(),
            "quoted_name": plan.quoted_name,
            "rows": plan.request.len(),
            "create": create,
            "drop": drop,
        }));
    }

    Ok(json!({
        "dialect": adapter.dialect().to_string(),
        "text": compiled.text,
        "parameters": parameters,
        "temporary_tables": tables,
    }))
}

fn scalar_json(value: &Scalar) -> serde_json::Value {
    match value {
        Scalar::Bool(v) => json!(v),
        Scalar::Int8(v) => json!(v),
        Scalar::Int16(v) => json!(v),
        Scalar::Int32(v) => json!(v),
        Scalar::Int64(v) => json!(v),
        Scalar::Float32(v) => json!(v),
        Scalar::Float64(v) => json!(v),
        other => json!(format_text(other)),
    }
}

enum Outcome {
    Affected(u64),
    Rows(Vec<NativeRow>),
}

async fn run_template(
    statement: &Statement,
    url: &str,
    execute: bool,
    timeout: Option<u64>,
    format: OutputFormat,
    settings: &Settings,
) -> Result<()> {
    let connection = SqlxConnection::connect(url).await?;
    let dialect = connection.dialect();
    tracing::info!(dialect = %dialect, "connected");

    let signal = CancellationSignal::new();
    {
        let signal = signal.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                signal.cancel();
            }
        });
    }

    let mut options = CommandOptions::new().cancellation(signal);
    if let Some(secs) = timeout {
        options = options.timeout(Duration::from_secs(secs));
    }

    let mut command = compile_and_prepare(statement, dialect, &connection, options, settings).await?;
    let outcome = if execute {
        command.execute().await.map(Outcome::Affected)
    } else {
        command.query().await.map(Outcome::Rows)
    };
    let disposed = command.dispose().await;
    drop(command);

    match outcome? {
        Outcome::Affected(n) => println!("{} {} rows affected", "✓".green(), n),
        Outcome::Rows(rows) => print_rows(&rows, format)?,
    }
    disposed?;
    connection.close().await?;
    Ok(())
}

fn print_rows(rows: &[NativeRow], format: OutputFormat) -> Result<()> {
    let Some(first) = rows.first() else {
        println!("{}", "(no results)".dimmed());
        return Ok(());
    };

    match format {
        OutputFormat::Json => {
            let objects: Vec<serde_json::Value> = rows
                .iter()
                .map(|row| {
                    let map: serde_json::Map<String, serde_json::Value> = row
                        .columns
                        .iter()
                        .zip(&row.values)
                        .map(|(column, value)| {
                            let value = value.as_ref().map(scalar_json).unwrap_or(serde_json::Value::Null);
                            (column.clone(), value)
                        })
                        .collect();
                    serde_json::Value::Object(map)
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&objects)?);
        }
        OutputFormat::Text => {
            let columns = &first.columns;
            let cells: Vec<Vec<String>> = rows
                .iter()
                .map(|row| row.values.iter().map(|v| display_value(v.as_ref())).collect())
                .collect();

            let mut widths: Vec<usize> = columns.iter().map(|c| c.len()).collect();
            for row in &cells {
                for (width, cell) in widths.iter_mut().zip(row) {
                    *width = (*width).max(cell.len());
                }
            }

            let header: Vec<String> = columns
                .iter()
                .zip(&widths)
                .map(|(c, w)| format!("{:width$}", c, width = *w))
                .collect();
            println!("{}", header.join(" │ ").white().bold());

            let sep: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
            println!("{}", sep.join("─┼─").dimmed());

            for row in &cells {
                let line: Vec<String> = row
                    .iter()
                    .zip(&widths)
                    .map(|(cell, w)| format!("{:width$}", cell, width = *w))
                    .collect();
                println!("{}", line.join(" │ "));
            }

            println!();
            println!("{} row(s) returned", rows.len().to_string().cyan());
        }
    }
    Ok(())
}

fn show_dialects() {
    println!(
        "{:12} {:12} {}",
        "Dialect".white().bold(),
        "Parameter".white().bold(),
        "Temporary table".white().bold()
    );
    println!("{}", "─".repeat(48).dimmed());

    for dialect in Dialect::ALL {
        let adapter = dialect.adapter();
        let profile = SessionProfile::offline(dialect);
        println!(
            "{:12} {:12} {}",
            dialect.to_string().cyan().bold(),
            adapter.parameter_reference("Name", 1).yellow(),
            adapter.quote_temporary_table_name("Name", &profile).white()
        );
    }
}

fn convert_value(value: &str, from: ScalarKind, to: ScalarKind) -> Result<()> {
    let parsed = parse_value(value, from)?;
    let converted = convert(parsed, to.nullable())?;
    println!("{}", display_value(converted.as_ref()));
    Ok(())
}
