//! Command-line front end for the checklist and ledger.
//!
//! # Responsibility
//! - Drive the core feature controllers against an on-disk database.
//! - Print validation and write failures the way a toast would show them.

use clap::{Args, Parser, Subcommand, ValueEnum};
use daybook_core::{
    default_log_level, init_logging, BillController, BillEntry, BillKind, BillSchema,
    DaybookConfig, FeatureController, FeatureSchema, KeyedCollectionStore, KvBackend, Record,
    RecordId, SaveOutcome, SqliteBackend, TodoController, TodoItem, TodoSchema,
};
use log::info;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

type CliResult<T> = Result<T, Box<dyn Error>>;

#[derive(Debug, Parser)]
#[command(name = "daybook", version, about = "Checklist and ledger backed by SQLite")]
struct Cli {
    /// SQLite database file.
    #[arg(long, default_value = "daybook.sqlite3")]
    db: PathBuf,
    /// JSON configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Absolute directory for rolling log files; logging is off when absent.
    #[arg(long)]
    log_dir: Option<PathBuf>,
    #[arg(long)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Manage checklist items.
    Todo {
        #[command(subcommand)]
        action: TodoCommand,
    },
    /// Manage ledger entries.
    Bill {
        #[command(subcommand)]
        action: BillCommand,
    },
}

#[derive(Debug, Subcommand)]
enum TodoCommand {
    List,
    Add { text: String },
    Edit { id: RecordId, text: String },
    Toggle { id: RecordId },
    Rm { id: RecordId },
}

#[derive(Debug, Subcommand)]
enum BillCommand {
    List,
    Add(BillFields),
    Edit {
        id: RecordId,
        #[command(flatten)]
        fields: BillFields,
    },
    Rm { id: RecordId },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KindArg {
    Expense,
    Income,
}

impl From<KindArg> for BillKind {
    fn from(value: KindArg) -> Self {
        match value {
            KindArg::Expense => BillKind::Expense,
            KindArg::Income => BillKind::Income,
        }
    }
}

#[derive(Debug, Args)]
struct BillFields {
    #[arg(long, value_enum)]
    kind: Option<KindArg>,
    /// Unsigned whole amount; the sign follows `--kind`.
    #[arg(long)]
    amount: Option<String>,
    #[arg(long)]
    desc: Option<String>,
    /// `YYYY-MM-DD`
    #[arg(long)]
    date: Option<String>,
    /// `HH:MM`
    #[arg(long)]
    time: Option<String>,
}

#[tokio::main]
async fn main() -> CliResult<()> {
    let cli = Cli::parse();

    if let Some(log_dir) = &cli.log_dir {
        let level = cli.log_level.as_deref().unwrap_or(default_log_level());
        init_logging(level, log_dir)?;
    }

    let config = match &cli.config {
        Some(path) => DaybookConfig::from_json_str(&std::fs::read_to_string(path)?)?,
        None => DaybookConfig::default(),
    };
    let backend = Arc::new(SqliteBackend::open(&cli.db, config.storage.enable_cache)?);
    let store = KeyedCollectionStore::with_config(backend, &config.storage);
    info!(
        "event=cli_start module=cli status=ok db={}",
        cli.db.display()
    );

    match cli.command {
        Command::Todo { action } => {
            let controller = TodoController::new(TodoSchema, store, &config);
            run_todo(&controller, action).await
        }
        Command::Bill { action } => {
            let controller = BillController::new(BillSchema::default(), store, &config);
            run_bill(&controller, action).await
        }
    }
}

async fn run_todo(
    controller: &TodoController<SqliteBackend>,
    action: TodoCommand,
) -> CliResult<()> {
    match action {
        TodoCommand::List => {
            for record in listed(controller).await? {
                let item: TodoItem = record.decode()?;
                let mark = if item.done { "x" } else { " " };
                println!("[{mark}] {} {}", record.id, item.text);
            }
        }
        TodoCommand::Add { text } => {
            controller.open_for_create()?;
            controller.change_field("text", text)?;
            finish_save(controller).await?;
        }
        TodoCommand::Edit { id, text } => {
            let record = existing(controller, id).await?;
            controller.open_for_edit(&record)?;
            controller.change_field("text", text)?;
            finish_save(controller).await?;
        }
        TodoCommand::Toggle { id } => {
            if !controller.toggle_done(id).await? {
                return Err(format!("no todo with id {id}").into());
            }
        }
        TodoCommand::Rm { id } => remove(controller, id).await?,
    }
    Ok(())
}

async fn run_bill(
    controller: &BillController<SqliteBackend>,
    action: BillCommand,
) -> CliResult<()> {
    match action {
        BillCommand::List => {
            for record in listed(controller).await? {
                let entry: BillEntry = record.decode()?;
                let kind = match entry.kind() {
                    BillKind::Expense => "expense",
                    BillKind::Income => "income",
                };
                println!(
                    "{} {} {kind:<7} {:>8} {}",
                    record.id,
                    entry.occurred_at.format("%Y-%m-%d %H:%M"),
                    entry.amount.unsigned_abs(),
                    entry.description
                );
            }
        }
        BillCommand::Add(fields) => {
            controller.open_for_create()?;
            apply_bill_fields(controller, fields)?;
            finish_save(controller).await?;
        }
        BillCommand::Edit { id, fields } => {
            let record = existing(controller, id).await?;
            controller.open_for_edit(&record)?;
            apply_bill_fields(controller, fields)?;
            finish_save(controller).await?;
        }
        BillCommand::Rm { id } => remove(controller, id).await?,
    }
    Ok(())
}

fn apply_bill_fields(
    controller: &BillController<SqliteBackend>,
    fields: BillFields,
) -> CliResult<()> {
    if let Some(kind) = fields.kind {
        controller.change_field("type", BillKind::from(kind).as_draft())?;
    }
    let optional = [
        ("amount", fields.amount),
        ("description", fields.desc),
        ("date", fields.date),
        ("time", fields.time),
    ];
    for (name, value) in optional {
        if let Some(value) = value {
            controller.change_field(name, value)?;
        }
    }
    Ok(())
}

async fn listed<S: FeatureSchema, B: KvBackend>(
    controller: &FeatureController<S, B>,
) -> CliResult<Vec<Record>> {
    let records = controller
        .store()
        .try_list(controller.collection_key())
        .await?;
    Ok(controller.schema().display_order(records))
}

async fn existing<S: FeatureSchema, B: KvBackend>(
    controller: &FeatureController<S, B>,
    id: RecordId,
) -> CliResult<Record> {
    controller
        .store()
        .get(controller.collection_key(), id)
        .await?
        .ok_or_else(|| format!("no record with id {id}").into())
}

/// Removing an id that is not stored succeeds without effect.
async fn remove<S: FeatureSchema, B: KvBackend>(
    controller: &FeatureController<S, B>,
    id: RecordId,
) -> CliResult<()> {
    controller.delete(id).await;
    fail_on_toast(controller)?;
    println!("removed {id}");
    Ok(())
}

async fn finish_save<S: FeatureSchema, B: KvBackend>(
    controller: &FeatureController<S, B>,
) -> CliResult<()> {
    match controller.save().await {
        SaveOutcome::Issued(write) => {
            fail_on_toast(controller)?;
            println!("saved {}", write.id);
            Ok(())
        }
        SaveOutcome::Rejected(ticket) => Err(ticket.event.text.into()),
        SaveOutcome::NotOpen => Err("nothing to save".into()),
    }
}

fn fail_on_toast<S: FeatureSchema, B: KvBackend>(
    controller: &FeatureController<S, B>,
) -> CliResult<()> {
    match controller.toast() {
        Some(toast) => Err(toast.text.into()),
        None => Ok(()),
    }
}
