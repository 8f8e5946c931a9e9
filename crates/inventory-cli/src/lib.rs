//! `inventory`: command-line entry form for the shared asset workbook.
//!
//! Attributes are passed as repeated `--set key=value` flags, the same flat
//! map a graphical form would hand to the store.

use std::ffi::OsString;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use inventory_store::{
    Allocation, Attributes, DecommissionCoordinator, DecommissionPrefill, DecommissionRecord, EditSession,
    EntityType, Record, RecordRepository, StoreConfig, StoreError, TabularStore,
};
use serde::Serialize;

pub const DEFAULT_CONFIG_FILE: &str = "inventory.toml";
pub const DEFAULT_WORKBOOK: &str = "inventario.xlsx";
pub const WORKBOOK_ENV: &str = "INVENTORY_WORKBOOK";

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "inventory",
    version,
    about = "Register, update and retire assets in the shared inventory workbook."
)]
pub struct Args {
    /// Configuration file (default: ./inventory.toml when present).
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Workbook to operate on. Overrides the config file and INVENTORY_WORKBOOK.
    #[arg(long, global = true, value_name = "PATH")]
    pub workbook: Option<PathBuf>,

    /// Output format.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Increase log verbosity (-v info, -vv debug). RUST_LOG also applies.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create the workbook, or add the inventory sheets it is missing.
    Init,
    /// Show the code the next record of ENTITY would receive.
    Next { entity: EntityType },
    /// Register a new record.
    ///
    /// For `decommission_event`, `--set origin_code=<CODE>` names the asset to retire.
    Add {
        entity: EntityType,
        #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_value)]
        set: Vec<(String, String)>,
    },
    /// Change fields of an existing record. `--set key=` clears a field.
    Update {
        entity: EntityType,
        code: String,
        #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_value)]
        set: Vec<(String, String)>,
    },
    /// Print one record.
    Show { entity: EntityType, code: String },
    /// Print every record of ENTITY.
    List { entity: EntityType },
    /// Retire an asset: record the decommission and mark the asset.
    Decommission {
        code: String,
        #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_value)]
        set: Vec<(String, String)>,
    },
    /// Show the identifying data a decommission of CODE would copy.
    Lookup { code: String },
}

fn parse_key_value(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {s:?}"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing key in {s:?}"));
    }
    Ok((key.to_string(), value.to_string()))
}

pub fn init_logging(verbose: u8) {
    let (level, name) = match verbose {
        0 => (log::LevelFilter::Warn, "warn"),
        1 => (log::LevelFilter::Info, "info"),
        _ => (log::LevelFilter::Debug, "debug"),
    };
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(name));
    if verbose > 0 {
        builder.filter_level(level);
    }
    // A logger may already be installed when embedded in tests.
    let _ = builder.try_init();
}

/// Configuration and workbook path after applying all precedence rules.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub config: StoreConfig,
    pub workbook: PathBuf,
}

impl Settings {
    /// Workbook precedence: `--workbook`, then `workbook` in the config file
    /// (relative to the file), then `INVENTORY_WORKBOOK`, then
    /// `inventario.xlsx` in `cwd`.
    pub fn resolve(args: &Args, cwd: &Path, env_workbook: Option<OsString>) -> Result<Self> {
        let config_path = match &args.config {
            Some(path) => Some(cwd.join(path)),
            None => Some(cwd.join(DEFAULT_CONFIG_FILE)).filter(|path| path.is_file()),
        };
        let config = match &config_path {
            Some(path) => StoreConfig::load(path)?,
            None => StoreConfig::default(),
        };

        let workbook = if let Some(path) = &args.workbook {
            cwd.join(path)
        } else if let Some(path) = &config.workbook {
            let base = config_path
                .as_deref()
                .and_then(Path::parent)
                .unwrap_or(cwd);
            base.join(path)
        } else if let Some(path) = env_workbook.filter(|v| !v.is_empty()) {
            cwd.join(path)
        } else {
            cwd.join(DEFAULT_WORKBOOK)
        };

        log::debug!("using workbook {}", workbook.display());
        Ok(Self { config, workbook })
    }

    pub fn repository(&self) -> RecordRepository {
        RecordRepository::new(TabularStore::new(&self.workbook), self.config.clone())
    }
}

pub fn run_with_args(args: Args) -> Result<()> {
    let cwd = std::env::current_dir().context("cannot determine the working directory")?;
    let settings = Settings::resolve(&args, &cwd, std::env::var_os(WORKBOOK_ENV))?;
    let output = execute(&args.command, &settings, args.format)?;
    write_stdout(&output)
}

/// Run `command` and return what should be printed.
pub fn execute(command: &Command, settings: &Settings, format: OutputFormat) -> Result<String> {
    let repo = settings.repository();
    let out = match command {
        Command::Init => {
            let created = repo.store().initialize().map_err(|err| explain(err, settings))?;
            match format {
                OutputFormat::Json => to_json(&created)?,
                OutputFormat::Text if created.is_empty() => format!(
                    "{} already has every inventory sheet\n",
                    settings.workbook.display()
                ),
                OutputFormat::Text => format!(
                    "{}: created {}\n",
                    settings.workbook.display(),
                    created.join(", ")
                ),
            }
        }
        Command::Next { entity } => {
            let allocation = repo
                .next_allocation(*entity)
                .map_err(|err| explain(err, settings))?;
            render_allocation(&allocation, format)?
        }
        Command::Add { entity, set } => {
            let mut session = EditSession::new(&repo, *entity);
            let record = session
                .save(&repo, set.iter().map(|(k, v)| (k, v)))
                .map_err(|err| explain(err, settings))?;
            render_record(&record, format)?
        }
        Command::Update { entity, code, set } => {
            let mut session = EditSession::new(&repo, *entity);
            session
                .load(&repo, code)
                .map_err(|err| explain(err, settings))?;
            let record = session
                .save(&repo, set.iter().map(|(k, v)| (k, v)))
                .map_err(|err| explain(err, settings))?;
            render_record(&record, format)?
        }
        Command::Show { entity, code } => {
            let record = repo
                .read(*entity, code)
                .map_err(|err| explain(err, settings))?;
            render_record(&record, format)?
        }
        Command::List { entity } => {
            let records = repo.list(*entity).map_err(|err| explain(err, settings))?;
            render_list(*entity, &records, format)?
        }
        Command::Decommission { code, set } => {
            let attributes =
                Attributes::parse(EntityType::DecommissionEvent, set.iter().map(|(k, v)| (k, v)))
                    .map_err(|err| explain(err, settings))?;
            let outcome = DecommissionCoordinator::new(&repo)
                .decommission(code, &attributes)
                .map_err(|err| explain(err, settings))?;
            render_decommission(&outcome, format)?
        }
        Command::Lookup { code } => {
            let prefill = DecommissionCoordinator::new(&repo)
                .lookup(code)
                .map_err(|err| explain(err, settings))?;
            render_prefill(&prefill, format)?
        }
    };
    Ok(out)
}

/// Attach a next step to store errors the user can act on.
fn explain(err: StoreError, settings: &Settings) -> anyhow::Error {
    let hint = match &err {
        StoreError::StoreUnavailable { .. } => Some(format!(
            "cannot open the inventory workbook; create it with `inventory init --workbook {}` or close any program holding it",
            settings.workbook.display()
        )),
        StoreError::Persist { .. } => Some(
            "the workbook was not modified; check that it is not open in another program".to_string(),
        ),
        StoreError::TableFull { entity, .. } => Some(format!(
            "raise `scan_limits.{entity}` in {DEFAULT_CONFIG_FILE}"
        )),
        StoreError::SchemaMismatch { .. } => Some(
            "check the field names or the sheet headers (set `strict_headers = false` to only warn about headers)"
                .to_string(),
        ),
        _ => None,
    };
    let err = anyhow::Error::new(err);
    match hint {
        Some(hint) => err.context(hint),
        None => err,
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let mut out = serde_json::to_string_pretty(value)?;
    out.push('\n');
    Ok(out)
}

fn render_allocation(allocation: &Allocation, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => to_json(allocation),
        OutputFormat::Text => Ok(format!("{}\n", allocation.code)),
    }
}

fn render_record(record: &Record, format: OutputFormat) -> Result<String> {
    if format == OutputFormat::Json {
        return to_json(record);
    }
    let schema = record.entity.schema();
    let mut out = format!("{} ({}, row {})\n", record.code, record.entity, record.row_number);
    if let Some(origin) = &record.origin_code {
        out.push_str(&format!("  origin_code: {origin}\n"));
    }
    for column in schema.columns {
        match record.get(column.key) {
            Some(value) if !value.is_empty() => {
                out.push_str(&format!("  {}: {}\n", column.key, value));
            }
            _ => {}
        }
    }
    Ok(out)
}

fn render_list(entity: EntityType, records: &[Record], format: OutputFormat) -> Result<String> {
    if format == OutputFormat::Json {
        return to_json(records);
    }
    let schema = entity.schema();
    let status_key = schema
        .status_column()
        .and_then(|col| schema.columns.get(col as usize))
        .map(|column| column.key);
    let summary_keys: Vec<&str> = ["type", "brand", "model"]
        .into_iter()
        .chain(status_key)
        .filter(|key| schema.column(key).is_some())
        .collect();

    let mut out = String::new();
    for record in records {
        let mut line = record.code.clone();
        if let Some(origin) = &record.origin_code {
            line.push('\t');
            line.push_str(origin);
        }
        for key in &summary_keys {
            line.push('\t');
            line.push_str(record.get(key).unwrap_or_default());
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
    Ok(out)
}

fn render_decommission(outcome: &DecommissionRecord, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => to_json(outcome),
        OutputFormat::Text => Ok(format!(
            "{} decommissioned (decommission record {})\n",
            outcome.origin_code, outcome.record.code
        )),
    }
}

fn render_prefill(prefill: &DecommissionPrefill, format: OutputFormat) -> Result<String> {
    if format == OutputFormat::Json {
        return to_json(prefill);
    }
    let mut out = format!("{} ({})\n", prefill.origin_code, prefill.origin_entity);
    for (key, value) in &prefill.fields {
        out.push_str(&format!("  {key}: {value}\n"));
    }
    out.push_str(&format!("  status: {}\n", prefill.current_status));
    Ok(out)
}

fn write_stdout(text: &str) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    match handle.write_all(text.as_bytes()).and_then(|()| handle.flush()) {
        // `inventory list | head` closes the pipe early.
        Err(err) if err.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        other => other.context("failed to write output"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn args(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("inventory").chain(argv.iter().copied()))
            .expect("parse args")
    }

    #[test]
    fn parses_repeated_set_flags() {
        let parsed = args(&["add", "printer", "--set", "brand=HP", "--set", "notes=a=b", "--set", "model="]);
        match parsed.command {
            Command::Add { entity, set } => {
                assert_eq!(entity, EntityType::Printer);
                assert_eq!(
                    set,
                    vec![
                        ("brand".to_string(), "HP".to_string()),
                        ("notes".to_string(), "a=b".to_string()),
                        ("model".to_string(), String::new()),
                    ]
                );
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert!(Args::try_parse_from(["inventory", "add", "printer", "--set", "brand"]).is_err());
        assert!(Args::try_parse_from(["inventory", "list", "scanners"]).is_err());
    }

    #[test]
    fn workbook_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let cwd = dir.path();
        let env = Some(OsString::from("desde-env.xlsx"));

        let settings = Settings::resolve(&args(&["init"]), cwd, None).unwrap();
        assert_eq!(settings.workbook, cwd.join(DEFAULT_WORKBOOK));

        let settings = Settings::resolve(&args(&["init"]), cwd, env.clone()).unwrap();
        assert_eq!(settings.workbook, cwd.join("desde-env.xlsx"));

        std::fs::create_dir(cwd.join("conf")).unwrap();
        std::fs::write(cwd.join("conf/inv.toml"), "workbook = \"compartido.xlsx\"\n").unwrap();
        let settings =
            Settings::resolve(&args(&["--config", "conf/inv.toml", "init"]), cwd, env.clone()).unwrap();
        assert_eq!(settings.workbook, cwd.join("conf/compartido.xlsx"));

        let settings = Settings::resolve(
            &args(&["--config", "conf/inv.toml", "--workbook", "otro.xlsx", "init"]),
            cwd,
            env,
        )
        .unwrap();
        assert_eq!(settings.workbook, cwd.join("otro.xlsx"));
    }

    #[test]
    fn default_config_file_is_picked_up() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(DEFAULT_CONFIG_FILE),
            "strict_headers = false\n[scan_limits]\nprinter = 5\n",
        )
        .unwrap();
        let settings = Settings::resolve(&args(&["init"]), dir.path(), None).unwrap();
        assert!(!settings.config.strict_headers);
        assert_eq!(settings.config.bound(EntityType::Printer), 5);
    }

    #[test]
    fn text_flow_through_execute() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::resolve(&args(&["init"]), dir.path(), None).unwrap();
        let run = |argv: &[&str]| {
            let parsed = args(argv);
            execute(&parsed.command, &settings, parsed.format)
        };

        assert!(run(&["init"]).unwrap().contains("created"));
        assert_eq!(run(&["next", "computer_equipment"]).unwrap(), "EQC-0001\n");

        let added = run(&["add", "computer_equipment", "--set", "type=Laptop", "--set", "area=UCI"]).unwrap();
        assert!(added.starts_with("EQC-0001 (computer_equipment, row 2)"), "{added}");
        assert!(added.contains("  area: UCI\n"));

        run(&["update", "computer_equipment", "eqc-0001", "--set", "area=Urgencias"]).unwrap();
        let shown = run(&["show", "computer_equipment", "EQC-0001"]).unwrap();
        assert!(shown.contains("  area: Urgencias\n"), "{shown}");

        let looked_up = run(&["lookup", "EQC-0001"]).unwrap();
        assert!(looked_up.contains("  type: Laptop\n"), "{looked_up}");

        let retired = run(&["decommission", "EQC-0001", "--set", "reason=Obsoleto"]).unwrap();
        assert_eq!(retired, "EQC-0001 decommissioned (decommission record 1)\n");

        let listed = run(&["list", "computer_equipment"]).unwrap();
        assert_eq!(listed, "EQC-0001\tLaptop\t\t\tDADO DE BAJA\n");

        let err = run(&["decommission", "EQC-0001"]).unwrap_err();
        assert!(format!("{err:#}").contains("already decommissioned"), "{err:#}");
    }

    #[test]
    fn missing_workbook_suggests_init() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::resolve(&args(&["init"]), dir.path(), None).unwrap();
        let err = execute(
            &Command::List {
                entity: EntityType::Printer,
            },
            &settings,
            OutputFormat::Text,
        )
        .unwrap_err();
        assert!(err.to_string().contains("inventory init"), "{err}");
        assert!(err.downcast_ref::<StoreError>().is_some());
    }
}
