//! CLI command implementations
//!
//! Every command opens what it needs, does one thing, and writes JSON lines
//! to stdout. The process exit code comes from the error taxonomy.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::error::ErrorKind;
use clap::Parser;
use serde_json::json;

use super::args::{Cli, CodecAlgorithm, Command, DbAction, Direction};
use super::errors::{CliError, CliResult};
use super::io::{write_error, write_response};
use crate::codec::{Codec, CodecStats, HuffmanCodec, LzwCodec};
use crate::config::Config;
use crate::db::{
    AcceptAll, Database, DbError, FieldCountValidator, Lookup, PayloadValidator, EXIT_OK,
    EXIT_USAGE,
};
use crate::observability::{log_event_with_fields, Event, Logger};
use crate::storage::Record;

/// Parse the process arguments, run the command and return the exit code.
pub fn run() -> i32 {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => EXIT_OK,
                _ => EXIT_USAGE,
            };
            let _ = e.print();
            return code;
        }
    };

    match execute(cli) {
        Ok(()) => EXIT_OK,
        Err(e) => {
            let _ = write_error(e.code(), &e.to_string());
            e.exit_code()
        }
    }
}

/// Run an already-parsed command line.
pub fn execute(cli: Cli) -> CliResult<()> {
    let config = load_config(&cli)?;

    match cli.command {
        Command::Db { action } => run_db(config, action),
        Command::Codec { algorithm } => run_codec(&config, algorithm),
    }
}

fn load_config(cli: &Cli) -> CliResult<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    config.validate()?;

    Logger::set_min_severity(config.log_severity()?);
    log_event_with_fields(
        Event::ConfigLoaded,
        &[
            (
                "source",
                &cli.config
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "defaults".to_string()),
            ),
            ("data_dir", &config.data_dir.display().to_string()),
        ],
    );
    Ok(config)
}

fn run_db(config: Config, action: DbAction) -> CliResult<()> {
    let mut db = Database::open(config)?;

    match action {
        DbAction::Append { payload, validate } => {
            let bytes = read_input(&payload)?;
            let (id, offset) = if validate {
                db.insert_validated(&bytes, &FieldCountValidator::accident_schema())?
            } else {
                db.insert(&bytes)?
            };
            write_response(json!({ "id": id, "offset": offset }))
        }

        DbAction::Import { csv, no_validate } => {
            let file = File::open(&csv)
                .map_err(|e| CliError::io(format!("Failed to open {}", csv.display()), e))?;
            let schema = FieldCountValidator::accident_schema();
            let validator: &dyn PayloadValidator = if no_validate { &AcceptAll } else { &schema };
            let report = db.import_rows(BufReader::new(file), validator)?;
            write_response(serde_json::to_value(report)?)
        }

        DbAction::Get { id, out } => match db.get(id)? {
            Lookup::Found(record) => match out {
                Some(path) => {
                    fs::write(&path, &record.payload).map_err(|e| {
                        CliError::io(format!("Failed to write {}", path.display()), e)
                    })?;
                    write_response(json!({
                        "id": record.id,
                        "offset": record.offset,
                        "bytes": record.payload.len(),
                        "out": path.display().to_string(),
                    }))
                }
                None => write_response(record_json(&record)),
            },
            Lookup::Tombstoned(id) => Err(DbError::Tombstoned(id).into()),
            Lookup::NotFound => Err(DbError::NotFound(id).into()),
        },

        DbAction::Delete { id } => {
            if db.delete(id)? {
                return write_response(json!({ "id": id, "deleted": true }));
            }
            match db.get(id)? {
                Lookup::Tombstoned(id) => Err(DbError::Tombstoned(id).into()),
                _ => Err(DbError::NotFound(id).into()),
            }
        }

        DbAction::Update { id, payload } => {
            let bytes = read_input(&payload)?;
            let new_id = db.update(id, &bytes)?;
            write_response(json!({ "old_id": id, "id": new_id }))
        }

        DbAction::Scan { all } => {
            for item in db.scan()? {
                let record = item.map_err(DbError::from)?;
                if all || record.is_live() {
                    write_response(record_json(&record))?;
                }
            }
            Ok(())
        }

        DbAction::Repair => {
            let report = db.repair()?;
            write_response(serde_json::to_value(report)?)
        }

        DbAction::Reindex => {
            let report = db.rebuild_index()?;
            write_response(serde_json::to_value(report)?)
        }

        DbAction::Compact => {
            let stats = db.compact()?;
            write_response(serde_json::to_value(stats)?)
        }

        DbAction::Verify => {
            let report = db.verify()?;
            let clean = report.is_clean();
            let mut data = serde_json::to_value(report)?;
            if let Some(map) = data.as_object_mut() {
                map.insert("clean".to_string(), json!(clean));
            }
            write_response(data)
        }
    }
}

fn run_codec(config: &Config, algorithm: CodecAlgorithm) -> CliResult<()> {
    let (codec, direction): (Box<dyn Codec>, Direction) = match algorithm {
        CodecAlgorithm::Huff { direction } => {
            (Box::new(HuffmanCodec::new(config.huffman_config())), direction)
        }
        CodecAlgorithm::Lzw { direction } => {
            (Box::new(LzwCodec::new(config.lzw_config()?)), direction)
        }
    };

    let (op, stats) = match direction {
        Direction::Encode { input, output } => ("encode", codec.encode_file(&input, &output)?),
        Direction::Decode { input, output } => ("decode", codec.decode_file(&input, &output)?),
    };
    write_response(stats_json(codec.name(), op, &stats))
}

fn read_input(path: &Path) -> CliResult<Vec<u8>> {
    fs::read(path).map_err(|e| CliError::io(format!("Failed to read {}", path.display()), e))
}

fn record_json(record: &Record) -> serde_json::Value {
    json!({
        "id": record.id,
        "offset": record.offset,
        "valid": record.valid,
        "payload": STANDARD.encode(&record.payload),
    })
}

fn stats_json(codec: &str, op: &str, stats: &CodecStats) -> serde_json::Value {
    json!({
        "codec": codec,
        "op": op,
        "input_bytes": stats.input_bytes,
        "output_bytes": stats.output_bytes,
        "ratio_percent": stats.ratio_percent(),
    })
}
