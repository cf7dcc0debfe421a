use clap::{Parser, Subcommand};
use serde_json::Value;
use uuid::Uuid;

use crate::types::EntityKind;

const SEARCH_HELP: &str = "\
JSON array of {field, operator, value} criteria, AND-joined.
Operators: = > < >= <= like ilike in regex iregex, each with an optional
`not` prefix, and ~ ~* !~ !~*. Malformed criteria are ignored.
Example: '[{\"field\": \"price\", \"operator\": \"not in\", \"value\": [1, 2]}]'";

#[derive(Debug, Parser)]
#[command(name = "taxonomy")]
#[command(about = "Manage the sport / event / market / selection taxonomy")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create the tables and enum types that don't exist yet
    Init,

    /// Insert a record (or merge into an existing one when --id is given)
    Create {
        #[arg(short = 't', long = "type", value_enum)]
        kind: EntityKind,

        /// Id for the new record; generated when omitted
        #[arg(short, long, value_parser = parse_uuid)]
        id: Option<Uuid>,

        /// JSON object of fields, e.g. '{"name": "Football", "display_name": "Football", "order": 1}'
        #[arg(short, long, value_parser = parse_json)]
        data: Value,
    },

    /// Merge fields into the record with the given id
    Update {
        #[arg(short = 't', long = "type", value_enum)]
        kind: EntityKind,

        #[arg(short, long, value_parser = parse_uuid)]
        id: Uuid,

        /// JSON object of the fields to change, e.g. '{"is_active": false}'
        #[arg(short, long, value_parser = parse_json)]
        data: Value,
    },

    /// Delete a record and everything beneath it
    Delete {
        #[arg(short = 't', long = "type", value_enum)]
        kind: EntityKind,

        #[arg(short, long, value_parser = parse_uuid)]
        id: Uuid,
    },

    /// Print the records matching every criterion
    Search {
        #[arg(short = 't', long = "type", value_enum)]
        kind: EntityKind,

        #[arg(short, long, value_parser = parse_json, help = SEARCH_HELP)]
        data: Value,
    },
}

fn parse_uuid(raw: &str) -> Result<Uuid, String> {
    Uuid::parse_str(raw.trim()).map_err(|_| "Invalid uuid".to_string())
}

fn parse_json(raw: &str) -> Result<Value, String> {
    serde_json::from_str(raw).map_err(|e| format!("Invalid JSON data: {e}"))
}
