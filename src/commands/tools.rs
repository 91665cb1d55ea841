use anyhow::{bail, Context};
use campus_runtime::tools::{AggregateArgs, CreateArgs, EditArgs, FetchArgs, SearchArgs, ToolCall};
use campus_runtime::{CampusAssistant, Config};
use clap::Subcommand;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Subcommand)]
pub enum ToolCommand {
    /// List the known collections
    Collections,
    /// Keyword search over one collection
    Search {
        collection: String,
        query: String,
        #[arg(short, long, default_value_t = 5)]
        limit: usize,
    },
    /// Count, sum or average records
    Aggregate {
        collection: String,
        #[arg(short, long)]
        group_by: Option<String>,
        #[arg(short, long, default_value = "count")]
        metric: String,
        /// Numeric field for sum / average
        #[arg(short, long)]
        field: Option<String>,
        /// Exact-match filter, repeatable: --filter status=active
        #[arg(long = "filter", value_name = "KEY=VALUE")]
        filters: Vec<String>,
    },
    /// Fetch one record by id
    Fetch { collection: String, id: String },
    /// Create a record from a JSON object of fields
    Create {
        collection: String,
        #[arg(long, value_name = "JSON")]
        fields: String,
    },
    /// Update fields of a record; null removes a field
    Edit {
        collection: String,
        id: String,
        #[arg(long, value_name = "JSON")]
        fields: String,
    },
}

pub async fn run(config: Config, command: ToolCommand) -> anyhow::Result<()> {
    let assistant = CampusAssistant::from_config(config)?;

    let call = match command {
        ToolCommand::Collections => {
            for name in assistant.collections() {
                println!("{name}");
            }
            return Ok(());
        }
        ToolCommand::Search {
            collection,
            query,
            limit,
        } => ToolCall::Search(SearchArgs {
            query,
            collection,
            limit,
        }),
        ToolCommand::Aggregate {
            collection,
            group_by,
            metric,
            field,
            filters,
        } => ToolCall::Aggregate(AggregateArgs {
            collection,
            group_by,
            metric,
            field,
            filters: parse_filters(&filters)?,
        }),
        ToolCommand::Fetch { collection, id } => ToolCall::FetchById(FetchArgs { collection, id }),
        ToolCommand::Create { collection, fields } => ToolCall::Create(CreateArgs {
            collection,
            fields: parse_fields(&fields)?,
        }),
        ToolCommand::Edit {
            collection,
            id,
            fields,
        } => ToolCall::Edit(EditArgs {
            collection,
            id,
            fields: parse_fields(&fields)?,
        }),
    };

    let output = assistant.execute_tool(call).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Parse `key=value` pairs; values that read as JSON scalars keep their type.
fn parse_filters(raw: &[String]) -> anyhow::Result<BTreeMap<String, Value>> {
    let mut filters = BTreeMap::new();
    for pair in raw {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("filter '{pair}' must look like key=value");
        };
        let value = serde_json::from_str::<Value>(value)
            .ok()
            .filter(|v| !v.is_object() && !v.is_array())
            .unwrap_or_else(|| Value::String(value.to_string()));
        filters.insert(key.trim().to_string(), value);
    }
    Ok(filters)
}

fn parse_fields(raw: &str) -> anyhow::Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw).context("fields must be valid JSON")? {
        Value::Object(map) => Ok(map),
        _ => bail!("fields must be a JSON object"),
    }
}
