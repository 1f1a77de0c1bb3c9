//! One function per `cereal` subcommand.
//!
//! Output goes to the writer passed in so commands can be exercised against
//! a buffer; prompts go to stderr.
use std::io::{self, BufRead, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::SecondsFormat;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use serialized::util::strip_control_chars;
use serialized::{Client, Event, FeedEntry};

use super::table::{format_row, Table};
use super::{AggregateCommand, Command, FeedCommand, ProjectionCommand, ReactionCommand, StoreArgs};

const TAIL_HEADERS: [&str; 3] = ["TIMESTAMP", "AGGREGATE ID", "EVENT TYPE"];
const TAIL_WIDTHS: [usize; 3] = [24, 36, 40];

/// Definitions are hand-written JSON files; anything larger is a mistake.
const MAX_DEFINITION_SIZE: u64 = 1_048_576;

pub async fn run(
    command: Command,
    client: &Client,
    cancel: &CancellationToken,
    out: &mut impl Write,
) -> Result<()> {
    match command {
        Command::Store(args) => store(client, args, out).await,
        Command::Aggregate(cmd) => aggregate(client, cmd, out).await,
        Command::Feed(FeedCommand::Get {
            name,
            since,
            current,
        }) => {
            if current {
                let seq = client
                    .current_sequence_number(&name)
                    .await
                    .with_context(|| format!("Failed to read current sequence number of '{name}'"))?;
                writeln!(out, "{seq}")?;
                Ok(())
            } else {
                tail_feed(client, &name, since, cancel, out).await
            }
        }
        Command::Feed(FeedCommand::List) => list_feeds(client, out).await,
        Command::Projection(cmd) => projection(client, cmd, out).await,
        Command::Reaction(cmd) => reaction(client, cmd, out).await,
    }
}

// ============================================================================
// Aggregates
// ============================================================================

async fn store(client: &Client, args: StoreArgs, out: &mut impl Write) -> Result<()> {
    let data: Value =
        serde_json::from_str(&args.data).context("Event data (-d) must be valid JSON")?;
    let aggregate_id = args.agg_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    let event = match args.event_id {
        Some(id) => Event::with_id(id, &args.event_type, &data)?,
        None => Event::new(&args.event_type, &data)?,
    };

    client
        .store(&args.agg_type, &aggregate_id, args.expected_version, &[event])
        .await
        .with_context(|| format!("Failed to store event on {}/{}", args.agg_type, aggregate_id))?;

    writeln!(out, "{aggregate_id}")?;
    Ok(())
}

async fn aggregate(client: &Client, command: AggregateCommand, out: &mut impl Write) -> Result<()> {
    match command {
        AggregateCommand::Get {
            aggregate_type,
            id,
            limit,
        } => {
            let aggregate = client
                .load_aggregate(&aggregate_type, &id)
                .await
                .with_context(|| format!("Failed to load aggregate {aggregate_type}/{id}"))?;

            writeln!(out, "Type:     {}", strip_control_chars(&aggregate.aggregate_type))?;
            writeln!(out, "ID:       {}", strip_control_chars(&aggregate.aggregate_id))?;
            writeln!(out, "Version:  {}", aggregate.aggregate_version)?;
            writeln!(out, "Events:   {}", aggregate.events.len())?;
            writeln!(out)?;

            let skip = aggregate.events.len().saturating_sub(limit);
            let mut table = Table::new(&["EVENT ID", "EVENT TYPE", "DATA"]);
            for event in &aggregate.events[skip..] {
                table.push([event.id.clone(), event.event_type.clone(), event_data(event)]);
            }
            table.render(out)?;
            Ok(())
        }
        AggregateCommand::Exists { aggregate_type, id } => {
            let exists = client
                .aggregate_exists(&aggregate_type, &id)
                .await
                .with_context(|| format!("Failed to check aggregate {aggregate_type}/{id}"))?;
            writeln!(out, "{exists}")?;
            Ok(())
        }
        AggregateCommand::Delete {
            aggregate_type,
            yes,
        } => {
            let token = client
                .request_delete_aggregate_type(&aggregate_type)
                .await
                .with_context(|| format!("Failed to request deletion of '{aggregate_type}'"))?;

            if !yes && !confirm_delete(&aggregate_type, &mut io::stdin().lock(), &mut io::stderr())? {
                writeln!(out, "Aborted")?;
                return Ok(());
            }

            client
                .delete_aggregate_type(&aggregate_type, &token)
                .await
                .with_context(|| format!("Failed to delete aggregates of type '{aggregate_type}'"))?;
            writeln!(out, "Deleted all aggregates of type {aggregate_type}")?;
            Ok(())
        }
    }
}

/// Asks for a typed "yes"; anything else, including EOF, declines.
fn confirm_delete(
    aggregate_type: &str,
    input: &mut impl BufRead,
    prompt: &mut impl Write,
) -> io::Result<bool> {
    write!(
        prompt,
        "This permanently deletes ALL aggregates of type '{aggregate_type}'. Type 'yes' to continue: "
    )?;
    prompt.flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(answer.trim() == "yes")
}

fn event_data(event: &Event) -> String {
    if event.encrypted_data.is_some() {
        return "(encrypted)".to_string();
    }
    if event.data.is_null() {
        return "-".to_string();
    }
    event.data.to_string()
}

// ============================================================================
// Feeds
// ============================================================================

async fn tail_feed(
    client: &Client,
    name: &str,
    since: u64,
    cancel: &CancellationToken,
    out: &mut impl Write,
) -> Result<()> {
    writeln!(out, "{}", format_row(&TAIL_HEADERS, &TAIL_WIDTHS))?;

    let result = client
        .consume(name, since, cancel, |entry| -> io::Result<()> {
            for row in entry_rows(entry) {
                writeln!(out, "{}", format_row(&row, &TAIL_WIDTHS))?;
            }
            out.flush()
        })
        .await;

    match result {
        Ok(never) => match never {},
        Err(e) if e.is_cancelled() => {
            tracing::debug!(feed = %name, "Feed tail interrupted");
            Ok(())
        }
        Err(e) => Err(e).with_context(|| format!("Failed while tailing feed '{name}'")),
    }
}

/// One output row per event; an entry without events still gets a row.
fn entry_rows(entry: &FeedEntry) -> Vec<[String; 3]> {
    let timestamp = entry
        .time()
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| entry.timestamp.to_string());

    if entry.events.is_empty() {
        return vec![[timestamp, entry.aggregate_id.clone(), "-".to_string()]];
    }
    entry
        .events
        .iter()
        .map(|event| {
            [
                timestamp.clone(),
                entry.aggregate_id.clone(),
                event.event_type.clone(),
            ]
        })
        .collect()
}

async fn list_feeds(client: &Client, out: &mut impl Write) -> Result<()> {
    let feeds = client.feeds().await.context("Failed to list feeds")?;

    let mut table = Table::new(&["TYPE", "AGGREGATES", "BATCHES", "EVENTS"]);
    for feed in &feeds {
        table.push([
            feed.aggregate_type.clone(),
            feed.aggregate_count.to_string(),
            feed.batch_count.to_string(),
            feed.event_count.to_string(),
        ]);
    }
    table.render(out)?;
    Ok(())
}

// ============================================================================
// Projections and reactions
// ============================================================================

async fn projection(client: &Client, command: ProjectionCommand, out: &mut impl Write) -> Result<()> {
    match command {
        ProjectionCommand::Single { name, id } => {
            let projection = client
                .single_projection(&name, &id)
                .await
                .with_context(|| format!("Failed to load projection {name}/{id}"))?;
            print_json(out, &projection.data)
        }
        ProjectionCommand::Aggregated { name } => {
            let projection = client
                .aggregated_projection(&name)
                .await
                .with_context(|| format!("Failed to load aggregated projection '{name}'"))?;
            print_json(out, &projection.data)
        }
        ProjectionCommand::List { name } => {
            let projections = match &name {
                Some(name) => client
                    .single_projections(name)
                    .await
                    .with_context(|| format!("Failed to list projections of '{name}'"))?,
                None => client
                    .aggregated_projections()
                    .await
                    .context("Failed to list aggregated projections")?,
            };

            let mut table = Table::new(&["PROJECTION ID", "DATA"]);
            for projection in &projections {
                table.push([projection.projection_id.clone(), projection.data.to_string()]);
            }
            table.render(out)?;
            Ok(())
        }
        ProjectionCommand::Definitions => {
            let definitions = client
                .projection_definitions()
                .await
                .context("Failed to list projection definitions")?;

            let mut table = Table::new(&["NAME", "FEED", "HANDLERS"]);
            for definition in &definitions {
                table.push([
                    definition.projection_name.clone(),
                    definition.feed_name.clone(),
                    definition.handlers.len().to_string(),
                ]);
            }
            table.render(out)?;
            Ok(())
        }
        ProjectionCommand::Definition { name } => {
            let definition = client
                .projection_definition(&name)
                .await
                .with_context(|| format!("Failed to load projection definition '{name}'"))?;
            print_json(out, &definition)
        }
        ProjectionCommand::Create { file } => {
            let definition: serialized::ProjectionDefinition = read_definition(&file)?;
            client
                .create_projection_definition(&definition)
                .await
                .with_context(|| {
                    format!("Failed to create projection definition '{}'", definition.projection_name)
                })?;
            writeln!(
                out,
                "Created projection definition {}",
                strip_control_chars(&definition.projection_name)
            )?;
            Ok(())
        }
        ProjectionCommand::Delete { name } => {
            client
                .delete_projection_definition(&name)
                .await
                .with_context(|| format!("Failed to delete projection definition '{name}'"))?;
            writeln!(out, "Deleted projection definition {name}")?;
            Ok(())
        }
    }
}

async fn reaction(client: &Client, command: ReactionCommand, out: &mut impl Write) -> Result<()> {
    match command {
        ReactionCommand::Definitions => {
            let definitions = client
                .reaction_definitions()
                .await
                .context("Failed to list reaction definitions")?;

            let mut table = Table::new(&["NAME", "FEED", "EVENT TYPE", "ACTION"]);
            for definition in &definitions {
                table.push([
                    definition.reaction_name.clone(),
                    definition.feed_name.clone(),
                    definition.react_on_event_type.clone(),
                    format!(
                        "{} {}",
                        definition.action.action_type, definition.action.target_uri
                    ),
                ]);
            }
            table.render(out)?;
            Ok(())
        }
        ReactionCommand::Definition { name } => {
            let definition = client
                .reaction_definition(&name)
                .await
                .with_context(|| format!("Failed to load reaction definition '{name}'"))?;
            print_json(out, &definition)
        }
        ReactionCommand::Create { file } => {
            let definition: serialized::ReactionDefinition = read_definition(&file)?;
            client
                .create_reaction_definition(&definition)
                .await
                .with_context(|| {
                    format!("Failed to create reaction definition '{}'", definition.reaction_name)
                })?;
            writeln!(
                out,
                "Created reaction definition {}",
                strip_control_chars(&definition.reaction_name)
            )?;
            Ok(())
        }
        ReactionCommand::Delete { name } => {
            client
                .delete_reaction_definition(&name)
                .await
                .with_context(|| format!("Failed to delete reaction definition '{name}'"))?;
            writeln!(out, "Deleted reaction definition {name}")?;
            Ok(())
        }
    }
}

/// Pretty-printed JSON. Control characters inside strings come out escaped.
fn print_json<T: Serialize>(out: &mut impl Write, value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    writeln!(out, "{text}")?;
    Ok(())
}

fn read_definition<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let meta = std::fs::metadata(path)
        .with_context(|| format!("Failed to read definition file '{}'", path.display()))?;
    if meta.len() > MAX_DEFINITION_SIZE {
        anyhow::bail!(
            "Definition file '{}' is {} bytes (max {} bytes)",
            path.display(),
            meta.len(),
            MAX_DEFINITION_SIZE
        );
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read definition file '{}'", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Invalid definition in '{}'", path.display()))
}
