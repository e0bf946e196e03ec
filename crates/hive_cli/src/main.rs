//! Command-line entry point for the hive entity store.
//!
//! # Responsibility
//! - Resolve configuration (file, `HIVE_*` env, flags) and open the store.
//! - Map each subcommand onto one core operation for the calling identity.
//! - Print results as JSON on stdout and classified errors on stderr.
//!
//! # Invariants
//! - Every command runs as exactly one caller; there is no admin bypass.
//! - Exit code is derived from the error class, never from message text.

use clap::{Args, Parser, Subcommand};
use hive_core::{
    init_logging_from_config, open_db_with_config, AnchorListQuery, CallerId, CaptureListQuery,
    CaptureSource, ConfigError, CoreConfig, DbError, DeviceType, ErrorClass, ItemListQuery,
    ItemPatch, ItemStatus, NewAnchor, NewCapture, NewItem, NewRouteSet, NewScan, NewZone, Patch,
    PresenceTracker, QueryFacade, RepoError, RouteSetPatch, SearchQuery,
    SqliteBreadcrumbRepository, StopOutcome, ValidationError,
};
use log::{info, warn};
use serde::Serialize;
use serde_json::json;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "hive", version, about = "Personal organizer: zones, anchors, items, presence")]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long, env = "HIVE_CONFIG")]
    config: Option<PathBuf>,

    /// Database file; overrides the configured path.
    #[arg(long)]
    db: Option<PathBuf>,

    /// Identity every operation runs as.
    #[arg(long, env = "HIVE_CALLER")]
    caller: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Top-level owned containers.
    #[command(subcommand)]
    Zone(ZoneCommand),
    /// Tagged reference points.
    #[command(subcommand)]
    Anchor(AnchorCommand),
    /// Tasks and notes.
    #[command(subcommand)]
    Item(ItemCommand),
    /// Raw text inbox.
    #[command(subcommand)]
    Capture(CaptureCommand),
    /// Presence sessions.
    #[command(subcommand)]
    Presence(PresenceCommand),
    /// Ordered walks through anchors.
    #[command(subcommand)]
    Routeset(RouteSetCommand),
    /// Record a tag scan.
    Scan {
        key: String,
        #[arg(long, value_parser = parse_device, default_value = "iphone")]
        device: DeviceType,
        #[arg(long)]
        location: Option<String>,
    },
    /// Substring search over anchors and items.
    Search {
        text: String,
        #[arg(long)]
        limit: Option<u32>,
    },
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Self::Zone(_) => "zone",
            Self::Anchor(_) => "anchor",
            Self::Item(_) => "item",
            Self::Capture(_) => "capture",
            Self::Presence(_) => "presence",
            Self::Routeset(_) => "routeset",
            Self::Scan { .. } => "scan",
            Self::Search { .. } => "search",
        }
    }
}

#[derive(Subcommand)]
enum ZoneCommand {
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        slug: String,
        #[arg(long)]
        color: Option<String>,
        #[arg(long)]
        icon: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    List,
    Delete {
        id: Uuid,
    },
}

#[derive(Subcommand)]
enum AnchorCommand {
    Create {
        #[arg(long)]
        key: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        zone: Option<Uuid>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        location_hint: Option<String>,
        #[arg(long)]
        photo_url: Option<String>,
        #[arg(long)]
        floorplan_ref: Option<String>,
        /// Repeat for several tags.
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Look an anchor up by key, in any casing.
    Get {
        key: String,
    },
    List {
        #[arg(long)]
        zone: Option<Uuid>,
        #[arg(long)]
        tag: Option<String>,
    },
    Delete {
        id: Uuid,
    },
}

#[derive(Args)]
struct ItemScope {
    #[arg(long)]
    zone: Option<Uuid>,
    #[arg(long)]
    anchor: Option<Uuid>,
}

#[derive(Subcommand)]
enum ItemCommand {
    Create {
        #[arg(long)]
        title: String,
        #[arg(long)]
        body: Option<String>,
        /// Create a note instead of a task.
        #[arg(long)]
        note: bool,
        #[arg(long)]
        priority: Option<i64>,
        #[command(flatten)]
        scope: ItemScope,
    },
    List {
        #[arg(long, value_parser = parse_status)]
        status: Option<ItemStatus>,
        #[command(flatten)]
        scope: ItemScope,
    },
    /// Mark an item done.
    Done {
        id: Uuid,
    },
    Delete {
        id: Uuid,
    },
}

#[derive(Subcommand)]
enum CaptureCommand {
    Create {
        text: String,
        #[arg(long, value_parser = parse_source, default_value = "text")]
        source: CaptureSource,
        #[command(flatten)]
        scope: ItemScope,
    },
    List {
        #[arg(long)]
        limit: Option<u32>,
        #[command(flatten)]
        scope: ItemScope,
    },
}

#[derive(Subcommand)]
enum PresenceCommand {
    /// Begin a session at an anchor, closing any open one.
    Start { key: String },
    /// End the open session, or the given one.
    Stop {
        #[arg(long)]
        id: Option<Uuid>,
    },
    Current,
    History {
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Most recently touched session, open or closed.
    Last,
}

#[derive(Subcommand)]
enum RouteSetCommand {
    /// Create a route; stops are anchor ids in walking order.
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long = "stop")]
        stops: Vec<Uuid>,
    },
    List,
    /// Rename or replace the stops of a route.
    Update {
        id: Uuid,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        clear_description: bool,
        /// Replaces every stop. `--clear-stops` empties the route.
        #[arg(long = "stop")]
        stops: Vec<Uuid>,
        #[arg(long)]
        clear_stops: bool,
    },
    Delete {
        id: Uuid,
    },
}

#[derive(Debug)]
enum CliError {
    Config(ConfigError),
    Db(DbError),
    Caller(ValidationError),
    Repo(RepoError),
    Output(serde_json::Error),
}

impl CliError {
    fn exit_code(&self) -> u8 {
        match self {
            Self::Repo(err) => match err.class() {
                ErrorClass::Internal => 1,
                ErrorClass::Invalid => 2,
                ErrorClass::NotFound => 3,
                ErrorClass::Conflict => 4,
            },
            Self::Config(_) | Self::Caller(_) => 2,
            Self::Db(_) | Self::Output(_) => 1,
        }
    }

    fn class(&self) -> &'static str {
        match self {
            Self::Repo(err) => err.class().as_str(),
            Self::Config(_) | Self::Caller(_) => ErrorClass::Invalid.as_str(),
            Self::Db(_) | Self::Output(_) => ErrorClass::Internal.as_str(),
        }
    }
}

impl Display for CliError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(err) => write!(f, "config: {err}"),
            Self::Db(err) => write!(f, "database: {err}"),
            Self::Caller(err) => write!(f, "caller: {err}"),
            Self::Repo(err) => f.write_str(&err.public_message()),
            Self::Output(err) => write!(f, "output: {err}"),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<DbError> for CliError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<RepoError> for CliError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(value: serde_json::Error) -> Self {
        Self::Output(value)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let command = cli.command.name();
    match run(cli) {
        Ok(()) => {
            info!("event=cli_command module=cli status=ok command={command}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            warn!(
                "event=cli_command module=cli status=error command={command} error_class={}",
                err.class()
            );
            eprintln!("error[{}]: {err}", err.class());
            ExitCode::from(err.exit_code())
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = load_config(cli.config.as_deref(), cli.db)?;
    if let Err(err) = init_logging_from_config(&config) {
        eprintln!("warning: file logging disabled: {err}");
    }

    let caller = CallerId::new(cli.caller).map_err(CliError::Caller)?;
    let conn = open_db_with_config(&config)?;

    let policy = config.unscoped_policy;
    let facade = || QueryFacade::try_new(&conn, policy);

    match cli.command {
        Command::Presence(command) => {
            let repo = SqliteBreadcrumbRepository::try_new(&conn, policy)?;
            let tracker =
                PresenceTracker::new(repo).with_busy_retries(config.busy_retry_attempts);
            run_presence(&tracker, &caller, command)
        }
        Command::Zone(command) => run_zone(&facade()?, &caller, command),
        Command::Anchor(command) => run_anchor(&facade()?, &caller, command),
        Command::Item(command) => run_item(&facade()?, &caller, command),
        Command::Capture(command) => run_capture(&facade()?, &caller, command),
        Command::Routeset(command) => run_routeset(&facade()?, &caller, command),
        Command::Scan {
            key,
            device,
            location,
        } => {
            let mut scan = NewScan::new(key, device);
            scan.location = location;
            print_json(&facade()?.log_scan(&caller, &scan)?)
        }
        Command::Search { text, limit } => {
            let mut query = SearchQuery::new(text);
            if let Some(limit) = limit {
                query.limit = limit;
            }
            print_json(&facade()?.search(&caller, &query)?)
        }
    }
}

fn load_config(path: Option<&Path>, db: Option<PathBuf>) -> Result<CoreConfig, CliError> {
    let config = match path {
        Some(path) => CoreConfig::load(path)?,
        None => CoreConfig::default(),
    };
    let mut config = config.apply_env()?;
    if let Some(db) = db {
        config.database_path = db;
    }
    config.validate()?;
    Ok(config)
}

fn run_zone(
    hive: &QueryFacade<'_>,
    caller: &CallerId,
    command: ZoneCommand,
) -> Result<(), CliError> {
    match command {
        ZoneCommand::Create {
            name,
            slug,
            color,
            icon,
            description,
        } => {
            let request = NewZone {
                name,
                slug,
                color,
                icon,
                description,
            };
            print_json(&hive.create_zone(caller, &request)?)
        }
        ZoneCommand::List => print_json(&hive.list_zones(caller)?),
        ZoneCommand::Delete { id } => {
            let removed = hive.delete_zone(caller, id)?;
            print_json(&json!({
                "deleted": id,
                "anchors": removed.anchors,
                "items": removed.items,
                "captures": removed.captures,
            }))
        }
    }
}

fn run_anchor(
    hive: &QueryFacade<'_>,
    caller: &CallerId,
    command: AnchorCommand,
) -> Result<(), CliError> {
    match command {
        AnchorCommand::Create {
            key,
            name,
            zone,
            description,
            location_hint,
            photo_url,
            floorplan_ref,
            tags,
        } => {
            let mut request = NewAnchor::new(key, name);
            request.zone_id = zone;
            request.description = description;
            request.location_hint = location_hint;
            request.photo_url = photo_url;
            request.floorplan_ref = floorplan_ref;
            request.tags = tags;
            print_json(&hive.create_anchor(caller, &request)?)
        }
        AnchorCommand::Get { key } => print_json(&hive.get_anchor_by_key(caller, &key)?),
        AnchorCommand::List { zone, tag } => {
            let query = AnchorListQuery {
                zone_id: zone,
                tag,
                ..AnchorListQuery::default()
            };
            print_json(&hive.list_anchors(caller, &query)?)
        }
        AnchorCommand::Delete { id } => {
            hive.delete_anchor(caller, id)?;
            print_json(&json!({ "deleted": id }))
        }
    }
}

fn run_item(
    hive: &QueryFacade<'_>,
    caller: &CallerId,
    command: ItemCommand,
) -> Result<(), CliError> {
    match command {
        ItemCommand::Create {
            title,
            body,
            note,
            priority,
            scope,
        } => {
            let mut request = if note {
                NewItem::note(title)
            } else {
                NewItem::task(title)
            };
            request.body = body;
            request.priority = priority;
            request.zone_id = scope.zone;
            request.anchor_id = scope.anchor;
            print_json(&hive.create_item(caller, &request)?)
        }
        ItemCommand::List { status, scope } => {
            let query = ItemListQuery {
                zone_id: scope.zone,
                anchor_id: scope.anchor,
                status,
                ..ItemListQuery::default()
            };
            print_json(&hive.list_items(caller, &query)?)
        }
        ItemCommand::Done { id } => {
            print_json(&hive.update_item(caller, id, ItemPatch::status(ItemStatus::Done))?)
        }
        ItemCommand::Delete { id } => {
            hive.delete_item(caller, id)?;
            print_json(&json!({ "deleted": id }))
        }
    }
}

fn run_capture(
    hive: &QueryFacade<'_>,
    caller: &CallerId,
    command: CaptureCommand,
) -> Result<(), CliError> {
    match command {
        CaptureCommand::Create {
            text,
            source,
            scope,
        } => {
            let request = NewCapture {
                raw_text: text,
                source,
                zone_id: scope.zone,
                anchor_id: scope.anchor,
            };
            print_json(&hive.create_capture(caller, &request)?)
        }
        CaptureCommand::List { limit, scope } => {
            let query = CaptureListQuery {
                zone_id: scope.zone,
                anchor_id: scope.anchor,
                limit,
            };
            print_json(&hive.list_captures(caller, &query)?)
        }
    }
}

fn run_routeset(
    hive: &QueryFacade<'_>,
    caller: &CallerId,
    command: RouteSetCommand,
) -> Result<(), CliError> {
    match command {
        RouteSetCommand::Create {
            name,
            description,
            stops,
        } => {
            let mut request = NewRouteSet::new(name, stops);
            request.description = description;
            print_json(&hive.create_routeset(caller, &request)?)
        }
        RouteSetCommand::List => print_json(&hive.list_routesets(caller)?),
        RouteSetCommand::Update {
            id,
            name,
            description,
            clear_description,
            stops,
            clear_stops,
        } => {
            let patch = RouteSetPatch {
                name,
                description: match description {
                    Some(text) => Patch::Set(text),
                    None if clear_description => Patch::Clear,
                    None => Patch::Keep,
                },
                anchor_ids: (clear_stops || !stops.is_empty()).then_some(stops),
            };
            print_json(&hive.update_routeset(caller, id, patch)?)
        }
        RouteSetCommand::Delete { id } => {
            hive.delete_routeset(caller, id)?;
            print_json(&json!({ "deleted": id }))
        }
    }
}

fn run_presence(
    tracker: &PresenceTracker<SqliteBreadcrumbRepository<'_>>,
    caller: &CallerId,
    command: PresenceCommand,
) -> Result<(), CliError> {
    match command {
        PresenceCommand::Start { key } => print_json(&tracker.start(caller, &key)?),
        PresenceCommand::Stop { id } => match tracker.stop(caller, id)? {
            StopOutcome::Stopped(breadcrumb) => print_json(&json!({
                "stopped": breadcrumb,
                "dwell_ms": breadcrumb.dwell_ms(),
            })),
            StopOutcome::NoActiveSession => print_json(&json!({ "stopped": null })),
        },
        PresenceCommand::Current => print_json(&tracker.state(caller)?),
        PresenceCommand::History { limit } => print_json(&tracker.history(caller, limit)?),
        PresenceCommand::Last => print_json(&tracker.last(caller)?),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_status(value: &str) -> Result<ItemStatus, String> {
    ItemStatus::parse(value).ok_or_else(|| format!("expected open|done, got `{value}`"))
}

fn parse_device(value: &str) -> Result<DeviceType, String> {
    DeviceType::parse(value).ok_or_else(|| format!("expected iphone|watch|laptop, got `{value}`"))
}

fn parse_source(value: &str) -> Result<CaptureSource, String> {
    CaptureSource::parse(value)
        .ok_or_else(|| format!("expected text|voice|nfc|import, got `{value}`"))
}

#[cfg(test)]
mod tests {
    use super::{
        parse_device, parse_status, Cli, CliError, Command, PresenceCommand, RouteSetCommand,
    };
    use clap::{CommandFactory, Parser};
    use hive_core::{DeviceType, ItemStatus, RepoError, ResourceKind};

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn presence_start_parses() {
        let cli = Cli::try_parse_from(["hive", "--caller", "u1", "presence", "start", "desk"])
            .unwrap();
        assert_eq!(cli.caller, "u1");
    }

    #[test]
    fn presence_last_parses() {
        let cli = Cli::try_parse_from(["hive", "--caller", "u1", "presence", "last"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Presence(PresenceCommand::Last)
        ));
    }

    #[test]
    fn routeset_create_keeps_stop_order() {
        let first = "6f1c7f3e-5d2a-4b8e-9a61-0c2d9e4b7a10";
        let second = "0b9e2c1d-3f4a-4e5b-8c6d-7e8f9a0b1c2d";
        let cli = Cli::try_parse_from([
            "hive", "--caller", "u1", "routeset", "create", "--name", "Morning", "--stop", second,
            "--stop", first,
        ])
        .unwrap();
        match cli.command {
            Command::Routeset(RouteSetCommand::Create { name, stops, .. }) => {
                assert_eq!(name, "Morning");
                let stops: Vec<String> = stops.iter().map(ToString::to_string).collect();
                assert_eq!(stops, vec![second, first]);
            }
            _ => panic!("expected routeset create"),
        }
    }

    #[test]
    fn value_parsers_reject_unknown_codes() {
        assert_eq!(parse_status("done"), Ok(ItemStatus::Done));
        assert!(parse_status("later").is_err());
        assert_eq!(parse_device("watch"), Ok(DeviceType::Watch));
        assert!(parse_device("pager").is_err());
    }

    #[test]
    fn exit_codes_follow_error_class() {
        let not_found = CliError::Repo(RepoError::NotFound {
            kind: ResourceKind::Anchor,
            id: "DESK".to_string(),
        });
        assert_eq!(not_found.exit_code(), 3);
        let conflict = CliError::Repo(RepoError::Conflict {
            field: "slug",
            value: "home".to_string(),
        });
        assert_eq!(conflict.exit_code(), 4);
    }
}
