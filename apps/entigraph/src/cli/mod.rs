//! # Entigraph CLI Module
//!
//! This module implements the CLI interface for Entigraph.
//!
//! ## Available Commands
//!
//! - `init` - Initialize a new database
//! - `status` - Show store statistics
//! - `create` / `get` / `update` / `archive` - Entity operations
//! - `history` - Version chain of an entity
//! - `metadata` - Show or merge shared metadata
//! - `list` - Entities of an account or a type
//! - `user` - Find a user by email or shortname
//! - `link` - Create, delete and list links
//! - `aggregate` - Filter/sort/paginate query
//! - `login-code` - Login code records

mod commands;

use crate::config::AppConfig;
use clap::{Parser, Subcommand};
use entigraph_core::{AccountId, EntityId, GraphError, LoginId, MetadataId};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Entigraph - versioned entity graph store
///
/// Typed entities with permanent history, ordered links between them, and
/// filter/sort/paginate queries. Every command prints JSON.
#[derive(Parser, Debug)]
#[command(name = "entigraph")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the redb database (overrides the config file)
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short = 'C', long, global = true)]
    pub config: Option<PathBuf>,

    /// Lock wait timeout in milliseconds (overrides the config file)
    #[arg(long, global = true)]
    pub lock_timeout_ms: Option<u64>,

    /// Print compact single-line JSON (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new empty database
    Init {
        /// Replace an existing database
        #[arg(short, long)]
        force: bool,
    },

    /// Show store statistics
    Status,

    /// Create an entity
    Create {
        #[arg(short, long)]
        account: AccountId,

        /// Entity type discriminator
        #[arg(short = 't', long = "type")]
        entity_type: String,

        /// Properties as JSON
        #[arg(short, long, default_value = "{}")]
        properties: String,

        /// Keep every past version on update
        #[arg(long)]
        versioned: bool,

        /// Explicit id for the first version
        #[arg(long)]
        entity_id: Option<EntityId>,

        /// Creator entity id (nil when omitted)
        #[arg(long)]
        created_by: Option<EntityId>,
    },

    /// Fetch one entity version
    Get {
        #[arg(short, long)]
        account: AccountId,

        #[arg(short, long)]
        entity: EntityId,

        /// Resolve to the current head version
        #[arg(short, long)]
        latest: bool,
    },

    /// Replace an entity's properties
    Update {
        #[arg(short, long)]
        account: AccountId,

        #[arg(short, long)]
        entity: EntityId,

        /// Properties as JSON
        #[arg(short, long)]
        properties: String,

        /// Fail unless the stored type matches
        #[arg(short = 't', long)]
        expected_type: Option<String>,
    },

    /// Flag an entity as archived
    Archive {
        #[arg(short, long)]
        account: AccountId,

        #[arg(short, long)]
        entity: EntityId,
    },

    /// Show the version chain of an entity, newest first
    History {
        #[arg(short, long)]
        account: AccountId,

        #[arg(short, long)]
        entity: EntityId,
    },

    /// Show shared metadata, or merge into it with --extra
    Metadata {
        #[arg(short, long)]
        account: AccountId,

        #[arg(short, long)]
        metadata_id: MetadataId,

        /// JSON to merge into `extra`
        #[arg(long)]
        extra: Option<String>,
    },

    /// List the entities of an account, or of one type
    List {
        #[arg(short, long)]
        account: AccountId,

        #[arg(short = 't', long = "type")]
        entity_type: Option<String>,

        /// Include every version, not only heads (requires --type)
        #[arg(long, requires = "entity_type")]
        all_versions: bool,
    },

    /// Find a user by email address or shortname, across all accounts
    User {
        /// Address listed under `emails[*].address`
        #[arg(long, required_unless_present = "shortname", conflicts_with = "shortname")]
        email: Option<String>,

        #[arg(long)]
        shortname: Option<String>,
    },

    /// Link operations
    Link {
        #[command(subcommand)]
        action: LinkAction,
    },

    /// Filter, sort and paginate a collection
    Aggregate {
        #[arg(short, long)]
        account: AccountId,

        /// Aggregate the latest entities of this type
        #[arg(short = 't', long = "type", conflicts_with_all = ["source", "path"])]
        entity_type: Option<String>,

        /// Aggregate the linked entities of this source version
        #[arg(short, long, requires = "path")]
        source: Option<EntityId>,

        #[arg(long)]
        path: Option<String>,

        /// Operation as JSON (`pageNumber`, `itemsPerPage`, `multiSort`, `multiFilter`)
        #[arg(short, long, default_value = "{}")]
        operation: String,
    },

    /// Login code records
    LoginCode {
        #[command(subcommand)]
        action: LoginCodeAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum LinkAction {
    /// Insert a link (appends when --index is omitted)
    Create {
        #[arg(short, long)]
        account: AccountId,

        #[arg(short, long)]
        source: EntityId,

        #[arg(short, long)]
        destination: EntityId,

        /// Destination account (defaults to --account)
        #[arg(long)]
        destination_account: Option<AccountId>,

        /// Pin to one destination version
        #[arg(long)]
        pin: Option<EntityId>,

        #[arg(short, long)]
        path: String,

        #[arg(short, long, allow_negative_numbers = true)]
        index: Option<i64>,
    },

    /// Remove the link at a position
    Delete {
        #[arg(short, long)]
        account: AccountId,

        #[arg(short, long)]
        source: EntityId,

        #[arg(short, long)]
        path: String,

        #[arg(short, long)]
        index: usize,
    },

    /// Show one group (with --path) or every group of a source
    List {
        #[arg(short, long)]
        account: AccountId,

        #[arg(short, long)]
        source: EntityId,

        #[arg(short, long)]
        path: Option<String>,

        /// Show resolved destination entities instead of links (requires --path)
        #[arg(long, requires = "path")]
        resolve: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum LoginCodeAction {
    /// Store a new code for a user entity
    Create {
        #[arg(short, long)]
        account: AccountId,

        #[arg(short, long)]
        user: EntityId,

        #[arg(short, long)]
        code: String,
    },

    /// Show one code
    Get {
        #[arg(short, long)]
        account: AccountId,

        #[arg(short, long)]
        login_id: LoginId,
    },

    /// Codes of one user, oldest first
    List {
        #[arg(short, long)]
        account: AccountId,

        #[arg(short, long)]
        user: EntityId,
    },

    /// Count one more attempt against a code
    Attempt {
        #[arg(short, long)]
        account: AccountId,

        #[arg(short, long)]
        login_id: LoginId,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Resolve configuration from the file and the flags.
pub fn resolve_config(cli: &Cli) -> Result<(PathBuf, AppConfig), GraphError> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    if let Some(timeout) = cli.lock_timeout_ms {
        config.store.lock_timeout_ms = timeout;
    }
    let database = config.resolve_database(cli.database.as_deref());
    Ok((database, config))
}

/// Execute the CLI and return the JSON document to print.
pub fn execute(cli: Cli) -> Result<serde_json::Value, GraphError> {
    let (database, config) = resolve_config(&cli)?;

    let command = match cli.command {
        Some(Commands::Init { force }) => return cmd_init(&database, &config, force),
        Some(command) => command,
        None => Commands::Status,
    };

    let store = open_store(&database, &config)?;
    match command {
        Commands::Init { .. } | Commands::Status => cmd_status(&store, &database),
        Commands::Create {
            account,
            entity_type,
            properties,
            versioned,
            entity_id,
            created_by,
        } => cmd_create(
            &store,
            CreateArgs {
                account,
                entity_type,
                properties,
                versioned,
                entity_id,
                created_by,
            },
        ),
        Commands::Get {
            account,
            entity,
            latest,
        } => cmd_get(&store, account, entity, latest),
        Commands::Update {
            account,
            entity,
            properties,
            expected_type,
        } => cmd_update(&store, account, entity, &properties, expected_type.as_deref()),
        Commands::Archive { account, entity } => cmd_archive(&store, account, entity),
        Commands::History { account, entity } => cmd_history(&store, account, entity),
        Commands::Metadata {
            account,
            metadata_id,
            extra,
        } => cmd_metadata(&store, account, metadata_id, extra.as_deref()),
        Commands::List {
            account,
            entity_type,
            all_versions,
        } => cmd_list(&store, account, entity_type.as_deref(), all_versions),
        Commands::User { email, shortname } => {
            cmd_user(&store, email.as_deref(), shortname.as_deref())
        }
        Commands::Link { action } => cmd_link(&store, action),
        Commands::Aggregate {
            account,
            entity_type,
            source,
            path,
            operation,
        } => cmd_aggregate(&store, account, entity_type, source, path, &operation),
        Commands::LoginCode { action } => cmd_login_code(&store, action),
    }
}
