//! Cogvault: scoped, typed, file-backed configuration for bot features.
//!
//! **Cogvault is the local-first document vault that feature modules
//! ("cogs") call on demand for their per-scope configuration.**
//!
//! Each feature owns a namespace; each namespace holds one JSON document
//! per scope instance across six fixed scope kinds (global, guild,
//! channel, role, user, member). Documents are marshalled between raw
//! JSON trees and caller-declared typed records, never exposed as
//! loosely-keyed maps.
//!
//! # Core Principles
//!
//! - **Local-first**: one JSON file per scope instance, no daemon, no
//!   network surface
//! - **Typed at the seam**: the marshalling engine is the only component
//!   that coerces; a document either conforms to its declared schema in
//!   full or the load fails
//! - **Read-or-create**: the backing file for a scope key exists from the
//!   moment the key is first requested
//! - **Audited writes**: every mutation routes through the write broker
//!   and lands in `vault.events.jsonl`
//!
//! # Layout
//!
//! ```text
//! <root>/<namespace>/global.json
//! <root>/<namespace>/<guild|channel|role|user>/<id>.json
//! <root>/<namespace>/member/<guild_id>/<member_id>.json
//! <root>/vault.events.jsonl
//! ```
//!
//! # Example
//!
//! ```no_run
//! use cogvault::core::registry::Config;
//! use cogvault::core::schema::{Document, FieldShape, Shape};
//! use cogvault::core::store::Store;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
//! struct GuildPrefs {
//!     channel: u64,
//!     role: u64,
//! }
//!
//! impl Document for GuildPrefs {
//!     fn shape() -> Shape {
//!         Shape::node(
//!             "GuildPrefs",
//!             vec![
//!                 FieldShape::new("channel", Shape::Int),
//!                 FieldShape::new("role", Shape::Int),
//!             ],
//!         )
//!     }
//! }
//!
//! # fn main() -> Result<(), cogvault::core::error::VaultError> {
//! let mut config = Config::new(Store::new("data"), "Birthday")?;
//! config.defaults_guild(&GuildPrefs { channel: 0, role: 0 })?;
//!
//! let mut prefs = config.guild::<GuildPrefs>(123)?;
//! prefs.update(|p| p.channel = 456)?;
//! # Ok(())
//! # }
//! ```
//!
//! # Known gaps
//!
//! - Writes to one scope key are serialized within this process only;
//!   cross-process writers are last-write-wins.
//! - Two independently obtained groups for one key hold independent
//!   caches. Callers that need single-writer semantics route all access
//!   to a key through a single owned group.
//! - Document files carry no version field; there is no migration story.

pub mod core;

use core::broker::{AUDIT_LOG_NAME, VaultEvent};
use core::error::VaultError;
use core::registry::{self, ScopeKind};
use core::store::Store;

use clap::{Parser, Subcommand};
use colored::Colorize;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "cogvault",
    version = env!("CARGO_PKG_VERSION"),
    about = "Local-first, file-backed configuration vault for bot feature modules"
)]
struct Cli {
    /// Root directory the vault lives under.
    #[clap(long, default_value = ".", env = "COGVAULT_ROOT")]
    root: PathBuf,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the document stored for one scope.
    Show {
        namespace: String,
        #[clap(value_enum)]
        kind: ScopeKind,
        /// Numeric ids addressing the scope: none for global, one for
        /// guild/channel/role/user, guild id then member id for member.
        ids: Vec<u64>,
    },
    /// List the ids that have a document under a scope kind.
    List {
        namespace: String,
        #[clap(value_enum)]
        kind: ScopeKind,
        /// Guild id narrowing a member listing. Without it, a member
        /// listing shows the guild ids that have member folders.
        prefix: Option<u64>,
    },
    /// Print the file path a scope resolves to.
    Path {
        namespace: String,
        #[clap(value_enum)]
        kind: ScopeKind,
        ids: Vec<u64>,
    },
    /// Render the write audit trail.
    Audit {
        /// Show at most the N most recent events.
        #[clap(long, default_value = "20")]
        limit: usize,
    },
}

pub fn run() -> Result<(), VaultError> {
    let cli = Cli::parse();
    let store = Store::new(cli.root);

    match cli.command {
        Command::Show {
            namespace,
            kind,
            ids,
        } => show_document(&store, &namespace, kind, &ids),
        Command::List {
            namespace,
            kind,
            prefix,
        } => list_scope(&store, &namespace, kind, prefix),
        Command::Path {
            namespace,
            kind,
            ids,
        } => {
            let path = registry::scope_path(&store, &namespace, kind, &ids)?;
            println!("{}", path.display());
            Ok(())
        }
        Command::Audit { limit } => render_audit(&store, limit),
    }
}

/// Reads one document at the raw level. Inspection never auto-creates.
fn show_document(
    store: &Store,
    namespace: &str,
    kind: ScopeKind,
    ids: &[u64],
) -> Result<(), VaultError> {
    let path = registry::scope_path(store, namespace, kind, ids)?;
    if !path.is_file() {
        return Err(VaultError::NotFound(format!(
            "no document at {}",
            path.display()
        )));
    }
    let text = fs::read_to_string(&path)?;
    let raw: Value = serde_json::from_str(&text).map_err(|source| {
        VaultError::MalformedDocument {
            path: path.clone(),
            source,
        }
    })?;
    println!("{}", serde_json::to_string_pretty(&raw).unwrap());
    Ok(())
}

fn list_scope(
    store: &Store,
    namespace: &str,
    kind: ScopeKind,
    prefix: Option<u64>,
) -> Result<(), VaultError> {
    if kind == ScopeKind::Global {
        return Err(VaultError::ValidationError(
            "the global scope holds a single document; use `show`".to_string(),
        ));
    }
    if prefix.is_some() && kind != ScopeKind::Member {
        return Err(VaultError::ValidationError(format!(
            "scope kind `{}` takes no prefix id",
            kind.dir_name()
        )));
    }

    if kind == ScopeKind::Member && prefix.is_none() {
        let dir = registry::scope_dir(store, namespace, kind, &[]);
        for guild_id in core::store::list_subscopes(&dir)? {
            println!("{}", guild_id);
        }
        return Ok(());
    }

    let prefix_ids: Vec<u64> = prefix.into_iter().collect();
    let dir = registry::scope_dir(store, namespace, kind, &prefix_ids);
    for (id, _) in core::store::list_documents(&dir)? {
        println!("{}", id);
    }
    Ok(())
}

fn render_audit(store: &Store, limit: usize) -> Result<(), VaultError> {
    let path = store.root.join(AUDIT_LOG_NAME);
    if !path.is_file() {
        println!("no audit events recorded at {}", path.display());
        return Ok(());
    }

    let mut events: Vec<VaultEvent> = Vec::new();
    for line in fs::read_to_string(&path)?.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<VaultEvent>(line) {
            Ok(ev) => events.push(ev),
            Err(_) => continue,
        }
    }

    let start = events.len().saturating_sub(limit);
    println!(
        "{}",
        format!(
            "{:<12} {:<14} {:<12} {:<8} PATH",
            "TIME", "OP", "NAMESPACE", "STATUS"
        )
        .bold()
    );
    for ev in &events[start..] {
        let status = if ev.status == "success" {
            ev.status.green()
        } else {
            ev.status.red()
        };
        println!(
            "{:<12} {:<14} {:<12} {:<8} {}",
            truncate(&ev.ts, 12),
            truncate(&ev.op, 14),
            truncate(&ev.namespace, 12),
            status,
            ev.path
        );
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() > max {
        format!("{}...", &s[..max - 3])
    } else {
        s.to_string()
    }
}
