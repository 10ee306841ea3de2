//! Scope registry: resolves (namespace, scope kind, ids) to bound documents.
//!
//! One [`Config`] owns a feature's document tree under
//! `<root>/<namespace>/<kind>/<id...>.json`, with the global scope
//! collapsing to `<root>/<namespace>/global.json`. The registry hands out
//! fresh [`Group`]s on demand and never caches them; callers that need
//! single-writer semantics route all access to one key through one group.

use crate::core::broker::{Broker, content_hash};
use crate::core::error::VaultError;
use crate::core::group::Group;
use crate::core::marshal;
use crate::core::schema::{Document, Shape};
use crate::core::store::{self, Store};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The six fixed storage categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum ScopeKind {
    Global,
    Guild,
    Channel,
    Role,
    User,
    Member,
}

impl ScopeKind {
    pub const ALL: [ScopeKind; 6] = [
        ScopeKind::Global,
        ScopeKind::Guild,
        ScopeKind::Channel,
        ScopeKind::Role,
        ScopeKind::User,
        ScopeKind::Member,
    ];

    pub fn dir_name(self) -> &'static str {
        match self {
            ScopeKind::Global => "global",
            ScopeKind::Guild => "guild",
            ScopeKind::Channel => "channel",
            ScopeKind::Role => "role",
            ScopeKind::User => "user",
            ScopeKind::Member => "member",
        }
    }

    /// Number of numeric ids addressing one document of this kind.
    /// Member documents nest under their guild id.
    pub fn id_arity(self) -> usize {
        match self {
            ScopeKind::Global => 0,
            ScopeKind::Member => 2,
            _ => 1,
        }
    }
}

/// Resolves the backing file for a scope key. Id arity is checked against
/// the scope kind.
pub fn scope_path(
    store: &Store,
    namespace: &str,
    kind: ScopeKind,
    ids: &[u64],
) -> Result<PathBuf, VaultError> {
    if ids.len() != kind.id_arity() {
        return Err(VaultError::ValidationError(format!(
            "scope kind `{}` takes {} id(s), got {}",
            kind.dir_name(),
            kind.id_arity(),
            ids.len()
        )));
    }

    let ns = store.namespace_dir(namespace);
    if kind == ScopeKind::Global {
        return Ok(ns.join(format!("global.{}", store::EXTENSION)));
    }

    let mut path = ns.join(kind.dir_name());
    for id in &ids[..ids.len() - 1] {
        path = path.join(id.to_string());
    }
    path = path.join(format!("{}.{}", ids[ids.len() - 1], store::EXTENSION));
    Ok(path)
}

/// Directory a scope kind's documents live under, optionally narrowed by
/// prefix ids (a guild id for member documents).
pub fn scope_dir(store: &Store, namespace: &str, kind: ScopeKind, prefix_ids: &[u64]) -> PathBuf {
    let mut dir = store.namespace_dir(namespace).join(kind.dir_name());
    for id in prefix_ids {
        dir = dir.join(id.to_string());
    }
    dir
}

struct ScopeDefault {
    raw: Value,
    shape: Shape,
}

/// A feature's configuration files tree.
///
/// Construction takes the store root and the owning feature's namespace;
/// per-scope-kind defaults are registered before any access. There is no
/// module-level ambient state.
pub struct Config {
    namespace: String,
    store: Store,
    broker: Arc<Broker>,
    defaults: FxHashMap<ScopeKind, ScopeDefault>,
}

impl Config {
    /// Opens the registry for one feature namespace. The store root is
    /// created up front so the audit log has somewhere to land.
    pub fn new(store: Store, namespace: &str) -> Result<Self, VaultError> {
        validate_namespace(namespace)?;
        fs::create_dir_all(&store.root)?;
        let broker = Arc::new(Broker::new(&store.root));
        Ok(Self {
            namespace: namespace.to_string(),
            store,
            broker,
            defaults: FxHashMap::default(),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    // ---- default registration ----

    pub fn defaults_global<D: Document>(&mut self, default: &D) -> Result<(), VaultError> {
        self.register(ScopeKind::Global, default)
    }

    pub fn defaults_guild<D: Document>(&mut self, default: &D) -> Result<(), VaultError> {
        self.register(ScopeKind::Guild, default)
    }

    pub fn defaults_channel<D: Document>(&mut self, default: &D) -> Result<(), VaultError> {
        self.register(ScopeKind::Channel, default)
    }

    pub fn defaults_role<D: Document>(&mut self, default: &D) -> Result<(), VaultError> {
        self.register(ScopeKind::Role, default)
    }

    pub fn defaults_user<D: Document>(&mut self, default: &D) -> Result<(), VaultError> {
        self.register(ScopeKind::User, default)
    }

    pub fn defaults_member<D: Document>(&mut self, default: &D) -> Result<(), VaultError> {
        self.register(ScopeKind::Member, default)
    }

    fn register<D: Document>(&mut self, kind: ScopeKind, default: &D) -> Result<(), VaultError> {
        let raw = marshal::to_raw(default)?;
        self.defaults.insert(
            kind,
            ScopeDefault {
                raw,
                shape: D::shape(),
            },
        );
        Ok(())
    }

    fn registered(&self, kind: ScopeKind) -> Result<&ScopeDefault, VaultError> {
        self.defaults.get(&kind).ok_or_else(|| {
            VaultError::ValidationError(format!(
                "no default registered for scope kind `{}` in namespace `{}`",
                kind.dir_name(),
                self.namespace
            ))
        })
    }

    fn registered_as<D: Document>(&self, kind: ScopeKind) -> Result<&ScopeDefault, VaultError> {
        let default = self.registered(kind)?;
        if default.shape != D::shape() {
            return Err(VaultError::SchemaMismatch(format!(
                "scope kind `{}` of `{}` is registered with a different schema",
                kind.dir_name(),
                self.namespace
            )));
        }
        Ok(default)
    }

    // ---- scope accessors ----

    pub fn global<D: Document>(&self) -> Result<Group<D>, VaultError> {
        self.bind(ScopeKind::Global, &[])
    }

    pub fn guild<D: Document>(&self, guild_id: u64) -> Result<Group<D>, VaultError> {
        self.bind(ScopeKind::Guild, &[guild_id])
    }

    pub fn channel<D: Document>(&self, channel_id: u64) -> Result<Group<D>, VaultError> {
        self.bind(ScopeKind::Channel, &[channel_id])
    }

    pub fn role<D: Document>(&self, role_id: u64) -> Result<Group<D>, VaultError> {
        self.bind(ScopeKind::Role, &[role_id])
    }

    pub fn user<D: Document>(&self, user_id: u64) -> Result<Group<D>, VaultError> {
        self.bind(ScopeKind::User, &[user_id])
    }

    /// A member is a user within a guild, so both ids are required.
    pub fn member<D: Document>(&self, guild_id: u64, member_id: u64) -> Result<Group<D>, VaultError> {
        self.bind(ScopeKind::Member, &[guild_id, member_id])
    }

    fn bind<D: Document>(&self, kind: ScopeKind, ids: &[u64]) -> Result<Group<D>, VaultError> {
        let default = self.registered_as::<D>(kind)?;
        let path = scope_path(&self.store, &self.namespace, kind, ids)?;
        Group::bind(path, &self.namespace, Arc::clone(&self.broker), &default.raw)
    }

    // ---- enumeration ----

    /// Every existing document under a scope kind, keyed by the numeric id
    /// parsed from the filename. A missing directory is created and yields
    /// an empty map. Loads fan out in parallel; the keys are distinct, so
    /// per-key write ordering is unaffected.
    pub fn enumerate<D: Document>(
        &self,
        kind: ScopeKind,
        prefix_ids: &[u64],
    ) -> Result<BTreeMap<u64, Group<D>>, VaultError> {
        if kind == ScopeKind::Global {
            return Err(VaultError::ValidationError(
                "the global scope holds a single document".to_string(),
            ));
        }
        if prefix_ids.len() >= kind.id_arity() {
            return Err(VaultError::ValidationError(format!(
                "scope kind `{}` takes at most {} prefix id(s), got {}",
                kind.dir_name(),
                kind.id_arity() - 1,
                prefix_ids.len()
            )));
        }

        let default = self.registered_as::<D>(kind)?;
        let dir = scope_dir(&self.store, &self.namespace, kind, prefix_ids);
        let files = store::list_documents(&dir)?;

        let groups = files
            .into_par_iter()
            .map(|(id, path)| {
                Group::bind(path, &self.namespace, Arc::clone(&self.broker), &default.raw)
                    .map(|group| (id, group))
            })
            .collect::<Result<Vec<_>, VaultError>>()?;
        Ok(groups.into_iter().collect())
    }

    pub fn all_guilds<D: Document>(&self) -> Result<BTreeMap<u64, Group<D>>, VaultError> {
        self.enumerate(ScopeKind::Guild, &[])
    }

    pub fn all_channels<D: Document>(&self) -> Result<BTreeMap<u64, Group<D>>, VaultError> {
        self.enumerate(ScopeKind::Channel, &[])
    }

    pub fn all_roles<D: Document>(&self) -> Result<BTreeMap<u64, Group<D>>, VaultError> {
        self.enumerate(ScopeKind::Role, &[])
    }

    pub fn all_users<D: Document>(&self) -> Result<BTreeMap<u64, Group<D>>, VaultError> {
        self.enumerate(ScopeKind::User, &[])
    }

    /// Every member document of one guild.
    pub fn all_members<D: Document>(
        &self,
        guild_id: u64,
    ) -> Result<BTreeMap<u64, Group<D>>, VaultError> {
        self.enumerate(ScopeKind::Member, &[guild_id])
    }

    // ---- bulk reset ----

    /// Overwrites every existing document under a scope kind (optionally
    /// narrowed by prefix ids) with the registered default. Files are
    /// reset, never deleted or created.
    pub fn clear(&self, kind: ScopeKind, prefix_ids: &[u64]) -> Result<(), VaultError> {
        if kind == ScopeKind::Global {
            return self.clear_global();
        }
        if prefix_ids.len() >= kind.id_arity() {
            return Err(VaultError::ValidationError(format!(
                "scope kind `{}` takes at most {} prefix id(s), got {}",
                kind.dir_name(),
                kind.id_arity() - 1,
                prefix_ids.len()
            )));
        }
        let default = self.registered(kind)?;
        let dir = scope_dir(&self.store, &self.namespace, kind, prefix_ids);
        for (_, path) in store::list_documents(&dir)? {
            self.reset_file(&path, &default.raw)?;
        }
        Ok(())
    }

    /// Resets the global document to its default, if it exists.
    pub fn clear_global(&self) -> Result<(), VaultError> {
        let default = self.registered(ScopeKind::Global)?;
        let path = scope_path(&self.store, &self.namespace, ScopeKind::Global, &[])?;
        if path.is_file() {
            self.reset_file(&path, &default.raw)?;
        }
        Ok(())
    }

    pub fn clear_all_guilds(&self) -> Result<(), VaultError> {
        self.clear(ScopeKind::Guild, &[])
    }

    pub fn clear_all_channels(&self) -> Result<(), VaultError> {
        self.clear(ScopeKind::Channel, &[])
    }

    pub fn clear_all_roles(&self) -> Result<(), VaultError> {
        self.clear(ScopeKind::Role, &[])
    }

    pub fn clear_all_users(&self) -> Result<(), VaultError> {
        self.clear(ScopeKind::User, &[])
    }

    /// Resets every member document of one guild.
    pub fn clear_all_members(&self, guild_id: u64) -> Result<(), VaultError> {
        self.clear(ScopeKind::Member, &[guild_id])
    }

    /// Resets every registered scope kind, walking each guild folder under
    /// `member/`.
    pub fn clear_all(&self) -> Result<(), VaultError> {
        for kind in ScopeKind::ALL {
            if !self.defaults.contains_key(&kind) {
                continue;
            }
            match kind {
                ScopeKind::Global => self.clear_global()?,
                ScopeKind::Member => {
                    let member_root = scope_dir(&self.store, &self.namespace, kind, &[]);
                    for guild_id in store::list_subscopes(&member_root)? {
                        self.clear(ScopeKind::Member, &[guild_id])?;
                    }
                }
                _ => self.clear(kind, &[])?,
            }
        }
        Ok(())
    }

    fn reset_file(&self, path: &Path, raw: &Value) -> Result<(), VaultError> {
        let hash = content_hash(raw);
        self.broker
            .with_path(path, &self.namespace, "config.clear", Some(&hash), || {
                store::write_raw(path, raw)
            })
    }
}

fn validate_namespace(namespace: &str) -> Result<(), VaultError> {
    if namespace.is_empty() {
        return Err(VaultError::ValidationError(
            "namespace must not be empty".to_string(),
        ));
    }
    let ok = namespace
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !ok {
        return Err(VaultError::PathError(format!(
            "namespace `{}` may only contain ASCII alphanumerics, `-` and `_`",
            namespace
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_paths_follow_the_fixed_layout() {
        let store = Store::new("/vault");
        let global = scope_path(&store, "Birthday", ScopeKind::Global, &[]).unwrap();
        assert_eq!(global, PathBuf::from("/vault/Birthday/global.json"));

        let guild = scope_path(&store, "Birthday", ScopeKind::Guild, &[123]).unwrap();
        assert_eq!(guild, PathBuf::from("/vault/Birthday/guild/123.json"));

        let member = scope_path(&store, "Birthday", ScopeKind::Member, &[42, 7]).unwrap();
        assert_eq!(member, PathBuf::from("/vault/Birthday/member/42/7.json"));
    }

    #[test]
    fn scope_path_checks_id_arity() {
        let store = Store::new("/vault");
        assert!(scope_path(&store, "Birthday", ScopeKind::Member, &[42]).is_err());
        assert!(scope_path(&store, "Birthday", ScopeKind::Global, &[1]).is_err());
        assert!(scope_path(&store, "Birthday", ScopeKind::Guild, &[]).is_err());
    }

    #[test]
    fn namespaces_must_be_path_safe() {
        assert!(validate_namespace("Birthday").is_ok());
        assert!(validate_namespace("role-by-reaction").is_ok());
        assert!(validate_namespace("").is_err());
        assert!(validate_namespace("a/b").is_err());
        assert!(validate_namespace("..").is_err());
    }
}
