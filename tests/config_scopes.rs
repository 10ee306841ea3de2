use cogvault::core::broker::VaultEvent;
use cogvault::core::error::VaultError;
use cogvault::core::registry::{Config, ScopeKind, scope_path};
use cogvault::core::schema::{Document, FieldShape, Shape};
use cogvault::core::store::Store;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
struct GuildPrefs {
    channel: u64,
    role: u64,
}

impl Document for GuildPrefs {
    fn shape() -> Shape {
        Shape::node(
            "GuildPrefs",
            vec![
                FieldShape::new("channel", Shape::Int),
                FieldShape::new("role", Shape::Int),
            ],
        )
    }
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
struct Motd {
    text: String,
}

impl Document for Motd {
    fn shape() -> Shape {
        Shape::node("Motd", vec![FieldShape::new("text", Shape::Str)])
    }
}

fn events_config(root: &Path) -> Config {
    let mut config = Config::new(Store::new(root), "Events").expect("open registry");
    config
        .defaults_guild(&GuildPrefs {
            channel: 0,
            role: 0,
        })
        .expect("register guild default");
    config
}

fn read_events(root: &Path) -> Vec<VaultEvent> {
    let text = fs::read_to_string(root.join("vault.events.jsonl")).expect("audit log");
    text.lines()
        .map(|line| serde_json::from_str(line).expect("valid event json"))
        .collect()
}

#[test]
fn first_access_creates_the_file_with_the_default() {
    let tmp = tempdir().expect("tempdir");
    let config = events_config(tmp.path());

    let group = config.guild::<GuildPrefs>(123).expect("bind guild");
    assert_eq!(group.get(), &GuildPrefs { channel: 0, role: 0 });

    let path = tmp.path().join("Events").join("guild").join("123.json");
    assert!(path.is_file());
    let on_disk: Value =
        serde_json::from_str(&fs::read_to_string(&path).expect("read")).expect("parse");
    assert_eq!(on_disk, json!({"channel": 0, "role": 0}));
}

#[test]
fn set_then_get_returns_the_exact_value_and_persists() {
    let tmp = tempdir().expect("tempdir");
    let config = events_config(tmp.path());

    let mut group = config.guild::<GuildPrefs>(5).expect("bind guild");
    let value = GuildPrefs {
        channel: 777,
        role: 9,
    };
    group.set(value.clone()).expect("write through");
    assert_eq!(group.get(), &value);

    // a fresh bind sees the written value
    let rebound = config.guild::<GuildPrefs>(5).expect("rebind guild");
    assert_eq!(rebound.get(), &value);
}

#[test]
fn equal_set_skips_the_disk_write() {
    let tmp = tempdir().expect("tempdir");
    let config = events_config(tmp.path());

    let mut group = config.guild::<GuildPrefs>(6).expect("bind guild");
    let current = group.get().clone();
    group.set(current).expect("no-op set");

    let set_events = read_events(tmp.path())
        .iter()
        .filter(|ev| ev.op == "group.set")
        .count();
    assert_eq!(set_events, 0);

    group
        .set(GuildPrefs {
            channel: 1,
            role: 1,
        })
        .expect("real set");
    let set_events = read_events(tmp.path())
        .iter()
        .filter(|ev| ev.op == "group.set")
        .count();
    assert_eq!(set_events, 1);
}

#[test]
fn independent_groups_for_one_key_hold_independent_caches() {
    let tmp = tempdir().expect("tempdir");
    let config = events_config(tmp.path());

    let mut first = config.guild::<GuildPrefs>(7).expect("first bind");
    let second = config.guild::<GuildPrefs>(7).expect("second bind");

    first
        .set(GuildPrefs {
            channel: 42,
            role: 0,
        })
        .expect("write through");

    // last-write-wins contract: the second cache does not observe it
    assert_eq!(second.get(), &GuildPrefs { channel: 0, role: 0 });
}

#[test]
fn update_applies_a_read_modify_write() {
    let tmp = tempdir().expect("tempdir");
    let config = events_config(tmp.path());

    let mut group = config.guild::<GuildPrefs>(8).expect("bind guild");
    group.update(|prefs| prefs.channel = 314).expect("update");
    assert_eq!(group.get().channel, 314);

    let rebound = config.guild::<GuildPrefs>(8).expect("rebind");
    assert_eq!(rebound.get().channel, 314);
}

#[test]
fn enumerate_creates_a_missing_directory_and_returns_empty() {
    let tmp = tempdir().expect("tempdir");
    let config = events_config(tmp.path());

    let all = config.all_guilds::<GuildPrefs>().expect("enumerate");
    assert!(all.is_empty());
    assert!(tmp.path().join("Events").join("guild").is_dir());
}

#[test]
fn enumerate_returns_every_existing_document() {
    let tmp = tempdir().expect("tempdir");
    let config = events_config(tmp.path());

    config.guild::<GuildPrefs>(1).expect("bind 1");
    config.guild::<GuildPrefs>(2).expect("bind 2");
    config.guild::<GuildPrefs>(10).expect("bind 10");

    let all = config.all_guilds::<GuildPrefs>().expect("enumerate");
    assert_eq!(all.keys().copied().collect::<Vec<_>>(), vec![1, 2, 10]);
}

#[test]
fn member_enumeration_is_scoped_to_one_guild() {
    let tmp = tempdir().expect("tempdir");
    let mut config = Config::new(Store::new(tmp.path()), "Events").expect("open registry");
    config
        .defaults_member(&Motd {
            text: String::new(),
        })
        .expect("register member default");

    config.member::<Motd>(42, 7).expect("bind 42/7");
    config.member::<Motd>(42, 8).expect("bind 42/8");
    config.member::<Motd>(99, 7).expect("bind 99/7");

    let members = config.all_members::<Motd>(42).expect("enumerate guild 42");
    assert_eq!(members.keys().copied().collect::<Vec<_>>(), vec![7, 8]);
}

#[test]
fn clear_resets_contents_without_changing_the_file_set() {
    let tmp = tempdir().expect("tempdir");
    let config = events_config(tmp.path());

    let mut one = config.guild::<GuildPrefs>(1).expect("bind 1");
    let mut two = config.guild::<GuildPrefs>(2).expect("bind 2");
    one.set(GuildPrefs {
        channel: 11,
        role: 12,
    })
    .expect("set 1");
    two.set(GuildPrefs {
        channel: 21,
        role: 22,
    })
    .expect("set 2");

    config.clear_all_guilds().expect("clear");

    let dir = tmp.path().join("Events").join("guild");
    let mut names: Vec<_> = fs::read_dir(&dir)
        .expect("list")
        .map(|e| e.expect("entry").file_name().into_string().unwrap())
        .collect();
    names.sort();
    assert_eq!(names, vec!["1.json", "2.json"]);

    let rebound = config.guild::<GuildPrefs>(1).expect("rebind");
    assert_eq!(rebound.get(), &GuildPrefs { channel: 0, role: 0 });
}

#[test]
fn clear_all_resets_every_registered_scope() {
    let tmp = tempdir().expect("tempdir");
    let mut config = Config::new(Store::new(tmp.path()), "Events").expect("open registry");
    config
        .defaults_guild(&GuildPrefs {
            channel: 0,
            role: 0,
        })
        .expect("guild default");
    config
        .defaults_member(&Motd {
            text: String::new(),
        })
        .expect("member default");

    let mut guild = config.guild::<GuildPrefs>(1).expect("bind guild");
    guild
        .set(GuildPrefs {
            channel: 5,
            role: 5,
        })
        .expect("set guild");
    let mut member = config.member::<Motd>(42, 7).expect("bind member");
    member
        .set(Motd {
            text: "hi".to_string(),
        })
        .expect("set member");

    config.clear_all().expect("clear all");

    assert_eq!(
        config.guild::<GuildPrefs>(1).expect("rebind guild").get(),
        &GuildPrefs { channel: 0, role: 0 }
    );
    assert_eq!(
        config.member::<Motd>(42, 7).expect("rebind member").get(),
        &Motd { text: String::new() }
    );
}

#[test]
fn malformed_json_is_reported_not_replaced() {
    let tmp = tempdir().expect("tempdir");
    let config = events_config(tmp.path());

    let path = tmp.path().join("Events").join("guild").join("5.json");
    fs::create_dir_all(path.parent().unwrap()).expect("mkdir");
    fs::write(&path, "{not json").expect("plant garbage");

    let err = config.guild::<GuildPrefs>(5).expect_err("must not load");
    assert!(matches!(err, VaultError::MalformedDocument { .. }));

    // the file is left exactly as it was
    assert_eq!(fs::read_to_string(&path).expect("read"), "{not json");
}

#[test]
fn nonconformant_document_fails_and_mutates_nothing() {
    let tmp = tempdir().expect("tempdir");
    let config = events_config(tmp.path());

    let path = tmp.path().join("Events").join("guild").join("5.json");
    fs::create_dir_all(path.parent().unwrap()).expect("mkdir");
    let planted = r#"{"channel": "not a number", "role": 1}"#;
    fs::write(&path, planted).expect("plant nonconformant");

    let err = config.guild::<GuildPrefs>(5).expect_err("must not load");
    assert!(matches!(err, VaultError::SchemaMismatch(_)));
    assert_eq!(fs::read_to_string(&path).expect("read"), planted);
}

#[test]
fn unregistered_scope_kind_is_rejected() {
    let tmp = tempdir().expect("tempdir");
    let config = events_config(tmp.path());

    let err = config.user::<GuildPrefs>(1).expect_err("no user default");
    assert!(matches!(err, VaultError::ValidationError(_)));
}

#[test]
fn mismatched_document_type_is_rejected() {
    let tmp = tempdir().expect("tempdir");
    let config = events_config(tmp.path());

    let err = config.guild::<Motd>(1).expect_err("guild registered as GuildPrefs");
    assert!(matches!(err, VaultError::SchemaMismatch(_)));
}

#[test]
fn global_scope_collapses_to_one_file() {
    let tmp = tempdir().expect("tempdir");
    let mut config = Config::new(Store::new(tmp.path()), "Events").expect("open registry");
    config
        .defaults_global(&Motd {
            text: "welcome".to_string(),
        })
        .expect("register global default");

    let group = config.global::<Motd>().expect("bind global");
    assert_eq!(group.get().text, "welcome");
    assert!(tmp.path().join("Events").join("global.json").is_file());
}

#[test]
fn scope_path_rejects_wrong_arity() {
    let store = Store::new("/vault");
    assert!(scope_path(&store, "Events", ScopeKind::Member, &[42]).is_err());
    assert!(scope_path(&store, "Events", ScopeKind::User, &[1, 2]).is_err());
}

#[test]
fn audit_log_records_loads_and_writes() {
    let tmp = tempdir().expect("tempdir");
    let config = events_config(tmp.path());

    let mut group = config.guild::<GuildPrefs>(9).expect("bind guild");
    group
        .set(GuildPrefs {
            channel: 3,
            role: 4,
        })
        .expect("set");

    let events = read_events(tmp.path());
    assert!(events.iter().any(|ev| ev.op == "group.load"));
    let set_event = events
        .iter()
        .find(|ev| ev.op == "group.set")
        .expect("set event recorded");
    assert_eq!(set_event.status, "success");
    assert!(set_event.content_hash.is_some());
    assert!(set_event.path.ends_with("9.json"));
}
