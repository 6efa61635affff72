use std::{
    env,
    ffi::{OsStr, OsString},
    fs,
    path::Path,
    sync::{Mutex, OnceLock},
};

use statscollector_app::config::{self, AppConfigError, ArchiveBackend};
use tempfile::TempDir;

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

fn env_guard() -> std::sync::MutexGuard<'static, ()> {
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .expect("config env mutex poisoned")
}

fn snapshot_env(vars: &[&'static str]) -> Vec<(&'static str, Option<OsString>)> {
    vars.iter().map(|&name| (name, env::var_os(name))).collect()
}

fn restore_env(vars: Vec<(&'static str, Option<OsString>)>) {
    for (name, value) in vars {
        match value {
            Some(val) => set_var(name, val),
            None => remove_var(name),
        }
    }
}

fn set_var(name: &str, value: impl AsRef<OsStr>) {
    unsafe { env::set_var(name, value) }
}

fn remove_var(name: &str) {
    unsafe { env::remove_var(name) }
}

fn write_solr_url(path: &Path, url: &str) {
    fs::write(path, format!("[solr]\nurl = \"{url}\"\n")).expect("write config file");
}

const TRACKED: [&str; 5] = [
    "STATSCOLLECTOR_CONFIG_FILE",
    "STATSCOLLECTOR__SOLR__URL",
    "STATSCOLLECTOR__ARCHIVE__KEEP_LAST",
    "STATSCOLLECTOR__ARCHIVE__BACKEND",
    "STATSCOLLECTOR__GRAYLOG__CONTAINER_NAMES",
];

#[test]
fn config_precedence_follows_documented_order() {
    let _guard = env_guard();
    let env_snapshot = snapshot_env(&TRACKED);
    for name in TRACKED {
        remove_var(name);
    }
    let original_dir = env::current_dir().expect("capture current dir");

    let workspace = TempDir::new().expect("temp workspace");
    let workspace_path = workspace.path();
    let local_config_dir = workspace_path.join("config");
    let override_path = workspace_path.join("override.toml");
    let env_file_path = workspace_path.join("env-named.toml");
    fs::create_dir_all(&local_config_dir).expect("create local config dir");
    env::set_current_dir(workspace_path).expect("change to workspace");

    let defaults = config::load().expect("defaults load");
    assert_eq!(defaults.solr.url, "http://localhost:9983/solr/collection1/");

    let local_path = local_config_dir.join("settings.toml");
    write_solr_url(&local_path, "http://local:8983/solr/c/");
    write_solr_url(&override_path, "http://override:8983/solr/c/");
    write_solr_url(&env_file_path, "http://env-file:8983/solr/c/");

    let local = config::load().expect("load local config");
    assert_eq!(local.solr.url, "http://local:8983/solr/c/");

    set_var("STATSCOLLECTOR_CONFIG_FILE", &env_file_path);
    let env_named = config::load().expect("load env-named file");
    assert_eq!(env_named.solr.url, "http://env-file:8983/solr/c/");

    let explicit = config::load_from(Some(&override_path)).expect("load explicit file");
    assert_eq!(explicit.solr.url, "http://override:8983/solr/c/");

    set_var("STATSCOLLECTOR__SOLR__URL", "http://env:8983/solr/c/");
    let from_env = config::load_from(Some(&override_path)).expect("load env override");
    assert_eq!(from_env.solr.url, "http://env:8983/solr/c/");

    env::set_current_dir(&original_dir).expect("restore current dir");
    restore_env(env_snapshot);
}

#[test]
fn env_values_are_typed_and_lists_split() {
    let _guard = env_guard();
    let env_snapshot = snapshot_env(&TRACKED);
    for name in TRACKED {
        remove_var(name);
    }

    set_var("STATSCOLLECTOR__ARCHIVE__KEEP_LAST", "3");
    set_var("STATSCOLLECTOR__ARCHIVE__BACKEND", "fs");
    set_var("STATSCOLLECTOR__GRAYLOG__CONTAINER_NAMES", "neo4j,rabbitmq");
    let cfg = config::load().expect("load typed env");

    assert_eq!(cfg.archive.keep_last, 3);
    assert_eq!(cfg.archive.backend, ArchiveBackend::Fs);
    assert_eq!(
        cfg.graylog.container_names,
        vec!["neo4j".to_string(), "rabbitmq".to_string()]
    );

    restore_env(env_snapshot);
}

#[test]
fn missing_explicit_file_is_an_error() {
    let _guard = env_guard();
    let workspace = TempDir::new().expect("temp workspace");
    let err = config::load_from(Some(&workspace.path().join("absent.toml")))
        .expect_err("missing explicit file");
    assert!(matches!(err, AppConfigError::MissingFile { .. }));
}
