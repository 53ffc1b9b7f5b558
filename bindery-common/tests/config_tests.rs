//! Configuration file resolution and store root priority
//!
//! Uses serial_test: these tests manipulate BINDERY_CONFIG and
//! BINDERY_STORE_ROOT and must not run in parallel.

use bindery_common::config::{resolve_config_path, ConfigSource, CONFIG_ENV_VAR, STORE_ROOT_ENV_VAR};
use bindery_common::TomlConfig;
use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};

#[test]
#[serial]
fn test_cli_path_beats_environment() {
    env::set_var(CONFIG_ENV_VAR, "/from/env.toml");

    let source = resolve_config_path(Some(Path::new("/from/cli.toml")), CONFIG_ENV_VAR);
    assert_eq!(source, ConfigSource::Explicit(PathBuf::from("/from/cli.toml")));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_environment_path_used_without_cli() {
    env::set_var(CONFIG_ENV_VAR, "/from/env.toml");

    let source = resolve_config_path(None, CONFIG_ENV_VAR);
    assert_eq!(source, ConfigSource::Explicit(PathBuf::from("/from/env.toml")));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_explicit_missing_file_is_error() {
    env::remove_var(CONFIG_ENV_VAR);
    let temp_dir = tempfile::tempdir().unwrap();
    let missing = temp_dir.path().join("nope.toml");

    assert!(TomlConfig::resolve(Some(&missing)).is_err());
}

#[test]
#[serial]
fn test_explicit_file_is_loaded() {
    env::remove_var(CONFIG_ENV_VAR);
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(
        &path,
        "store_root = \"/srv/bindery\"\n[logging]\nlevel = \"debug\"\n",
    )
    .unwrap();

    let config = TomlConfig::resolve(Some(&path)).unwrap();
    assert_eq!(config.store_root, Some(PathBuf::from("/srv/bindery")));
    assert_eq!(config.logging.level, "debug");
}

#[test]
#[serial]
fn test_store_root_priority() {
    let config = TomlConfig {
        store_root: Some(PathBuf::from("/from/toml")),
        ..TomlConfig::default()
    };

    env::set_var(STORE_ROOT_ENV_VAR, "/from/env");
    assert_eq!(
        config.resolve_store_root(Some(Path::new("/from/cli"))),
        PathBuf::from("/from/cli")
    );
    assert_eq!(config.resolve_store_root(None), PathBuf::from("/from/env"));

    env::remove_var(STORE_ROOT_ENV_VAR);
    assert_eq!(config.resolve_store_root(None), PathBuf::from("/from/toml"));

    let bare = TomlConfig::default();
    assert!(!bare.resolve_store_root(None).as_os_str().is_empty());
}
