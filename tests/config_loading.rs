use crossbind::{Bridge, BridgeConfig};
use std::fs;
use tempfile::TempDir;

#[test]
fn test_load_from_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(".crossbindrc");
    fs::write(&path, "[conversion]\nmax_depth = 3\n\n[logging]\nlevel = \"debug\"\n").unwrap();

    let config = BridgeConfig::load(&path).unwrap();
    assert_eq!(config.conversion.max_depth, 3);
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.registry, BridgeConfig::default().registry);
}

#[test]
fn test_load_reports_missing_file() {
    let dir = TempDir::new().unwrap();
    let err = BridgeConfig::load(&dir.path().join("absent.toml")).unwrap_err();
    assert!(err.starts_with("Failed to read config"));
}

#[test]
fn test_discover_walks_up_to_parent() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join(".crossbindrc.toml"), "[host]\nmax_call_depth = 12\n").unwrap();
    let nested = dir.path().join("a").join("b");
    fs::create_dir_all(&nested).unwrap();

    let config = BridgeConfig::discover_from(&nested);
    assert_eq!(config.host.max_call_depth, 12);
}

#[test]
fn test_discover_skips_unparseable_file() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join(".crossbindrc"), "this is not toml [").unwrap();
    fs::write(dir.path().join(".crossbindrc.toml"), "[guest]\nmax_call_depth = 7\n").unwrap();

    assert_eq!(BridgeConfig::discover_from(dir.path()).guest.max_call_depth, 7);
}

#[test]
fn test_save_then_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("saved.toml");
    let mut config = BridgeConfig::default();
    config.registry.sweep_threshold = 4;
    config.logging.json = true;

    config.save(&path).unwrap();
    assert_eq!(BridgeConfig::load(&path).unwrap(), config);
}

#[test]
fn test_bridge_applies_loaded_limits() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(".crossbindrc");
    fs::write(&path, "[conversion]\nmax_depth = 2\n").unwrap();
    let config = BridgeConfig::load(&path).unwrap();

    let bridge = Bridge::new(config);
    assert_eq!(bridge.config().conversion.max_depth, 2);
    let err = bridge
        .run_host(r#"$f = embed_guest_func("def f(x): return x"); $f([[[1]]]);"#)
        .unwrap_err();
    assert_eq!(err.class_name(), "BridgeException");
}
