use cinder::config::{Config, MIN_BUFFER_SIZE};
use cinder::http::alias::AliasKind;

#[test]
fn test_config_default_address() {
    // When LISTEN env var is not set, should use default
    unsafe {
        std::env::remove_var("LISTEN");
        std::env::remove_var("CINDER_CONFIG");
    }
    let cfg = Config::load().unwrap();
    assert_eq!(cfg.listen_addr, "127.0.0.1:8080");
}

#[test]
fn test_config_defaults() {
    let cfg = Config::default();
    assert_eq!(cfg.keep_alive.timeout, 10);
    assert_eq!(cfg.keep_alive.max, 1000);
    assert_eq!(cfg.directory_index, "index.html");
    assert!(cfg.server_name.starts_with("Cinder/"));
    cfg.validate().unwrap();
}

#[test]
fn test_config_from_yaml() {
    let cfg = Config::from_yaml(
        r#"
listen_addr: "0.0.0.0:3000"
document_root: /srv/www
keep_alive:
  timeout: 5
max_connections: 16
aliases:
  - kind: script_alias
    from: /cgi-bin/
    to: /usr/lib/cgi-bin/
  - kind: redirect
    from: /old/
    to: http://example.com/new/
mime_types:
  md: text/markdown
"#,
    )
    .unwrap();

    assert_eq!(cfg.listen_addr, "0.0.0.0:3000");
    assert_eq!(cfg.keep_alive.timeout, 5);
    assert_eq!(cfg.keep_alive.max, 1000);
    assert_eq!(cfg.max_connections, 16);
    assert_eq!(cfg.aliases.len(), 2);
    assert_eq!(cfg.aliases[0].kind, AliasKind::ScriptAlias);
    assert_eq!(cfg.mime_types.get("md").map(String::as_str), Some("text/markdown"));
}

#[test]
fn test_config_rejects_small_buffer() {
    let err = Config::from_yaml(&format!("buffer_size: {}", MIN_BUFFER_SIZE - 1)).unwrap_err();
    assert!(err.to_string().contains("buffer_size"));
}

#[test]
fn test_config_rejects_empty_pool() {
    assert!(Config::from_yaml("max_connections: 0").is_err());
}

#[test]
fn test_config_rejects_bad_redirect_target() {
    let yaml = "aliases:\n  - kind: redirect\n    from: /old/\n    to: not a url\n";
    assert!(Config::from_yaml(yaml).is_err());

    let yaml = "aliases:\n  - kind: alias\n    from: icons/\n    to: /usr/share/icons/\n";
    assert!(Config::from_yaml(yaml).is_err());
}

#[test]
fn test_config_rejects_multiline_server_name() {
    assert!(Config::from_yaml("server_name: \"a\\r\\nX-Injected: 1\"").is_err());
}

#[test]
fn test_config_clone() {
    let cfg1 = Config::default();
    let cfg2 = cfg1.clone();
    assert_eq!(cfg1.listen_addr, cfg2.listen_addr);
}

#[test]
fn test_config_from_missing_file() {
    let err = Config::from_file("/nonexistent/cinder.yaml").unwrap_err();
    assert!(format!("{err:#}").contains("reading config file"));
}
