use std::io::Write;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Duration;
use tempfile::NamedTempFile;
use zonekeeper::ConfigError;
use zonekeeper::config::ApiConfig;
use zonekeeper::service::ReconcileMode;
use zonekeeper::zone::DuplicateHostPolicy;

// Mutex to ensure tests that modify environment variables don't run concurrently
static ENV_MUTEX: Mutex<()> = Mutex::new(());

const VARS: &[&str] = &[
    "ZONEKEEPER_BIND_ADDR",
    "ZONEKEEPER_ZONE_PORT",
    "ZONEKEEPER_LOCK_TIMEOUT",
    "ZONEKEEPER_DUPLICATE_HOSTS",
    "ZONEKEEPER_RECONCILE_ON_STARTUP",
    "ZONEKEEPER_BASE_PATH",
];

fn clear_env() {
    for var in VARS {
        unsafe {
            std::env::remove_var(var);
        }
    }
}

#[test]
fn test_from_env_overrides_defaults() {
    let _guard = ENV_MUTEX.lock().unwrap();
    clear_env();

    unsafe {
        std::env::set_var("ZONEKEEPER_BIND_ADDR", "127.0.0.1:9000");
        std::env::set_var("ZONEKEEPER_ZONE_PORT", "5353");
        std::env::set_var("ZONEKEEPER_LOCK_TIMEOUT", "750ms");
        std::env::set_var("ZONEKEEPER_DUPLICATE_HOSTS", "allow");
        std::env::set_var("ZONEKEEPER_RECONCILE_ON_STARTUP", "repair");
    }

    let config = ApiConfig::from_env();
    clear_env();
    let config = config.unwrap();

    assert_eq!(
        config.bind_addr,
        "127.0.0.1:9000".parse::<SocketAddr>().unwrap()
    );
    assert_eq!(config.zone_port, 5353);
    assert_eq!(config.lock_timeout, Duration::from_millis(750));
    assert_eq!(config.duplicate_hosts, DuplicateHostPolicy::Allow);
    assert_eq!(config.reconcile_on_startup, Some(ReconcileMode::Repair));
}

#[test]
fn test_from_env_rejects_bad_values() {
    let _guard = ENV_MUTEX.lock().unwrap();
    clear_env();

    unsafe {
        std::env::set_var("ZONEKEEPER_ZONE_PORT", "not-a-port");
    }
    let result = ApiConfig::from_env();
    clear_env();
    assert!(matches!(result, Err(ConfigError::InvalidPort(_))));

    unsafe {
        std::env::set_var("ZONEKEEPER_BASE_PATH", "no-leading-slash");
    }
    let result = ApiConfig::from_env();
    clear_env();
    assert!(matches!(result, Err(ConfigError::InvalidBasePath(_))));
}

#[test]
fn test_load_file_then_env() {
    let _guard = ENV_MUTEX.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
bind_addr = "127.0.0.1:8000"
zone_port = 2053
base_path = "/zones"

[soa]
rname = "hostmaster.example.org"
"#
    )
    .unwrap();

    unsafe {
        std::env::set_var("ZONEKEEPER_ZONE_PORT", "3053");
    }
    let config = ApiConfig::load(Some(file.path()));
    clear_env();
    let config = config.unwrap();

    assert_eq!(config.bind_addr.port(), 8000);
    assert_eq!(config.base_path, "/zones");
    // Environment wins over the file
    assert_eq!(config.zone_port, 3053);
    assert_eq!(config.soa_defaults.rname, "hostmaster.example.org");
}

#[test]
fn test_load_missing_or_invalid_file() {
    let _guard = ENV_MUTEX.lock().unwrap();
    clear_env();

    let missing = std::path::Path::new("/nonexistent/zonekeeper.toml");
    assert!(matches!(
        ApiConfig::load(Some(missing)),
        Err(ConfigError::Io(_))
    ));

    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "zone_port = [").unwrap();
    assert!(matches!(
        ApiConfig::load(Some(file.path())),
        Err(ConfigError::ParseError(_))
    ));
}

#[test]
fn test_load_rejects_unusable_soa_defaults() {
    let _guard = ENV_MUTEX.lock().unwrap();
    clear_env();

    for soa in [r#"mname = "ns1 example.com""#, r#"mname = """#] {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[soa]\n{}", soa).unwrap();
        assert!(
            matches!(
                ApiConfig::load(Some(file.path())),
                Err(ConfigError::InvalidValue { .. })
            ),
            "{} should be rejected",
            soa
        );
    }

    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "[soa]\nrname = \"hostmaster@example.org\"").unwrap();
    let config = ApiConfig::load(Some(file.path())).unwrap();
    assert_eq!(config.soa_defaults.rname, "hostmaster.example.org");
}
