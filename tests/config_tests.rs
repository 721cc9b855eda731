use qrshare::config::{Config, DEFAULT_MAX_UPLOAD_SIZE};
use std::env;
use std::net::IpAddr;
use std::time::Duration;

// helper to clear env vars
fn clear_env() {
    env::remove_var("BIND_HOST");
    env::remove_var("PORT");
    env::remove_var("UPLOAD_DIR");
    env::remove_var("MAX_UPLOAD_SIZE");
    env::remove_var("WORKER_THREADS");
    env::remove_var("ADVERTISE_HOST");
    env::remove_var("SHUTDOWN_TIMEOUT_SECS");
}

#[test]
fn test_config_behavior() {
    // Run these sequentially to avoid race conditions with environment variables

    // 1. Test Defaults
    clear_env();

    let config = Config::from_env();

    assert_eq!(config.bind_host, "0.0.0.0".parse::<IpAddr>().unwrap());
    assert_eq!(config.port, 1082);
    assert_eq!(config.upload_dir.to_str().unwrap(), ".");
    assert_eq!(config.max_upload_size, DEFAULT_MAX_UPLOAD_SIZE);
    assert_eq!(config.max_upload_size, 100 * 1024 * 1024);
    assert_eq!(config.worker_threads, 4);
    assert_eq!(config.advertise_host, None);
    assert_eq!(config.shutdown_timeout, Duration::from_secs(5));

    // 2. Test From Env
    clear_env();

    env::set_var("BIND_HOST", "127.0.0.1");
    env::set_var("PORT", "9090");
    env::set_var("UPLOAD_DIR", "/tmp/uploads");
    env::set_var("MAX_UPLOAD_SIZE", "1024");
    env::set_var("ADVERTISE_HOST", "files.lan");
    env::set_var("SHUTDOWN_TIMEOUT_SECS", "1");

    let config = Config::from_env();

    assert_eq!(config.bind_host, "127.0.0.1".parse::<IpAddr>().unwrap());
    assert_eq!(config.port, 9090);
    assert_eq!(config.upload_dir.to_str().unwrap(), "/tmp/uploads");
    assert_eq!(config.max_upload_size, 1024);
    assert_eq!(config.advertise_host.as_deref(), Some("files.lan"));
    assert_eq!(config.shutdown_timeout, Duration::from_secs(1));

    // 3. Garbage falls back to defaults
    clear_env();

    env::set_var("BIND_HOST", "not-an-ip");
    env::set_var("PORT", "port");
    env::set_var("WORKER_THREADS", "0");
    env::set_var("ADVERTISE_HOST", "   ");

    let config = Config::from_env();

    assert_eq!(config.bind_host, "0.0.0.0".parse::<IpAddr>().unwrap());
    assert_eq!(config.port, 1082);
    assert_eq!(config.worker_threads, 4);
    assert_eq!(config.advertise_host, None);

    // Cleanup
    clear_env();
}
