use std::env;
use std::sync::{Mutex, OnceLock};

use reimburse_cli::commands::{config, migrate, rules, seed};
use serde_json::Value;

#[test]
fn migrate_returns_success_with_valid_env() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = database_url(&dir, "migrate.db");

    with_env(&[("REIMBURSE_DATABASE_URL", &url)], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_on_bad_override() {
    with_env(&[("REIMBURSE_SERVER_PORT", "not-a-port")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_loads_and_verifies_demo_organisation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = database_url(&dir, "seed.db");

    with_env(&[("REIMBURSE_DATABASE_URL", &url)], || {
        let result = seed::run();
        assert_eq!(result.exit_code, 0, "expected seed success: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["status"], "ok");
        let message = payload["message"].as_str().expect("message should be a string");
        assert!(message.contains("companies [acme, globex]"));
        assert!(message.contains("3 policy rules"));
    });
}

#[test]
fn seed_is_idempotent_across_runs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = database_url(&dir, "seed-twice.db");

    with_env(&[("REIMBURSE_DATABASE_URL", &url)], || {
        let first = seed::run();
        let second = seed::run();

        assert_eq!(first.exit_code, 0);
        assert_eq!(second.exit_code, 0);
        assert_eq!(first.output, second.output);
    });
}

#[test]
fn rules_for_unknown_company_reports_not_found() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = database_url(&dir, "rules-missing.db");

    with_env(&[("REIMBURSE_DATABASE_URL", &url)], || {
        let result = rules::run("initech");
        assert_eq!(result.exit_code, 7);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "rules");
        assert_eq!(payload["error_class"], "not_found");
    });
}

#[test]
fn rules_lists_seeded_policy_in_flow_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = database_url(&dir, "rules.db");

    with_env(&[("REIMBURSE_DATABASE_URL", &url)], || {
        assert_eq!(seed::run().exit_code, 0);

        let result = rules::run("acme");
        assert_eq!(result.exit_code, 0, "expected rules listing: {}", result.output);

        let payload = parse_payload(&result.output);
        let message = payload["message"].as_str().expect("message should be a string");
        let finance = message.find("finance-review").expect("finance rule listed");
        let cfo = message.find("cfo-signoff").expect("cfo rule listed");
        assert!(finance < cfo, "rules should be listed by sequence: {message}");
        assert!(message.contains("(percentage, 3 approvers, 2 required)"));
        assert!(message.contains("designated acme-cfo"));
    });
}

#[test]
fn config_attributes_env_sources_and_redacts_api_key() {
    with_env(
        &[
            ("REIMBURSE_DATABASE_URL", "sqlite://from-env.db"),
            ("REIMBURSE_CURRENCY_API_KEY", "rates-secret-value"),
        ],
        || {
            let output = config::run();

            assert!(output
                .contains("- database.url = sqlite://from-env.db (source: env (REIMBURSE_DATABASE_URL))"));
            assert!(output.contains("- currency.api_key = ***alue"));
            assert!(!output.contains("rates-secret-value"));
            assert!(output.contains("- server.port = 8080 (source: default)"));
        },
    );
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn database_url(dir: &tempfile::TempDir, file: &str) -> String {
    format!("sqlite://{}", dir.path().join(file).display())
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "REIMBURSE_DATABASE_URL",
        "REIMBURSE_DATABASE_MAX_CONNECTIONS",
        "REIMBURSE_DATABASE_TIMEOUT_SECS",
        "REIMBURSE_SERVER_BIND_ADDRESS",
        "REIMBURSE_SERVER_PORT",
        "REIMBURSE_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "REIMBURSE_CURRENCY_ENABLED",
        "REIMBURSE_CURRENCY_BASE_URL",
        "REIMBURSE_CURRENCY_API_KEY",
        "REIMBURSE_CURRENCY_TIMEOUT_MS",
        "REIMBURSE_WORKFLOW_ENFORCE_APPROVER_ELIGIBILITY",
        "REIMBURSE_LOGGING_LEVEL",
        "REIMBURSE_LOGGING_FORMAT",
        "REIMBURSE_LOG_LEVEL",
        "REIMBURSE_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
