//! Default configuration values

/// Default configuration file name (TOML)
pub const DEFAULT_CONFIG_TOML: &str = "storyreel.toml";

/// Default configuration file name (YAML)
pub const DEFAULT_CONFIG_YAML: &str = "storyreel.yaml";

/// Get list of config file names to search for
pub fn config_file_names() -> Vec<&'static str> {
    vec![
        DEFAULT_CONFIG_TOML,
        DEFAULT_CONFIG_YAML,
        ".storyreel.toml",
        ".storyreel.yaml",
    ]
}

/// Default configuration template written by `storyreel init`
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# Storyreel configuration
# See https://github.com/example/storyreel for documentation

[scheduler]
max_concurrent_tasks = 3
poll_interval_secs = 1
max_attempts = 3
backoff_base_secs = 30
backoff_cap_secs = 600
lease_duration_secs = 60
on_branch_failure = "fail-fast"
default_scenes = 4

[stages]
default_timeout_secs = 3600

[stages.timeout_secs]
# synth-clip = 7200

[paths]
data_dir = ".storyreel/state"
output_dir = "output"
work_dir = ".storyreel/work"
"#;
