//! Default configuration values
//!
//! These are embedded in the binary and used when no config file exists.

/// Default configuration as TOML (for reference/documentation)
pub const DEFAULT_CONFIG_TOML: &str = r##"
# simbox configuration

[remote]
api_base_url = "http://localhost:8080"
namespace = "default"
request_timeout_secs = 30

[workspace]
workdir = "/home/project"
bootstrap_command = "cd project\n"

[sync]
interval_secs = 5
max_retries = 3

[terminal]
subprotocol = "tty"
columns = 80
rows = 40
exec_timeout_secs = 60

[domains]
retry_interval_secs = 3
# max_attempts = 10
"##;
