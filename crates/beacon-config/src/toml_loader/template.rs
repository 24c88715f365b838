//! Default TOML config template with inline documentation comments.

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> String {
    r##"# Beacon realtime configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.

[subscriptions]
# enabled = true
# auto_subscribe = true     # subscribe on mount, resubscribe on reconnect

[presence]
# poll_interval_ms = 5000   # 250-60000
# default_name = "Anonymous User"
# default_status = "online"

[tasks]
# channel_prefix = "organization"
# domains = ["import"]

[logging]
# level = "info"            # trace, debug, info, warn, error
"##
    .to_string()
}
