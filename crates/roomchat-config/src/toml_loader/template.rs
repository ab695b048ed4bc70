//! Default TOML config template with inline documentation comments.

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> String {
    r##"# roomchat configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.

[server]
# api_base_url = "http://localhost:8080/api/v1/rooms"
# ws_url = "ws://localhost:8080/api/v1/ws"
# request_timeout_secs = 15     # 1-120
# connect_timeout_secs = 10     # 1-60

[connection]
# handshake_timeout_secs = 10   # 1-120
# reconnect_base_delay_ms = 1000  # 50-60000
# reconnect_max_delay_ms = 30000  # >= base, <= 600000
# max_reconnect_attempts = 5    # 0-50

[history]
# page_size = 50                # 1-200

[identity]
# user_id = ""
# user_name = ""
# token_env = "ROOMCHAT_TOKEN"

[logging]
# level = "info"                # trace, debug, info, warn, error
"##
    .to_string()
}
