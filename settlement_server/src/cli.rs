use std::{env, env::VarError};

/// There's no real CLI for the server, so just do quick 'n dirty
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        // Any argument at all prints the help
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // Secrets (API key, HMAC secret) are deliberately absent from this list
    const DISPLAY_ENVS: [&str; 18] = [
        "RUST_LOG",
        "LMS_HOST",
        "LMS_PORT",
        "LMS_DATABASE_URL",
        "LMS_CURRENCY",
        "LMS_REDIRECT_GRACE_MS",
        "LMS_RECONCILE_INTERVAL_SECS",
        "LMS_STALE_PENDING_MINS",
        "LMS_RECEIPT_WEBHOOK_URL",
        "LMS_PAYGATE_IP_WHITELIST",
        "LMS_USE_X_FORWARDED_FOR",
        "LMS_USE_FORWARDED",
        "LMS_PAYGATE_RAW_BODY_HMAC",
        "LMS_PAYGATE_BASE_URL",
        "LMS_PAYGATE_INTEGRATION_ID",
        "LMS_PAYGATE_IFRAME_ID",
        "LMS_PAYGATE_TIMEOUT_SECS",
        "LMS_PAYGATE_MAX_RETRIES",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}
