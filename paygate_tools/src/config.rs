use std::time::Duration;

use lms_common::Secret;
use log::*;

pub const DEFAULT_PAYGATE_BASE_URL: &str = "https://accept.paymob.com";
pub const DEFAULT_PAYGATE_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_PAYGATE_MAX_RETRIES: u32 = 3;
/// How long a payment key stays valid, in seconds.
pub const PAYMENT_KEY_EXPIRY: u64 = 3600;

#[derive(Debug, Clone)]
pub struct PaygateConfig {
    pub base_url: String,
    pub api_key: Secret<String>,
    pub integration_id: u64,
    pub iframe_id: u64,
    pub hmac_secret: Secret<String>,
    pub timeout: Duration,
    /// Total attempts per call, including the first.
    pub max_retries: u32,
}

impl Default for PaygateConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_PAYGATE_BASE_URL.to_string(),
            api_key: Secret::default(),
            integration_id: 0,
            iframe_id: 0,
            hmac_secret: Secret::default(),
            timeout: DEFAULT_PAYGATE_TIMEOUT,
            max_retries: DEFAULT_PAYGATE_MAX_RETRIES,
        }
    }
}

impl PaygateConfig {
    pub fn new_from_env_or_default() -> Self {
        let base_url = std::env::var("LMS_PAYGATE_BASE_URL").unwrap_or_else(|_| {
            info!("🪛️ LMS_PAYGATE_BASE_URL not set, using {DEFAULT_PAYGATE_BASE_URL}");
            DEFAULT_PAYGATE_BASE_URL.to_string()
        });
        let base_url = base_url.trim_end_matches('/').to_string();
        let api_key = Secret::new(std::env::var("LMS_PAYGATE_API_KEY").unwrap_or_else(|_| {
            warn!("🪛️ LMS_PAYGATE_API_KEY not set. Payment sessions cannot be created.");
            String::default()
        }));
        let integration_id = parse_id("LMS_PAYGATE_INTEGRATION_ID");
        let iframe_id = parse_id("LMS_PAYGATE_IFRAME_ID");
        let hmac_secret = Secret::new(std::env::var("LMS_PAYGATE_HMAC_SECRET").unwrap_or_else(|_| {
            warn!(
                "🪛️ LMS_PAYGATE_HMAC_SECRET not set. Gateway signals will be ACCEPTED WITHOUT VERIFICATION. Do not run \
                 like this in production."
            );
            String::default()
        }));
        let timeout = std::env::var("LMS_PAYGATE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| {
                s.parse::<u64>()
                    .map_err(|e| warn!("🪛️ Invalid LMS_PAYGATE_TIMEOUT_SECS ({s}): {e}. Using the default."))
                    .ok()
            })
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_PAYGATE_TIMEOUT);
        let max_retries = std::env::var("LMS_PAYGATE_MAX_RETRIES")
            .ok()
            .and_then(|s| {
                s.parse::<u32>()
                    .map_err(|e| warn!("🪛️ Invalid LMS_PAYGATE_MAX_RETRIES ({s}): {e}. Using the default."))
                    .ok()
            })
            .unwrap_or(DEFAULT_PAYGATE_MAX_RETRIES)
            .max(1);
        Self { base_url, api_key, integration_id, iframe_id, hmac_secret, timeout, max_retries }
    }
}

fn parse_id(var: &str) -> u64 {
    match std::env::var(var) {
        Ok(s) => s.parse::<u64>().unwrap_or_else(|e| {
            error!("🪛️ {var} is not a valid id ({s}): {e}. Payment sessions will be rejected by the gateway.");
            0
        }),
        Err(_) => {
            warn!("🪛️ {var} not set. Payment sessions will be rejected by the gateway.");
            0
        },
    }
}
