use std::{env, net::IpAddr, str::FromStr, time::Duration};

use lms_common::DEFAULT_CURRENCY_CODE;
use log::*;
use paygate_tools::PaygateConfig;
use settlement_engine::settlement_objects::{SettlementOptions, DEFAULT_REDIRECT_GRACE, DEFAULT_STALE_PENDING_AGE};

const DEFAULT_LMS_HOST: &str = "127.0.0.1";
const DEFAULT_LMS_PORT: u16 = 8460;
const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub currency: String,
    /// How long the redirect handler waits for the webhook before asking the gateway.
    pub redirect_grace: Duration,
    /// Time between reconciliation passes. `None` disables the worker.
    pub reconcile_interval: Option<Duration>,
    /// Pending orders older than this are inquired about during reconciliation.
    pub stale_pending_age: Duration,
    /// Receipts are POSTed here. If `None`, they are only logged.
    pub receipt_webhook_url: Option<String>,
    /// If supplied, requests against /paygate endpoints are checked against this list of gateway IP addresses.
    /// To explicitly disable the whitelist, set LMS_PAYGATE_IP_WHITELIST to "false", "none", or "0".
    pub paygate_whitelist: Option<Vec<IpAddr>>,
    /// If true, the X-Forwarded-For header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_x_forwarded_for: bool,
    /// If true, the Forwarded header will be used to determine the client's IP address.
    pub use_forwarded: bool,
    /// If true, webhook bodies must carry a valid `X-Paygate-Hmac-Sha256` header.
    pub raw_body_hmac: bool,
    pub paygate: PaygateConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_LMS_HOST.to_string(),
            port: DEFAULT_LMS_PORT,
            database_url: String::default(),
            currency: DEFAULT_CURRENCY_CODE.to_string(),
            redirect_grace: DEFAULT_REDIRECT_GRACE,
            reconcile_interval: Some(DEFAULT_RECONCILE_INTERVAL),
            stale_pending_age: DEFAULT_STALE_PENDING_AGE,
            receipt_webhook_url: None,
            paygate_whitelist: None,
            use_x_forwarded_for: false,
            use_forwarded: false,
            raw_body_hmac: false,
            paygate: PaygateConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("LMS_HOST").ok().unwrap_or_else(|| DEFAULT_LMS_HOST.into());
        let port = env::var("LMS_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for LMS_PORT. {e} Using the default, {DEFAULT_LMS_PORT}, instead."
                    );
                    DEFAULT_LMS_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_LMS_PORT);
        let database_url = env::var("LMS_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ LMS_DATABASE_URL is not set. Please set it to the URL for the settlement database.");
            String::default()
        });
        let currency = env::var("LMS_CURRENCY").map(|s| s.trim().to_uppercase()).unwrap_or_else(|_| {
            info!("🪛️ LMS_CURRENCY is not set. Using {DEFAULT_CURRENCY_CODE}.");
            DEFAULT_CURRENCY_CODE.to_string()
        });
        let redirect_grace =
            parse_env::<u64>("LMS_REDIRECT_GRACE_MS").map(Duration::from_millis).unwrap_or(DEFAULT_REDIRECT_GRACE);
        let reconcile_interval = match parse_env::<u64>("LMS_RECONCILE_INTERVAL_SECS") {
            Some(0) => {
                warn!("🪛️ The reconciliation worker is disabled. Stuck orders will not be repaired automatically.");
                None
            },
            Some(secs) => Some(Duration::from_secs(secs)),
            None => Some(DEFAULT_RECONCILE_INTERVAL),
        };
        let stale_pending_age = parse_env::<u64>("LMS_STALE_PENDING_MINS")
            .map(|m| Duration::from_secs(m * 60))
            .unwrap_or(DEFAULT_STALE_PENDING_AGE);
        let receipt_webhook_url = env::var("LMS_RECEIPT_WEBHOOK_URL").ok().filter(|s| !s.trim().is_empty());
        if receipt_webhook_url.is_none() {
            info!("🪛️ LMS_RECEIPT_WEBHOOK_URL is not set. Receipts will be logged, not delivered.");
        }
        let paygate_whitelist = configure_whitelist();
        let use_x_forwarded_for = is_true("LMS_USE_X_FORWARDED_FOR", false);
        let use_forwarded = is_true("LMS_USE_FORWARDED", false);
        let raw_body_hmac = is_true("LMS_PAYGATE_RAW_BODY_HMAC", false);
        let paygate = PaygateConfig::new_from_env_or_default();
        Self {
            host,
            port,
            database_url,
            currency,
            redirect_grace,
            reconcile_interval,
            stale_pending_age,
            receipt_webhook_url,
            paygate_whitelist,
            use_x_forwarded_for,
            use_forwarded,
            raw_body_hmac,
            paygate,
        }
    }

    pub fn settlement_options(&self) -> SettlementOptions {
        SettlementOptions {
            currency: self.currency.clone(),
            redirect_grace: self.redirect_grace,
            stale_pending_age: self.stale_pending_age,
            redirect_url: None,
        }
    }
}

fn is_true(var: &str, default: bool) -> bool {
    env::var(var).map(|s| &s == "1" || s.eq_ignore_ascii_case("true")).unwrap_or(default)
}

fn parse_env<T: FromStr>(var: &str) -> Option<T>
where T::Err: std::fmt::Display {
    let s = env::var(var).ok()?;
    s.trim()
        .parse::<T>()
        .map_err(|e| warn!("🪛️ Invalid configuration value for {var} ({s}). {e}. Using the default."))
        .ok()
}

fn configure_whitelist() -> Option<Vec<IpAddr>> {
    let whitelist = env::var("LMS_PAYGATE_IP_WHITELIST").ok().and_then(|s| parse_whitelist(&s));
    match &whitelist {
        Some(whitelist) if whitelist.is_empty() => {
            warn!(
                "🚨️ The gateway IP whitelist was configured, but is empty. The server will run, but won't authorise any \
                 incoming gateway requests."
            );
        },
        None => {
            info!("🪛️ No gateway IP whitelist is set. Only MAC validation will be used.");
        },
        Some(v) => {
            let addrs = v.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(", ");
            info!("🪛️ Gateway IP whitelist: {addrs}");
        },
    }
    whitelist
}

pub fn parse_whitelist(s: &str) -> Option<Vec<IpAddr>> {
    if ["none", "false", "0"].contains(&s.trim().to_lowercase().as_str()) {
        info!(
            "🪛️ Gateway IP whitelist is disabled. If this is not what you want, set LMS_PAYGATE_IP_WHITELIST to a \
             comma-separated list of IP addresses to enable it."
        );
        return None;
    }
    let ip_addrs = s
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| {
            s.parse()
                .map_err(|e| warn!("🪛️ Ignoring invalid IP address ({s}) in LMS_PAYGATE_IP_WHITELIST: {e}"))
                .ok()
        })
        .collect::<Vec<IpAddr>>();
    Some(ip_addrs)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn whitelist_parsing() {
        assert!(parse_whitelist("none").is_none());
        assert!(parse_whitelist("FALSE").is_none());
        let list = parse_whitelist("10.0.0.1, not-an-ip,::1").unwrap();
        assert_eq!(list, vec!["10.0.0.1".parse::<IpAddr>().unwrap(), "::1".parse::<IpAddr>().unwrap()]);
        assert_eq!(parse_whitelist(""), Some(vec![]));
    }

    #[test]
    fn settlement_options_follow_the_config() {
        let config = ServerConfig { currency: "USD".into(), redirect_grace: Duration::from_millis(500), ..Default::default() };
        let options = config.settlement_options();
        assert_eq!(options.currency, "USD");
        assert_eq!(options.redirect_grace, Duration::from_millis(500));
        assert_eq!(options.stale_pending_age, DEFAULT_STALE_PENDING_AGE);
    }
}
