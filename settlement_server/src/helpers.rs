use std::{net::IpAddr, str::FromStr};

use actix_web::HttpRequest;
use hmac::{Hmac, Mac};
use log::{debug, trace};
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::Sha256;

static FORWARDED_FOR: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r#"for="?(?P<ip>[^;,"]+)"#).ok());

/// Get the remote IP address from the request. It uses 3 sources to determine the IP address, in decreasing order
/// of preference:
/// 1. The `X-Forwarded-For` header, iif `use_x_forwarded_for` is set to true in the configuration.
/// 2. The `Forwarded` header, iif `use_forwarded` is set to true in the configuration.
/// 3. The peer address from the connection info.
pub fn get_remote_ip(req: &HttpRequest, use_x_forwarded_for: bool, use_forwarded: bool) -> Option<IpAddr> {
    remote_ip(req.headers(), req.connection_info().peer_addr(), use_x_forwarded_for, use_forwarded)
}

pub fn remote_ip(
    headers: &actix_web::http::header::HeaderMap,
    peer_addr: Option<&str>,
    use_x_forwarded_for: bool,
    use_forwarded: bool,
) -> Option<IpAddr> {
    let mut result = None;
    if use_x_forwarded_for {
        trace!("Checking X-Forwarded-For header");
        // The left-most address is the original client
        result = headers
            .get("X-Forwarded-For")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .and_then(|s| IpAddr::from_str(s.trim()).ok());
        if let Some(ip) = result {
            debug!("Using X-Forwarded-For header for remote address: {ip}");
        }
    }
    if use_forwarded && result.is_none() {
        trace!("Checking Forwarded header");
        result = FORWARDED_FOR.as_ref().and_then(|re| {
            headers
                .get("Forwarded")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| re.captures(v))
                .and_then(|caps| caps.name("ip"))
                .map(|m| m.as_str())
                .and_then(|s| IpAddr::from_str(s).ok())
        });
        if let Some(ip) = result {
            debug!("Using Forwarded header for remote address: {ip}");
        }
    }
    result.or_else(|| {
        trace!("Using Peer address for remote address: {:?}", peer_addr);
        peer_addr.and_then(|s| IpAddr::from_str(s).ok())
    })
}

/// Base64 HMAC-SHA256 of `data`, as sent in the `X-Paygate-Hmac-Sha256` header.
pub fn calculate_hmac(secret: &str, data: &[u8]) -> String {
    match Hmac::<Sha256>::new_from_slice(secret.as_bytes()) {
        Ok(mut mac) => {
            mac.update(data);
            base64::encode(mac.finalize().into_bytes())
        },
        // HMAC accepts keys of any length
        Err(_) => String::new(),
    }
}

#[cfg(test)]
mod test {
    use actix_web::test::TestRequest;

    use super::*;

    #[test]
    fn forwarded_headers() {
        let req = TestRequest::default()
            .insert_header(("X-Forwarded-For", "203.0.113.7, 10.0.0.1"))
            .insert_header(("Forwarded", "for=198.51.100.2;proto=https"))
            .to_http_request();
        let h = req.headers();
        assert_eq!(remote_ip(h, Some("10.0.0.9"), true, true), Some("203.0.113.7".parse().unwrap()));
        assert_eq!(remote_ip(h, Some("10.0.0.9"), false, true), Some("198.51.100.2".parse().unwrap()));
        assert_eq!(remote_ip(h, Some("10.0.0.9"), false, false), Some("10.0.0.9".parse().unwrap()));
        assert_eq!(remote_ip(h, None, false, false), None);
    }

    #[test]
    fn hmac_is_base64_sha256() {
        // Known answer: HMAC-SHA256(key="key", "The quick brown fox jumps over the lazy dog")
        let mac = calculate_hmac("key", b"The quick brown fox jumps over the lazy dog");
        assert_eq!(mac, "97yD9DBThCSxMpjmqm+xQ+9NWaFJRhdZl0edvC0aPNg=");
    }
}
