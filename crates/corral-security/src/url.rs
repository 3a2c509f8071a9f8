// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook URL safety validation.
//!
//! Static checks on the URL host before any network attempt: catches literal
//! IP addresses and well-known local hostnames. Hostnames that resolve to
//! private IPs at connect time are outside this module's reach; the
//! notification pipeline treats delivery failures as retryable instead.

use std::net::{IpAddr, Ipv4Addr};

use corral_core::CorralError;
use tracing::warn;

/// Check if an IP is in a private or reserved range.
///
/// Blocks: RFC 1918, loopback, link-local, broadcast, unspecified, the
/// cloud metadata endpoint, IPv6 loopback, unique-local, link-local.
pub fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                || *v4 == Ipv4Addr::new(169, 254, 169, 254) // cloud metadata
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                || (v6.segments()[0] & 0xfe00) == 0xfc00 // fc00::/7 unique local
                || (v6.segments()[0] & 0xffc0) == 0xfe80 // fe80::/10 link-local
        }
    }
}

/// Validate a webhook destination before delivery.
///
/// - The scheme must be `https`; webhooks never get the localhost TLS
///   exemption that internal tooling does.
/// - `localhost` and loopback-style hostnames are rejected.
/// - Literal IP hosts in private/reserved ranges are rejected.
pub fn validate_webhook_url(raw: &str) -> Result<(), CorralError> {
    let parsed = url::Url::parse(raw)
        .map_err(|e| CorralError::Security(format!("invalid webhook URL: {e}")))?;

    if parsed.scheme() != "https" {
        warn!(url = %raw, "webhook rejected: https required");
        return Err(CorralError::Security(
            "webhook URLs must use https".to_string(),
        ));
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| CorralError::Security("webhook URL has no host".to_string()))?;

    if is_local_hostname(host) {
        warn!(url = %raw, "webhook rejected: local hostname");
        return Err(CorralError::Security(format!(
            "webhook URL targets local host {host}"
        )));
    }

    // url normalizes bracketed IPv6 hosts, so a plain parse covers both.
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = bare.parse::<IpAddr>()
        && is_private_ip(&ip)
    {
        warn!(url = %raw, ip = %ip, "webhook rejected: private IP");
        return Err(CorralError::Security(format!(
            "webhook URL targets private IP {ip}"
        )));
    }

    Ok(())
}

/// Check if a hostname refers to the local machine.
pub fn is_local_hostname(host: &str) -> bool {
    let lower = host.to_ascii_lowercase();
    lower == "localhost" || lower.ends_with(".localhost") || lower.starts_with("127.")
}
