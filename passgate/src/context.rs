//! Client context captured when a token is created.
//!
//! The context is stored on the token as opaque metadata. It is never
//! rendered into outgoing mail.

use serde::{Deserialize, Serialize};

/// Device and network details of the request that created a token
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientContext {
    pub ip: Option<String>,
    pub country: Option<String>,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub device: Option<String>,
}

impl ClientContext {
    /// Build a context from raw request header values
    ///
    /// # Arguments
    ///
    /// * `client_ip` - resolved client address; of a comma-separated list the
    ///   first entry wins
    /// * `country` - two-letter country code set by an edge proxy
    /// * `user_agent` - `User-Agent` value
    pub fn capture(
        client_ip: Option<&str>,
        country: Option<&str>,
        user_agent: Option<&str>,
    ) -> Self {
        let ip = client_ip
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .map(str::to_string);

        let country = country
            .map(str::trim)
            .filter(|c| c.len() == 2)
            .map(str::to_ascii_uppercase);

        let (browser, os, device) = match user_agent {
            Some(ua) => classify_user_agent(ua),
            None => (None, None, None),
        };

        Self {
            ip,
            country,
            browser,
            os,
            device,
        }
    }
}

type Classified = (Option<String>, Option<String>, Option<String>);

/// Coarse browser / OS / device classification of a user agent string
fn classify_user_agent(ua: &str) -> Classified {
    let browser = if ua.contains("Edg/") {
        Some("Edge")
    } else if ua.contains("Firefox/") {
        Some("Firefox")
    } else if ua.contains("Chrome/") {
        Some("Chrome")
    } else if ua.contains("Safari/") {
        Some("Safari")
    } else if ua.contains("curl/") {
        Some("curl")
    } else {
        None
    };

    // Order matters: Android UAs also mention Linux, iOS UAs mention Mac OS X.
    let os = if ua.contains("Android") {
        Some("Android")
    } else if ua.contains("iPhone") || ua.contains("iPad") {
        Some("iOS")
    } else if ua.contains("Windows") {
        Some("Windows")
    } else if ua.contains("Mac OS X") {
        Some("macOS")
    } else if ua.contains("Linux") {
        Some("Linux")
    } else {
        None
    };

    let device = if ua.contains("iPad") || ua.contains("Tablet") {
        "tablet"
    } else if ua.contains("Mobile") || ua.contains("iPhone") {
        "mobile"
    } else {
        "desktop"
    };

    (
        browser.map(str::to_string),
        os.map(str::to_string),
        Some(device.to_string()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_takes_first_forwarded_address() {
        let ctx = ClientContext::capture(Some("203.0.113.7, 10.0.0.1"), Some("de"), None);
        assert_eq!(ctx.ip.as_deref(), Some("203.0.113.7"));
        assert_eq!(ctx.country.as_deref(), Some("DE"));
        assert_eq!(ctx.browser, None);
    }

    #[test]
    fn test_classify_mobile_chrome() {
        let ua = "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 \
                  (KHTML, like Gecko) Chrome/126.0 Mobile Safari/537.36";
        let ctx = ClientContext::capture(None, None, Some(ua));
        assert_eq!(ctx.browser.as_deref(), Some("Chrome"));
        assert_eq!(ctx.os.as_deref(), Some("Android"));
        assert_eq!(ctx.device.as_deref(), Some("mobile"));
    }

    #[test]
    fn test_classify_desktop_firefox() {
        let ua = "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:128.0) Gecko/20100101 Firefox/128.0";
        let ctx = ClientContext::capture(None, None, Some(ua));
        assert_eq!(ctx.browser.as_deref(), Some("Firefox"));
        assert_eq!(ctx.os.as_deref(), Some("Windows"));
        assert_eq!(ctx.device.as_deref(), Some("desktop"));
    }

    #[test]
    fn test_invalid_country_is_dropped() {
        let ctx = ClientContext::capture(Some(""), Some("Germany"), None);
        assert_eq!(ctx.ip, None);
        assert_eq!(ctx.country, None);
    }
}
