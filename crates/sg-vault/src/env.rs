//! Runtime environment description
//!
//! Captures the characteristics a fingerprint-derived passphrase is built from,
//! plus the transport information used for the secure-context check.

use serde::{Deserialize, Serialize};

/// Placeholder substituted for any environment characteristic that is unavailable
pub const UNKNOWN: &str = "unknown";

/// Observable characteristics of the process or client hosting the vault
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeEnvironment {
    /// Client identification string
    pub user_agent: Option<String>,
    /// Preferred locale, e.g. `en-US`
    pub locale: Option<String>,
    /// Screen geometry as `width x height x depth`
    pub screen: Option<String>,
    /// Offset from UTC in minutes
    pub timezone_offset_minutes: Option<i32>,
    /// Operating platform
    pub platform: Option<String>,
    /// Serving origin, e.g. `https://app.example.org`
    pub origin: Option<String>,
}

impl RuntimeEnvironment {
    /// Create an empty environment (every characteristic unavailable)
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Describe the current native process
    #[must_use]
    pub fn detect() -> Self {
        let locale = std::env::var("LC_ALL")
            .or_else(|_| std::env::var("LANG"))
            .ok()
            .filter(|l| !l.is_empty());

        Self {
            user_agent: Some(format!("stakeguard/{}", env!("CARGO_PKG_VERSION"))),
            locale,
            screen: None,
            timezone_offset_minutes: None,
            platform: Some(format!(
                "{}-{}",
                std::env::consts::OS,
                std::env::consts::ARCH
            )),
            origin: None,
        }
    }

    /// With serving origin
    #[inline]
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// With user agent
    #[inline]
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// With screen geometry
    #[inline]
    #[must_use]
    pub fn with_screen(mut self, width: u32, height: u32, depth: u32) -> Self {
        self.screen = Some(format!("{width}x{height}x{depth}"));
        self
    }

    /// Host part of the origin, if an origin is set
    #[must_use]
    pub fn hostname(&self) -> Option<&str> {
        let origin = self.origin.as_deref()?;
        let rest = origin.split_once("://").map_or(origin, |(_, rest)| rest);
        let authority = rest.split('/').next().unwrap_or(rest);
        let host = match authority.strip_prefix('[') {
            Some(v6) => v6.split(']').next().unwrap_or(v6),
            None => authority.split(':').next().unwrap_or(authority),
        };
        (!host.is_empty()).then_some(host)
    }

    /// Whether the environment runs over an encrypted transport
    ///
    /// A process without an origin is local and counts as secure. Otherwise the
    /// origin must be `https` or a loopback host.
    #[must_use]
    pub fn is_secure_context(&self) -> bool {
        let Some(origin) = self.origin.as_deref() else {
            return true;
        };
        if origin.starts_with("https://") {
            return true;
        }
        matches!(
            self.hostname(),
            Some("localhost" | "127.0.0.1" | "::1")
        )
    }

    /// Fingerprint components in a fixed order, placeholders substituted
    pub(crate) fn components(&self) -> [String; 6] {
        fn or_unknown(value: Option<&str>) -> String {
            value
                .filter(|v| !v.is_empty())
                .unwrap_or(UNKNOWN)
                .to_string()
        }

        [
            or_unknown(self.user_agent.as_deref()),
            or_unknown(self.locale.as_deref()),
            or_unknown(self.screen.as_deref()),
            self.timezone_offset_minutes
                .map_or_else(|| UNKNOWN.to_string(), |m| m.to_string()),
            or_unknown(self.platform.as_deref()),
            or_unknown(self.hostname()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hostname_extraction() {
        let env = RuntimeEnvironment::new().with_origin("https://app.example.org:8443/path");
        assert_eq!(env.hostname(), Some("app.example.org"));

        let env = RuntimeEnvironment::new().with_origin("http://[::1]:3000");
        assert_eq!(env.hostname(), Some("::1"));

        assert_eq!(RuntimeEnvironment::new().hostname(), None);
    }

    #[test]
    fn secure_context_rules() {
        assert!(RuntimeEnvironment::new().is_secure_context());
        assert!(RuntimeEnvironment::new()
            .with_origin("https://app.example.org")
            .is_secure_context());
        assert!(RuntimeEnvironment::new()
            .with_origin("http://localhost:5173")
            .is_secure_context());
        assert!(!RuntimeEnvironment::new()
            .with_origin("http://app.example.org")
            .is_secure_context());
    }

    #[test]
    fn missing_components_use_placeholder() {
        let components = RuntimeEnvironment::new().components();
        assert!(components.iter().all(|c| c == UNKNOWN));

        let env = RuntimeEnvironment::new().with_screen(1920, 1080, 24);
        assert_eq!(env.components()[2], "1920x1080x24");
    }
}
