//! Request-origin metadata and user-agent classification.

use warden_core::models::session::{Browser, ClientInfo, Os};

/// Where a request came from, as reported by the boundary layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientContext {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientContext {
    pub fn new(ip: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            ip: Some(ip.into()),
            user_agent: Some(user_agent.into()),
        }
    }

    /// Rate-limit key for this client. Absent IPs share one bucket.
    pub fn rate_key(&self) -> &str {
        self.ip.as_deref().filter(|ip| !ip.is_empty()).unwrap_or("unknown")
    }

    /// Session metadata with the user agent classified.
    pub fn client_info(&self) -> ClientInfo {
        let (browser, os) = self
            .user_agent
            .as_deref()
            .map(parse_user_agent)
            .unwrap_or_default();
        ClientInfo {
            ip: self.ip.clone(),
            user_agent: self.user_agent.clone(),
            browser,
            os,
        }
    }
}

/// Classify a user-agent string.
///
/// Order matters: Edge and Chrome advertise "Safari", Chrome on iOS
/// advertises "Mac OS X", and Android advertises "Linux".
pub fn parse_user_agent(ua: &str) -> (Browser, Os) {
    let browser = if ua.contains("Edg/") || ua.contains("Edge/") {
        Browser::Edge
    } else if ua.contains("Chrome/") || ua.contains("CriOS/") {
        Browser::Chrome
    } else if ua.contains("Firefox/") || ua.contains("FxiOS/") {
        Browser::Firefox
    } else if ua.contains("Safari/") {
        Browser::Safari
    } else {
        Browser::Unknown
    };

    let os = if ua.contains("iPhone") || ua.contains("iPad") {
        Os::Ios
    } else if ua.contains("Android") {
        Os::Android
    } else if ua.contains("Windows") {
        Os::Windows
    } else if ua.contains("Mac OS X") || ua.contains("Macintosh") {
        Os::MacOs
    } else if ua.contains("Linux") {
        Os::Linux
    } else {
        Os::Unknown
    };

    (browser, os)
}
