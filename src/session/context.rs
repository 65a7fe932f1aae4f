//! Connection and session context
//!
//! [`ConnectInfo`] is what the transport knows about a connection when it
//! reports the connect command. [`SessionContext`] is the read-only view of a
//! session used for logging and by callers inspecting a session.

use std::net::SocketAddr;

use crate::amf::{AmfObject, AmfValue};

/// Parameters of the RTMP connect command
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectInfo {
    /// Application name
    pub app: String,

    pub tc_url: Option<String>,

    pub flash_ver: Option<String>,

    /// Remote peer, if the transport knows it
    pub peer_addr: Option<SocketAddr>,

    /// The full command object, in wire order
    pub properties: AmfObject,
}

impl ConnectInfo {
    pub fn new(app: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            ..Default::default()
        }
    }

    /// Build from the decoded connect command object
    pub fn from_command_object(object: &AmfValue) -> Self {
        let properties = object.as_object().cloned().unwrap_or_default();
        let field = |key: &str| properties.get(key).and_then(|v| v.as_str()).map(String::from);

        Self {
            app: field("app").unwrap_or_default(),
            tc_url: field("tcUrl"),
            flash_ver: field("flashVer"),
            peer_addr: None,
            properties,
        }
    }

    pub fn with_peer(mut self, peer_addr: SocketAddr) -> Self {
        self.peer_addr = Some(peer_addr);
        self
    }
}

/// Read-only session information
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: u64,

    pub peer_addr: Option<SocketAddr>,

    /// Application name (from connect)
    pub app: String,

    /// Stream name as sent by the publisher
    pub stream_name: Option<String>,
}

impl SessionContext {
    pub fn new(session_id: u64) -> Self {
        Self {
            session_id,
            peer_addr: None,
            app: String::new(),
            stream_name: None,
        }
    }

    pub fn with_connect(&mut self, info: &ConnectInfo) {
        self.app = info.app.clone();
        self.peer_addr = info.peer_addr;
    }

    /// Stream name for log fields; empty before publish
    pub fn stream(&self) -> &str {
        self.stream_name.as_deref().unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_command_object() {
        let object: AmfObject = [
            ("app", AmfValue::from("live")),
            ("flashVer", AmfValue::from("FMLE/3.0 (compatible; FMSc/1.0)")),
            ("tcUrl", AmfValue::from("rtmp://localhost/live")),
            ("fpad", AmfValue::from(false)),
        ]
        .into_iter()
        .collect();

        let info = ConnectInfo::from_command_object(&AmfValue::Object(object));
        assert_eq!(info.app, "live");
        assert_eq!(info.tc_url.as_deref(), Some("rtmp://localhost/live"));
        assert_eq!(info.flash_ver.as_deref(), Some("FMLE/3.0 (compatible; FMSc/1.0)"));
        assert_eq!(info.properties.len(), 4);
    }

    #[test]
    fn test_from_non_object() {
        let info = ConnectInfo::from_command_object(&AmfValue::Null);
        assert_eq!(info, ConnectInfo::default());
    }

    #[test]
    fn test_context_with_connect() {
        let peer: SocketAddr = "10.0.0.7:50123".parse().unwrap();
        let mut ctx = SessionContext::new(9);
        assert_eq!(ctx.stream(), "");

        ctx.with_connect(&ConnectInfo::new("live").with_peer(peer));
        assert_eq!(ctx.app, "live");
        assert_eq!(ctx.peer_addr, Some(peer));
    }
}
