//! Caller identity resolution.
//!
//! Every rate-limited request is attributed to exactly one [`IdentityKey`].
//! Authenticated callers are keyed by their user id; everyone else is keyed
//! by network address. The two namespaces carry distinct prefixes so a user
//! id can never alias an address.

use std::fmt;

/// Identity established by an authentication layer ahead of the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedIdentity {
    /// Stable user identifier
    pub id: String,
}

impl AuthenticatedIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// The view of an inbound request consumed by the gate.
///
/// Every field is optional; a partially populated request is never an error.
#[derive(Debug, Clone, Default)]
pub struct RequestInfo {
    /// Request path, e.g. `/api/items/`
    pub path: Option<String>,
    /// Address of the directly connected peer
    pub remote_address: Option<String>,
    /// Raw value of the forwarded-address header
    pub forwarded_for: Option<String>,
    /// Authenticated caller, if any
    pub identity: Option<AuthenticatedIdentity>,
}

impl RequestInfo {
    /// Create a request view for `path` with no caller information.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Default::default()
        }
    }

    pub fn with_remote_address(mut self, addr: impl Into<String>) -> Self {
        self.remote_address = Some(addr.into());
        self
    }

    pub fn with_forwarded_for(mut self, header: impl Into<String>) -> Self {
        self.forwarded_for = Some(header.into());
        self
    }

    pub fn with_identity(mut self, identity: AuthenticatedIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// The request path, or the empty string when unknown.
    pub fn path_or_empty(&self) -> &str {
        self.path.as_deref().unwrap_or("")
    }
}

/// Key identifying a rate limit subject.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentityKey {
    /// An authenticated user id
    User(String),
    /// A network address
    Anonymous(String),
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityKey::User(id) => write!(f, "user:{}", id),
            IdentityKey::Anonymous(addr) => write!(f, "anon:{}", addr),
        }
    }
}

/// Derives an [`IdentityKey`] from a [`RequestInfo`].
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityResolver;

impl IdentityResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolve the caller of `request`.
    ///
    /// Returns `None` when neither an authenticated identity nor any address
    /// is available, meaning the request cannot be rate limited.
    pub fn resolve(&self, request: &RequestInfo) -> Option<IdentityKey> {
        if let Some(identity) = request
            .identity
            .as_ref()
            .filter(|identity| !identity.id.is_empty())
        {
            return Some(IdentityKey::User(identity.id.clone()));
        }

        client_address(request).map(|addr| IdentityKey::Anonymous(addr.to_string()))
    }
}

/// Pick the client address: the first forwarded entry if there is one,
/// otherwise the peer address.
fn client_address(request: &RequestInfo) -> Option<&str> {
    let forwarded = request
        .forwarded_for
        .as_deref()
        .and_then(|header| header.split(',').next())
        .map(str::trim)
        .filter(|addr| !addr.is_empty());

    forwarded.or_else(|| {
        request
            .remote_address
            .as_deref()
            .map(str::trim)
            .filter(|addr| !addr.is_empty())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authenticated_identity_wins() {
        let request = RequestInfo::new("/api/")
            .with_remote_address("10.0.0.1")
            .with_forwarded_for("203.0.113.9")
            .with_identity(AuthenticatedIdentity::new("42"));

        let key = IdentityResolver::new().resolve(&request).unwrap();
        assert_eq!(key, IdentityKey::User("42".to_string()));
        assert_eq!(key.to_string(), "user:42");
    }

    #[test]
    fn test_empty_identity_falls_back_to_address() {
        let request = RequestInfo::new("/api/")
            .with_remote_address("10.0.0.1")
            .with_identity(AuthenticatedIdentity::new(""));

        let key = IdentityResolver::new().resolve(&request).unwrap();
        assert_eq!(key.to_string(), "anon:10.0.0.1");
    }

    #[test]
    fn test_identity_id_kept_verbatim() {
        let resolver = IdentityResolver::new();
        let padded = resolver
            .resolve(&RequestInfo::new("/api/").with_identity(AuthenticatedIdentity::new(" 42")))
            .unwrap();
        let plain = resolver
            .resolve(&RequestInfo::new("/api/").with_identity(AuthenticatedIdentity::new("42")))
            .unwrap();

        assert_eq!(padded.to_string(), "user: 42");
        assert_ne!(padded, plain);
    }

    #[test]
    fn test_forwarded_header_preferred_over_remote() {
        let request = RequestInfo::new("/api/")
            .with_remote_address("10.0.0.1")
            .with_forwarded_for("198.51.100.7");

        let key = IdentityResolver::new().resolve(&request).unwrap();
        assert_eq!(key.to_string(), "anon:198.51.100.7");
    }

    #[test]
    fn test_forwarded_list_uses_first_entry_trimmed() {
        let request = RequestInfo::new("/api/")
            .with_forwarded_for("  198.51.100.7 , 10.1.1.1, 10.2.2.2");

        let key = IdentityResolver::new().resolve(&request).unwrap();
        assert_eq!(key, IdentityKey::Anonymous("198.51.100.7".to_string()));
    }

    #[test]
    fn test_blank_forwarded_entry_falls_back_to_remote() {
        let request = RequestInfo::new("/api/")
            .with_remote_address(" 10.0.0.1 ")
            .with_forwarded_for(" , 198.51.100.7");

        let key = IdentityResolver::new().resolve(&request).unwrap();
        assert_eq!(key.to_string(), "anon:10.0.0.1");
    }

    #[test]
    fn test_no_identity_and_no_address() {
        let request = RequestInfo::new("/api/");
        assert!(IdentityResolver::new().resolve(&request).is_none());

        let request = RequestInfo::default()
            .with_remote_address("")
            .with_forwarded_for("   ");
        assert!(IdentityResolver::new().resolve(&request).is_none());
    }

    #[test]
    fn test_namespaces_never_collide() {
        let resolver = IdentityResolver::new();

        let user = resolver
            .resolve(&RequestInfo::new("/api/").with_identity(AuthenticatedIdentity::new("10.0.0.1")))
            .unwrap();
        let anon = resolver
            .resolve(&RequestInfo::new("/api/").with_remote_address("10.0.0.1"))
            .unwrap();
        assert_ne!(user, anon);
        assert_ne!(user.to_string(), anon.to_string());

        // An address shaped like a user key still lands in the anon namespace.
        let spoofed = resolver
            .resolve(&RequestInfo::new("/api/").with_forwarded_for("user:42"))
            .unwrap();
        let real = resolver
            .resolve(&RequestInfo::new("/api/").with_identity(AuthenticatedIdentity::new("42")))
            .unwrap();
        assert_eq!(spoofed.to_string(), "anon:user:42");
        assert_ne!(spoofed.to_string(), real.to_string());
    }

    #[test]
    fn test_path_or_empty() {
        assert_eq!(RequestInfo::default().path_or_empty(), "");
        assert_eq!(RequestInfo::new("/health/").path_or_empty(), "/health/");
    }
}
