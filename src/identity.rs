use crate::error::AdmissionError;
use std::fmt;

/// Normalized client identifier (IP without port), the key into the
/// counter store and ban registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientId(String);

impl ClientId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[cfg(test)]
    pub fn from_static(s: &str) -> Self {
        ClientId(s.to_string())
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Candidate signals the HTTP layer hands over per request.
#[derive(Debug, Clone, Copy)]
pub struct ClientCandidates<'a> {
    /// X-Real-IP header value, if the proxy set one
    pub real_ip: Option<&'a str>,
    /// X-Forwarded-For header value, comma separated, original client first
    pub forwarded_for: Option<&'a str>,
    /// Direct connection address from the transport layer
    pub direct_addr: &'a str,
}

/// Resolve one [`ClientId`] from the candidate signals.
///
/// Precedence, first non-empty match wins: X-Real-IP, then the first
/// X-Forwarded-For entry, then the direct connection address. Each
/// candidate is trimmed and stripped of a trailing `:port`.
///
/// An all-empty candidate set is a contract violation from the HTTP
/// layer (a direct address is always available from the transport) and
/// comes back as [`AdmissionError::NoClientAddress`].
pub fn resolve(candidates: &ClientCandidates<'_>) -> Result<ClientId, AdmissionError> {
    let raw = candidates
        .real_ip
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .or_else(|| {
            candidates
                .forwarded_for
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|s| !s.is_empty())
        })
        .unwrap_or(candidates.direct_addr.trim());

    let host = strip_port(raw);
    if host.is_empty() {
        return Err(AdmissionError::NoClientAddress);
    }
    Ok(ClientId(host.to_string()))
}

// Strip a trailing :port. Bracketed IPv6 ("[::1]:8080") is unwrapped to
// the literal between the brackets; a bare IPv6 literal has more than
// one colon and is returned untouched rather than split at the first.
fn strip_port(addr: &str) -> &str {
    if let Some(rest) = addr.strip_prefix('[') {
        if let Some(end) = rest.find(']') {
            return &rest[..end];
        }
    }
    match addr.find(':') {
        Some(i) if addr[i + 1..].contains(':') => addr,
        Some(i) => &addr[..i],
        None => addr,
    }
}
