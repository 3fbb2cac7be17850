//! Parsing and transport selection for `a2a://host[:port]/{wire_token}`
//! invite URIs (the portable identifier a token is handed out as).

use std::fmt;

use crate::error::{DriverError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        })
    }
}

/// A parsed invite URI, ready to address a peer's `/api/a2a/*` surface.
#[derive(Debug, Clone)]
pub struct Invite {
    pub scheme: Scheme,
    pub host: String,
    pub port: Option<u16>,
    pub wire_token: String,
}

impl Invite {
    /// Loopback and `.local` hostnames always get plain HTTP, since there is
    /// no TLS terminator to talk to on a LAN peer. Any other host defaults to
    /// HTTPS unless it names an explicit non-443 port, which only makes sense
    /// pointed at a bare HTTP listener.
    pub fn parse(uri: &str) -> Result<Self> {
        let rest = uri
            .strip_prefix("a2a://")
            .ok_or_else(|| DriverError::InvalidInvite(format!("missing a2a:// scheme: {uri}")))?;
        let (authority, path) = rest
            .split_once('/')
            .ok_or_else(|| DriverError::InvalidInvite(format!("missing wire token path: {uri}")))?;
        if path.is_empty() {
            return Err(DriverError::InvalidInvite(format!("empty wire token: {uri}")));
        }

        let (host, port) = split_authority(authority)?;
        let is_local = host == "127.0.0.1"
            || host == "::1"
            || host.eq_ignore_ascii_case("localhost")
            || host.to_ascii_lowercase().ends_with(".local");
        let scheme = if is_local {
            Scheme::Http
        } else {
            match port {
                Some(p) if p != 443 => Scheme::Http,
                _ => Scheme::Https,
            }
        };

        Ok(Self {
            scheme,
            host,
            port,
            wire_token: path.to_string(),
        })
    }

    fn authority(&self) -> String {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        match self.port {
            Some(p) => format!("{host}:{p}"),
            None => host,
        }
    }

    fn base_url(&self) -> String {
        format!("{}://{}", self.scheme, self.authority())
    }

    pub fn invoke_url(&self) -> String {
        format!("{}/api/a2a/invoke", self.base_url())
    }

    pub fn end_url(&self) -> String {
        format!("{}/api/a2a/end", self.base_url())
    }

    /// The wire token doubles as the bearer credential presented to the peer.
    pub fn bearer(&self) -> &str {
        &self.wire_token
    }
}

fn split_authority(authority: &str) -> Result<(String, Option<u16>)> {
    if let Some(rest) = authority.strip_prefix('[') {
        let (host, after) = rest.split_once(']').ok_or_else(|| {
            DriverError::InvalidInvite(format!("unterminated ipv6 literal: {authority}"))
        })?;
        let port = match after.strip_prefix(':') {
            Some(p) => Some(
                p.parse::<u16>()
                    .map_err(|_| DriverError::InvalidInvite(format!("invalid port: {after}")))?,
            ),
            None => None,
        };
        return Ok((host.to_string(), port));
    }

    match authority.rsplit_once(':') {
        Some((host, port_str))
            if !host.is_empty() && !port_str.is_empty() && port_str.bytes().all(|b| b.is_ascii_digit()) =>
        {
            let port = port_str
                .parse::<u16>()
                .map_err(|_| DriverError::InvalidInvite(format!("invalid port: {port_str}")))?;
            Ok((host.to_string(), Some(port)))
        }
        _ => Ok((authority.to_string(), None)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_host_uses_plain_http() {
        let invite = Invite::parse("a2a://127.0.0.1:18790/fed_abc").unwrap();
        assert_eq!(invite.scheme, Scheme::Http);
        assert_eq!(invite.invoke_url(), "http://127.0.0.1:18790/api/a2a/invoke");
    }

    #[test]
    fn dot_local_host_uses_plain_http() {
        let invite = Invite::parse("a2a://bobs-mac.local/fed_abc").unwrap();
        assert_eq!(invite.scheme, Scheme::Http);
        assert_eq!(invite.invoke_url(), "http://bobs-mac.local/api/a2a/invoke");
    }

    #[test]
    fn bare_public_host_defaults_to_https() {
        let invite = Invite::parse("a2a://gateway.example.com/fed_abc").unwrap();
        assert_eq!(invite.scheme, Scheme::Https);
        assert_eq!(invite.end_url(), "https://gateway.example.com/api/a2a/end");
    }

    #[test]
    fn explicit_443_stays_https() {
        let invite = Invite::parse("a2a://gateway.example.com:443/fed_abc").unwrap();
        assert_eq!(invite.scheme, Scheme::Https);
    }

    #[test]
    fn explicit_non_443_port_implies_http() {
        let invite = Invite::parse("a2a://gateway.example.com:8443/fed_abc").unwrap();
        assert_eq!(invite.scheme, Scheme::Http);
        assert_eq!(invite.invoke_url(), "http://gateway.example.com:8443/api/a2a/invoke");
    }

    #[test]
    fn bracketed_ipv6_literal_round_trips() {
        let invite = Invite::parse("a2a://[2001:db8::1]:9000/fed_abc").unwrap();
        assert_eq!(invite.host, "2001:db8::1");
        assert_eq!(invite.port, Some(9000));
        assert_eq!(invite.invoke_url(), "http://[2001:db8::1]:9000/api/a2a/invoke");
    }

    #[test]
    fn missing_wire_token_is_rejected() {
        assert!(Invite::parse("a2a://gateway.example.com").is_err());
    }

    #[test]
    fn missing_scheme_is_rejected() {
        assert!(Invite::parse("https://gateway.example.com/fed_abc").is_err());
    }
}
