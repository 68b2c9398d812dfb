//! Connection string assembly.
//!
//! A logical database name maps to a base URI in the `[mongodb]` section of a
//! [`ConfigSource`]. The section named after the URI's host may override credentials,
//! append query parameters and replace the host:
//!
//! ```toml
//! [mongodb]
//! main = "db1.example.com:27017/shop?w=majority"
//!
//! ["db1.example.com:27017"]
//! user = "app:secret"          # or user = "app" + password = "secret"
//! query = "authSource=admin"
//! host = "10.0.0.12:27017"     # applied last
//! ```
//!
//! The host list is parsed by hand instead of through `url::Url`: MongoDB seed lists
//! (`h1:27017,h2:27017`) are not valid authorities for generic URL parsers.

use crate::config::{ConfigSource, SECTION_NAME};
use crate::error::{NosqlError, NosqlResult};
use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};

pub const SCHEME_PREFIX: &str = "mongodb://";

/// Characters escaped inside the userinfo component.
const USERINFO: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b':')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'@')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

const MASK: &str = "****";

/// Per-host overrides read from the configuration section named after the URI host.
///
/// Empty strings mean "not configured".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostOverrides {
    pub user: String,
    pub password: String,
    pub query: String,
    pub host: String,
}

impl HostOverrides {
    /// Snapshot the override keys of `host`.
    pub fn from_source(source: &dyn ConfigSource, host: &str) -> Self {
        Self {
            user: source.get(host, "user"),
            password: source.get(host, "password"),
            query: source.get(host, "query"),
            host: source.get(host, "host"),
        }
    }

    /// Credentials to embed, if any.
    ///
    /// Precedence: `user` + `password` pair, then `user` split on its first colon,
    /// then `user` alone.
    pub fn credentials(&self) -> Option<(&str, Option<&str>)> {
        if self.user.is_empty() {
            return None;
        }
        if !self.password.is_empty() {
            return Some((self.user.as_str(), Some(self.password.as_str())));
        }
        match self.user.split_once(':') {
            Some((user, password)) => Some((user, Some(password))),
            None => Some((self.user.as_str(), None)),
        }
    }
}

/// Structured form of a connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSpec {
    pub scheme: String,
    /// Percent-encoded `user[:password]`.
    pub userinfo: Option<String>,
    /// Host list as written, e.g. `h1:27017,h2:27017`.
    pub host: String,
    pub path: String,
    pub query: Option<String>,
    pub fragment: Option<String>,
}

impl ConnectionSpec {
    /// Split a connection string into its components, validating the host list.
    pub fn parse(uri: &str) -> NosqlResult<Self> {
        let (scheme, rest) = uri
            .split_once("://")
            .ok_or_else(|| NosqlError::uri_parse("missing scheme"))?;
        if !is_scheme(scheme) {
            return Err(NosqlError::uri_parse(format!("invalid scheme '{}'", scheme)));
        }

        let (rest, fragment) = match rest.split_once('#') {
            Some((rest, fragment)) => (rest, Some(fragment.to_string())),
            None => (rest, None),
        };
        let (rest, query) = match rest.split_once('?') {
            Some((rest, query)) => (rest, Some(query.to_string())),
            None => (rest, None),
        };
        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, ""),
        };
        let (userinfo, host) = match authority.rsplit_once('@') {
            Some((userinfo, host)) => (Some(userinfo.to_string()), host),
            None => (None, authority),
        };

        validate_hosts(host)?;

        Ok(Self {
            scheme: scheme.to_string(),
            userinfo,
            host: host.to_string(),
            path: path.to_string(),
            query,
            fragment,
        })
    }

    /// Decoded user name, if any.
    pub fn user(&self) -> Option<String> {
        self.userinfo.as_deref().map(|info| {
            let user = info.split_once(':').map_or(info, |(user, _)| user);
            percent_decode_str(user).decode_utf8_lossy().into_owned()
        })
    }

    /// Decoded password, if any.
    pub fn password(&self) -> Option<String> {
        self.userinfo
            .as_deref()
            .and_then(|info| info.split_once(':'))
            .map(|(_, password)| percent_decode_str(password).decode_utf8_lossy().into_owned())
    }

    pub fn set_credentials(&mut self, user: &str, password: Option<&str>) {
        let mut info = utf8_percent_encode(user, USERINFO).to_string();
        if let Some(password) = password {
            info.push(':');
            info.extend(utf8_percent_encode(password, USERINFO));
        }
        self.userinfo = Some(info);
    }

    /// Append raw query parameters, joining with `&`.
    pub fn append_query(&mut self, extra: &str) {
        if extra.is_empty() {
            return;
        }
        let query = self.query.get_or_insert_with(String::new);
        if !query.is_empty() {
            query.push('&');
        }
        query.push_str(extra);
    }

    /// Same string with the password replaced by `****`.
    fn masked(&self) -> String {
        let mut masked = self.clone();
        if let Some(info) = &self.userinfo {
            if let Some((user, _)) = info.split_once(':') {
                masked.userinfo = Some(format!("{}:{}", user, MASK));
            }
        }
        masked.to_string()
    }
}

impl std::fmt::Display for ConnectionSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://", self.scheme)?;
        if let Some(info) = &self.userinfo {
            write!(f, "{}@", info)?;
        }
        write!(f, "{}{}", self.host, self.path)?;
        if let Some(query) = &self.query {
            write!(f, "?{}", query)?;
        }
        if let Some(fragment) = &self.fragment {
            write!(f, "#{}", fragment)?;
        }
        Ok(())
    }
}

/// Connection string ready for the driver plus the database it targets.
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedUri {
    /// Contains credentials - never log, use [`ResolvedUri::masked`]
    pub uri: String,
    pub database: String,
    /// Host list after the `host` override.
    pub host: String,
    masked: String,
}

impl ResolvedUri {
    /// Log-safe connection string.
    pub fn masked(&self) -> &str {
        &self.masked
    }
}

impl std::fmt::Debug for ResolvedUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedUri")
            .field("uri", &self.masked)
            .field("database", &self.database)
            .field("host", &self.host)
            .finish()
    }
}

/// Resolve the connection string of a logical database name.
pub fn resolve_uri(source: &dyn ConfigSource, name: &str) -> NosqlResult<ResolvedUri> {
    let base = source.get(SECTION_NAME, name);
    if base.is_empty() {
        return Err(NosqlError::config_missing(SECTION_NAME, name));
    }

    let spec = ConnectionSpec::parse(&with_scheme(&base))?;
    let overrides = HostOverrides::from_source(source, &spec.host);
    assemble(spec, &overrides)
}

/// Apply `overrides` to a base URI. Pure counterpart of [`resolve_uri`].
pub fn build_uri(base: &str, overrides: &HostOverrides) -> NosqlResult<ResolvedUri> {
    let spec = ConnectionSpec::parse(&with_scheme(base))?;
    assemble(spec, overrides)
}

fn assemble(mut spec: ConnectionSpec, overrides: &HostOverrides) -> NosqlResult<ResolvedUri> {
    let raw_database = spec.path.strip_prefix('/').unwrap_or(&spec.path);
    let database = decode_once(raw_database)?;
    if database.is_empty() {
        return Err(NosqlError::uri_parse("no database name in connection string path"));
    }
    spec.path = "/".to_string();

    if let Some((user, password)) = overrides.credentials() {
        spec.set_credentials(user, password);
    }

    spec.append_query(&overrides.query);

    // host substitution must stay last
    if !overrides.host.is_empty() {
        validate_hosts(&overrides.host)?;
        spec.host = overrides.host.clone();
    }

    let uri = decode_once(&spec.to_string())?;
    let masked = decode_once(&spec.masked())?;

    Ok(ResolvedUri {
        uri,
        database,
        host: spec.host,
        masked,
    })
}

/// Percent-decode `s`; a `%` not followed by two hex digits is an error.
fn decode_once(s: &str) -> NosqlResult<String> {
    let bytes = s.as_bytes();
    for (idx, _) in s.match_indices('%') {
        let escape = bytes.get(idx + 1..idx + 3);
        if !escape.is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit)) {
            return Err(NosqlError::uri_parse(format!(
                "invalid percent-escape at byte {}",
                idx
            )));
        }
    }

    percent_decode_str(s)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|e| NosqlError::uri_parse(format!("invalid percent-encoding: {}", e)))
}

fn with_scheme(base: &str) -> String {
    let has_scheme = base
        .split_once("://")
        .is_some_and(|(scheme, _)| is_scheme(scheme));
    if has_scheme {
        base.to_string()
    } else {
        format!("{}{}", SCHEME_PREFIX, base)
    }
}

fn is_scheme(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

fn validate_hosts(hosts: &str) -> NosqlResult<()> {
    if hosts.is_empty() {
        return Err(NosqlError::uri_parse("missing host"));
    }
    for host in hosts.split(',') {
        validate_host(host)?;
    }
    Ok(())
}

fn validate_host(host: &str) -> NosqlResult<()> {
    if host.is_empty() {
        return Err(NosqlError::uri_parse("empty host in host list"));
    }
    if let Some(c) = host.chars().find(|c| c.is_whitespace() || c.is_control()) {
        return Err(NosqlError::uri_parse(format!(
            "invalid character {:?} in host '{}'",
            c, host
        )));
    }

    let port = if let Some(ipv6) = host.strip_prefix('[') {
        let (_, after) = ipv6
            .split_once(']')
            .ok_or_else(|| NosqlError::uri_parse(format!("unterminated IPv6 host '{}'", host)))?;
        match after {
            "" => None,
            _ => Some(after.strip_prefix(':').ok_or_else(|| {
                NosqlError::uri_parse(format!("unexpected text after IPv6 host '{}'", host))
            })?),
        }
    } else {
        host.rsplit_once(':').map(|(_, port)| port)
    };

    match port {
        Some(port) if !port.is_empty() => port
            .parse::<u16>()
            .map(|_| ())
            .map_err(|_| NosqlError::uri_parse(format!("invalid port '{}'", port))),
        _ => Ok(()),
    }
}
