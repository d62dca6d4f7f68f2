//! Client IP resolution.
//!
//! Requests usually reach the server through one or more proxies, so the
//! client address has to be picked out of several headers. Candidates are
//! gathered in a fixed source-priority order and the first public one wins;
//! the list is only ever filtered, never reordered.

use crate::models::AddressCandidate;

/// Prefix of an IPv4-mapped IPv6 address.
const MAPPED_V4_PREFIX: &str = "::ffff:";

/// Source name used for the transport peer address.
pub const SOCKET_SOURCE: &str = "socket";

/// How many addresses a source may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// One address per value.
    Single,
    /// Comma-separated list, client first (`X-Forwarded-For` style).
    Multi,
}

/// Proxy headers consulted for the client address, highest priority first.
pub const HEADER_SOURCES: &[(&str, SourceKind)] = &[
    ("x-vercel-forwarded-for", SourceKind::Multi),
    ("x-real-ip", SourceKind::Single),
    ("cf-connecting-ip", SourceKind::Single),
    ("fly-client-ip", SourceKind::Single),
    ("true-client-ip", SourceKind::Single),
    ("x-client-ip", SourceKind::Single),
    ("x-forwarded-for", SourceKind::Multi),
];

/// One raw input to the resolver.
#[derive(Debug, Clone, Copy)]
pub struct AddressSource<'a> {
    pub name: &'a str,
    pub kind: SourceKind,
    pub value: &'a str,
}

impl<'a> AddressSource<'a> {
    pub fn single(name: &'a str, value: &'a str) -> Self {
        Self {
            name,
            kind: SourceKind::Single,
            value,
        }
    }

    pub fn multi(name: &'a str, value: &'a str) -> Self {
        Self {
            name,
            kind: SourceKind::Multi,
            value,
        }
    }
}

/// Outcome of client IP resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Selected address, empty if there were no candidates.
    pub ip: String,
    /// Name of the source the address came from.
    pub source: Option<String>,
    /// Every candidate considered, in priority order.
    pub candidates: Vec<AddressCandidate>,
}

// ── Normalization ───────────────────────────────────────────────────

/// Canonicalize a raw address string.
///
/// Trims, strips one layer of matching quotes, unwraps `[v6]:port`, drops a
/// `:port` suffix from IPv4 literals and reduces `::ffff:a.b.c.d` to the
/// embedded IPv4 address.
pub fn normalize(raw: &str) -> String {
    let mut value = raw.trim();

    if value.len() >= 2
        && ((value.starts_with('"') && value.ends_with('"'))
            || (value.starts_with('\'') && value.ends_with('\'')))
    {
        value = &value[1..value.len() - 1];
    }

    if let Some(inner) = unwrap_bracketed(value) {
        value = inner;
    }

    if let Some((host, port)) = value.split_once(':') {
        if is_dotted_quad(host) && !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) {
            value = host;
        }
    }

    if let Some(prefix) = value.get(..MAPPED_V4_PREFIX.len()) {
        if prefix.eq_ignore_ascii_case(MAPPED_V4_PREFIX) && value.len() > prefix.len() {
            return value[prefix.len()..].to_string();
        }
    }

    value.to_string()
}

/// `[addr]` or `[addr]:port` → `addr`.
fn unwrap_bracketed(value: &str) -> Option<&str> {
    let rest = value.strip_prefix('[')?;
    let close = rest.find(']')?;
    let inner = &rest[..close];
    if inner.is_empty() {
        return None;
    }
    let tail = &rest[close + 1..];
    let port_ok = tail.is_empty()
        || tail
            .strip_prefix(':')
            .is_some_and(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()));
    port_ok.then_some(inner)
}

fn is_dotted_quad(value: &str) -> bool {
    let mut parts = 0;
    for part in value.split('.') {
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
        parts += 1;
    }
    parts == 4
}

/// Split a multi-valued header into normalized, non-empty entries.
pub fn parse_forwarded_for(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(normalize)
        .filter(|ip| !ip.is_empty())
        .collect()
}

// ── Classification ──────────────────────────────────────────────────

/// Whether an address is non-routable.
///
/// Anything that is not a recognizable private IPv6 prefix and not a
/// four-octet dotted address is treated as public.
pub fn is_private(raw: &str) -> bool {
    let value = normalize(raw);
    let lower = value.to_ascii_lowercase();

    if lower.is_empty() || lower == "::1" || lower == "localhost" {
        return true;
    }
    if lower.starts_with("fc") || lower.starts_with("fd") || lower.starts_with("fe80") {
        return true;
    }

    let octets: Vec<u32> = match lower.split('.').map(|p| p.parse::<u32>()).collect() {
        Ok(octets) => octets,
        Err(_) => return false,
    };
    let [a, b, _, _] = octets[..] else {
        return false;
    };

    a == 10 || a == 127 || (a == 192 && b == 168) || (a == 172 && (16..=31).contains(&b))
}

// ── Resolution ──────────────────────────────────────────────────────

/// Build the ordered candidate list from sources given in priority order.
pub fn collect_candidates<'a, I>(sources: I) -> Vec<AddressCandidate>
where
    I: IntoIterator<Item = AddressSource<'a>>,
{
    let mut candidates = Vec::new();
    for source in sources {
        let ips = match source.kind {
            SourceKind::Multi => parse_forwarded_for(source.value),
            SourceKind::Single => {
                let ip = normalize(source.value);
                if ip.is_empty() { vec![] } else { vec![ip] }
            }
        };
        candidates.extend(ips.into_iter().map(|ip| AddressCandidate {
            source: source.name.to_string(),
            ip,
        }));
    }
    candidates
}

/// Pick the first public candidate, else the first candidate at all.
pub fn select(candidates: Vec<AddressCandidate>) -> Resolution {
    let chosen = candidates
        .iter()
        .find(|c| !is_private(&c.ip))
        .or_else(|| candidates.first())
        .cloned();

    match chosen {
        Some(c) => Resolution {
            ip: c.ip,
            source: Some(c.source),
            candidates,
        },
        None => Resolution {
            candidates,
            ..Resolution::default()
        },
    }
}

/// Resolve the client address from proxy header values and the peer address.
///
/// `header` is looked up for every entry of [`HEADER_SOURCES`]; `peer` is
/// appended last as the `socket` source.
pub fn resolve_client_ip<'a, F>(header: F, peer: Option<&str>) -> Resolution
where
    F: Fn(&str) -> Option<&'a str>,
{
    let mut sources: Vec<AddressSource<'_>> = HEADER_SOURCES
        .iter()
        .filter_map(|&(name, kind)| {
            header(name)
                .filter(|v| !v.trim().is_empty())
                .map(|value| AddressSource { name, kind, value })
        })
        .collect();
    if let Some(peer) = peer {
        sources.push(AddressSource::single(SOCKET_SOURCE, peer));
    }
    select(collect_candidates(sources))
}
