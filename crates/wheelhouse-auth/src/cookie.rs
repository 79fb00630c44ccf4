//! Cookie helpers.

use crate::{Error, Result};
use httpdate::fmt_http_date;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// SameSite attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    /// SameSite=Strict
    Strict,
    /// SameSite=Lax
    Lax,
    /// SameSite=None
    None,
}

impl SameSite {
    fn as_str(self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

/// Everything about a session cookie except its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieOptions {
    /// Cookie name.
    pub name: String,

    /// Cookie path.
    pub path: String,

    /// Optional cookie domain.
    pub domain: Option<String>,

    /// Send on HTTPS only.
    pub secure: bool,

    /// Not accessible to JS.
    pub http_only: bool,

    /// SameSite attribute.
    pub same_site: SameSite,

    /// Max-Age in seconds.
    pub max_age_seconds: Option<u64>,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            name: "access_token".to_string(),
            path: "/".to_string(),
            domain: None,
            secure: true,
            http_only: true,
            same_site: SameSite::Lax,
            max_age_seconds: None,
        }
    }
}

impl CookieOptions {
    /// HttpOnly, Secure, SameSite=Lax cookie named `name` scoped to `path`.
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    /// Set Max-Age.
    #[must_use]
    pub fn with_max_age(mut self, seconds: u64) -> Self {
        self.max_age_seconds = Some(seconds);
        self
    }

    /// Set (or clear) the Domain attribute.
    #[must_use]
    pub fn with_domain(mut self, domain: Option<String>) -> Self {
        self.domain = domain;
        self
    }

    /// Toggle the Secure flag. Only plain-HTTP local development should turn it off.
    #[must_use]
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }
}

/// Build a `Set-Cookie` header value.
pub fn build_set_cookie(value: &str, opts: &CookieOptions) -> Result<String> {
    serialize(value, opts.max_age_seconds, opts)
}

/// Build a `Set-Cookie` header value that clears the cookie: same name, path and
/// flags, empty value and `Max-Age=0`.
pub fn build_clear_cookie(opts: &CookieOptions) -> Result<String> {
    serialize("", Some(0), opts)
}

fn serialize(value: &str, max_age: Option<u64>, opts: &CookieOptions) -> Result<String> {
    if opts.name.is_empty() || !opts.name.chars().all(is_token_char) {
        return Err(Error::InvalidCookie(format!("bad name {:?}", opts.name)));
    }
    if !value.chars().all(is_cookie_octet) {
        return Err(Error::InvalidCookie(format!(
            "value for {} contains reserved characters",
            opts.name
        )));
    }

    let mut parts: Vec<String> = Vec::new();
    parts.push(format!("{}={value}", opts.name));
    parts.push(format!("Path={}", opts.path));

    if let Some(domain) = &opts.domain {
        parts.push(format!("Domain={domain}"));
    }

    if opts.secure {
        parts.push("Secure".to_string());
    }
    if opts.http_only {
        parts.push("HttpOnly".to_string());
    }

    parts.push(format!("SameSite={}", opts.same_site.as_str()));

    match max_age {
        Some(0) => {
            parts.push("Max-Age=0".to_string());
            parts.push(format!("Expires={}", fmt_http_date(UNIX_EPOCH)));
        }
        Some(max_age) => {
            parts.push(format!("Max-Age={max_age}"));
            // Expires for older clients.
            let expires = SystemTime::now() + Duration::from_secs(max_age);
            parts.push(format!("Expires={}", fmt_http_date(expires)));
        }
        None => {}
    }

    Ok(parts.join("; "))
}

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(c)
}

fn is_cookie_octet(c: char) -> bool {
    c.is_ascii_graphic() && !matches!(c, '"' | ',' | ';' | '\\')
}

/// A cookie read back from a `Cookie` (or echoed `Set-Cookie`) header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCookie {
    /// Cookie name.
    pub name: String,
    /// Cookie value, unquoted.
    pub value: String,
    /// Max-Age, when the header carried one.
    pub max_age: Option<u64>,
}

const ATTRIBUTES: [&str; 7] = [
    "path", "domain", "max-age", "expires", "samesite", "secure", "httponly",
];

/// Parse a cookie header.
///
/// Attribute pairs (`Max-Age`, `Path`, ...) attach to the cookie before them instead
/// of being read as cookies of their own.
pub fn parse_cookie_header(header: &str) -> Vec<ParsedCookie> {
    let mut cookies: Vec<ParsedCookie> = Vec::new();
    for pair in header.split(';') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
        let name = name.trim();
        let value = value.trim();
        let lower = name.to_ascii_lowercase();

        if ATTRIBUTES.contains(&lower.as_str()) {
            if lower == "max-age" {
                if let Some(last) = cookies.last_mut() {
                    last.max_age = value.parse().ok();
                }
            }
            continue;
        }
        if name.is_empty() || !pair.contains('=') {
            continue;
        }
        cookies.push(ParsedCookie {
            name: name.to_string(),
            value: value.trim_matches('"').to_string(),
            max_age: None,
        });
    }
    cookies
}

/// First cookie named `name` in `header`.
pub fn find_cookie(header: &str, name: &str) -> Option<ParsedCookie> {
    parse_cookie_header(header)
        .into_iter()
        .find(|c| c.name == name)
}
