use chrono::{DateTime, Utc};
use std::collections::HashMap;
use url::Url;

/// A cookie received through `Set-Cookie`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub expires: Option<DateTime<Utc>>,
}

impl Cookie {
    /// Parses a single `Set-Cookie` header value
    ///
    /// Returns None if the header has no `name=value` pair. Unparseable
    /// `Expires` attributes are ignored, leaving the cookie session-scoped.
    pub fn parse(header: &str) -> Option<Self> {
        let mut parts = header.split(';').map(str::trim);
        let (name, value) = parts.next()?.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let mut cookie = Cookie {
            name: name.to_string(),
            value: value.trim().to_string(),
            domain: None,
            path: None,
            expires: None,
        };

        for attribute in parts {
            let (attr_name, attr_value) = match attribute.split_once('=') {
                Some((n, v)) => (n.trim(), v.trim()),
                None => (attribute, ""),
            };
            match attr_name.to_ascii_lowercase().as_str() {
                "domain" => cookie.domain = Some(attr_value.to_string()),
                "path" => cookie.path = Some(attr_value.to_string()),
                "expires" => cookie.expires = parse_cookie_date(attr_value),
                _ => {}
            }
        }

        Some(cookie)
    }

    /// Returns true if the cookie carries an expiry at or before `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.map(|e| e <= now).unwrap_or(false)
    }
}

/// Parses the date formats seen in `Expires` attributes
///
/// Handles the RFC 1123 form (`Wed, 21 Oct 2015 07:28:00 GMT`) and the
/// legacy dashed form (`Wed, 21-Oct-2015 07:28:00 GMT`).
fn parse_cookie_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .or_else(|_| DateTime::parse_from_rfc2822(&value.replace('-', " ")))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Cookie jar plus the referer anchor for one crawl stream
///
/// Referer chaining only makes sense for strictly sequential requests, so a
/// session is owned by exactly one [`crate::crawler::AdaptiveFetcher`].
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    /// Cookies keyed by name; the latest `Set-Cookie` for a name wins
    cookies: HashMap<String, Cookie>,

    /// URL of the most recent successful document fetch
    last_url: Option<String>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores cookies from a response's `Set-Cookie` headers
    pub fn absorb<'a, I>(&mut self, set_cookie_headers: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.absorb_at(set_cookie_headers, Utc::now());
    }

    /// Same as [`SessionState::absorb`] with an explicit clock
    ///
    /// A cookie arriving already expired evicts any stored cookie of the same name.
    pub fn absorb_at<'a, I>(&mut self, set_cookie_headers: I, now: DateTime<Utc>)
    where
        I: IntoIterator<Item = &'a str>,
    {
        for header in set_cookie_headers {
            let Some(cookie) = Cookie::parse(header) else {
                tracing::debug!("Ignoring malformed Set-Cookie header: {}", header);
                continue;
            };

            if cookie.is_expired(now) {
                self.cookies.remove(&cookie.name);
            } else {
                self.cookies.insert(cookie.name.clone(), cookie);
            }
        }
    }

    /// Builds the `Cookie` request header, or None if the jar is empty
    pub fn cookie_header(&mut self) -> Option<String> {
        self.cookie_header_at(Utc::now())
    }

    /// Same as [`SessionState::cookie_header`] with an explicit clock
    ///
    /// Expired cookies are evicted lazily here. Pairs are sorted by name so
    /// the header is stable across calls.
    pub fn cookie_header_at(&mut self, now: DateTime<Utc>) -> Option<String> {
        self.cookies.retain(|_, cookie| !cookie.is_expired(now));

        if self.cookies.is_empty() {
            return None;
        }

        let mut pairs: Vec<_> = self
            .cookies
            .values()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect();
        pairs.sort();
        Some(pairs.join("; "))
    }

    /// Returns the referer to send with a request for `url`
    ///
    /// The last successfully fetched URL when there is one, otherwise the
    /// origin of `url` itself.
    pub fn referer_for(&self, url: &Url) -> Option<String> {
        if let Some(last) = &self.last_url {
            return Some(last.clone());
        }

        let origin = url.origin();
        if origin.is_tuple() {
            Some(format!("{}/", origin.ascii_serialization()))
        } else {
            None
        }
    }

    /// `Sec-Fetch-Site` value matching the referer chain
    pub fn fetch_site(&self) -> &'static str {
        if self.last_url.is_some() {
            "same-origin"
        } else {
            "none"
        }
    }

    /// Moves the referer anchor to `url` after a successful fetch
    pub fn record_success(&mut self, url: &str) {
        self.last_url = Some(url.to_string());
    }

    pub fn last_url(&self) -> Option<&str> {
        self.last_url.as_deref()
    }

    pub fn cookie(&self, name: &str) -> Option<&Cookie> {
        self.cookies.get(name)
    }

    pub fn cookie_count(&self) -> usize {
        self.cookies.len()
    }
}
