use crate::error::RouteError;
use regex::Regex;
use std::collections::HashMap;
use std::sync::RwLock;

enum Bucket {
    Exact,
    Suffix,
    Prefix,
    Regexp(Box<Regex>),
}

/// A registry of host patterns, each owning one value (the app stores a
/// router per host).
///
/// Patterns are classified at registration into four buckets and matched
/// with a fixed precedence, regardless of registration order:
///
/// 1. exact domains (`www.example.com`), looked up on the request host
///    stripped of its port;
/// 2. suffix wildcards (`*.example.com`), scanned linearly;
/// 3. prefix wildcards (`example.*`), scanned linearly;
/// 4. regular expressions (anything else), scanned in registration order;
///    the first match wins.
///
/// # Examples
/// ```rust
/// let mut hosts = vessel::HostManager::new();
/// hosts.add("*.example.com", 1).unwrap();
/// hosts.add("api.example.com", 2).unwrap();
/// assert_eq!(hosts.find("api.example.com:8080"), Some(&2));
/// assert_eq!(hosts.find("www.example.com"), Some(&1));
/// assert_eq!(hosts.find("other.test"), None);
/// ```
pub struct HostManager<T> {
    exact: HashMap<String, T>,
    suffixes: Vec<(String, T)>,
    prefixes: Vec<(String, T)>,
    regexps: Vec<(String, Regex, T)>,
}

impl<T> HostManager<T> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        HostManager {
            exact: HashMap::new(),
            suffixes: Vec::new(),
            prefixes: Vec::new(),
            regexps: Vec::new(),
        }
    }

    /// The number of registered patterns.
    pub fn len(&self) -> usize {
        self.exact.len() + self.suffixes.len() + self.prefixes.len() + self.regexps.len()
    }

    /// Whether no pattern is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registers `value` under `pattern`, returning a reference to the
    /// stored value.  Re-adding an existing pattern is idempotent: the
    /// existing value is returned unchanged and `value` is dropped.
    pub fn add(&mut self, pattern: &str, value: T) -> Result<&mut T, RouteError> {
        self.entry(pattern, move || value)
    }

    /// Like [`HostManager::add`], constructing the value only when the
    /// pattern is new.
    pub fn entry<F: FnOnce() -> T>(
        &mut self,
        pattern: &str,
        make: F,
    ) -> Result<&mut T, RouteError> {
        match classify(pattern)? {
            Bucket::Exact => Ok(self
                .exact
                .entry(pattern.to_owned())
                .or_insert_with(make)),
            Bucket::Suffix => {
                let i = match self.suffixes.iter().position(|(p, _)| p == pattern) {
                    Some(i) => i,
                    None => {
                        self.suffixes.push((pattern.to_owned(), make()));
                        self.suffixes.len() - 1
                    }
                };
                Ok(&mut self.suffixes[i].1)
            }
            Bucket::Prefix => {
                let i = match self.prefixes.iter().position(|(p, _)| p == pattern) {
                    Some(i) => i,
                    None => {
                        self.prefixes.push((pattern.to_owned(), make()));
                        self.prefixes.len() - 1
                    }
                };
                Ok(&mut self.prefixes[i].1)
            }
            Bucket::Regexp(regex) => {
                let i = match self.regexps.iter().position(|(p, _, _)| p == pattern) {
                    Some(i) => i,
                    None => {
                        self.regexps.push((pattern.to_owned(), *regex, make()));
                        self.regexps.len() - 1
                    }
                };
                Ok(&mut self.regexps[i].2)
            }
        }
    }

    /// Removes a pattern, returning its value.
    pub fn remove(&mut self, pattern: &str) -> Option<T> {
        if let Some(value) = self.exact.remove(pattern) {
            return Some(value);
        }
        if let Some(i) = self.suffixes.iter().position(|(p, _)| p == pattern) {
            return Some(self.suffixes.remove(i).1);
        }
        if let Some(i) = self.prefixes.iter().position(|(p, _)| p == pattern) {
            return Some(self.prefixes.remove(i).1);
        }
        if let Some(i) = self.regexps.iter().position(|(p, _, _)| p == pattern) {
            return Some(self.regexps.remove(i).2);
        }
        None
    }

    /// Selects the value for a request host, applying the bucket precedence.
    /// The host is stripped of its port (including the `[..]:port` IPv6
    /// form) first.
    pub fn find(&self, host: &str) -> Option<&T> {
        self.find_entry(host).map(|(_, value)| value)
    }

    /// Like [`HostManager::find`], also returning the pattern that matched.
    pub fn find_entry(&self, host: &str) -> Option<(&str, &T)> {
        let host = strip_port(host);
        if let Some((pattern, value)) = self.exact.get_key_value(host) {
            return Some((pattern.as_str(), value));
        }
        for (pattern, value) in &self.suffixes {
            if host.ends_with(&pattern[1..]) {
                return Some((pattern.as_str(), value));
            }
        }
        for (pattern, value) in &self.prefixes {
            if host.starts_with(&pattern[..pattern.len() - 1]) {
                return Some((pattern.as_str(), value));
            }
        }
        for (pattern, regex, value) in &self.regexps {
            if regex.is_match(host) {
                return Some((pattern.as_str(), value));
            }
        }
        None
    }

    /// The value registered under exactly this pattern, if any.  Unlike
    /// [`HostManager::find`], no matching is involved.
    pub fn pattern_mut(&mut self, pattern: &str) -> Option<&mut T> {
        if self.exact.contains_key(pattern) {
            return self.exact.get_mut(pattern);
        }
        if let Some(i) = self.suffixes.iter().position(|(p, _)| p == pattern) {
            return Some(&mut self.suffixes[i].1);
        }
        if let Some(i) = self.prefixes.iter().position(|(p, _)| p == pattern) {
            return Some(&mut self.prefixes[i].1);
        }
        if let Some(i) = self.regexps.iter().position(|(p, _, _)| p == pattern) {
            return Some(&mut self.regexps[i].2);
        }
        None
    }

    /// Iterates mutably over every registered value.
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.exact
            .values_mut()
            .chain(self.suffixes.iter_mut().map(|(_, v)| v))
            .chain(self.prefixes.iter_mut().map(|(_, v)| v))
            .chain(self.regexps.iter_mut().map(|(_, _, v)| v))
    }

    /// Iterates over every `(pattern, value)` pair, bucket by bucket.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.exact
            .iter()
            .map(|(p, v)| (p.as_str(), v))
            .chain(self.suffixes.iter().map(|(p, v)| (p.as_str(), v)))
            .chain(self.prefixes.iter().map(|(p, v)| (p.as_str(), v)))
            .chain(self.regexps.iter().map(|(p, _, v)| (p.as_str(), v)))
    }
}

impl<T> Default for HostManager<T> {
    fn default() -> Self {
        HostManager::new()
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for HostManager<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostManager")
            .field("exact", &self.exact)
            .field("suffixes", &self.suffixes)
            .field("prefixes", &self.prefixes)
            .field(
                "regexps",
                &self
                    .regexps
                    .iter()
                    .map(|(p, _, v)| (p, v))
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// A read/write-lock decorator around [`HostManager`] for runtime
/// reconfiguration: reads run concurrently, writes exclusively.
///
/// Resolution clones the stored value out (the intended use is `T =
/// Arc<..>`), so the lock is held only long enough to resolve the host and
/// never during handler execution.
#[derive(Debug)]
pub struct SyncHostManager<T> {
    inner: RwLock<HostManager<T>>,
}

impl<T: Clone> SyncHostManager<T> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        SyncHostManager {
            inner: RwLock::new(HostManager::new()),
        }
    }

    /// Registers `value` under `pattern`.  Idempotent like
    /// [`HostManager::add`]; takes the write lock.
    pub fn add(&self, pattern: &str, value: T) -> Result<(), RouteError> {
        let mut inner = self.inner.write().expect("host manager poisoned");
        inner.add(pattern, value).map(|_| ())
    }

    /// Removes a pattern under the write lock, returning its value.
    pub fn remove(&self, pattern: &str) -> Option<T> {
        let mut inner = self.inner.write().expect("host manager poisoned");
        inner.remove(pattern)
    }

    /// Resolves a host under the read lock; the lock is released before
    /// this returns.
    pub fn find(&self, host: &str) -> Option<T> {
        let inner = self.inner.read().expect("host manager poisoned");
        inner.find(host).cloned()
    }

    /// The number of registered patterns.
    pub fn len(&self) -> usize {
        self.inner.read().expect("host manager poisoned").len()
    }

    /// Whether no pattern is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone> Default for SyncHostManager<T> {
    fn default() -> Self {
        SyncHostManager::new()
    }
}

impl<T> From<HostManager<T>> for SyncHostManager<T> {
    fn from(inner: HostManager<T>) -> Self {
        SyncHostManager {
            inner: RwLock::new(inner),
        }
    }
}

fn classify(pattern: &str) -> Result<Bucket, RouteError> {
    if let Some(rest) = pattern.strip_prefix("*.") {
        if is_domain(rest) {
            return Ok(Bucket::Suffix);
        }
    } else if let Some(rest) = pattern.strip_suffix(".*") {
        if is_domain(rest) {
            return Ok(Bucket::Prefix);
        }
    } else if is_domain(pattern) {
        return Ok(Bucket::Exact);
    }
    match Regex::new(pattern) {
        Ok(regex) => Ok(Bucket::Regexp(Box::new(regex))),
        Err(source) => Err(RouteError::InvalidHostPattern {
            pattern: pattern.to_owned(),
            source,
        }),
    }
}

/// Checks a string against RFC 1035/3696 domain rules, extended with
/// underscore labels: total length at most 253 (254 with a lone trailing
/// dot), labels of 1..=63 bytes from `[A-Za-z0-9_-]`, no label starting or
/// ending with `-`, and at least one non-digit byte somewhere (a
/// pure-numeric host is an address, not a domain).
pub(crate) fn is_domain(s: &str) -> bool {
    if s.is_empty() {
        return false;
    }
    let (body, max) = match s.strip_suffix('.') {
        Some(body) => (body, 254),
        None => (s, 253),
    };
    if s.len() > max || body.is_empty() {
        return false;
    }
    let mut has_nondigit = false;
    for label in body.split('.') {
        if label.is_empty() || label.len() > 63 {
            return false;
        }
        if label.starts_with('-') || label.ends_with('-') {
            return false;
        }
        for &b in label.as_bytes() {
            match b {
                b'a'..=b'z' | b'A'..=b'Z' | b'_' | b'-' => has_nondigit = true,
                b'0'..=b'9' => {}
                _ => return false,
            }
        }
    }
    has_nondigit
}

/// Drops the port from a host, keeping the brackets of an IPv6 literal:
/// `example.com:8080` becomes `example.com` and `[::1]:8080` becomes
/// `[::1]`.
pub(crate) fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        match host.find(']') {
            Some(i) => &host[..=i],
            None => host,
        }
    } else {
        match host.rfind(':') {
            Some(i) if host[i + 1..].bytes().all(|b| b.is_ascii_digit()) => &host[..i],
            _ => host,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domains() {
        assert!(is_domain("example.com"));
        assert!(is_domain("www.example.com."));
        assert!(is_domain("under_score.example.com"));
        assert!(is_domain("xn--bcher-kva.example"));
        assert!(is_domain("localhost"));
        assert!(!is_domain(""));
        assert!(!is_domain("."));
        assert!(!is_domain("exa mple.com"));
        assert!(!is_domain("-leading.example.com"));
        assert!(!is_domain("trailing-.example.com"));
        assert!(!is_domain("127.0.0.1"));
        assert!(!is_domain(&"a".repeat(64)));
        assert!(!is_domain(&format!("{}.com", "a.".repeat(130))));
    }

    #[test]
    fn ports_are_stripped() {
        assert_eq!(strip_port("example.com:8080"), "example.com");
        assert_eq!(strip_port("example.com"), "example.com");
        assert_eq!(strip_port("[::1]:8080"), "[::1]");
        assert_eq!(strip_port("[2001:db8::1]"), "[2001:db8::1]");
        // A non-numeric tail is not a port.
        assert_eq!(strip_port("odd:host"), "odd:host");
    }

    #[test]
    fn classification_and_precedence() {
        let mut hosts = HostManager::new();
        hosts.add("www.example.com", "exact").unwrap();
        hosts.add("*.example.com", "suffix").unwrap();
        hosts.add("example.*", "prefix").unwrap();
        hosts.add(r"ex.+\.org", "regexp").unwrap();

        // Exact wins even though the suffix pattern also matches.
        assert_eq!(hosts.find("www.example.com"), Some(&"exact"));
        assert_eq!(hosts.find("api.example.com"), Some(&"suffix"));
        // The suffix scan needs a subdomain; "example.org" falls through to
        // the prefix bucket.
        assert_eq!(hosts.find("example.org"), Some(&"prefix"));
        assert_eq!(hosts.find("extra.org"), Some(&"regexp"));
        assert_eq!(hosts.find("nothing.test"), None);
    }

    #[test]
    fn exact_lookup_ignores_port() {
        let mut hosts = HostManager::new();
        hosts.add("example.com", 1).unwrap();
        assert_eq!(hosts.find("example.com:443"), Some(&1));
    }

    #[test]
    fn re_add_returns_existing() {
        let mut hosts = HostManager::new();
        hosts.add("example.com", 1).unwrap();
        let kept = hosts.add("example.com", 2).unwrap();
        assert_eq!(*kept, 1);
        assert_eq!(hosts.len(), 1);
    }

    #[test]
    fn regexps_match_in_registration_order() {
        let mut hosts = HostManager::new();
        hosts.add(r".*\.a\.test", "first").unwrap();
        hosts.add(r"x\..*\.test", "second").unwrap();

        // Both patterns match; registration order decides.
        assert_eq!(hosts.find("x.a.test"), Some(&"first"));
        assert_eq!(hosts.find("x.b.test"), Some(&"second"));
    }

    #[test]
    fn invalid_regexp_is_rejected() {
        let mut hosts = HostManager::new();
        let err = hosts.add("((", 0).unwrap_err();
        assert!(matches!(err, RouteError::InvalidHostPattern { .. }));
    }

    #[test]
    fn remove_frees_the_pattern() {
        let mut hosts = HostManager::new();
        hosts.add("*.example.com", 1).unwrap();
        assert_eq!(hosts.remove("*.example.com"), Some(1));
        assert_eq!(hosts.find("a.example.com"), None);
        assert!(hosts.is_empty());
    }

    #[test]
    fn sync_decorator_clones_out() {
        use std::sync::Arc;

        let hosts = SyncHostManager::new();
        hosts.add("*.example.com", Arc::new(7)).unwrap();
        let found = hosts.find("api.example.com").unwrap();
        assert_eq!(*found, 7);

        // Reconfiguration after serving has started.
        hosts.add("other.test", Arc::new(9)).unwrap();
        assert_eq!(hosts.len(), 2);
        assert_eq!(*hosts.find("other.test").unwrap(), 9);
        hosts.remove("other.test");
        assert!(hosts.find("other.test").is_none());
    }
}
