//! Trust-boundary validation
//!
//! Every string that reaches the network or the disk passes through a
//! [`Validator`] first. A failed check never mutates the value under test;
//! it returns a [`ValidationError`] and appends a security-log event with a
//! truncated snippet of the offending value.

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use url::{Host, Url};

use crate::core::constants::{
    MAX_ADDRESS_LEN, MAX_FILENAME_LEN, MAX_MESSAGE_LEN, MAX_MODEL_NAME_LEN, MAX_REQUEST_BYTES,
};
use crate::core::security_log::SecurityLog;

const ALLOWED_SCHEMES: [&str; 2] = ["http", "https"];

/// Project-hosting suffixes accepted without consulting the hostname grammar.
const ALLOWED_HOST_SUFFIXES: [&str; 3] = ["github.com", "github.io", "githubusercontent.com"];

static DANGEROUS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<script[^>]*>.*?</script>|javascript:|data:|vbscript:|file://|[<>"']"#)
        .expect("dangerous-pattern regex is valid")
});

static MODEL_IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._:-]+$").expect("model regex is valid"));

static HOSTNAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?\.)*[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?$",
    )
    .expect("hostname regex is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationKind {
    Address,
    ModelIdentifier,
    Message,
    Path,
    Payload,
}

impl ValidationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ValidationKind::Address => "address",
            ValidationKind::ModelIdentifier => "model identifier",
            ValidationKind::Message => "message",
            ValidationKind::Path => "path",
            ValidationKind::Payload => "request payload",
        }
    }
}

impl fmt::Display for ValidationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    Empty,
    TooLong { len: usize, max: usize },
    Unparseable,
    DisallowedScheme(String),
    DangerousPattern,
    DisallowedHost(String),
    DisallowedCharacters,
    Traversal,
    OutsideStorageRoot,
}

impl RejectReason {
    /// Stable reason code used as the security-log category suffix.
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::Empty => "empty",
            RejectReason::TooLong { .. } => "too-long",
            RejectReason::Unparseable => "unparseable",
            RejectReason::DisallowedScheme(_) => "scheme",
            RejectReason::DangerousPattern => "dangerous-pattern",
            RejectReason::DisallowedHost(_) => "host",
            RejectReason::DisallowedCharacters => "characters",
            RejectReason::Traversal => "traversal",
            RejectReason::OutsideStorageRoot => "outside-root",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Empty => write!(f, "value is empty"),
            RejectReason::TooLong { len, max } => {
                write!(f, "length {len} exceeds the limit of {max}")
            }
            RejectReason::Unparseable => write!(f, "value could not be parsed"),
            RejectReason::DisallowedScheme(scheme) => {
                write!(f, "scheme '{scheme}' is not allowed")
            }
            RejectReason::DangerousPattern => write!(f, "value contains a blocked pattern"),
            RejectReason::DisallowedHost(host) => write!(f, "host '{host}' is not allowed"),
            RejectReason::DisallowedCharacters => {
                write!(f, "only letters, digits, '.', '_', ':' and '-' are allowed")
            }
            RejectReason::Traversal => write!(f, "path traversal is not allowed"),
            RejectReason::OutsideStorageRoot => {
                write!(f, "path resolves outside the storage directory")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind}: {reason}")]
pub struct ValidationError {
    pub kind: ValidationKind,
    pub reason: RejectReason,
}

pub type ValidationResult = Result<(), ValidationError>;

/// Validation service, constructed once at startup and shared by reference.
pub struct Validator {
    storage_root: PathBuf,
    log: SecurityLog,
}

impl Validator {
    pub fn new(storage_root: PathBuf, log: SecurityLog) -> Self {
        Validator { storage_root, log }
    }

    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    pub fn security_log(&self) -> &SecurityLog {
        &self.log
    }

    pub fn validate(&self, kind: ValidationKind, value: &str) -> ValidationResult {
        match kind {
            ValidationKind::Address => self.validate_address(value),
            ValidationKind::ModelIdentifier => self.validate_model_identifier(value),
            ValidationKind::Message => self.validate_message(value),
            ValidationKind::Path => self.resolve_path(value).map(|_| ()),
            ValidationKind::Payload => self.validate_payload_size(value.len(), value),
        }
    }

    pub fn validate_address(&self, value: &str) -> ValidationResult {
        check_address(value).map_err(|reason| self.reject(ValidationKind::Address, reason, value))
    }

    pub fn validate_model_identifier(&self, value: &str) -> ValidationResult {
        check_model_identifier(value)
            .map_err(|reason| self.reject(ValidationKind::ModelIdentifier, reason, value))
    }

    pub fn validate_message(&self, value: &str) -> ValidationResult {
        let len = value.chars().count();
        let outcome = if value.is_empty() {
            Err(RejectReason::Empty)
        } else if len > MAX_MESSAGE_LEN {
            Err(RejectReason::TooLong {
                len,
                max: MAX_MESSAGE_LEN,
            })
        } else if contains_dangerous_pattern(value) {
            Err(RejectReason::DangerousPattern)
        } else {
            Ok(())
        };
        outcome.map_err(|reason| self.reject(ValidationKind::Message, reason, value))
    }

    /// Guard against oversized request bodies. `context` is what gets logged.
    pub fn validate_payload_size(&self, len: usize, context: &str) -> ValidationResult {
        if len > MAX_REQUEST_BYTES {
            return Err(self.reject(
                ValidationKind::Payload,
                RejectReason::TooLong {
                    len,
                    max: MAX_REQUEST_BYTES,
                },
                context,
            ));
        }
        Ok(())
    }

    /// Resolve `value` against the storage root and confirm the result stays
    /// inside it. Relative paths are joined onto the root.
    pub fn resolve_path(&self, value: &str) -> Result<PathBuf, ValidationError> {
        let reject = |reason| self.reject(ValidationKind::Path, reason, value);

        if value.trim().is_empty() {
            return Err(reject(RejectReason::Empty));
        }
        let path = Path::new(value);
        if let Some(name) = path.file_name() {
            let len = name.to_string_lossy().chars().count();
            if len > MAX_FILENAME_LEN {
                return Err(reject(RejectReason::TooLong {
                    len,
                    max: MAX_FILENAME_LEN,
                }));
            }
        }
        if path
            .components()
            .any(|component| matches!(component, Component::ParentDir))
        {
            return Err(reject(RejectReason::Traversal));
        }

        let candidate = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.storage_root.join(path)
        };
        let root = canonicalize_lenient(&self.storage_root);
        let resolved = canonicalize_lenient(&candidate);
        if resolved == root || !resolved.starts_with(&root) {
            return Err(reject(RejectReason::OutsideStorageRoot));
        }
        Ok(resolved)
    }

    fn reject(&self, kind: ValidationKind, reason: RejectReason, value: &str) -> ValidationError {
        self.log
            .record(&format!("invalid {kind} ({})", reason.code()), value);
        ValidationError { kind, reason }
    }
}

fn check_address(value: &str) -> Result<(), RejectReason> {
    let len = value.chars().count();
    if value.is_empty() {
        return Err(RejectReason::Empty);
    }
    if len > MAX_ADDRESS_LEN {
        return Err(RejectReason::TooLong {
            len,
            max: MAX_ADDRESS_LEN,
        });
    }

    let url = Url::parse(value).map_err(|_| RejectReason::Unparseable)?;
    if !ALLOWED_SCHEMES.contains(&url.scheme()) {
        return Err(RejectReason::DisallowedScheme(url.scheme().to_string()));
    }
    if contains_dangerous_pattern(value) {
        return Err(RejectReason::DangerousPattern);
    }

    match url.host() {
        Some(Host::Domain(domain)) if is_allowed_domain(domain) => Ok(()),
        Some(Host::Ipv4(ip)) if ip.is_loopback() => Ok(()),
        // Dotted quads satisfy the label grammar
        Some(Host::Ipv4(ip)) if HOSTNAME.is_match(&ip.to_string()) => Ok(()),
        Some(Host::Ipv6(ip)) if ip.is_loopback() => Ok(()),
        Some(host) => Err(RejectReason::DisallowedHost(host.to_string())),
        None => Err(RejectReason::DisallowedHost(String::new())),
    }
}

fn is_allowed_domain(domain: &str) -> bool {
    let domain = domain.to_ascii_lowercase();
    if domain == "localhost" {
        return true;
    }
    if ALLOWED_HOST_SUFFIXES
        .iter()
        .any(|suffix| domain == *suffix || domain.ends_with(&format!(".{suffix}")))
    {
        return true;
    }
    HOSTNAME.is_match(&domain)
}

fn check_model_identifier(value: &str) -> Result<(), RejectReason> {
    let len = value.chars().count();
    if len == 0 {
        return Err(RejectReason::Empty);
    }
    if len > MAX_MODEL_NAME_LEN {
        return Err(RejectReason::TooLong {
            len,
            max: MAX_MODEL_NAME_LEN,
        });
    }
    if !MODEL_IDENTIFIER.is_match(value) {
        return Err(RejectReason::DisallowedCharacters);
    }
    Ok(())
}

/// Pure predicate form of model-identifier validation; does not log.
pub fn is_valid_model_identifier(value: &str) -> bool {
    check_model_identifier(value).is_ok()
}

pub fn contains_dangerous_pattern(text: &str) -> bool {
    DANGEROUS_PATTERN.is_match(text)
}

/// Accept a value in degraded form: strip control characters (newlines and
/// tabs survive) and truncate to the message length ceiling.
pub fn sanitize(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .take(MAX_MESSAGE_LEN)
        .collect()
}

/// Canonicalize the longest existing ancestor of `path` and re-append the
/// components that do not exist yet.
fn canonicalize_lenient(path: &Path) -> PathBuf {
    let mut existing = path;
    let mut rest = Vec::new();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            return rest
                .iter()
                .rev()
                .fold(canonical, |acc: PathBuf, part| acc.join(part));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name.to_os_string());
                existing = parent;
            }
            _ => return path.to_path_buf(),
        }
    }
}
