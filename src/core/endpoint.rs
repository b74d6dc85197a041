use std::fmt;

use crate::core::validator::{ValidationError, Validator};
use crate::utils::url::{construct_api_url, normalize_base_url};

/// Validated base address of the inference server.
///
/// The only way to obtain one is [`Endpoint::parse`], so holding an
/// `Endpoint` means the address already passed address validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    base: String,
}

impl Endpoint {
    pub fn parse(value: &str, validator: &Validator) -> Result<Self, ValidationError> {
        let value = value.trim();
        validator.validate_address(value)?;
        Ok(Endpoint {
            base: normalize_base_url(value),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.base
    }

    pub fn api_url(&self, path: &str) -> String {
        construct_api_url(&self.base, path)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::security_log::SecurityLog;
    use crate::core::validator::ValidationKind;
    use tempfile::tempdir;

    #[test]
    fn parse_normalizes_and_builds_api_urls() {
        let dir = tempdir().expect("tempdir");
        let validator = Validator::new(dir.path().to_path_buf(), SecurityLog::disabled());

        let endpoint = Endpoint::parse(" http://localhost:11434/ ", &validator).expect("valid");
        assert_eq!(endpoint.as_str(), "http://localhost:11434");
        assert_eq!(endpoint.api_url("api/tags"), "http://localhost:11434/api/tags");
        assert_eq!(endpoint.to_string(), "http://localhost:11434");
    }

    #[test]
    fn parse_rejects_invalid_addresses_and_logs_them() {
        let dir = tempdir().expect("tempdir");
        let log_path = dir.path().join("security.log");
        let validator = Validator::new(dir.path().to_path_buf(), SecurityLog::new(log_path));

        for address in ["ftp://host", "javascript:alert(1)", "http://bad_host!"] {
            let err = Endpoint::parse(address, &validator).expect_err("rejected");
            assert_eq!(err.kind, ValidationKind::Address);
        }
        let events = validator.security_log().events().expect("events");
        assert_eq!(events.len(), 3);
    }
}
