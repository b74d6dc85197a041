//! URL helpers for building inference-server endpoints
//!
//! The configured base address may carry a trailing slash; endpoint paths
//! may carry a leading one. Joining them must never produce `//`.

/// Normalize a base URL by removing trailing slashes
///
/// # Examples
///
/// ```
/// use shama::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("http://localhost:11434"), "http://localhost:11434");
/// assert_eq!(normalize_base_url("http://localhost:11434/"), "http://localhost:11434");
/// assert_eq!(normalize_base_url("http://localhost:11434///"), "http://localhost:11434");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Construct a complete API endpoint URL from a base URL and endpoint path
///
/// # Examples
///
/// ```
/// use shama::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("http://localhost:11434", "api/chat"),
///     "http://localhost:11434/api/chat"
/// );
/// assert_eq!(
///     construct_api_url("http://localhost:11434/", "/api/tags"),
///     "http://localhost:11434/api/tags"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    format!("{}/{}", normalized_base, endpoint)
}
