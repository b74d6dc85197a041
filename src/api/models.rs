use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::api::TagEntry;

/// A model installed on the inference server, as reported by `/api/tags`.
///
/// Descriptors are never mutated; a refresh replaces the whole list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDescriptor {
    pub name: String,
    pub size: u64,
    pub modified_at: Option<DateTime<FixedOffset>>,
    pub digest: Option<String>,
    pub family: Option<String>,
    pub format: Option<String>,
    pub parent_model: Option<String>,
    pub parameter_size: Option<String>,
    pub quantization_level: Option<String>,
}

impl ModelDescriptor {
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        ModelDescriptor {
            name: name.into(),
            size,
            modified_at: None,
            digest: None,
            family: None,
            format: None,
            parent_model: None,
            parameter_size: None,
            quantization_level: None,
        }
    }

    /// Name without the `:tag` suffix.
    pub fn base_name(&self) -> &str {
        self.name.split(':').next().unwrap_or(&self.name)
    }

    /// Tag after the colon; Ollama treats a bare name as `latest`.
    pub fn tag(&self) -> &str {
        self.name
            .split_once(':')
            .map(|(_, tag)| tag)
            .unwrap_or("latest")
    }

    pub fn short_digest(&self) -> &str {
        match &self.digest {
            Some(digest) => digest.get(..20).unwrap_or(digest),
            None => "N/A",
        }
    }

    pub fn modified_date(&self) -> String {
        self.modified_at
            .map(|at| at.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "Unknown".to_string())
    }
}

impl From<TagEntry> for ModelDescriptor {
    fn from(entry: TagEntry) -> Self {
        let modified_at = entry
            .modified_at
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok());
        let details = entry.details.unwrap_or_default();
        ModelDescriptor {
            name: entry.name,
            size: entry.size,
            modified_at,
            digest: entry.digest.filter(|digest| !digest.is_empty()),
            family: details.family,
            format: details.format,
            parent_model: details.parent_model.filter(|parent| !parent.is_empty()),
            parameter_size: details.parameter_size,
            quantization_level: details.quantization_level,
        }
    }
}

/// Decode one raw `/api/tags` entry. Entries that do not decode yield `None`.
pub fn decode_tag_entry(value: &Value) -> Option<ModelDescriptor> {
    match TagEntry::deserialize(value) {
        Ok(entry) => Some(entry.into()),
        Err(err) => {
            debug!(error = %err, "skipping undecodable model descriptor");
            None
        }
    }
}

pub fn sort_models(models: &mut [ModelDescriptor]) {
    // Newest first; undated models go last, ties fall back to name
    models.sort_by(|a, b| match (&a.modified_at, &b.modified_at) {
        (Some(a_at), Some(b_at)) => b_at.cmp(a_at).then_with(|| a.name.cmp(&b.name)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.name.cmp(&b.name),
    });
}

pub fn format_size(bytes: u64) -> String {
    const MB: f64 = 1024.0 * 1024.0;
    const GB: f64 = MB * 1024.0;
    let bytes = bytes as f64;
    if bytes >= GB {
        format!("{:.2} GB", bytes / GB)
    } else {
        format!("{:.1} MB", bytes / MB)
    }
}

/// Human-readable report for a set of models: size, date, digest, lineage
/// and a total.
pub fn model_info_report(models: &[&ModelDescriptor]) -> String {
    let mut report = String::from("Model Information Report\n");
    report.push_str(&"=".repeat(50));
    report.push_str("\n\n");

    for model in models {
        report.push_str(&format!("{}\n", model.name));
        report.push_str(&format!(
            "   Size: {} ({} bytes)\n",
            format_size(model.size),
            model.size
        ));
        report.push_str(&format!("   Modified: {}\n", model.modified_date()));
        report.push_str(&format!("   Digest: {}\n", model.short_digest()));
        report.push_str(&format!(
            "   Parent: {}\n",
            model.parent_model.as_deref().unwrap_or("N/A")
        ));
        report.push_str(&format!(
            "   Format: {}\n",
            model.format.as_deref().unwrap_or("N/A")
        ));
        report.push_str(&format!(
            "   Family: {}\n",
            model.family.as_deref().unwrap_or("N/A")
        ));
        report.push_str(&format!(
            "   Parameters: {}\n",
            model.parameter_size.as_deref().unwrap_or("N/A")
        ));
        report.push_str(&format!(
            "   Quantization: {}\n\n",
            model.quantization_level.as_deref().unwrap_or("N/A")
        ));
    }

    let total: u64 = models.iter().map(|model| model.size).sum();
    report.push_str("Summary:\n");
    report.push_str(&format!("   Selected Models: {}\n", models.len()));
    report.push_str(&format!("   Total Size: {}\n", format_size(total)));
    report
}

/// Group `selected` by base name and list how many installed variants
/// (`name:tag`) share it.
pub fn tag_report(selected: &[&ModelDescriptor], installed: &[ModelDescriptor]) -> String {
    let mut report = String::new();
    for model in selected {
        let variants: Vec<&str> = installed
            .iter()
            .filter(|other| other.base_name() == model.base_name())
            .map(|other| other.tag())
            .collect();
        report.push_str(&format!("{}:{}", model.base_name(), model.tag()));
        if variants.len() > 1 {
            report.push_str(&format!(
                "  ({} variants: {})",
                variants.len(),
                variants.join(", ")
            ));
        }
        report.push('\n');
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dated(name: &str, modified: &str) -> ModelDescriptor {
        ModelDescriptor {
            modified_at: Some(DateTime::parse_from_rfc3339(modified).expect("valid date")),
            ..ModelDescriptor::new(name, 0)
        }
    }

    #[test]
    fn tag_entries_decode_into_descriptors() {
        let value = json!({
            "name": "llama2:7b",
            "size": 3_826_793_677u64,
            "modified_at": "2024-05-01T10:20:30.123456789-07:00",
            "digest": "78e26419b4469263f75331927a00a0284ef6544c1975b826b15abdaef17bb962",
            "details": {
                "family": "llama",
                "format": "gguf",
                "parent_model": "",
                "parameter_size": "7B",
                "quantization_level": "Q4_0"
            }
        });
        let model = decode_tag_entry(&value).expect("decodes");
        assert_eq!(model.name, "llama2:7b");
        assert_eq!(model.base_name(), "llama2");
        assert_eq!(model.tag(), "7b");
        assert_eq!(model.modified_date(), "2024-05-01");
        assert_eq!(model.short_digest(), "78e26419b4469263f753");
        assert_eq!(model.family.as_deref(), Some("llama"));
        assert_eq!(model.parent_model, None);
        assert_eq!(model.parameter_size.as_deref(), Some("7B"));
        assert_eq!(model.quantization_level.as_deref(), Some("Q4_0"));
    }

    #[test]
    fn malformed_entries_are_skipped() {
        assert!(decode_tag_entry(&json!({"name": "x", "size": "huge"})).is_none());
        assert!(decode_tag_entry(&json!("just a string")).is_none());
        // Missing name decodes to an empty name, which validation rejects later
        assert_eq!(decode_tag_entry(&json!({"size": 1})).expect("decodes").name, "");
    }

    #[test]
    fn bare_names_default_to_latest_tag() {
        let model = ModelDescriptor::new("mistral", 0);
        assert_eq!(model.base_name(), "mistral");
        assert_eq!(model.tag(), "latest");
        assert_eq!(model.short_digest(), "N/A");
        assert_eq!(model.modified_date(), "Unknown");
    }

    #[test]
    fn sort_models_puts_newest_first_and_undated_last() {
        let mut models = vec![
            ModelDescriptor::new("zeta", 0),
            dated("old", "2023-01-01T00:00:00Z"),
            dated("new", "2024-06-01T00:00:00Z"),
            ModelDescriptor::new("alpha", 0),
        ];
        sort_models(&mut models);
        let names: Vec<_> = models.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["new", "old", "alpha", "zeta"]);
    }

    #[test]
    fn format_size_switches_units() {
        assert_eq!(format_size(512 * 1024 * 1024), "512.0 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.00 GB");
        assert_eq!(format_size(0), "0.0 MB");
    }

    #[test]
    fn reports_summarize_selection() {
        let installed = vec![
            ModelDescriptor {
                parameter_size: Some("7B".into()),
                quantization_level: Some("Q4_0".into()),
                ..ModelDescriptor::new("llama2:7b", 1024 * 1024 * 1024)
            },
            ModelDescriptor::new("llama2:13b", 2 * 1024 * 1024 * 1024),
            ModelDescriptor::new("mistral", 512 * 1024 * 1024),
        ];
        let selected = vec![&installed[0], &installed[2]];

        let info = model_info_report(&selected);
        assert!(info.contains("llama2:7b\n   Size: 1.00 GB"));
        assert!(info.contains("   Parameters: 7B\n   Quantization: Q4_0\n\n"));
        assert!(info.contains("mistral\n"));
        assert!(info.contains("   Quantization: N/A\n"));
        assert!(info.contains("Selected Models: 2"));
        assert!(info.contains("Total Size: 1.50 GB"));

        let tags = tag_report(&selected, &installed);
        assert_eq!(
            tags,
            "llama2:7b  (2 variants: 7b, 13b)\nmistral:latest\n"
        );
    }
}
