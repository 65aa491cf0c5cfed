//! Output formatter (C1)
//!
//! Serializes a [`serde_json::Value`] as pretty JSON, compact JSON, or YAML
//! and enforces a byte cap, per `spec.md` §4.1.

use serde::{Deserialize, Serialize};

/// How a tool result is rendered to text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ResponseMode {
    #[default]
    Json,
    CompactJson,
    Yaml,
}

impl std::str::FromStr for ResponseMode {
    type Err = crate::error::BridgeError;

    fn from_str(s: &str) -> crate::error::BridgeResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "compact-json" | "compact_json" => Ok(Self::CompactJson),
            "yaml" => Ok(Self::Yaml),
            other => Err(crate::error::BridgeError::configuration(format!(
                "invalid GITLAB_RESPONSE_MODE: {other}"
            ))),
        }
    }
}

/// Format options carried through the pipeline (`spec.md` §3 "Format options").
#[derive(Debug, Clone, Copy)]
pub struct FormatOptions {
    pub response_mode: ResponseMode,
    pub max_bytes: usize,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            response_mode: ResponseMode::Json,
            max_bytes: 1_000_000,
        }
    }
}

/// The result of formatting a value: text, whether it was truncated, and
/// the pre-truncation byte length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedPayload {
    pub text: String,
    pub truncated: bool,
    pub bytes: usize,
}

const TRUNCATION_SUFFIX_TEMPLATE: &str = "\n... [truncated {N} bytes]";

fn truncation_suffix(elided: usize) -> String {
    format!("\n... [truncated {elided} bytes]")
}

/// Serialize `value` per `options.response_mode`, then apply the byte cap.
///
/// Truncation is byte-wise: the underlying buffer may be cut mid-character,
/// producing invalid UTF-8 at the seam. That is by design (`spec.md` §9
/// "Truncation is byte-wise") — the suffix is the marker, and callers must
/// not attempt to re-encode or re-parse the truncated text. We use
/// `String::from_utf8_lossy` only to give the cut bytes a valid Rust
/// `String` representation; the spec does not require the lossy
/// replacement to be absent, only that truncation is visible and `bytes`
/// reports the true pre-truncation length.
pub fn format(value: &serde_json::Value, options: FormatOptions) -> FormattedPayload {
    let full = match options.response_mode {
        ResponseMode::Json => {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".to_string())
        }
        ResponseMode::CompactJson => {
            serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
        }
        ResponseMode::Yaml => serde_yaml::to_string(value).unwrap_or_else(|_| "null\n".to_string()),
    };

    let full_bytes = full.as_bytes();
    let bytes = full_bytes.len();

    if bytes <= options.max_bytes {
        return FormattedPayload {
            text: full,
            truncated: false,
            bytes,
        };
    }

    let elided = bytes - options.max_bytes;
    let cut = &full_bytes[..options.max_bytes];
    let mut text = String::from_utf8_lossy(cut).into_owned();
    text.push_str(&truncation_suffix(elided));

    FormattedPayload {
        text,
        truncated: true,
        bytes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn fits_under_cap_is_untouched() {
        let v = serde_json::json!({"a": 1});
        let out = format(
            &v,
            FormatOptions {
                response_mode: ResponseMode::CompactJson,
                max_bytes: 1_000,
            },
        );
        assert!(!out.truncated);
        assert_eq!(out.text, r#"{"a":1}"#);
        assert_eq!(out.bytes, out.text.len());
    }

    #[test]
    fn truncates_with_visible_suffix() {
        let v = serde_json::json!({"a": "x".repeat(100)});
        let out = format(
            &v,
            FormatOptions {
                response_mode: ResponseMode::CompactJson,
                max_bytes: 20,
            },
        );
        assert!(out.truncated);
        assert!(out.text.contains("[truncated"));
        assert!(out.bytes > 20);
    }

    #[test]
    fn yaml_mode_serializes_block_style() {
        let v = serde_json::json!({"key": "value"});
        let out = format(
            &v,
            FormatOptions {
                response_mode: ResponseMode::Yaml,
                max_bytes: 1_000,
            },
        );
        assert!(out.text.contains("key:"));
    }

    #[test]
    fn response_mode_parses_all_variants() {
        assert_eq!("json".parse::<ResponseMode>().unwrap(), ResponseMode::Json);
        assert_eq!(
            "compact-json".parse::<ResponseMode>().unwrap(),
            ResponseMode::CompactJson
        );
        assert_eq!("yaml".parse::<ResponseMode>().unwrap(), ResponseMode::Yaml);
        assert!("xml".parse::<ResponseMode>().is_err());
    }

    proptest! {
        // P4: format(v).text.length <= cap + |suffix|, truncated iff the
        // original serialization exceeded cap, bytes equals the original length.
        #[test]
        fn p4_formatter_byte_cap(s in ".{0,500}", cap in 1usize..300) {
            let v = serde_json::json!({"s": s});
            let options = FormatOptions { response_mode: ResponseMode::CompactJson, max_bytes: cap };
            let full_len = serde_json::to_string(&v).unwrap().len();
            let out = format(&v, options);

            prop_assert_eq!(out.bytes, full_len);
            prop_assert_eq!(out.truncated, full_len > cap);
            if out.truncated {
                let suffix_len = truncation_suffix(full_len - cap).len();
                prop_assert!(out.text.len() <= cap + suffix_len);
            } else {
                prop_assert_eq!(out.text.len(), full_len);
            }
        }
    }

    #[test]
    fn suffix_template_documents_shape() {
        assert!(TRUNCATION_SUFFIX_TEMPLATE.contains("{N}"));
    }
}
