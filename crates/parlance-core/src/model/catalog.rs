//! Remote voice catalog client.
//!
//! The catalog is the `voices.json` listing published in the Hugging Face
//! `rhasspy/piper-voices` repository: a map from voice key to language,
//! quality, and the repository-relative files that make up the voice.
//! Individual files are fetched from the same repository via
//! `resolve/main/<path>`.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{ParlanceError, ParlanceResult};
use crate::model::types::RemoteFile;

/// Default catalog repository base URL
pub const DEFAULT_CATALOG_BASE: &str = "https://huggingface.co/rhasspy/piper-voices";

/// One downloadable voice as listed by the catalog
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogVoice {
    /// Unique voice key, e.g. `en_US-ryan-medium`
    pub key: String,
    /// Language code, e.g. `en_US`
    pub language: Option<String>,
    /// Quality tier (`x_low`, `low`, `medium`, `high`)
    pub quality: Option<String>,
    /// Required files: the `.onnx` weights and the `.onnx.json` config
    pub files: Vec<RemoteFile>,
}

/// Parsed remote catalog
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VoiceCatalog {
    /// Voices keyed by name, sorted for stable listings
    pub voices: BTreeMap<String, CatalogVoice>,
}

impl VoiceCatalog {
    /// Number of voices in the catalog
    #[must_use]
    pub fn len(&self) -> usize {
        self.voices.len()
    }

    /// Whether the catalog is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    /// Look up a voice by key
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&CatalogVoice> {
        self.voices.get(key)
    }

    /// Parse the raw `voices.json` payload.
    ///
    /// Voices that do not carry a complete `.onnx` + `.onnx.json` pair are
    /// skipped: they cannot be downloaded into a usable store entry.
    ///
    /// # Errors
    ///
    /// Returns a network error if the payload is not the expected JSON shape.
    pub fn parse(payload: &str) -> ParlanceResult<Self> {
        let raw: BTreeMap<String, RawVoice> = serde_json::from_str(payload)
            .map_err(|e| ParlanceError::network(format!("malformed catalog: {e}")))?;

        let mut voices = BTreeMap::new();
        for (key, voice) in raw {
            let files: Vec<RemoteFile> = voice
                .files
                .into_iter()
                .filter(|(path, _)| path.ends_with(".onnx") || path.ends_with(".onnx.json"))
                .map(|(path, meta)| RemoteFile {
                    path,
                    size_bytes: meta.size_bytes,
                    digest: meta.md5_digest,
                })
                .collect();

            let has_weights = files.iter().any(|f| f.path.ends_with(".onnx"));
            let has_config = files.iter().any(|f| f.path.ends_with(".onnx.json"));
            if !has_weights || !has_config {
                debug!("skipping catalog voice '{key}' without a complete file pair");
                continue;
            }

            voices.insert(
                key.clone(),
                CatalogVoice {
                    key,
                    language: voice.language.and_then(|l| l.code),
                    quality: voice.quality,
                    files,
                },
            );
        }

        Ok(Self { voices })
    }
}

#[derive(Debug, Deserialize)]
struct RawVoice {
    #[serde(default)]
    language: Option<RawLanguage>,
    #[serde(default)]
    quality: Option<String>,
    #[serde(default)]
    files: BTreeMap<String, RawFile>,
}

#[derive(Debug, Deserialize)]
struct RawLanguage {
    #[serde(default)]
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawFile {
    #[serde(default)]
    size_bytes: Option<u64>,
    #[serde(default)]
    md5_digest: Option<String>,
}

/// HTTP client for the remote voice catalog
#[derive(Debug, Clone)]
pub struct CatalogClient {
    client: reqwest::Client,
    base_url: String,
}

impl CatalogClient {
    /// Create a client against the default Hugging Face repository
    #[must_use]
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_CATALOG_BASE)
    }

    /// Create a client against a custom repository base URL
    #[must_use]
    pub fn with_base_url<S: Into<String>>(base_url: S) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// The repository base URL this client talks to
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The underlying HTTP client, shared with the downloader
    #[must_use]
    pub fn http_client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Resolve the download URL for a repository-relative file path
    #[must_use]
    pub fn file_url(&self, repo_path: &str) -> String {
        format!("{}/resolve/main/{repo_path}", self.base_url)
    }

    /// Fetch and parse the remote catalog.
    ///
    /// # Errors
    ///
    /// Returns a network error if the request fails, the server answers with
    /// a non-success status, or the payload does not parse.
    pub async fn fetch(&self) -> ParlanceResult<VoiceCatalog> {
        let url = self.file_url("voices.json");
        debug!("fetching voice catalog from {url}");

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(ParlanceError::network(format!(
                "catalog request failed with HTTP {}",
                response.status().as_u16()
            )));
        }

        let payload = response.text().await?;
        let catalog = VoiceCatalog::parse(&payload)?;
        info!("catalog lists {} downloadable voices", catalog.len());
        Ok(catalog)
    }
}

impl Default for CatalogClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_CATALOG: &str = r#"{
        "en_US-ryan-medium": {
            "key": "en_US-ryan-medium",
            "language": { "code": "en_US", "name_english": "English" },
            "quality": "medium",
            "num_speakers": 1,
            "files": {
                "en/en_US/ryan/medium/en_US-ryan-medium.onnx": {
                    "size_bytes": 63201294,
                    "md5_digest": "318dd28e5e2174dc42741b5c9e5e0073"
                },
                "en/en_US/ryan/medium/en_US-ryan-medium.onnx.json": {
                    "size_bytes": 4882,
                    "md5_digest": "967cdbd2e0940b1d221163e3bcd7545d"
                },
                "en/en_US/ryan/medium/MODEL_CARD": {
                    "size_bytes": 279,
                    "md5_digest": "3f71b562530bdabc2ca44b0d04ef5db0"
                }
            },
            "aliases": []
        },
        "de_DE-thorsten-broken": {
            "key": "de_DE-thorsten-broken",
            "language": { "code": "de_DE" },
            "quality": "low",
            "files": {
                "de/de_DE/thorsten/low/de_DE-thorsten-low.onnx": { "size_bytes": 100 }
            }
        }
    }"#;

    #[test]
    fn test_parse_filters_to_model_file_pair() {
        let catalog = VoiceCatalog::parse(SAMPLE_CATALOG).unwrap();
        assert_eq!(catalog.len(), 1);

        let voice = catalog.get("en_US-ryan-medium").unwrap();
        assert_eq!(voice.language.as_deref(), Some("en_US"));
        assert_eq!(voice.quality.as_deref(), Some("medium"));
        assert_eq!(voice.files.len(), 2, "MODEL_CARD must be filtered out");
        assert!(voice.files.iter().all(|f| f.path.ends_with(".onnx")
            || f.path.ends_with(".onnx.json")));
    }

    #[test]
    fn test_parse_skips_incomplete_voices() {
        let catalog = VoiceCatalog::parse(SAMPLE_CATALOG).unwrap();
        assert!(catalog.get("de_DE-thorsten-broken").is_none());
    }

    #[test]
    fn test_parse_rejects_malformed_payload() {
        let err = VoiceCatalog::parse("<html>rate limited</html>").unwrap_err();
        assert_eq!(err.category(), "network");
    }

    #[test]
    fn test_file_url_joins_resolve_main() {
        let client = CatalogClient::with_base_url("https://example.test/repo/");
        assert_eq!(
            client.file_url("en/en_US/ryan/medium/en_US-ryan-medium.onnx"),
            "https://example.test/repo/resolve/main/en/en_US/ryan/medium/en_US-ryan-medium.onnx"
        );
    }

    #[test]
    fn test_default_base_url() {
        let client = CatalogClient::new();
        assert_eq!(client.base_url(), DEFAULT_CATALOG_BASE);
    }
}
