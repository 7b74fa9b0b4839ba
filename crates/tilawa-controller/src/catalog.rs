//! Client for the public recitation catalog.
//!
//! The catalog lists reciters with their recitation variants (moshaf) and the
//! 114 surahs. Stream URLs are derived from a moshaf's server and the surah
//! number.

use serde::Deserialize;
use tilawa_bridge::config::{CatalogConfig, Language};

/// Errors that can occur while querying the catalog.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("catalog answered with status {0}")]
    StatusError(reqwest::StatusCode),
}

/// A recitation variant of a reciter, served from its own stream server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Moshaf {
    pub id: u32,
    pub name: String,
    /// Base URL of the stream files, usually ending with `/`.
    pub server: String,
    #[serde(default)]
    pub surah_total: u32,
    #[serde(default)]
    pub moshaf_type: u32,
    /// Comma separated surah numbers available on the server.
    #[serde(default)]
    pub surah_list: String,
}

impl Moshaf {
    /// Available surah numbers in ascending order.
    pub fn surah_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self
            .surah_list
            .split(',')
            .filter_map(|id| id.trim().parse().ok())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    pub fn has_surah(&self, surah: u32) -> bool {
        self.surah_ids().contains(&surah)
    }

    /// First available surah after `surah`, if any.
    pub fn next_surah(&self, surah: u32) -> Option<u32> {
        self.surah_ids().into_iter().find(|id| *id > surah)
    }

    /// Stream URL of `surah`, e.g. `https://server8.mp3quran.net/afs/001.mp3`.
    pub fn stream_url(&self, surah: u32, extension: &str) -> Option<String> {
        if !self.has_surah(surah) {
            return None;
        }
        let separator = if self.server.ends_with('/') { "" } else { "/" };
        Some(format!("{}{separator}{surah:03}.{extension}", self.server))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Reciter {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub letter: String,
    #[serde(default)]
    pub moshaf: Vec<Moshaf>,
}

impl Reciter {
    /// Case-insensitive match on the reciter's name.
    pub fn matches(&self, filter: &str) -> bool {
        self.name.to_lowercase().contains(&filter.trim().to_lowercase())
    }

    pub fn moshaf(&self, id: u32) -> Option<&Moshaf> {
        self.moshaf.iter().find(|moshaf| moshaf.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Surah {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub start_page: u32,
    #[serde(default)]
    pub end_page: u32,
    /// `1` for Meccan surahs, `0` for Medinan ones.
    #[serde(default)]
    pub makkia: u8,
    #[serde(rename = "type", default)]
    pub kind: u8,
}

impl Surah {
    pub fn is_meccan(&self) -> bool {
        self.makkia == 1
    }
}

#[derive(Debug, Deserialize)]
struct RecitersResponse {
    reciters: Vec<Reciter>,
}

#[derive(Debug, Deserialize)]
struct SuwarResponse {
    suwar: Vec<Surah>,
}

/// HTTP client for the catalog endpoints.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    http: reqwest::Client,
    base_url: String,
}

impl CatalogClient {
    pub fn new(config: &CatalogConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(http: reqwest::Client, config: &CatalogConfig) -> Self {
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    async fn fetch<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        language: Language,
    ) -> Result<T, CatalogError> {
        let url = self.endpoint(path);
        log::debug!("Fetching {url} ({})", language.code());

        let response = self
            .http
            .get(&url)
            .query(&[("language", language.code())])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(CatalogError::StatusError(response.status()));
        }
        Ok(response.json::<T>().await?)
    }

    /// Every reciter, sorted by name.
    pub async fn reciters(&self, language: Language) -> Result<Vec<Reciter>, CatalogError> {
        let mut reciters = self
            .fetch::<RecitersResponse>("reciters", language)
            .await?
            .reciters;
        reciters.sort_by(|left, right| left.name.cmp(&right.name));
        log::info!("Fetched {} reciters", reciters.len());
        Ok(reciters)
    }

    /// Every surah, in canonical order.
    pub async fn surahs(&self, language: Language) -> Result<Vec<Surah>, CatalogError> {
        let mut suwar = self.fetch::<SuwarResponse>("suwar", language).await?.suwar;
        suwar.sort_by_key(|surah| surah.id);
        Ok(suwar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECITERS: &str = r#"{
        "reciters": [
            {
                "id": 123,
                "name": "Mishary Alafasi",
                "letter": "M",
                "date": "2020-04-27T18:43:01.000000Z",
                "moshaf": [
                    {
                        "id": 1,
                        "name": "Rewayat Hafs A'n Assem - Murattal",
                        "server": "https://server8.mp3quran.net/afs/",
                        "surah_total": 4,
                        "moshaf_type": 11,
                        "surah_list": "1,2,18,114"
                    }
                ]
            },
            {
                "id": 54,
                "name": "Abdulbasit Abdulsamad",
                "letter": "A",
                "moshaf": []
            }
        ]
    }"#;

    const SUWAR: &str = r#"{
        "suwar": [
            {"id": 2, "name": "Al-Baqarah", "start_page": 2, "end_page": 49, "makkia": 0, "type": 0},
            {"id": 1, "name": "Al-Fatihah", "start_page": 1, "end_page": 1, "makkia": 1, "type": 0}
        ]
    }"#;

    fn alafasi() -> Moshaf {
        let response: RecitersResponse = serde_json::from_str(RECITERS).unwrap();
        response.reciters[0].moshaf[0].clone()
    }

    mod parsing {
        use super::*;

        #[test]
        fn reads_reciters_and_ignores_unknown_fields() {
            let response: RecitersResponse = serde_json::from_str(RECITERS).unwrap();
            assert_eq!(response.reciters.len(), 2);
            assert_eq!(response.reciters[0].moshaf[0].surah_total, 4);
            assert!(response.reciters[1].moshaf.is_empty());
        }

        #[test]
        fn reads_surahs() {
            let response: SuwarResponse = serde_json::from_str(SUWAR).unwrap();
            let fatihah = &response.suwar[1];
            assert_eq!(fatihah.id, 1);
            assert!(fatihah.is_meccan());
            assert!(!response.suwar[0].is_meccan());
        }
    }

    mod moshaf {
        use super::*;

        #[test]
        fn derives_zero_padded_stream_urls() {
            let moshaf = alafasi();
            assert_eq!(
                moshaf.stream_url(1, "mp3").as_deref(),
                Some("https://server8.mp3quran.net/afs/001.mp3")
            );
            assert_eq!(
                moshaf.stream_url(114, "mp3").as_deref(),
                Some("https://server8.mp3quran.net/afs/114.mp3")
            );
            assert_eq!(moshaf.stream_url(3, "mp3"), None);
        }

        #[test]
        fn adds_missing_separator() {
            let moshaf = Moshaf {
                server: "https://server8.mp3quran.net/afs".to_string(),
                ..alafasi()
            };
            assert_eq!(
                moshaf.stream_url(18, "mp3").as_deref(),
                Some("https://server8.mp3quran.net/afs/018.mp3")
            );
        }

        #[test]
        fn next_surah_skips_gaps() {
            let moshaf = alafasi();
            assert_eq!(moshaf.next_surah(2), Some(18));
            assert_eq!(moshaf.next_surah(18), Some(114));
            assert_eq!(moshaf.next_surah(114), None);
        }

        #[test]
        fn tolerates_sloppy_surah_lists() {
            let moshaf = Moshaf {
                surah_list: "3, 1,,x,2,1".to_string(),
                ..alafasi()
            };
            assert_eq!(moshaf.surah_ids(), vec![1, 2, 3]);
        }
    }

    #[test]
    fn reciter_filter_ignores_case() {
        let response: RecitersResponse = serde_json::from_str(RECITERS).unwrap();
        let reciter = &response.reciters[0];
        assert!(reciter.matches("alafasi"));
        assert!(reciter.matches(" MISH "));
        assert!(!reciter.matches("basit"));
        assert_eq!(reciter.moshaf(1).map(|moshaf| moshaf.id), Some(1));
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        let client = CatalogClient::new(&CatalogConfig::default());
        assert_eq!(
            client.endpoint("reciters"),
            "https://mp3quran.net/api/v3/reciters"
        );
    }
}
