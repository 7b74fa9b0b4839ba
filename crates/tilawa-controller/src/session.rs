//! The user's listening session: catalog selection and continuous playback.
//!
//! The selection survives restarts through the preference store. When a track
//! ends, the session moves on to the next surah of the selected moshaf; the
//! host itself never advances on its own.

use std::collections::BTreeMap;
use std::sync::Arc;

use tilawa_bridge::PlaybackState;
use tilawa_bridge::config::{CatalogConfig, Language};
use tilawa_bridge::preferences::{PreferenceStore, Value, keys};

use crate::catalog::{Moshaf, Reciter, Surah};
use crate::client::ControllerClient;
use crate::error::ClientError;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error("no reciter is selected")]
    NothingSelected,
    #[error("reciter {0} is not in the catalog")]
    UnknownReciter(u32),
    #[error("reciter {reciter} has no moshaf {moshaf}")]
    UnknownMoshaf { reciter: u32, moshaf: u32 },
    #[error("surah {0} is not available for the selected moshaf")]
    SurahUnavailable(u32),
    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Reciter, moshaf and surah picked by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub reciter_id: Option<u32>,
    pub moshaf_id: Option<u32>,
    pub surah_id: Option<u32>,
}

impl Selection {
    pub async fn restore(preferences: &PreferenceStore) -> Self {
        Self {
            reciter_id: preferences.get_u32(keys::RECITER_ID).await,
            moshaf_id: preferences.get_u32(keys::MOSHAF_ID).await,
            surah_id: preferences.get_u32(keys::SURAH_ID).await,
        }
    }

    async fn persist(&self, preferences: &PreferenceStore) {
        let entries: BTreeMap<String, Value> = [
            (keys::RECITER_ID, self.reciter_id),
            (keys::MOSHAF_ID, self.moshaf_id),
            (keys::SURAH_ID, self.surah_id),
        ]
        .into_iter()
        .filter_map(|(key, id)| id.map(|id| (key.to_string(), Value::Integer(i64::from(id)))))
        .collect();

        if let Err(err) = preferences.set(entries).await {
            log::warn!("Failed to store the selection: {err}");
        }
    }
}

pub struct Session {
    client: Arc<ControllerClient>,
    preferences: PreferenceStore,
    extension: String,
    language: Language,
    reciters: Vec<Reciter>,
    surahs: Vec<Surah>,
    selection: Selection,
}

impl Session {
    /// Restores the previous selection and language from the preferences.
    pub async fn restore(
        client: Arc<ControllerClient>,
        preferences: PreferenceStore,
        config: &CatalogConfig,
    ) -> Self {
        let language = preferences
            .get_string(keys::LANGUAGE)
            .await
            .and_then(|code| Language::from_code(&code))
            .unwrap_or(config.default_language);
        let selection = Selection::restore(&preferences).await;
        log::debug!("Restored session {selection:?} in {language:?}");

        Self {
            client,
            preferences,
            extension: config.audio_extension.clone(),
            language,
            reciters: Vec::new(),
            surahs: Vec::new(),
            selection,
        }
    }

    pub fn client(&self) -> &ControllerClient {
        &self.client
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// Switches the catalog language. The caller refetches the catalog.
    pub async fn set_language(&mut self, language: Language) {
        self.language = language;
        if let Err(err) = self
            .preferences
            .set_one(keys::LANGUAGE, language.code())
            .await
        {
            log::warn!("Failed to store the language: {err}");
        }
    }

    pub fn set_catalog(&mut self, reciters: Vec<Reciter>, surahs: Vec<Surah>) {
        self.reciters = reciters;
        self.surahs = surahs;
    }

    pub fn reciters(&self) -> &[Reciter] {
        &self.reciters
    }

    pub fn surahs(&self) -> &[Surah] {
        &self.surahs
    }

    pub fn find_reciters(&self, filter: &str) -> Vec<&Reciter> {
        self.reciters
            .iter()
            .filter(|reciter| reciter.matches(filter))
            .collect()
    }

    pub fn surah(&self, id: u32) -> Option<&Surah> {
        self.surahs.iter().find(|surah| surah.id == id)
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn reciter(&self) -> Option<&Reciter> {
        let id = self.selection.reciter_id?;
        self.reciters.iter().find(|reciter| reciter.id == id)
    }

    /// The selected moshaf, or the reciter's first one.
    pub fn moshaf(&self) -> Option<&Moshaf> {
        let reciter = self.reciter()?;
        self.selection
            .moshaf_id
            .and_then(|id| reciter.moshaf(id))
            .or_else(|| reciter.moshaf.first())
    }

    /// Selects a reciter and, optionally, one of its moshafs.
    pub async fn select(
        &mut self,
        reciter_id: u32,
        moshaf_id: Option<u32>,
    ) -> Result<(), SessionError> {
        let reciter = self
            .reciters
            .iter()
            .find(|reciter| reciter.id == reciter_id)
            .ok_or(SessionError::UnknownReciter(reciter_id))?;
        let moshaf = match moshaf_id {
            Some(id) => reciter.moshaf(id).ok_or(SessionError::UnknownMoshaf {
                reciter: reciter_id,
                moshaf: id,
            })?,
            None => reciter
                .moshaf
                .first()
                .ok_or(SessionError::NothingSelected)?,
        };

        log::info!("Selected {} ({})", reciter.name, moshaf.name);
        self.selection.reciter_id = Some(reciter_id);
        self.selection.moshaf_id = Some(moshaf.id);
        self.selection.persist(&self.preferences).await;
        Ok(())
    }

    /// Loads and starts `surah` of the selected moshaf.
    pub async fn play_surah(&mut self, surah: u32) -> Result<PlaybackState, SessionError> {
        let moshaf = self.moshaf().ok_or(SessionError::NothingSelected)?;
        let url = moshaf
            .stream_url(surah, &self.extension)
            .ok_or(SessionError::SurahUnavailable(surah))?;

        let state = self.client.load(url).await?;
        self.client.play().await?;

        self.selection.surah_id = Some(surah);
        self.selection.persist(&self.preferences).await;
        Ok(state)
    }

    /// Resumes playback, reloading the remembered surah when the host has
    /// nothing loaded (e.g. after it was recreated).
    pub async fn resume(&mut self) -> Result<(), SessionError> {
        let loaded = self.client.get_state().await?.loaded_url.is_some();
        match self.selection.surah_id {
            Some(surah) if !loaded => self.play_surah(surah).await.map(drop),
            _ => Ok(self.client.play().await?),
        }
    }

    /// Moves on to the next available surah. Returns the surah started, or
    /// `None` at the end of the moshaf.
    pub async fn advance(&mut self) -> Result<Option<u32>, SessionError> {
        let current = self.selection.surah_id.unwrap_or(0);
        let next = self
            .moshaf()
            .ok_or(SessionError::NothingSelected)?
            .next_surah(current);

        match next {
            Some(surah) => {
                log::info!("Advancing from surah {current} to {surah}");
                self.play_surah(surah).await?;
                Ok(Some(surah))
            }
            None => {
                log::info!("Reached the last surah of the moshaf");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tilawa_audio::scripted::ScriptedFactory;
    use tilawa_bridge::MessageRouter;
    use tilawa_bridge::config::TimingConfig;
    use tilawa_host::Supervisor;

    fn catalog() -> Vec<Reciter> {
        vec![Reciter {
            id: 123,
            name: "Mishary Alafasi".to_string(),
            letter: "M".to_string(),
            moshaf: vec![Moshaf {
                id: 1,
                name: "Murattal".to_string(),
                server: "https://server8.mp3quran.net/afs/".to_string(),
                surah_total: 3,
                moshaf_type: 11,
                surah_list: "1,2,114".to_string(),
            }],
        }]
    }

    async fn session(preferences: PreferenceStore) -> Session {
        let router = MessageRouter::default();
        let supervisor = Arc::new(Supervisor::new(
            router.clone(),
            Arc::new(ScriptedFactory::new()),
            preferences.clone(),
            TimingConfig::default(),
        ));
        supervisor.listen().await.unwrap();

        let client = Arc::new(ControllerClient::new(
            router,
            preferences.clone(),
            TimingConfig::default(),
        ));
        let mut session = Session::restore(client, preferences, &CatalogConfig::default()).await;
        session.set_catalog(catalog(), Vec::new());
        session
    }

    #[tokio::test(start_paused = true)]
    async fn plays_selected_surah_and_remembers_it() {
        let preferences = PreferenceStore::in_memory();
        let mut session = session(preferences.clone()).await;

        session.select(123, None).await.unwrap();
        let state = session.play_surah(2).await.unwrap();

        assert_eq!(
            state.loaded_url.as_deref(),
            Some("https://server8.mp3quran.net/afs/002.mp3")
        );
        assert!(session.client().get_state().await.unwrap().is_playing);
        assert_eq!(
            Selection::restore(&preferences).await,
            Selection {
                reciter_id: Some(123),
                moshaf_id: Some(1),
                surah_id: Some(2),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn advances_through_available_surahs() {
        let mut session = session(PreferenceStore::in_memory()).await;
        session.select(123, Some(1)).await.unwrap();
        session.play_surah(2).await.unwrap();

        assert_eq!(session.advance().await, Ok(Some(114)));
        assert_eq!(session.advance().await, Ok(None));
        assert_eq!(session.selection().surah_id, Some(114));
    }

    #[tokio::test(start_paused = true)]
    async fn rejects_unknown_choices() {
        let mut session = session(PreferenceStore::in_memory()).await;

        assert_eq!(
            session.play_surah(1).await,
            Err(SessionError::NothingSelected)
        );
        assert_eq!(
            session.select(9, None).await,
            Err(SessionError::UnknownReciter(9))
        );
        assert_eq!(
            session.select(123, Some(7)).await,
            Err(SessionError::UnknownMoshaf {
                reciter: 123,
                moshaf: 7
            })
        );
        session.select(123, None).await.unwrap();
        assert_eq!(
            session.play_surah(3).await,
            Err(SessionError::SurahUnavailable(3))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn restores_language_and_selection() {
        let preferences = PreferenceStore::in_memory();
        preferences.set_one(keys::LANGUAGE, "ar").await.unwrap();
        preferences.set_one(keys::RECITER_ID, 123).await.unwrap();
        preferences.set_one(keys::SURAH_ID, 114).await.unwrap();

        let session = session(preferences).await;

        assert_eq!(session.language(), Language::Arabic);
        assert_eq!(session.reciter().map(|reciter| reciter.id), Some(123));
        assert_eq!(session.moshaf().map(|moshaf| moshaf.id), Some(1));
        assert_eq!(session.selection().surah_id, Some(114));
    }

    #[tokio::test(start_paused = true)]
    async fn resume_reloads_the_remembered_surah() {
        let preferences = PreferenceStore::in_memory();
        preferences.set_one(keys::RECITER_ID, 123).await.unwrap();
        preferences.set_one(keys::SURAH_ID, 114).await.unwrap();
        let mut session = session(preferences).await;

        session.resume().await.unwrap();

        let state = session.client().get_state().await.unwrap();
        assert!(state.is_playing);
        assert_eq!(
            state.loaded_url.as_deref(),
            Some("https://server8.mp3quran.net/afs/114.mp3")
        );
    }
}
