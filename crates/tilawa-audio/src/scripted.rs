//! Deterministic in-memory resource.
//!
//! Loads resolve on tokio timers according to a per-URL [`TrackScript`], and
//! the playback position follows the tokio clock, so paused-time tests are
//! fully reproducible. A [`ScriptedHandle`] lets the caller inject events the
//! way real output would (end of stream, late errors).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::{
    AudioResource, EventSink, LoadId, ReadyState, ResourceError, ResourceEvent, ResourceFactory,
};

/// How a load of a given URL behaves.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadBehavior {
    /// Becomes playable after the delay.
    Ready,
    /// Reports an error after the delay.
    Fail(String),
    /// Reaches the given readiness after the delay and never signals
    /// playability.
    Stall(ReadyState),
}

/// Script of a single track.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackScript {
    pub duration: f64,
    pub delay: Duration,
    pub behavior: LoadBehavior,
    /// Reason given when `play` is refused.
    pub reject_play: Option<String>,
}

impl Default for TrackScript {
    fn default() -> Self {
        Self {
            duration: 20.0,
            delay: Duration::from_millis(50),
            behavior: LoadBehavior::Ready,
            reject_play: None,
        }
    }
}

impl TrackScript {
    pub fn ready(duration: f64) -> Self {
        Self {
            duration,
            ..Self::default()
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            behavior: LoadBehavior::Fail(message.into()),
            ..Self::default()
        }
    }

    pub fn stalled(ready_state: ReadyState) -> Self {
        Self {
            behavior: LoadBehavior::Stall(ready_state),
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn rejecting_play(mut self, reason: impl Into<String>) -> Self {
        self.reject_play = Some(reason.into());
        self
    }
}

#[derive(Default)]
struct Registry {
    tracks: HashMap<String, TrackScript>,
    created: usize,
    unavailable: Option<String>,
    current: Option<Arc<Mutex<Playhead>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Factory of [`ScriptedResource`]s sharing one script registry.
#[derive(Clone, Default)]
pub struct ScriptedFactory {
    registry: Arc<Mutex<Registry>>,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the script used for `url`. Unknown URLs use
    /// [`TrackScript::default`].
    pub fn with_track(self, url: impl Into<String>, script: TrackScript) -> Self {
        lock(&self.registry).tracks.insert(url.into(), script);
        self
    }

    /// Makes every following `create` fail.
    pub fn unavailable(self, reason: impl Into<String>) -> Self {
        lock(&self.registry).unavailable = Some(reason.into());
        self
    }

    /// Number of resources created so far.
    pub fn created(&self) -> usize {
        lock(&self.registry).created
    }

    /// Handle to the most recently created resource.
    pub fn handle(&self) -> Option<ScriptedHandle> {
        lock(&self.registry)
            .current
            .clone()
            .map(|playhead| ScriptedHandle { playhead })
    }
}

impl ResourceFactory for ScriptedFactory {
    fn create(&self, events: EventSink) -> Result<Box<dyn AudioResource>, ResourceError> {
        let mut registry = lock(&self.registry);
        if let Some(reason) = registry.unavailable.clone() {
            return Err(ResourceError::OutputUnavailable(reason));
        }

        let playhead = Arc::new(Mutex::new(Playhead {
            events: Some(events),
            gain: 1.0,
            ..Playhead::default()
        }));
        registry.created += 1;
        registry.current = Some(playhead.clone());

        Ok(Box::new(ScriptedResource {
            registry: self.registry.clone(),
            playhead,
            source: None,
        }))
    }
}

#[derive(Default)]
struct Playhead {
    events: Option<EventSink>,
    load: LoadId,
    loads: usize,
    source: Option<String>,
    script: TrackScript,
    ready: ReadyState,
    base: f64,
    started_at: Option<Instant>,
    gain: f64,
}

impl Playhead {
    fn emit(&self, event: ResourceEvent) {
        if let Some(events) = self.events.as_ref() {
            let _ = events.send(event);
        }
    }

    fn position(&self) -> f64 {
        let elapsed = self
            .started_at
            .map(|started| started.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        (self.base + elapsed).min(self.script.duration)
    }

    fn halt(&mut self) {
        self.base = self.position();
        self.started_at = None;
    }
}

/// Resource whose loads and playback follow [`TrackScript`]s.
pub struct ScriptedResource {
    registry: Arc<Mutex<Registry>>,
    playhead: Arc<Mutex<Playhead>>,
    source: Option<String>,
}

impl AudioResource for ScriptedResource {
    fn load(&mut self, url: &str) -> LoadId {
        let script = lock(&self.registry)
            .tracks
            .get(url)
            .cloned()
            .unwrap_or_default();
        self.source = Some(url.to_string());

        let load = {
            let mut playhead = lock(&self.playhead);
            playhead.load += 1;
            playhead.loads += 1;
            playhead.source = Some(url.to_string());
            playhead.script = script.clone();
            playhead.ready = ReadyState::Nothing;
            playhead.base = 0.0;
            playhead.started_at = None;
            playhead.load
        };

        let playhead = self.playhead.clone();
        tokio::spawn(async move {
            tokio::time::sleep(script.delay).await;
            let mut playhead = lock(&playhead);
            if playhead.load != load {
                return;
            }
            match script.behavior {
                LoadBehavior::Ready => {
                    playhead.ready = ReadyState::EnoughData;
                    playhead.emit(ResourceEvent::MetadataLoaded {
                        load,
                        duration: script.duration,
                    });
                    playhead.emit(ResourceEvent::CanPlay { load });
                }
                LoadBehavior::Fail(message) => {
                    playhead.emit(ResourceEvent::Error { load, message });
                }
                LoadBehavior::Stall(ready_state) => {
                    playhead.ready = ready_state;
                    if ready_state >= ReadyState::Metadata {
                        playhead.emit(ResourceEvent::MetadataLoaded {
                            load,
                            duration: script.duration,
                        });
                    }
                }
            }
        });

        load
    }

    fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    fn play(&mut self) -> Result<(), ResourceError> {
        let mut playhead = lock(&self.playhead);
        if playhead.source.is_none() {
            return Err(ResourceError::NotAllowed("no source is bound".to_string()));
        }
        if let Some(reason) = playhead.script.reject_play.clone() {
            return Err(ResourceError::NotSupported(reason));
        }
        if playhead.started_at.is_none() {
            playhead.started_at = Some(Instant::now());
        }
        Ok(())
    }

    fn pause(&mut self) {
        lock(&self.playhead).halt();
    }

    fn seek(&mut self, position: f64) {
        let mut playhead = lock(&self.playhead);
        let playing = playhead.started_at.is_some();
        playhead.base = position;
        playhead.started_at = playing.then(Instant::now);
    }

    fn position(&self) -> f64 {
        lock(&self.playhead).position()
    }

    fn set_gain(&mut self, gain: f64) {
        lock(&self.playhead).gain = gain;
    }

    fn ready_state(&self) -> ReadyState {
        lock(&self.playhead).ready
    }
}

/// Test-side view of a [`ScriptedResource`].
#[derive(Clone)]
pub struct ScriptedHandle {
    playhead: Arc<Mutex<Playhead>>,
}

impl ScriptedHandle {
    /// Simulates the stream playing through to its natural end.
    pub fn finish(&self) {
        let mut playhead = lock(&self.playhead);
        playhead.base = playhead.script.duration;
        playhead.started_at = None;
        let load = playhead.load;
        playhead.emit(ResourceEvent::TimeUpdate {
            load,
            position: playhead.script.duration,
        });
        playhead.emit(ResourceEvent::Ended { load });
    }

    /// Reports an error for the current load.
    pub fn fail(&self, message: impl Into<String>) {
        let playhead = lock(&self.playhead);
        playhead.emit(ResourceEvent::Error {
            load: playhead.load,
            message: message.into(),
        });
    }

    /// Number of `load` calls made on the resource.
    pub fn load_count(&self) -> usize {
        lock(&self.playhead).loads
    }

    pub fn is_producing(&self) -> bool {
        lock(&self.playhead).started_at.is_some()
    }

    pub fn gain(&self) -> f64 {
        lock(&self.playhead).gain
    }

    pub fn position(&self) -> f64 {
        lock(&self.playhead).position()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    const URL: &str = "https://server.example/afs/001.mp3";

    #[tokio::test(start_paused = true)]
    async fn ready_track_reports_metadata_then_can_play() {
        let factory = ScriptedFactory::new().with_track(URL, TrackScript::ready(30.0));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut resource = factory.create(tx).unwrap();

        let load = resource.load(URL);
        assert_eq!(resource.source(), Some(URL));
        assert_eq!(resource.ready_state(), ReadyState::Nothing);

        assert_eq!(
            rx.recv().await,
            Some(ResourceEvent::MetadataLoaded {
                load,
                duration: 30.0
            })
        );
        assert_eq!(rx.recv().await, Some(ResourceEvent::CanPlay { load }));
        assert!(resource.ready_state().can_play());
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_load_stays_silent() {
        let factory = ScriptedFactory::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut resource = factory.create(tx).unwrap();

        let first = resource.load(URL);
        let second = resource.load("https://server.example/afs/002.mp3");
        assert_ne!(first, second);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.load(), second);
    }

    #[tokio::test(start_paused = true)]
    async fn position_follows_clock_while_playing() {
        let factory = ScriptedFactory::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut resource = factory.create(tx).unwrap();
        resource.load(URL);

        resource.play().unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        resource.pause();
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert!((resource.position() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn unavailable_factory_refuses() {
        let factory = ScriptedFactory::new().unavailable("no device");
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(matches!(
            factory.create(tx),
            Err(ResourceError::OutputUnavailable(_))
        ));
        assert_eq!(factory.created(), 0);
    }
}
