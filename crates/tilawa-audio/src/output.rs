//! Audio resource backed by `rodio`.
//!
//! The output stream is not `Send`, so it lives on a dedicated worker thread
//! that owns the [`rodio::Sink`]. The resource handle talks to the worker over
//! a standard channel and reads position and readiness from shared atomics.
//! Stream bytes are fetched with `reqwest` on the tokio runtime into a
//! [`StreamBuffer`]. The worker starts decoding once [`PREBUFFER_BYTES`] have
//! arrived and the rest keeps streaming in behind the decoder.
//!
//! # Threading
//! The worker wakes up every [`TICK`] to publish the playback position and to
//! detect the end of the stream. All resource events are sent from the worker
//! or from the fetch task, never from the caller's thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

use futures_util::StreamExt;
use rodio::{Decoder, OutputStream, Sink, Source};

use crate::stream::{StreamBuffer, StreamReader};
use crate::{
    AudioResource, EventSink, LoadId, ReadyState, ResourceError, ResourceEvent, ResourceFactory,
};

/// Interval between position updates from the worker.
const TICK: Duration = Duration::from_millis(250);

/// Bytes buffered before decoding starts.
pub const PREBUFFER_BYTES: usize = 256 * 1024;

/// No load has failed yet.
const NO_LOAD: LoadId = 0;

enum WorkerCommand {
    /// Drops the current track and waits for `Prepare` of `load`.
    Reset { load: LoadId },
    /// Enough of the stream of `load` arrived to start decoding.
    Prepare {
        load: LoadId,
        buffer: Arc<StreamBuffer>,
    },
    /// The stream of `load` is fully fetched.
    Buffered { load: LoadId },
    Play,
    Pause,
    Seek(f64),
    Gain(f32),
}

/// State shared between the resource handle and the worker.
#[derive(Default)]
struct Shared {
    position_bits: AtomicU64,
    ready: AtomicU8,
    failed_load: AtomicU64,
    current_load: AtomicU64,
}

impl Shared {
    fn position(&self) -> f64 {
        f64::from_bits(self.position_bits.load(Ordering::Acquire))
    }

    fn set_position(&self, position: f64) {
        self.position_bits
            .store(position.to_bits(), Ordering::Release);
    }

    fn ready_state(&self) -> ReadyState {
        match self.ready.load(Ordering::Acquire) {
            1 => ReadyState::Metadata,
            2 => ReadyState::CurrentData,
            3 => ReadyState::FutureData,
            4 => ReadyState::EnoughData,
            _ => ReadyState::Nothing,
        }
    }

    fn set_ready_state(&self, state: ReadyState) {
        let value = match state {
            ReadyState::Nothing => 0,
            ReadyState::Metadata => 1,
            ReadyState::CurrentData => 2,
            ReadyState::FutureData => 3,
            ReadyState::EnoughData => 4,
        };
        self.ready.store(value, Ordering::Release);
    }
}

/// Creates [`RodioResource`]s that play through the default output device.
#[derive(Clone, Default)]
pub struct RodioFactory {
    http: reqwest::Client,
}

impl RodioFactory {
    /// Uses `http` for fetching stream bytes.
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

impl ResourceFactory for RodioFactory {
    fn create(&self, events: EventSink) -> Result<Box<dyn AudioResource>, ResourceError> {
        let (commands, worker_rx) = mpsc::channel();
        let (opened_tx, opened_rx) = mpsc::sync_channel(1);
        let shared = Arc::new(Shared::default());

        let worker_shared = shared.clone();
        let worker_events = events.clone();
        thread::Builder::new()
            .name("tilawa-audio".to_string())
            .spawn(move || {
                let (_stream, handle) = match OutputStream::try_default() {
                    Ok(output) => output,
                    Err(err) => {
                        let _ = opened_tx.send(Err(err.to_string()));
                        return;
                    }
                };
                let _ = opened_tx.send(Ok(()));
                Worker::new(handle, worker_shared, worker_events).run(worker_rx);
            })
            .map_err(|err| ResourceError::OutputUnavailable(err.to_string()))?;

        opened_rx
            .recv()
            .map_err(|_| ResourceError::WorkerStopped)?
            .map_err(ResourceError::OutputUnavailable)?;
        log::info!("Opened default audio output");

        Ok(Box::new(RodioResource {
            commands,
            shared,
            events,
            http: self.http.clone(),
            source: None,
            last_load: NO_LOAD,
        }))
    }
}

/// Handle to a `rodio` sink running on its own worker thread.
pub struct RodioResource {
    commands: Sender<WorkerCommand>,
    shared: Arc<Shared>,
    events: EventSink,
    http: reqwest::Client,
    source: Option<String>,
    last_load: LoadId,
}

impl RodioResource {
    fn command(&self, command: WorkerCommand) -> Result<(), ResourceError> {
        self.commands
            .send(command)
            .map_err(|_| ResourceError::WorkerStopped)
    }
}

impl AudioResource for RodioResource {
    fn load(&mut self, url: &str) -> LoadId {
        self.last_load += 1;
        let load = self.last_load;
        self.source = Some(url.to_string());
        self.shared.set_ready_state(ReadyState::Nothing);
        self.shared.set_position(0.0);
        self.shared.current_load.store(load, Ordering::Release);

        if self.command(WorkerCommand::Reset { load }).is_err() {
            let _ = self.events.send(ResourceEvent::Error {
                load,
                message: ResourceError::WorkerStopped.to_string(),
            });
            return load;
        }

        let url = url.to_string();
        let http = self.http.clone();
        let commands = self.commands.clone();
        let events = self.events.clone();
        let shared = self.shared.clone();
        tokio::spawn(async move {
            log::debug!("Fetching stream {url} for load {load}");
            if let Err(err) = fetch(&http, &url, load, &commands, &shared).await {
                shared.failed_load.store(load, Ordering::Release);
                let _ = events.send(ResourceEvent::Error {
                    load,
                    message: err.without_url().to_string(),
                });
            }
        });

        load
    }

    fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    fn play(&mut self) -> Result<(), ResourceError> {
        if self.source.is_none() {
            return Err(ResourceError::NotAllowed("no source is bound".to_string()));
        }
        if self.shared.failed_load.load(Ordering::Acquire) == self.last_load {
            return Err(ResourceError::NotSupported(
                "no supported source was found".to_string(),
            ));
        }
        self.command(WorkerCommand::Play)
    }

    fn pause(&mut self) {
        let _ = self.command(WorkerCommand::Pause);
    }

    fn seek(&mut self, position: f64) {
        self.shared.set_position(position);
        let _ = self.command(WorkerCommand::Seek(position));
    }

    fn position(&self) -> f64 {
        self.shared.position()
    }

    fn set_gain(&mut self, gain: f64) {
        let _ = self.command(WorkerCommand::Gain(gain as f32));
    }

    fn ready_state(&self) -> ReadyState {
        self.shared.ready_state()
    }
}

/// Streams `url` into a fresh buffer, handing it to the worker once the
/// prebuffer is filled or the stream ends. Stops early when `load` is
/// superseded.
async fn fetch(
    http: &reqwest::Client,
    url: &str,
    load: LoadId,
    commands: &Sender<WorkerCommand>,
    shared: &Shared,
) -> Result<(), reqwest::Error> {
    let response = http.get(url).send().await?.error_for_status()?;
    let buffer = StreamBuffer::new(response.content_length());
    let mut prepared = false;

    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        if shared.current_load.load(Ordering::Acquire) != load {
            log::debug!("Load {load} was superseded, stopping its fetch");
            buffer.fail("load was superseded");
            return Ok(());
        }
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(err) => {
                buffer.fail(err.to_string());
                return Err(err);
            }
        };

        let buffered = buffer.append(&chunk);
        if !prepared && buffered >= PREBUFFER_BYTES {
            prepared = true;
            let _ = commands.send(WorkerCommand::Prepare {
                load,
                buffer: buffer.clone(),
            });
        }
    }

    buffer.finish();
    log::debug!("Stream of load {load} fully fetched");
    if !prepared {
        let _ = commands.send(WorkerCommand::Prepare {
            load,
            buffer: buffer.clone(),
        });
    }
    let _ = commands.send(WorkerCommand::Buffered { load });
    Ok(())
}

fn seek_sink(sink: &Sink, position: f64) {
    if let Err(err) = sink.try_seek(Duration::from_secs_f64(position)) {
        log::warn!("Seeking to {position}s failed: {err}");
    }
}

/// Owns the sink on the audio thread.
struct Worker {
    handle: rodio::OutputStreamHandle,
    sink: Option<Sink>,
    shared: Arc<Shared>,
    events: EventSink,
    load: LoadId,
    track: Option<Arc<StreamBuffer>>,
    wants_play: bool,
    gain: f32,
}

impl Worker {
    fn new(handle: rodio::OutputStreamHandle, shared: Arc<Shared>, events: EventSink) -> Self {
        Self {
            handle,
            sink: None,
            shared,
            events,
            load: NO_LOAD,
            track: None,
            wants_play: false,
            gain: 1.0,
        }
    }

    fn run(mut self, commands: Receiver<WorkerCommand>) {
        loop {
            match commands.recv_timeout(TICK) {
                Ok(command) => self.handle_command(command),
                Err(RecvTimeoutError::Timeout) => self.tick(),
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        log::debug!("Audio worker stopped");
    }

    fn emit(&self, event: ResourceEvent) {
        let _ = self.events.send(event);
    }

    fn handle_command(&mut self, command: WorkerCommand) {
        match command {
            WorkerCommand::Reset { load } => {
                if let Some(sink) = self.sink.take() {
                    sink.stop();
                }
                if let Some(track) = self.track.take() {
                    track.fail("load was superseded");
                }
                self.load = load;
                self.wants_play = false;
            }
            WorkerCommand::Prepare { load, buffer } => {
                if load != self.load {
                    log::debug!("Dropping stale stream data for load {load}");
                    return;
                }
                self.prepare(buffer);
            }
            WorkerCommand::Buffered { load } => {
                if load == self.load && self.track.is_some() {
                    self.shared.set_ready_state(ReadyState::EnoughData);
                }
            }
            WorkerCommand::Play => {
                self.wants_play = true;
                if self.track.is_some() && self.sink.as_ref().is_none_or(Sink::empty) {
                    self.rebuild(0.0);
                }
                if let Some(sink) = self.sink.as_ref() {
                    sink.play();
                }
            }
            WorkerCommand::Pause => {
                self.wants_play = false;
                if let Some(sink) = self.sink.as_ref() {
                    sink.pause();
                }
            }
            WorkerCommand::Seek(position) => {
                if self.track.is_some() && self.sink.as_ref().is_none_or(Sink::empty) {
                    self.rebuild(position);
                    return;
                }
                if let Some(sink) = self.sink.as_ref() {
                    seek_sink(sink, position);
                }
            }
            WorkerCommand::Gain(gain) => {
                self.gain = gain;
                if let Some(sink) = self.sink.as_ref() {
                    sink.set_volume(gain);
                }
            }
        }
    }

    fn prepare(&mut self, track: Arc<StreamBuffer>) {
        let decoder = match Decoder::new(track.reader()) {
            Ok(decoder) => decoder,
            Err(err) => {
                log::error!("Failed to decode stream for load {}: {err}", self.load);
                self.shared.failed_load.store(self.load, Ordering::Release);
                self.emit(ResourceEvent::Error {
                    load: self.load,
                    message: err.to_string(),
                });
                return;
            }
        };

        let duration = decoder.total_duration();
        self.track = Some(track);
        self.shared.set_ready_state(ReadyState::Metadata);
        if let Some(duration) = duration {
            self.emit(ResourceEvent::MetadataLoaded {
                load: self.load,
                duration: duration.as_secs_f64(),
            });
        }

        let finished = self.track.as_ref().is_some_and(|track| track.is_finished());
        if self.install(decoder, self.shared.position()) {
            self.shared.set_ready_state(if finished {
                ReadyState::EnoughData
            } else {
                ReadyState::FutureData
            });
            self.emit(ResourceEvent::CanPlay { load: self.load });
        }
    }

    /// Replaces the sink with a fresh decoder of the current track.
    fn rebuild(&mut self, position: f64) {
        let Some(track) = self.track.clone() else {
            return;
        };
        match Decoder::new(track.reader()) {
            Ok(decoder) => {
                self.install(decoder, position);
            }
            Err(err) => log::error!("Failed to rebuild decoder: {err}"),
        }
    }

    fn install(&mut self, decoder: Decoder<StreamReader>, position: f64) -> bool {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
        let sink = match Sink::try_new(&self.handle) {
            Ok(sink) => sink,
            Err(err) => {
                self.emit(ResourceEvent::Error {
                    load: self.load,
                    message: err.to_string(),
                });
                return false;
            }
        };

        sink.pause();
        sink.set_volume(self.gain);
        sink.append(decoder);
        if position > 0.0 {
            seek_sink(&sink, position);
        }
        if self.wants_play {
            sink.play();
        }
        self.shared.set_position(position);
        self.sink = Some(sink);
        true
    }

    fn tick(&mut self) {
        if !self.wants_play {
            return;
        }
        let Some(sink) = self.sink.as_ref() else {
            return;
        };

        if sink.empty() {
            self.wants_play = false;
            self.shared.set_position(0.0);
            self.emit(ResourceEvent::Ended { load: self.load });
            return;
        }

        let position = sink.get_pos().as_secs_f64();
        self.shared.set_position(position);
        self.emit(ResourceEvent::TimeUpdate {
            load: self.load,
            position,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;

    /// Serves one response of `len` bytes, holding back everything after
    /// `head` until `release` fires.
    fn serve_slowly(len: usize, head: usize, release: Receiver<()>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap();
        thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut byte = [0u8; 1];
            while !request.ends_with(b"\r\n\r\n") {
                socket.read_exact(&mut byte).unwrap();
                request.push(byte[0]);
            }

            let body = vec![7u8; len];
            write!(
                socket,
                "HTTP/1.1 200 OK\r\nContent-Length: {len}\r\nContent-Type: audio/mpeg\r\n\r\n"
            )
            .unwrap();
            socket.write_all(&body[..head]).unwrap();
            socket.flush().unwrap();
            let _ = release.recv();
            // the client may already have hung up
            let _ = socket.write_all(&body[head..]);
        });
        format!("http://{address}/001.mp3")
    }

    fn next_command(commands: &Receiver<WorkerCommand>) -> WorkerCommand {
        commands
            .recv_timeout(Duration::from_secs(5))
            .expect("no worker command arrived")
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn decoding_starts_before_the_download_completes() {
        let (release_tx, release_rx) = mpsc::channel();
        let url = serve_slowly(PREBUFFER_BYTES * 4, PREBUFFER_BYTES + 1024, release_rx);
        let (commands_tx, commands_rx) = mpsc::channel();
        let shared = Arc::new(Shared::default());
        shared.current_load.store(1, Ordering::Release);

        let fetch_shared = shared.clone();
        let fetching = tokio::spawn(async move {
            fetch(&reqwest::Client::new(), &url, 1, &commands_tx, &fetch_shared).await
        });

        let (buffer, commands_rx) = tokio::task::spawn_blocking(move || {
            match next_command(&commands_rx) {
                WorkerCommand::Prepare { load: 1, buffer } => (buffer, commands_rx),
                _ => panic!("expected the prebuffered stream first"),
            }
        })
        .await
        .unwrap();
        assert!(!buffer.is_finished());

        release_tx.send(()).unwrap();
        fetching.await.unwrap().unwrap();

        let buffered = tokio::task::spawn_blocking(move || next_command(&commands_rx))
            .await
            .unwrap();
        assert!(matches!(buffered, WorkerCommand::Buffered { load: 1 }));
        assert!(buffer.is_finished());
        let mut bytes = Vec::new();
        buffer.reader().read_to_end(&mut bytes).unwrap();
        assert_eq!(bytes.len(), PREBUFFER_BYTES * 4);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn superseded_fetch_stops_early() {
        let (release_tx, release_rx) = mpsc::channel();
        let url = serve_slowly(PREBUFFER_BYTES * 4, PREBUFFER_BYTES + 1024, release_rx);
        let (commands_tx, commands_rx) = mpsc::channel();
        let shared = Arc::new(Shared::default());
        shared.current_load.store(1, Ordering::Release);

        let fetch_shared = shared.clone();
        let fetching = tokio::spawn(async move {
            fetch(&reqwest::Client::new(), &url, 1, &commands_tx, &fetch_shared).await
        });
        let (buffer, commands_rx) = tokio::task::spawn_blocking(move || {
            match next_command(&commands_rx) {
                WorkerCommand::Prepare { buffer, .. } => (buffer, commands_rx),
                _ => panic!("expected the prebuffered stream first"),
            }
        })
        .await
        .unwrap();

        shared.current_load.store(2, Ordering::Release);
        release_tx.send(()).unwrap();
        fetching.await.unwrap().unwrap();

        assert!(buffer.is_finished());
        assert!(commands_rx.try_recv().is_err());
    }
}
