use std::sync::Arc;

use anyhow::Context;
use tilawa_audio::output::RodioFactory;
use tilawa_bridge::MessageRouter;
use tilawa_bridge::config::{LoadedConfig, load_config};
use tilawa_bridge::preferences::PreferenceStore;
use tilawa_controller::catalog::CatalogClient;
use tilawa_controller::formatting::{format_status, format_time};
use tilawa_controller::session::Session;
use tilawa_controller::{ControllerClient, ControllerEvent};
use tilawa_host::Supervisor;
use tokio::io::{AsyncBufReadExt, BufReader};

mod cli;

use crate::cli::CliCommand;

fn main() -> anyhow::Result<()> {
    simple_logger::SimpleLogger::new()
        .with_colors(true)
        .with_threads(true)
        .with_local_timestamps()
        .with_level(log::LevelFilter::Info)
        .env()
        .init()
        .context("failed to build logger instance")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    runtime.block_on(run())
}

async fn run() -> anyhow::Result<()> {
    let LoadedConfig { config, first_run } =
        load_config().await.context("failed to load config")?;
    let preferences = PreferenceStore::open_default()
        .await
        .context("failed to open preferences")?;
    let router = MessageRouter::default();

    let supervisor = Arc::new(Supervisor::new(
        router.clone(),
        Arc::new(RodioFactory::default()),
        preferences.clone(),
        config.timings.clone(),
    ));
    let started = if first_run {
        supervisor.on_installed().await
    } else {
        supervisor.on_startup().await
    };
    if let Err(err) = started {
        log::error!("Failed to start the playback host: {err}");
    }
    supervisor.clone().listen().await?;

    let client = Arc::new(ControllerClient::new(
        router.clone(),
        preferences.clone(),
        config.timings.clone(),
    ));
    let mut events = client.listen();
    let catalog = CatalogClient::new(&config.catalog);
    let mut session = Session::restore(client.clone(), preferences, &config.catalog).await;
    refresh_catalog(&catalog, &mut session).await;

    println!("{}", cli::HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match cli::parse(&line) {
                    Ok(Some(CliCommand::Quit)) => break,
                    Ok(Some(command)) => {
                        if let Err(err) = execute(command, &catalog, &mut session).await {
                            println!("error: {err}");
                        }
                    }
                    Ok(None) => {}
                    Err(err) => println!("{err}"),
                }
            }
            Some(event) = events.recv() => on_event(event, &mut session).await,
        }
    }

    log::info!("Shutting down");
    supervisor.reclaim_host().await;
    router.close().await;
    Ok(())
}

async fn refresh_catalog(catalog: &CatalogClient, session: &mut Session) {
    let language = session.language();
    let reciters = catalog.reciters(language).await;
    let surahs = catalog.surahs(language).await;
    match (reciters, surahs) {
        (Ok(reciters), Ok(surahs)) => session.set_catalog(reciters, surahs),
        (Err(err), _) | (_, Err(err)) => log::warn!("Failed to fetch the catalog: {err}"),
    }
}

async fn on_event(event: ControllerEvent, session: &mut Session) {
    match event {
        ControllerEvent::Ended => match session.advance().await {
            Ok(Some(surah)) => println!("now playing surah {surah}"),
            Ok(None) => println!("finished the last surah"),
            Err(err) => println!("error: {err}"),
        },
        ControllerEvent::Error(error) => println!("playback error: {error}"),
        ControllerEvent::HostReady => log::debug!("Playback host is ready"),
        ControllerEvent::State(_) => {}
    }
}

async fn execute(
    command: CliCommand,
    catalog: &CatalogClient,
    session: &mut Session,
) -> anyhow::Result<()> {
    match command {
        CliCommand::Reciters(filter) => {
            for reciter in session.find_reciters(filter.as_deref().unwrap_or("")) {
                println!("{:>5}  {}", reciter.id, reciter.name);
                for moshaf in &reciter.moshaf {
                    println!(
                        "       {:>4}  {} ({} surahs)",
                        moshaf.id, moshaf.name, moshaf.surah_total
                    );
                }
            }
        }
        CliCommand::Surahs => {
            for surah in session.surahs() {
                println!("{:>3}  {}", surah.id, surah.name);
            }
        }
        CliCommand::Select { reciter, moshaf } => {
            session.select(reciter, moshaf).await?;
            if let Some(moshaf) = session.moshaf() {
                println!("selected {} ({} surahs)", moshaf.name, moshaf.surah_ids().len());
            }
        }
        CliCommand::Play(surah) => {
            let state = session.play_surah(surah).await?;
            let name = session
                .surah(surah)
                .map(|surah| surah.name.as_str())
                .unwrap_or("");
            println!("playing {surah} {name} ({})", format_time(state.duration));
        }
        CliCommand::Resume => session.resume().await?,
        CliCommand::Pause => session.client().pause().await?,
        CliCommand::Seek(time) => session.client().seek(time).await?,
        CliCommand::Volume(level) => {
            session
                .client()
                .set_volume(f64::from(level) / 100.0)
                .await?
        }
        CliCommand::Mute => session.client().set_muted(true).await?,
        CliCommand::Unmute => session.client().set_muted(false).await?,
        CliCommand::Next => match session.advance().await? {
            Some(surah) => println!("playing surah {surah}"),
            None => println!("this was the last surah"),
        },
        CliCommand::Status => {
            let state = session.client().get_state().await?;
            println!("{}", format_status(&state));
            if let Some(url) = state.loaded_url {
                println!("{url}");
            }
        }
        CliCommand::Lang(language) => {
            session.set_language(language).await;
            refresh_catalog(catalog, session).await;
        }
        CliCommand::Help => println!("{}", cli::HELP),
        CliCommand::Quit => {}
    }
    Ok(())
}
