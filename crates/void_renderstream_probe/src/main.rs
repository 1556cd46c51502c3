//! RenderStream probe
//!
//! Loads the plugin, prints the schema stored for an asset and the live
//! stream set as JSON, and can serve blank frames for a while so a host
//! sees a responding application.
//!
//! Run with: cargo run -p void_renderstream_probe -- [ASSET] [--serve FRAMES]

use serde::Serialize;
use std::sync::Arc;
use void_renderstream::{
    fetch_streams, load_schema, CameraState, FrameLoop, FrameSender, HostEnvironment, HostRenderTarget,
    RenderStreamConfig, RenderTarget, Schema, SchemaInfo, Session, StreamDescription, TickOutcome,
};
use void_renderstream_sys::{FunctionTable, HostLogForwarder};

/// Everything the probe found
#[derive(Debug, Serialize)]
struct Report {
    library: Option<String>,
    asset: String,
    schema: Option<Schema>,
    streams: Vec<StreamDescription>,
}

/// Command line
struct Args {
    asset: String,
    serve: Option<u64>,
}

impl Args {
    fn parse() -> Result<Self, String> {
        let mut asset = None;
        let mut serve = None;
        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--serve" => {
                    let frames = args.next().ok_or("--serve needs a frame count")?;
                    serve = Some(frames.parse().map_err(|_| format!("Invalid frame count: {}", frames))?);
                }
                _ if asset.is_none() => asset = Some(arg),
                _ => return Err(format!("Unexpected argument: {}", arg)),
            }
        }

        let asset = match asset {
            Some(asset) => asset,
            None => std::env::current_exe()
                .map_err(|err| format!("No asset given and current exe unknown: {}", err))?
                .display()
                .to_string(),
        };
        Ok(Self { asset, serve })
    }
}

/// Single-scene engine stand-in
#[derive(Default)]
struct ProbeHost {
    scene: u32,
    quit: bool,
}

impl HostEnvironment for ProbeHost {
    fn active_scene(&self) -> u32 {
        self.scene
    }

    fn load_scene(&mut self, scene: u32) {
        log::info!("Host selected scene {}", scene);
        self.scene = scene;
    }

    fn quit(&mut self) {
        self.quit = true;
    }
}

fn main() {
    let args = match Args::parse() {
        Ok(args) => args,
        Err(err) => {
            eprintln!("{}", err);
            eprintln!("Usage: rs-probe [ASSET] [--serve FRAMES]");
            std::process::exit(2);
        }
    };

    let config = RenderStreamConfig::load();
    let table = FunctionTable::global_or_load(&config.loader_options());
    init_logging(&config, table.clone());

    if let Some(path) = &config.config_path {
        log::info!("Using config {}", path.display());
    }
    if let Some(reason) = table.disabled_reason() {
        log::error!("RenderStream unavailable: {}", reason);
        std::process::exit(1);
    }

    let report = probe(&table, &args.asset);
    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{}", json),
        Err(err) => log::error!("Failed to serialise report: {}", err),
    }

    if let Some(frames) = args.serve {
        if let Err(err) = serve(table, config, &args.asset, frames) {
            log::error!("Serving stopped: {}", err);
            std::process::exit(1);
        }
    }
}

fn init_logging(config: &RenderStreamConfig, table: Arc<FunctionTable>) {
    let logger = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).build();
    let max_level = logger.filter();

    let installed = if config.forward_logs {
        HostLogForwarder::new(logger, table).install(max_level)
    } else {
        log::set_boxed_logger(Box::new(logger)).map(|()| log::set_max_level(max_level))
    };
    if let Err(err) = installed {
        eprintln!("Logger already installed: {}", err);
    }
}

fn probe(table: &FunctionTable, asset: &str) -> Report {
    let schema = match load_schema(table, asset) {
        Ok(schema) => Some(schema),
        Err(err) => {
            log::warn!("No schema for {}: {}", asset, err);
            None
        }
    };

    let streams = match fetch_streams(table) {
        Ok(streams) => streams,
        Err(err) => {
            log::warn!("Failed to get streams: {}", err);
            Vec::new()
        }
    };

    Report {
        library: table.library_path().map(|path| path.display().to_string()),
        asset: asset.to_string(),
        schema,
        streams,
    }
}

fn host_target(stream: &StreamDescription) -> Box<dyn RenderTarget> {
    Box::new(HostRenderTarget::for_stream(stream))
}

/// One sender and camera per current stream
fn senders_for(session: &Session) -> (Vec<FrameSender>, Vec<CameraState>) {
    let senders = session.create_senders(host_target);
    let cameras = senders
        .iter()
        .map(|sender| {
            let (width, height) = sender.resolution();
            CameraState::new(width as f32 / height.max(1) as f32)
        })
        .collect();
    (senders, cameras)
}

/// Answer the host with blank frames until `frames` have been sent
fn serve(
    table: Arc<FunctionTable>,
    config: RenderStreamConfig,
    asset: &str,
    frames: u64,
) -> void_renderstream::Result<()> {
    let mut session = Session::start(table, config, asset, SchemaInfo::default())?;
    session.on_scene_loaded(0)?;
    session.set_status(&format!("Probe serving {} frames", frames))?;

    let (mut senders, mut cameras) = senders_for(&session);

    let mut host = ProbeHost::default();
    let mut frame_loop = FrameLoop::new();
    let mut sent = 0;
    let mut tick = 0;

    while sent < frames && !host.quit {
        tick += 1;
        match frame_loop.tick(&mut session, &mut host) {
            TickOutcome::StreamsChanged => (senders, cameras) = senders_for(&session),
            TickOutcome::SceneSwitch { scene } => {
                session.on_scene_loaded(scene)?;
                frame_loop = FrameLoop::new();
            }
            TickOutcome::Terminated => break,
            _ => {}
        }

        for (sender, camera) in senders.iter_mut().zip(cameras.iter_mut()) {
            if let Err(err) = session.update_camera(sender, camera) {
                log::warn!("Camera for {}: {}", sender.name(), err);
            }
        }
        if session.publish_all(&mut senders, tick) > 0 {
            sent += 1;
        }
    }

    log::info!("Served {} frames over {} ticks", sent, tick);
    session.shutdown();
    Ok(())
}
