/*
Cursor por gestos de mano - daemon

Lee frames de landmarks de una mano (21 puntos normalizados) como JSON, uno
por línea, desde stdin:
    null                         -> no hay mano en este frame
    [[x, y], [x, y], ...]        -> los 21 puntos

y convierte cada frame en movimiento de cursor y eventos de gesto (click,
drag, enter, scroll, click derecho, dictado).

Para compilar con salida HID real (/dev/uinput):
    cargo build --release --features uinput

Ejemplo:
    detector_landmarks | sg input -c './target/release/handcursor --screen 2560x1440'

Sin la feature `uinput` (o con --dry-run) las órdenes solo se registran.
*/

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use handcursor::config::EngineConfig;
use handcursor::controller::CursorController;
use handcursor::hid::{ChannelSink, CommandSink, LogSink, OutputCommand};
use handcursor::types::ScreenSize;

/// Frame tal como llega por stdin
type RawFrame = Option<Vec<(f32, f32)>>;

#[derive(Parser, Debug)]
#[command(
    name = "handcursor",
    version,
    about = "Controla el cursor con landmarks de la mano leídos desde stdin"
)]
struct Cli {
    /// Archivo JSON de configuración (los campos ausentes usan valores por defecto)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Resolución de la pantalla
    #[arg(long, value_name = "WxH", default_value = "1920x1080", value_parser = parse_screen)]
    screen: ScreenSize,

    /// No inyectar eventos, solo registrarlos
    #[arg(long)]
    dry_run: bool,

    /// Logs de depuración
    #[arg(short, long)]
    verbose: bool,

    /// Imprime la configuración efectiva y sale
    #[arg(long)]
    print_config: bool,

    /// Avanza el scroll con los frames en lugar de un hilo a cadencia fija
    #[arg(long)]
    no_scroll_ticker: bool,
}

fn parse_screen(value: &str) -> Result<ScreenSize, String> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("'{}' no tiene el formato WxH", value))?;
    let width: u32 = w.trim().parse().map_err(|e| format!("ancho inválido: {}", e))?;
    let height: u32 = h.trim().parse().map_err(|e| format!("alto inválido: {}", e))?;
    if width == 0 || height == 0 {
        return Err("la pantalla no puede tener tamaño cero".to_string());
    }
    Ok(ScreenSize::new(width, height))
}

/// Una línea de stdin; una línea ilegible cuenta como frame sin mano
fn parse_line(line: &str) -> RawFrame {
    match serde_json::from_str::<Option<Vec<[f32; 2]>>>(line) {
        Ok(frame) => frame.map(|points| points.into_iter().map(|[x, y]| (x, y)).collect()),
        Err(e) => {
            debug!("Línea descartada: {}", e);
            None
        }
    }
}

/// Hilo lector de stdin. Al llegar EOF suelta el sender y el canal se cierra.
fn spawn_reader(tx: Sender<RawFrame>) -> JoinHandle<()> {
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    error!("❌ Error leyendo stdin: {}", e);
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            if tx.send(parse_line(&line)).is_err() {
                break;
            }
        }
    })
}

#[cfg(feature = "uinput")]
fn open_sink(dry_run: bool) -> Box<dyn CommandSink> {
    if dry_run {
        return Box::new(LogSink);
    }
    match handcursor::hid::HidOutput::new() {
        Ok(hid) => {
            info!("✅ HID inicializado (/dev/uinput)");
            Box::new(hid)
        }
        Err(e) => {
            error!("❌ No se pudo inicializar HID: {}; solo se registran las órdenes", e);
            Box::new(LogSink)
        }
    }
}

#[cfg(not(feature = "uinput"))]
fn open_sink(dry_run: bool) -> Box<dyn CommandSink> {
    if !dry_run {
        warn!("⚠️  Compilado sin la feature `uinput`: solo se registran las órdenes");
    }
    Box::new(LogSink)
}

/// Hilo de inyección: dueño del dispositivo, consume órdenes hasta que se cierran los senders
fn spawn_injector(rx: Receiver<OutputCommand>, dry_run: bool) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut sink = open_sink(dry_run);
        while let Ok(command) = rx.recv() {
            if let Err(e) = sink.send(&command) {
                error!("❌ Error enviando {:?}: {}", command, e);
            }
        }
        debug!("Hilo de inyección terminado");
    })
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("No se pudo cargar la configuración {:?}", path))?,
        None => EngineConfig::default(),
    };

    if cli.print_config {
        println!("{}", config.to_json_pretty()?);
        return Ok(());
    }

    info!("🎯 handcursor - pantalla {}x{}", cli.screen.width, cli.screen.height);
    let timeout = config.tracking.detection_timeout();

    // Órdenes hacia el hilo HID
    let (tx_out, rx_out) = unbounded::<OutputCommand>();
    let injector = spawn_injector(rx_out, cli.dry_run);

    // Frames desde stdin
    let (tx_frames, rx_frames) = bounded::<RawFrame>(100);
    let _reader = spawn_reader(tx_frames);

    let sink = ChannelSink::new(tx_out.clone());
    let mut controller = if cli.no_scroll_ticker {
        CursorController::new(config, cli.screen, sink)?
    } else {
        CursorController::with_scroll_ticker(config, cli.screen, sink, tx_out.clone())?
    };
    drop(tx_out);

    info!("🎬 Esperando frames en stdin...");
    let mut frames = 0u64;

    loop {
        select! {
            recv(rx_frames) -> msg => {
                match msg {
                    Ok(points) => {
                        frames += 1;
                        let report = controller.update_raw(points.as_deref(), Instant::now());
                        if !report.events.is_empty() {
                            debug!("frame {}: {:?}", frames, report.events);
                        }
                    }
                    Err(_) => {
                        info!("📭 Fin de la entrada tras {} frames", frames);
                        break;
                    }
                }
            }
            // Sin frames la pérdida de mano tiene que dispararse igual
            default(timeout) => {
                controller.update(None, Instant::now());
            }
        }
    }

    let report = controller.close();
    if !report.events.is_empty() {
        info!("🧹 Liberado al cerrar: {:?}", report.events);
    }
    drop(controller);

    if injector.join().is_err() {
        error!("❌ El hilo de inyección terminó con pánico");
    }
    info!("👋 Saliendo...");
    Ok(())
}
