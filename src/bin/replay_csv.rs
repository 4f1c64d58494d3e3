use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{ensure, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use handcursor::config::EngineConfig;
use handcursor::controller::CursorController;
use handcursor::csv_loader::load_recording;
use handcursor::hid::RecordingSink;
use handcursor::types::ScreenSize;

/// Reproduce una grabación de landmarks y muestra los eventos generados
#[derive(Parser, Debug)]
#[command(name = "replay_csv", version)]
struct Args {
    /// CSV con columnas frame,t_ms,landmark,x,y
    #[arg(value_name = "FILE")]
    csv: PathBuf,

    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[arg(long, default_value_t = 1920)]
    width: u32,

    #[arg(long, default_value_t = 1080)]
    height: u32,

    /// Imprime también la trayectoria del cursor
    #[arg(long)]
    dump_cursor: bool,

    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    ensure!(args.width > 0 && args.height > 0, "La pantalla no puede tener tamaño cero");

    let config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    println!("🎞️  Reproduciendo gesto desde {:?}", args.csv);
    let recording = load_recording(&args.csv)?;
    println!("ℹ️  {} frames", recording.len());

    let sink = RecordingSink::new();
    let mut controller = CursorController::new(
        config,
        ScreenSize::new(args.width, args.height),
        sink.clone(),
    )?;

    let start = Instant::now();
    let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    let mut failures = 0;

    for frame in &recording {
        let report = controller.update_raw(frame.points.as_deref(), start + frame.offset);
        failures += report.delivery_failures;

        let t = frame.offset.as_secs_f32();
        if args.dump_cursor {
            match report.cursor {
                Some((x, y)) => println!("  {:>8.3}s  cursor ({:>5}, {:>5})", t, x, y),
                None => println!("  {:>8.3}s  cursor -", t),
            }
        }

        for event in &report.events {
            *counts.entry(event.kind()).or_default() += 1;
            if !matches!(event.kind(), "move" | "drag_move") || args.dump_cursor {
                println!("  {:>8.3}s  {:?}", t, event);
            }
        }
    }

    let closing = controller.close();
    for event in &closing.events {
        *counts.entry(event.kind()).or_default() += 1;
        println!("  (cierre)   {:?}", event);
    }

    println!("\n📊 Resumen:");
    for (kind, count) in &counts {
        println!("  {:<16} {:>6}", kind, count);
    }
    println!("  {:<16} {:>6}", "órdenes", sink.commands().len());
    if failures > 0 {
        println!("  {:<16} {:>6}", "fallos", failures);
    }

    Ok(())
}
