use anyhow::{anyhow, bail, Context};
use serde::Serialize;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tofcam::testing::{
    synthetic_depth_data, MockLibrary, MockPlatform, MockUsbHost, PermissionScript,
    SensorCharacteristics,
};
use tofcam::{CameraSession, DeviceFilter, SessionManager, TofCamConfig, UsbDevice};

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: tofcam-cli <filter|config-init|config-check|simulate> [args]");
        std::process::exit(1);
    }

    let command = &args[1];
    match command.as_str() {
        "filter" => cmd_filter(&args),
        "config-init" => cmd_config_init(&args),
        "config-check" => cmd_config_check(&args),
        "simulate" => cmd_simulate(&args),
        _ => {
            eprintln!("Unknown command: {}", command);
            std::process::exit(1);
        }
    }
}

fn parse_hex_u16(value: &str) -> anyhow::Result<u16> {
    let digits = value.trim_start_matches("0x").trim_start_matches("0X");
    u16::from_str_radix(digits, 16).with_context(|| format!("invalid USB id '{}'", value))
}

fn config_path(args: &[String]) -> std::path::PathBuf {
    args.get(2)
        .filter(|arg| !arg.starts_with("--"))
        .map(std::path::PathBuf::from)
        .unwrap_or_else(TofCamConfig::default_path)
}

#[derive(Serialize)]
struct FilterVerdict {
    vendor_id: u16,
    product_id: u16,
    supported: bool,
}

fn cmd_filter(args: &[String]) -> anyhow::Result<()> {
    if args.len() < 4 {
        eprintln!("Usage: tofcam-cli filter <vendor_id> <product_id> [--json]");
        std::process::exit(1);
    }
    let vendor_id = parse_hex_u16(&args[2])?;
    let product_id = parse_hex_u16(&args[3])?;
    let verdict = FilterVerdict {
        vendor_id,
        product_id,
        supported: DeviceFilter::accepts(vendor_id, product_id),
    };

    if args.contains(&"--json".to_string()) {
        println!("{}", serde_json::to_string(&verdict)?);
    } else {
        let label = if verdict.supported { "supported" } else { "not supported" };
        println!("{:04x}:{:04x} {}", vendor_id, product_id, label);
    }
    Ok(())
}

fn cmd_config_init(args: &[String]) -> anyhow::Result<()> {
    let path = config_path(args);
    if path.exists() {
        bail!("{} already exists", path.display());
    }
    TofCamConfig::default().save_to_file(&path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

fn cmd_config_check(args: &[String]) -> anyhow::Result<()> {
    let path = config_path(args);
    let config = TofCamConfig::load_from_file(&path)?;
    config.validate().map_err(|e| anyhow!(e))?;
    println!("{} is valid", path.display());
    Ok(())
}

#[derive(Serialize)]
struct FrameSummary {
    timestamp: i64,
    width: u16,
    height: u16,
    valid_points: usize,
}

/// Run a full session against the built-in simulated camera.
fn cmd_simulate(args: &[String]) -> anyhow::Result<()> {
    // simulate [--frames <n>] [--config <path>] [--json]
    let mut frames: u64 = 5;
    let mut config_file = None;
    let mut json = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--frames" => {
                i += 1;
                frames = args.get(i).ok_or_else(|| anyhow!("--frames needs a value"))?.parse()?;
            }
            "--config" => {
                i += 1;
                config_file = args.get(i).cloned();
            }
            "--json" => json = true,
            other => bail!("unexpected argument '{}'", other),
        }
        i += 1;
    }

    let config = match config_file {
        Some(path) => TofCamConfig::load_from_file(path)?,
        None => TofCamConfig::load_or_default(),
    };
    if let Some(level) = config.log_level() {
        env_logger::Builder::new()
            .filter_module("tofcam", level)
            .parse_default_env()
            .try_init()
            .ok();
    }

    let host = Arc::new(
        MockUsbHost::new()
            .with_device(UsbDevice::new("simulated", 0x1C28, 0xC012))
            .with_script(PermissionScript::Grant),
    );
    let library = Arc::new(MockLibrary::new());
    let manager = SessionManager::from_config(library.clone(), &config);

    let (tx, rx) = crossbeam_channel::bounded(1);
    let error_tx = tx.clone();
    manager.create_session(
        &MockPlatform::new(host),
        move |session| {
            tx.send(Ok(session)).ok();
        },
        move |error| {
            error_tx.send(Err(error)).ok();
        },
    );
    let session: CameraSession = rx
        .recv_timeout(Duration::from_secs(5))
        .context("camera did not open")??;

    session.initialize()?;
    if let Some(use_case) = &config.manager.default_use_case {
        session.set_use_case(use_case)?;
    }
    session.register_depth_data_listener(move |frame| {
        let summary = FrameSummary {
            timestamp: frame.timestamp,
            width: frame.width,
            height: frame.height,
            valid_points: frame.points.iter().filter(|p| p.depth_confidence > 0).count(),
        };
        if json {
            if let Ok(line) = serde_json::to_string(&summary) {
                println!("{}", line);
            }
        } else {
            println!(
                "Frame: {}x{} t={}us valid={}",
                summary.width, summary.height, summary.timestamp, summary.valid_points
            );
        }
    })?;
    session.start_capture()?;

    let control = library
        .last_opened()
        .ok_or_else(|| anyhow!("simulated camera missing"))?;
    let sensor = SensorCharacteristics::pico_flexx();
    for frame_number in 0..frames {
        control.deliver_depth_data(synthetic_depth_data(frame_number, sensor.width, sensor.height));
    }
    control.flush();

    session.stop_capture()?;
    session.close()?;
    Ok(())
}
