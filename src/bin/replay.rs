//! Replay a bridge event script against the loopback bridge
//!
//! Script lines are either bridge callbacks (`OnEventAttach camA`) or one of
//! the directives below. Blank lines and `#` comments are skipped.
//!
//! ```text
//! wait <ms>                      advance the clock and expire permission waits
//! resolution <device> <WxH|default>
//! close-all
//! tick                           print the handles that would get a frame tick
//! ```

use anyhow::{bail, Context};
use std::env;
use std::fs;
use std::time::Duration;
use tokio::time::Instant;
use uvc_manager::testing::{LoopbackBridge, LoopbackRenderer, SyntheticCamera};
use uvc_manager::{DeviceEvent, DeviceManager, Resolution, UvcConfig};

type ReplayManager = DeviceManager<LoopbackBridge, LoopbackRenderer>;

struct Options {
    script: String,
    json: bool,
    config: Option<String>,
    camera: SyntheticCamera,
}

fn main() -> anyhow::Result<()> {
    uvc_manager::init_logging();

    let args: Vec<String> = env::args().collect();
    let options = match parse_args(&args) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!(
                "Usage: uvc-replay <script> [--json] [--config <path>] [--camera webcam|vga|theta-s|theta-v]"
            );
            std::process::exit(1);
        }
    };

    let config = match &options.config {
        Some(path) => UvcConfig::load_from_file(path)?,
        None => UvcConfig::load_or_default(),
    };

    let script = fs::read_to_string(&options.script)
        .with_context(|| format!("reading script {}", options.script))?;

    let bridge = LoopbackBridge::new().with_fallback(options.camera.clone());
    let mut manager = DeviceManager::new(config, bridge, LoopbackRenderer::new());
    manager.initialize()?;

    let mut now = Instant::now();
    for (number, line) in script.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        run_line(&mut manager, &mut now, line, options.json)
            .with_context(|| format!("line {}: {}", number + 1, line))?;
    }

    let devices = manager.attached_devices();
    if options.json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
    } else {
        for d in devices {
            let resolution = d
                .current_resolution
                .map(|r| r.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!("{}: {} {}", d.device_id, d.state, resolution);
        }
    }
    Ok(())
}

fn parse_args(args: &[String]) -> anyhow::Result<Options> {
    let mut script = None;
    let mut json = false;
    let mut config = None;
    let mut camera = SyntheticCamera::generic_webcam();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--json" => json = true,
            "--config" => {
                i += 1;
                config = Some(args.get(i).context("--config needs a path")?.clone());
            }
            "--camera" => {
                i += 1;
                camera = match args.get(i).map(String::as_str) {
                    Some("webcam") => SyntheticCamera::generic_webcam(),
                    Some("vga") => SyntheticCamera::vga_only(),
                    Some("theta-s") => SyntheticCamera::theta_s(),
                    Some("theta-v") => SyntheticCamera::theta_v(),
                    other => bail!("unknown camera preset: {:?}", other),
                };
            }
            other if script.is_none() => script = Some(other.to_string()),
            other => bail!("unexpected argument: {}", other),
        }
        i += 1;
    }

    Ok(Options {
        script: script.context("script path required")?,
        json,
        config,
        camera,
    })
}

fn run_line(manager: &mut ReplayManager, now: &mut Instant, line: &str, json: bool) -> anyhow::Result<()> {
    let mut parts = line.split_whitespace();
    let head = parts.next().unwrap_or_default();
    let rest: Vec<&str> = parts.collect();

    match head {
        "wait" => {
            let ms: u64 = rest.first().context("wait needs milliseconds")?.parse()?;
            *now += Duration::from_millis(ms);
            for device_id in manager.expire_permissions(*now) {
                println!("permission timed out: {}", device_id);
            }
        }
        "resolution" => {
            let device_id = rest.first().context("resolution needs a device")?;
            let resolution = match rest.get(1).copied() {
                None | Some("default") => None,
                Some(size) => Some(parse_resolution(size)?),
            };
            report(manager.request_change_resolution(device_id, resolution).map(|changed| {
                println!("{}: resolution {}", device_id, if changed { "changed" } else { "unchanged" });
            }));
        }
        "close-all" => {
            let outcome = manager.close_all();
            if json {
                let failures: Vec<String> =
                    outcome.failures.iter().map(|(id, e)| format!("{}: {}", id, e)).collect();
                println!(
                    "{}",
                    serde_json::json!({ "closed": outcome.closed, "failures": failures })
                );
            } else {
                println!("closed {:?}, {} failure(s)", outcome.closed, outcome.failures.len());
            }
        }
        "tick" => {
            let handles: Vec<i32> = manager.frame_tick_targets().iter().map(|h| h.get()).collect();
            println!("tick {:?}", handles);
        }
        callback => {
            let event = DeviceEvent::from_callback(callback, &rest.join(" "))?;
            report(manager.handle_event(event));
        }
    }
    Ok(())
}

/// Manager errors are part of the replay, not a reason to stop it
fn report(result: uvc_manager::errors::Result<()>) {
    if let Err(e) = result {
        println!("error: {}", e);
    }
}

fn parse_resolution(value: &str) -> anyhow::Result<Resolution> {
    let (w, h) = value.split_once('x').context("expected WxH")?;
    Ok(Resolution::new(w.parse()?, h.parse()?)?)
}
