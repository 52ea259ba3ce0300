//! Self-healing example
//!
//! Captures each device's running configuration, wipes and reloads it,
//! then restores whatever did not come back.
//!
//! # Usage
//!
//! ```bash
//! # Every device listed in a TOML file
//! cargo run --example self_heal -- --config lab.toml
//!
//! # A single device
//! cargo run --example self_heal -- --name IOU1 --host 192.168.1.10 --port 5021 --class iou
//! ```
//!
//! A configuration file looks like:
//!
//! ```toml
//! artifacts_dir = "captures"
//! cycle_timeout_secs = 900
//!
//! [[devices]]
//! name = "IOU1"
//! host = "192.168.1.10"
//! port = 5021
//!
//! [[devices]]
//! name = "vIOS1"
//! host = "192.168.1.10"
//! port = 5022
//! class = "iosv"
//! ```

use std::env;
use std::path::PathBuf;

use netmend::{DeviceDescriptor, ReconcileConfig, Reconciler};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    println!("=== Netmend Self-Healing Example ===\n");

    let mut config = match &args.config {
        Some(path) => ReconcileConfig::load(path)?,
        None => ReconcileConfig::default(),
    };

    if let Some(host) = &args.host {
        let device = DeviceDescriptor::new(&args.name, host, args.port).with_class(&args.class);
        config.devices.push(device);
    }
    if args.artifacts.is_some() {
        config.artifacts_dir = args.artifacts.clone();
    }
    config.validate()?;

    if config.devices.is_empty() {
        eprintln!("Error: no devices; pass --config or --host");
        std::process::exit(1);
    }

    println!("Reconciling {} device(s)...\n", config.devices.len());
    let reconciler = Reconciler::telnet(config);
    let outcomes = reconciler.run_all().await;

    println!("--- Summary ---");
    let mut failed = 0;
    for outcome in &outcomes {
        println!("  {}", outcome);
        if let Some(report) = &outcome.report {
            for (category, entries) in report.iter().filter(|(_, e)| !e.is_empty()) {
                println!("    {}:", category);
                for entry in entries {
                    for line in entry.lines() {
                        println!("      {}", line);
                    }
                }
            }
        }
        if !outcome.is_success() {
            failed += 1;
        }
    }

    if failed > 0 {
        eprintln!("\n{} of {} device(s) failed", failed, outcomes.len());
        std::process::exit(1);
    }
    println!("\nDone!");
    Ok(())
}

/// Simple argument parser
struct Args {
    config: Option<PathBuf>,
    name: String,
    host: Option<String>,
    port: u16,
    class: String,
    artifacts: Option<PathBuf>,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = env::args().collect();
        let mut config = None;
        let mut name = "device".to_string();
        let mut host = None;
        let mut port = 23u16;
        let mut class = "iou".to_string();
        let mut artifacts = None;

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--config" | "-c" => {
                    i += 1;
                    if i < args.len() {
                        config = Some(PathBuf::from(&args[i]));
                    }
                }
                "--name" | "-n" => {
                    i += 1;
                    if i < args.len() {
                        name = args[i].clone();
                    }
                }
                "--host" | "-h" => {
                    i += 1;
                    if i < args.len() {
                        host = Some(args[i].clone());
                    }
                }
                "--port" | "-p" => {
                    i += 1;
                    if i < args.len() {
                        port = args[i].parse().unwrap_or(23);
                    }
                }
                "--class" => {
                    i += 1;
                    if i < args.len() {
                        class = args[i].clone();
                    }
                }
                "--artifacts" | "-a" => {
                    i += 1;
                    if i < args.len() {
                        artifacts = Some(PathBuf::from(&args[i]));
                    }
                }
                "--help" => {
                    Self::print_help();
                    std::process::exit(0);
                }
                _ => {}
            }
            i += 1;
        }

        Self {
            config,
            name,
            host,
            port,
            class,
            artifacts,
        }
    }

    fn print_help() {
        println!("Self-healing example");
        println!();
        println!("Usage: self_heal [OPTIONS]");
        println!();
        println!("Options:");
        println!("  -c, --config <PATH>      TOML file listing devices and profiles");
        println!("  -n, --name <NAME>        Device name (default: device)");
        println!("  -h, --host <HOST>        Console server host");
        println!("  -p, --port <PORT>        Console port (default: 23)");
        println!("      --class <CLASS>      Device class (default: iou)");
        println!("  -a, --artifacts <DIR>    Write capture artifacts to DIR");
        println!("      --help               Print help");
    }
}
