//! Console bootstrap example
//!
//! Prepares a freshly booted device for remote management over its console:
//! either pushes a templated router configuration, or walks an appliance
//! through its initial setup wizard.
//!
//! # Usage
//!
//! ```bash
//! # Router: set hostname, domain, a local user and telnet/ssh on the vty lines
//! cargo run --example console_bootstrap -- --host 192.168.1.10 --port 5021 \
//!     --hostname R1 --domain lab.local --password secret
//!
//! # Appliance: answer the setup wizard
//! cargo run --example console_bootstrap -- --host 192.168.1.10 --port 5030 --appliance \
//!     --hostname ftd1 --address 192.168.45.10 --netmask 255.255.255.0 --gateway 192.168.45.1 \
//!     --password Admin#12345
//! ```

use std::collections::HashMap;
use std::env;

use netmend::channel::Session;
use netmend::driver::{ApplianceSetup, configure_over_console, render_commands, setup_appliance};
use netmend::transport::TelnetConfig;
use secrecy::SecretString;

const ROUTER_TEMPLATE: &[&str] = &[
    "configure terminal",
    "hostname {hostname}",
    "ip domain name {domain}",
    "username admin privilege 15 secret {password}",
    "crypto key generate rsa modulus 2048",
    "line vty 0 4",
    "login local",
    "transport input telnet ssh",
    "end",
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    println!("=== Netmend Console Bootstrap Example ===\n");

    println!("Connecting to {}:{}...", args.host, args.port);
    let mut session = Session::connect(TelnetConfig::new(&args.host, args.port))
        .await?
        .with_device(&args.hostname);
    println!("Connected!\n");

    if args.appliance {
        let mut setup = ApplianceSetup::new(
            &args.hostname,
            &args.address,
            &args.netmask,
            &args.gateway,
            SecretString::from(args.password.clone()),
        );
        if let Some(dns) = &args.dns {
            setup = setup.with_dns(dns);
        }

        let report = setup_appliance(&mut session, &setup).await?;
        println!("Answered: {}", report.answered.join(", "));
        println!("Skipped:  {}", report.skipped.join(", "));
    } else {
        let vars: HashMap<String, String> = [
            ("hostname", args.hostname.as_str()),
            ("domain", args.domain.as_str()),
            ("password", args.password.as_str()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let commands = render_commands(ROUTER_TEMPLATE, &vars)?;

        let responses = configure_over_console(&mut session, &commands, "#", None).await?;
        for response in &responses {
            let status = if response.is_rejected() { "rejected" } else { "ok" };
            println!("  {:<50} {} ({:?})", response.command, status, response.elapsed);
        }
    }

    println!("\nClosing connection...");
    session.close().await?;
    println!("Done!");

    Ok(())
}

/// Simple argument parser
struct Args {
    host: String,
    port: u16,
    appliance: bool,
    hostname: String,
    domain: String,
    password: String,
    address: String,
    netmask: String,
    gateway: String,
    dns: Option<String>,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = env::args().collect();
        let mut parsed = Self {
            host: "localhost".to_string(),
            port: 23,
            appliance: false,
            hostname: "R1".to_string(),
            domain: "lab.local".to_string(),
            password: String::new(),
            address: String::new(),
            netmask: "255.255.255.0".to_string(),
            gateway: String::new(),
            dns: None,
        };

        let mut i = 1;
        while i < args.len() {
            let value = args.get(i + 1).cloned();
            let mut takes_value = true;
            match (args[i].as_str(), value) {
                ("--host" | "-h", Some(v)) => parsed.host = v,
                ("--port" | "-p", Some(v)) => parsed.port = v.parse().unwrap_or(23),
                ("--hostname", Some(v)) => parsed.hostname = v,
                ("--domain", Some(v)) => parsed.domain = v,
                ("--password" | "-P", Some(v)) => parsed.password = v,
                ("--address", Some(v)) => parsed.address = v,
                ("--netmask", Some(v)) => parsed.netmask = v,
                ("--gateway", Some(v)) => parsed.gateway = v,
                ("--dns", Some(v)) => parsed.dns = Some(v),
                ("--appliance", _) => {
                    parsed.appliance = true;
                    takes_value = false;
                }
                ("--help", _) => {
                    Self::print_help();
                    std::process::exit(0);
                }
                _ => takes_value = false,
            }
            i += if takes_value { 2 } else { 1 };
        }

        if parsed.password.is_empty() {
            eprintln!("Error: --password is required");
            std::process::exit(1);
        }
        parsed
    }

    fn print_help() {
        println!("Console bootstrap example");
        println!();
        println!("Usage: console_bootstrap [OPTIONS] --password <PASSWORD>");
        println!();
        println!("Options:");
        println!("  -h, --host <HOST>          Console server host (default: localhost)");
        println!("  -p, --port <PORT>          Console port (default: 23)");
        println!("      --appliance            Run the appliance setup wizard");
        println!("      --hostname <NAME>      Hostname to set (default: R1)");
        println!("      --domain <DOMAIN>      Domain name (router, default: lab.local)");
        println!("  -P, --password <PASSWORD>  Admin password");
        println!("      --address <IP>         Management address (appliance)");
        println!("      --netmask <MASK>       Management netmask (appliance)");
        println!("      --gateway <IP>         Management gateway (appliance)");
        println!("      --dns <IP>             DNS server (appliance)");
        println!("      --help                 Print help");
    }
}
