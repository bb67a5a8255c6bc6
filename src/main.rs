use clap::{Arg, ArgAction, ArgMatches, Command};
use colored::*;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::process;
use std::sync::Arc;
use std::time::Instant;

use portsweep::{
    config::{ScanConfig, ScanMode},
    network::{PortResult, PortState},
    scanner::engine::{ScanEngine, ScanOutcome},
    stats::{self, StatsStore},
};

const DEFAULT_TOP: usize = 10;
const TOP_TITLE: &str = "Most frequently open ports";

const BANNER: [&str; 4] = [
    "  ___  ___  ___ _____ _____      _____ ___ ___ ",
    " | _ \\/ _ \\| _ \\_   _/ __\\ \\    / / __| __| _ \\",
    " |  _/ (_) |   / | | \\__ \\\\ \\/\\/ /| _|| _||  _/",
    " |_|  \\___/|_|_\\ |_| |___/ \\_/\\_/ |___|___|_|  ",
];

fn print_banner() {
    for line in BANNER {
        println!("{}", line.truecolor(231, 76, 60).bold());
    }
    println!();
    println!(
        "{} {} {}",
        "portsweep".truecolor(255, 215, 0).bold(),
        env!("CARGO_PKG_VERSION").bright_white(),
        format!("| started {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S")).bright_blue()
    );
    println!();
}

fn build_cli() -> Command {
    Command::new("portsweep")
        .version(env!("CARGO_PKG_VERSION"))
        .about("IPv4 host discovery, TCP connect and SYN port scanning")
        .arg(
            Arg::new("target")
                .short('t')
                .long("target")
                .value_name("TARGET")
                .help("Addresses, ranges (10.0.0.1-20) or CIDR blocks, comma separated"),
        )
        .arg(
            Arg::new("ports")
                .short('p')
                .long("ports")
                .value_name("PORTS")
                .help("Single port, comma list, or low-high (high excluded)"),
        )
        .arg(
            Arg::new("discovery")
                .long("sn")
                .help("Host discovery only, no port scan")
                .action(ArgAction::SetTrue)
                .conflicts_with("stealth"),
        )
        .arg(
            Arg::new("stealth")
                .short('s')
                .long("stealth")
                .help("Raw SYN scan (needs raw socket privileges)")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("workers")
                .short('w')
                .long("workers")
                .value_name("N")
                .help("Concurrent workers per probing pool")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .value_name("MS")
                .help("Connect timeout in milliseconds")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("filtered")
                .long("filtered")
                .help("Also show filtered ports")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("stats")
                .long("stats")
                .value_names(["VIEW", "N"])
                .num_args(1..=2)
                .help("Show recorded open-port counts: `all` or `top [N]`, then exit"),
        )
        .arg(
            Arg::new("no-stats")
                .long("no-stats")
                .help("Do not record open ports")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("no-banner")
                .long("no-banner")
                .help("Hide the banner")
                .action(ArgAction::SetTrue),
        )
}

/// File (or default) configuration with command line overrides applied
fn resolve_config(matches: &ArgMatches) -> portsweep::Result<ScanConfig> {
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => ScanConfig::from_toml_file(path)?,
        None => ScanConfig::load_default_config(),
    };

    if let Some(target) = matches.get_one::<String>("target") {
        config.target = target.clone();
    }
    if let Some(ports) = matches.get_one::<String>("ports") {
        config.ports = ports.clone();
    }
    if matches.get_flag("discovery") {
        config.mode = ScanMode::Discovery;
    } else if matches.get_flag("stealth") {
        config.mode = ScanMode::Stealth;
    }
    if let Some(&workers) = matches.get_one::<usize>("workers") {
        config.workers = workers;
    }
    if let Some(&timeout) = matches.get_one::<u64>("timeout") {
        config.connect_timeout_ms = timeout;
    }
    if matches.get_flag("filtered") {
        config.show_filtered = true;
    }
    if matches.get_flag("no-stats") {
        config.record_stats = false;
    }
    Ok(config)
}

fn show_stats(args: &[String]) -> portsweep::Result<()> {
    let store = StatsStore::new()?;
    match args {
        [view] if view == "all" => stats::print_ranking("Open port counts", &store.all()?),
        [view] if view == "top" => {
            stats::print_ranking(TOP_TITLE, &store.top(DEFAULT_TOP)?)
        }
        [view, n] if view == "top" => {
            let n: usize = n.parse().map_err(|_| {
                portsweep::ScanError::ConfigError(format!("invalid count for --stats top: {}", n))
            })?;
            stats::print_ranking(TOP_TITLE, &store.top(n)?);
        }
        _ => {
            return Err(portsweep::ScanError::ConfigError(
                "--stats expects `all` or `top [N]`".to_string(),
            ))
        }
    }
    Ok(())
}

fn print_live_hosts(live: &[Ipv4Addr]) {
    let mut sorted = live.to_vec();
    sorted.sort();
    if sorted.is_empty() {
        println!("{}", "[!] No hosts answered".bright_yellow());
        return;
    }
    for host in sorted {
        println!("{} {}", "[+] Host is up:".bright_green(), host.to_string().bright_cyan().bold());
    }
}

/// Results of interest grouped per host, hosts and ports ascending.
///
/// Every host in `hosts` gets an entry, even when none of its ports are shown.
fn visible_results<'a>(
    hosts: &[Ipv4Addr],
    results: &'a [PortResult],
    show_filtered: bool,
) -> BTreeMap<Ipv4Addr, Vec<&'a PortResult>> {
    let mut grouped: BTreeMap<Ipv4Addr, Vec<&PortResult>> =
        hosts.iter().map(|&host| (host, Vec::new())).collect();
    for result in results {
        let shown = match result.state {
            PortState::Open => true,
            PortState::Filtered => show_filtered,
            PortState::Closed | PortState::Unreachable => false,
        };
        let entry = grouped.entry(result.target).or_default();
        if shown {
            entry.push(result);
        }
    }
    for entries in grouped.values_mut() {
        entries.sort_by_key(|r| r.port);
    }
    grouped
}

fn print_port_results(report: &BTreeMap<Ipv4Addr, Vec<&PortResult>>) {
    for (host, entries) in report {
        println!();
        println!("{} {}", "Scan report for".bright_white().bold(), host.to_string().bright_cyan());
        if entries.is_empty() {
            println!("  No accessible ports detected");
            continue;
        }
        println!("  {:<10} {}", "PORT".bright_white().bold(), "STATE".bright_white().bold());
        for result in entries {
            let state = match result.state {
                PortState::Open => result.state.to_string().bright_green(),
                _ => result.state.to_string().bright_yellow(),
            };
            println!("  {:<10} {}", format!("{}/tcp", result.port), state);
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let matches = build_cli().get_matches();

    if let Some(args) = matches.get_many::<String>("stats") {
        let args: Vec<String> = args.cloned().collect();
        if let Err(e) = show_stats(&args) {
            eprintln!("{} {}", "[!]".bright_red(), e);
            process::exit(1);
        }
        return;
    }

    if !matches.get_flag("no-banner") {
        print_banner();
    }

    let config = match resolve_config(&matches) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}", "[!]".bright_red(), e);
            process::exit(1);
        }
    };

    let mut engine = match ScanEngine::new(config.clone()) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("{} {}", "[!] Invalid configuration:".bright_red(), e);
            process::exit(1);
        }
    };
    if config.record_stats && config.mode != ScanMode::Discovery {
        match StatsStore::new() {
            Ok(store) => engine = engine.with_stats(Arc::new(store)),
            Err(e) => eprintln!("{} {}", "[!] Stats disabled:".bright_yellow(), e),
        }
    }

    println!(
        "{} {} {} {}",
        "[~] Starting".bright_blue(),
        config.mode.name().bright_cyan(),
        "scan of".bright_blue(),
        config.target.bright_cyan().bold()
    );

    let start = Instant::now();
    let outcome = match engine.run().await {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("{} {}", "[!]".bright_red(), e);
            process::exit(1);
        }
    };
    let elapsed = start.elapsed().as_secs_f64();

    match outcome {
        ScanOutcome::Discovery { live } => {
            print_live_hosts(&live);
            println!();
            println!(
                "{} {} host(s) up, scanned in {:.2}s",
                "[~]".bright_blue(),
                live.len(),
                elapsed
            );
        }
        ScanOutcome::Ports {
            live,
            results,
            failures,
            stats_warning,
        } => {
            if config.mode == ScanMode::PortScan {
                print_live_hosts(&live);
            }
            let report = visible_results(&live, &results, config.show_filtered);
            print_port_results(&report);

            for failure in &failures {
                eprintln!(
                    "{} {}: {}",
                    "[!] Stealth scan failed for".bright_red(),
                    failure.target,
                    failure.reason
                );
            }
            if let Some(warning) = stats_warning {
                eprintln!("{} {}", "[!]".bright_yellow(), warning);
            }

            println!();
            println!(
                "{} {} host(s) reported, scanned in {:.2}s",
                "[~]".bright_blue(),
                report.len(),
                elapsed
            );
        }
    }
}
