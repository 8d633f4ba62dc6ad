/**
 * Pass Controller Binary
 *
 * Drives the positioner from a terminal:
 * 1. Resolves and opens the serial port on first command
 * 2. Runs Home / Start / Stop against the device
 * 3. Polls status while a pass replays
 *
 * Usage: pass_controller [--config FILE] [--port PATH] [--baud N] [--dry-run]
 */

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use pelco_pass::config::TimingConfig;
use pelco_pass::pelco::port;
use pelco_pass::{Config, MemoryLink, MemoryOpener, PassController};

#[derive(Parser, Debug)]
#[command(name = "pass_controller")]
#[command(about = "Replay a satellite pass on a Pelco-D az/el positioner")]
#[command(version)]
struct Args{
    /// TOML calibration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial device, skipping discovery (e.g. COM6, /dev/ttyUSB0)
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate override
    #[arg(short, long)]
    baud: Option<u32>,

    /// Record frames in memory instead of opening a serial port
    #[arg(long)]
    dry_run: bool,

    /// Pass length multiplier, e.g. 0.1 to replay ten times faster
    #[arg(long)]
    time_multiplier: Option<f64>,
}

fn build_config(args: &Args) -> pelco_pass::Result<Config>{
    let mut config = match &args.config{
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(port) = &args.port{
        config.serial.port_override = Some(port.clone());
    }
    if let Some(baud) = args.baud{
        config.serial.baud = baud;
    }
    if let Some(mult) = args.time_multiplier{
        config.motion.time_multiplier = mult;
    }
    Ok(config)
}

fn print_status(controller: &PassController){
    let s = controller.status();
    println!(
        "[{}] {} | progress {:>3.0}% | port {} @ {}",
        if s.running{ "RUNNING" } else{ "IDLE" },
        s.message,
        s.progress * 100.0,
        if s.port.is_empty(){ "-" } else{ s.port.as_str() },
        s.baud,
    );
    if !s.last_error.is_empty(){
        println!("  last error: {}", s.last_error);
    }
}

fn print_ports(){
    match port::list_candidates(){
        Ok(ports) if ports.is_empty() => println!("no serial ports found"),
        Ok(ports) =>{
            for p in ports{
                println!("  {:<16} {}", p.device, p.description);
            }
        }
        Err(e) => println!("port enumeration failed: {}", e),
    }
}

/// Pass length argument of `start`; a missing or malformed value is `None`.
fn parse_minutes(word: Option<&str>) -> Option<f64>{
    word?.parse::<f64>().ok().filter(|m| m.is_finite())
}

fn report(what: &str, result: pelco_pass::Result<()>){
    match result{
        Ok(()) => println!("[{}] ok", what),
        Err(e) => println!("[{}] error: {}", what, e),
    }
}

fn main(){
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let config = match build_config(&args){
        Ok(config) => config,
        Err(e) =>{
            error!(%e, "configuration rejected");
            std::process::exit(2);
        }
    };

    let dry_link = MemoryLink::new();
    let controller = if args.dry_run{
        let mut config = config;
        config.timing = TimingConfig::immediate();
        PassController::new(config, MemoryOpener::new("dry-run", dry_link.clone()))
    }else{
        PassController::serial(config)
    };
    let controller = match controller{
        Ok(c) => c,
        Err(e) =>{
            error!(%e, "controller setup failed");
            std::process::exit(2);
        }
    };

    info!(dry_run = args.dry_run, "pass controller ready");

    println!("\n[Commands]");
    println!("  home          - fast home (home azimuth + horizon)");
    println!("  start <min>   - replay a pass (minimum {} min)", controller.config().motion.min_pass_minutes);
    println!("  stop          - stop immediately");
    println!("  status | s    - show status");
    println!("  ports         - list serial ports");
    println!("  x             - exit\n");

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop{
        print!("> ");
        let _ = io::stdout().flush();

        let line = match lines.next(){
            Some(Ok(line)) => line,
            _ => break,
        };

        let mut words = line.split_whitespace();
        match words.next(){
            Some("home") => report("HOME", controller.home()),
            Some("stop") => report("STOP", controller.stop()),
            Some("start") => match parse_minutes(words.next()){
                Some(minutes) => report("START", controller.start(minutes)),
                None => println!("usage: start <minutes>"),
            },
            Some("status") | Some("s") => print_status(&controller),
            Some("ports") => print_ports(),
            Some("x") | Some("exit") | Some("quit") => break,
            None => {}
            Some(other) => println!("Unknown command: {}", other),
        }
    }

    // never leave the positioner mid-pass
    if controller.is_running(){
        report("STOP", controller.stop());
        controller.wait_idle(Duration::from_secs(5));
    }
    controller.join_worker();
    if args.dry_run{
        println!("dry run recorded {} bytes", dry_link.len());
    }
    println!("Goodbye!");
}
