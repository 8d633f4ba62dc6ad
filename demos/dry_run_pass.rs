/**
 * Dry-Run Pass
 *
 * Replays a compressed 5 minute pass against an in-memory link and prints
 * what the positioner would have received:
 * - preamble (stop + home)
 * - the shaped pass pairs, sampled
 * - the fast-home tail
 */

use std::time::{Duration, Instant};

use pelco_pass::config::TimingConfig;
use pelco_pass::{Config, MemoryLink, MemoryOpener, PassController, CMD_PAN_ABSOLUTE, CMD_TILT_ABSOLUTE};

const TIME_MULTIPLIER: f64 = 0.02;

fn main(){
    tracing_subscriber::fmt().with_env_filter("info").init();

    let mut config = Config::default();
    config.timing = TimingConfig::immediate();
    config.motion.time_multiplier = TIME_MULTIPLIER;

    let link = MemoryLink::new();
    let controller = match PassController::new(config, MemoryOpener::new("dry-run", link.clone())){
        Ok(c) => c,
        Err(e) =>{
            eprintln!("setup failed: {}", e);
            return;
        }
    };

    let started = Instant::now();
    if let Err(e) = controller.start(5.0){
        eprintln!("start failed: {}", e);
        return;
    }

    while controller.is_running(){
        let s = controller.status();
        println!("[{:>5.1}s] {:>5.1}% {}", started.elapsed().as_secs_f64(), s.progress * 100.0, s.message);
        std::thread::sleep(Duration::from_millis(500));
    }
    controller.join_worker();

    let frames = match link.frames(){
        Ok(frames) => frames,
        Err(e) =>{
            eprintln!("recording is not frame aligned: {}", e);
            return;
        }
    };

    let stops = frames.iter().filter(|f| f.is_stop()).count();
    let pairs: Vec<(f64, f64)> = frames
        .windows(2)
        .filter(|w| w[0].cmd2 == CMD_PAN_ABSOLUTE && w[1].cmd2 == CMD_TILT_ABSOLUTE)
        .map(|w| (w[0].angle_deg(), w[1].angle_deg()))
        .collect();

    println!("\n==============================================");
    println!("  {} frames, {} bytes", frames.len(), link.len());
    println!("  {} stop frames, {} az/el pairs", stops, pairs.len());
    println!("  final status: {}", controller.status().message);
    println!("==============================================");

    let step = (pairs.len() / 20).max(1);
    for (i, (az, el)) in pairs.iter().enumerate().step_by(step){
        println!("  #{:<5} az {:>7.2}  el {:>6.2}", i, az, el);
    }
}
