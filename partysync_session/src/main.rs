// CLI entry point for a headless partysync session.
//
// Runs a `MultiplayerGame` over a `HeadlessWorld` in solo, server or client
// mode. The locally controlled creature walks in a slow circle so there is
// replication traffic to watch; set `RUST_LOG=debug` to see every command.
//
// Usage:
//   partysync [OPTIONS]
//     --config <PATH>     JSON session config (flags override it)
//     --mode <MODE>       solo | server | client (default: solo)
//     --host <HOST>       Bind or connect address (default: 127.0.0.1)
//     --port <PORT>       Port (default: 7878)
//     --tag <TAG>         Participant tag a client asks for
//     --module <NAME>     Start module for solo/server sessions
//     --ticks <N>         Stop after N ticks (default: run until killed)

use std::path::PathBuf;
use std::process::exit;
use std::thread;

use log::{error, info};
use partysync_protocol::Vec3;
use partysync_session::{
    HeadlessWorld, ModuleLayout, MultiplayerGame, PartyTemplate, SessionConfig, SessionEvent,
    SessionMode, World, open_network,
};

struct Options {
    config: SessionConfig,
    max_ticks: Option<u64>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Options { config, max_ticks } = parse_args();
    if let Err(e) = config.validate() {
        eprintln!("{e}");
        exit(1);
    }

    let network = match open_network(&config) {
        Ok(network) => network,
        Err(e) => {
            eprintln!("Failed to start {} session: {e}", config.mode);
            exit(1);
        }
    };

    let layout = ModuleLayout {
        doors: vec!["door_entrance".into()],
    };
    let mut world = match config.mode {
        SessionMode::Client => HeadlessWorld::new(layout),
        SessionMode::Solo | SessionMode::Server => {
            HeadlessWorld::with_party(PartyTemplate::default()).with_layout(layout)
        }
    };

    let mut game = MultiplayerGame::new(network);
    if let Some(module) = &config.start_module {
        game.request_module(module);
    }

    info!("running {} session, tick {} ms", config.mode, config.tick_ms);
    let mut tick: u64 = 0;
    loop {
        for event in game.tick(&mut world) {
            info!("{event}");
            if event == SessionEvent::ServerConnectionLost {
                error!("server went away, exiting");
                exit(1);
            }
        }
        walk_player(&game, &mut world, tick);

        tick += 1;
        if max_ticks.is_some_and(|max| tick >= max) {
            break;
        }
        thread::sleep(config.tick_interval());
    }
    info!("stopping after {tick} ticks");
}

/// Move the local player along a circle and report the change.
fn walk_player(game: &MultiplayerGame, world: &mut HeadlessWorld, tick: u64) {
    if !game.state().is_running() {
        return;
    }
    let Some(tag) = world.player_tag() else {
        return;
    };
    let Some(creature) = world.creature_mut(&tag) else {
        return;
    };
    let angle = (tick % 360) as f32 * std::f32::consts::PI / 180.0;
    creature.position = Vec3::new(angle.cos() * 5.0, angle.sin() * 5.0, 0.0);
    creature.heading = angle;
    let (position, heading) = (creature.position, creature.heading);
    game.on_object_transform_changed(&*world, &tag, position, heading);
}

/// Parse command-line arguments. `--config` is read first so the other
/// flags can override what the file says.
fn parse_args() -> Options {
    let args: Vec<String> = std::env::args().collect();

    let mut config = match args.iter().position(|a| a == "--config") {
        Some(i) => {
            let Some(path) = args.get(i + 1) else {
                eprintln!("--config requires a path");
                exit(1);
            };
            SessionConfig::load(&PathBuf::from(path)).unwrap_or_else(|e| {
                eprintln!("{e}");
                exit(1);
            })
        }
        None => SessionConfig::default(),
    };
    let mut max_ticks = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
            }
            "--mode" => {
                i += 1;
                config.mode = args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                    eprintln!("--mode requires one of solo, server, client");
                    exit(1);
                });
            }
            "--host" => {
                i += 1;
                config.host = args.get(i).cloned().unwrap_or_else(|| {
                    eprintln!("--host requires a value");
                    exit(1);
                });
            }
            "--port" => {
                i += 1;
                config.port = args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                    eprintln!("--port requires a valid port number");
                    exit(1);
                });
            }
            "--tag" => {
                i += 1;
                config.client_tag = args.get(i).cloned().unwrap_or_else(|| {
                    eprintln!("--tag requires a value");
                    exit(1);
                });
            }
            "--module" => {
                i += 1;
                config.start_module = Some(args.get(i).cloned().unwrap_or_else(|| {
                    eprintln!("--module requires a value");
                    exit(1);
                }));
            }
            "--ticks" => {
                i += 1;
                max_ticks = Some(args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                    eprintln!("--ticks requires a valid number");
                    exit(1);
                }));
            }
            "--help" | "-h" => {
                print_usage();
                exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                print_usage();
                exit(1);
            }
        }
        i += 1;
    }

    Options { config, max_ticks }
}

fn print_usage() {
    println!("Usage: partysync [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --config <PATH>     JSON session config (flags override it)");
    println!("  --mode <MODE>       solo | server | client (default: solo)");
    println!("  --host <HOST>       Bind or connect address (default: 127.0.0.1)");
    println!("  --port <PORT>       Port (default: 7878)");
    println!("  --tag <TAG>         Participant tag a client asks for");
    println!("  --module <NAME>     Start module for solo/server sessions");
    println!("  --ticks <N>         Stop after N ticks (default: run until killed)");
    println!("  --help, -h          Show this help");
}
