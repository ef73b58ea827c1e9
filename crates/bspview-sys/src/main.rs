// Entry point — command-line map inspector
//
// bspview [-config <file>] [-entities] [+set <name> <value> ...] <map.bsp>
//
// Loads a map through the same queue/loader/publish path an interactive
// viewer uses, then prints what was built and every load issue.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use bspview_common::cvar::{CvarContext, DEVELOPER};
use bspview_world::context::{AppContext, Command, FrameEvent};
use bspview_world::error::LoadReport;
use bspview_world::Scene;

const FRAME_MSEC: u64 = 10;
const LOAD_TIMEOUT: Duration = Duration::from_secs(300);

struct Options {
    config: Option<PathBuf>,
    list_entities: bool,
    map: PathBuf,
}

fn usage() -> ExitCode {
    eprintln!("usage: bspview [-config <file>] [-entities] [+set <name> <value> ...] <map.bsp>");
    ExitCode::from(2)
}

/// Split out our own switches; `+set` arguments are left for the cvars.
fn parse_options(args: &[String]) -> Option<(Options, Vec<String>)> {
    let mut config = None;
    let mut list_entities = false;
    let mut map = None;
    let mut rest = Vec::new();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-config" => {
                config = Some(PathBuf::from(args.get(i + 1)?));
                i += 2;
            }
            "-entities" => {
                list_entities = true;
                i += 1;
            }
            "+set" => {
                rest.extend(args.iter().skip(i).take(3).cloned());
                i += 3;
            }
            arg if arg.starts_with('-') || arg.starts_with('+') => {
                eprintln!("unknown option {}", arg);
                return None;
            }
            arg => {
                if map.replace(PathBuf::from(arg)).is_some() {
                    return None;
                }
                i += 1;
            }
        }
    }

    Some((
        Options {
            config,
            list_entities,
            map: map?,
        },
        rest,
    ))
}

fn init_logging(cvars: &CvarContext) {
    let filter = if let Ok(filter) = EnvFilter::try_from_default_env() {
        filter
    } else if cvars.variable_value(DEVELOPER) != 0.0 {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

fn print_scene(scene: &Scene, report: &LoadReport, list_entities: bool) {
    let stats = scene.stats();
    println!(
        "{} (version {}, revision {}, crc {:08x})",
        scene.name(),
        scene.version(),
        scene.revision(),
        scene.checksum()
    );
    println!("  vertices       {}", stats.vertices);
    println!("  faces          {} ({} resolved)", stats.faces, stats.resolved_faces);
    println!("  static meshes  {}", stats.static_meshes);
    println!("  displacements  {}", stats.displacement_meshes);
    println!("  triangles      {}", stats.triangles);
    println!("  leaves         {}", stats.leaves);
    println!("  clusters       {}", stats.clusters);
    println!("  entities       {}", stats.entities);

    if report.is_empty() {
        println!("no load issues");
    } else {
        println!("{} load issues:", report.len());
        for (kind, count) in report.counts() {
            println!("  {:<22} {}", kind.name(), count);
        }
    }

    if list_entities {
        for (i, entity) in scene.entities().iter().enumerate() {
            let class_name = entity.class_name().unwrap_or("<none>");
            match entity.origin() {
                Some(o) => println!("{:5} {} at ({} {} {})", i, class_name, o[0], o[1], o[2]),
                None => println!("{:5} {}", i, class_name),
            }
        }
    }
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some((options, set_args)) = parse_options(&args) else {
        return usage();
    };

    let mut cvars = CvarContext::with_defaults();
    // config file first so +set on the command line overrides it
    let config_result = options.config.as_ref().map(|path| (path, cvars.exec_file(path)));
    let leftover = cvars.apply_command_line(&set_args);
    init_logging(&cvars);

    if let Some((path, result)) = config_result {
        match result {
            Ok(count) => info!("exec {}: {} variables set", path.display(), count),
            Err(e) => warn!("couldn't exec {}: {}", path.display(), e),
        }
    }
    for arg in leftover {
        warn!("ignored argument {}", arg);
    }

    let mut ctx = match AppContext::new(cvars) {
        Ok(ctx) => ctx,
        Err(e) => {
            error!("couldn't start the map loader: {}", e);
            return ExitCode::FAILURE;
        }
    };
    ctx.commands().send(Command::LoadPath(options.map.clone()));

    let deadline = Instant::now() + LOAD_TIMEOUT;
    while Instant::now() < deadline {
        for event in ctx.frame() {
            match event {
                FrameEvent::ScenePublished { report, .. } => {
                    if let Some(scene) = ctx.scene() {
                        print_scene(&scene, &report, options.list_entities);
                    }
                    return ExitCode::SUCCESS;
                }
                FrameEvent::LoadFailed { error, .. } => {
                    error!("{}", error);
                    return ExitCode::FAILURE;
                }
                FrameEvent::LoadCancelled { .. } | FrameEvent::SceneDiscarded { .. } => {
                    return ExitCode::FAILURE;
                }
                FrameEvent::LoadQueued { .. } | FrameEvent::LoadStarted { .. } => {}
                FrameEvent::CvarRejected { name } => warn!("{} is write protected", name),
            }
        }
        std::thread::sleep(Duration::from_millis(FRAME_MSEC));
    }

    error!("timed out loading {}", options.map.display());
    ExitCode::FAILURE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn options_and_set_args() {
        let args = strings(&["-config", "my.cfg", "+set", "r_novis", "1", "-entities", "maps/a.bsp"]);
        let (options, rest) = parse_options(&args).unwrap();
        assert_eq!(options.config, Some(PathBuf::from("my.cfg")));
        assert!(options.list_entities);
        assert_eq!(options.map, PathBuf::from("maps/a.bsp"));
        assert_eq!(rest, strings(&["+set", "r_novis", "1"]));
    }

    #[test]
    fn bad_options() {
        assert!(parse_options(&[]).is_none());
        assert!(parse_options(&strings(&["-config"])).is_none());
        assert!(parse_options(&strings(&["-bogus", "a.bsp"])).is_none());
        assert!(parse_options(&strings(&["a.bsp", "b.bsp"])).is_none());
    }
}
