//! green-sched entry point: CLI wiring and service construction.

use std::path::Path;
use std::process;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing_subscriber::EnvFilter;

use green_sched::clock::{Clock, SystemClock};
use green_sched::config::AppConfig;
use green_sched::forecast::{CarbonIntensityClient, ForecastCache};
use green_sched::io::export::export_csv;
use green_sched::schedule::{Priority, ScheduleRequest, ScheduleResult, Scheduler};

/// Parsed CLI arguments.
struct CliArgs {
    config_path: Option<String>,
    duration_minutes: Option<u32>,
    deadline: Option<DateTime<Utc>>,
    priority: Priority,
    windows_out: Option<String>,
    #[cfg(feature = "api")]
    serve: bool,
    #[cfg(feature = "api")]
    port: Option<u16>,
}

fn print_help() {
    eprintln!("green-sched — schedule jobs into low-carbon grid windows");
    eprintln!();
    eprintln!("Usage: green-sched [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config <path>          Load configuration from TOML file");
    eprintln!("  --duration <minutes>     Job duration to schedule");
    eprintln!("  --deadline <rfc3339>     Instant the job must finish by");
    eprintln!("  --priority <level>       low, medium or high (default: low)");
    eprintln!("  --windows-out <path>     Export chosen windows to CSV");
    #[cfg(feature = "api")]
    {
        eprintln!("  --serve                  Start the REST API server");
        eprintln!("  --port <u16>             API server port (default: 8000)");
    }
    eprintln!("  --help                   Show this help message");
    eprintln!();
    eprintln!("Log verbosity follows RUST_LOG (default: green_sched=info).");
}

/// Returns the value following flag `args[*i]`, advancing `i`, or exits.
fn flag_value<'a>(args: &'a [String], i: &mut usize, what: &str) -> &'a str {
    *i += 1;
    if *i >= args.len() {
        eprintln!("error: {} requires {what}", args[*i - 1]);
        process::exit(1);
    }
    &args[*i]
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        config_path: None,
        duration_minutes: None,
        deadline: None,
        priority: Priority::default(),
        windows_out: None,
        #[cfg(feature = "api")]
        serve: false,
        #[cfg(feature = "api")]
        port: None,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                process::exit(0);
            }
            "--config" => {
                cli.config_path = Some(flag_value(&args, &mut i, "a path argument").to_string());
            }
            "--duration" => {
                let v = flag_value(&args, &mut i, "a minutes argument");
                if let Ok(d) = v.parse::<u32>() {
                    cli.duration_minutes = Some(d);
                } else {
                    eprintln!("error: --duration value \"{v}\" is not a valid number of minutes");
                    process::exit(1);
                }
            }
            "--deadline" => {
                let v = flag_value(&args, &mut i, "an RFC 3339 timestamp");
                match DateTime::parse_from_rfc3339(v) {
                    Ok(d) => cli.deadline = Some(d.with_timezone(&Utc)),
                    Err(e) => {
                        eprintln!("error: --deadline value \"{v}\" is not RFC 3339: {e}");
                        process::exit(1);
                    }
                }
            }
            "--priority" => {
                let v = flag_value(&args, &mut i, "a level argument");
                if let Some(p) = Priority::parse(v) {
                    cli.priority = p;
                } else {
                    eprintln!("error: --priority value \"{v}\" must be low, medium or high");
                    process::exit(1);
                }
            }
            "--windows-out" => {
                cli.windows_out = Some(flag_value(&args, &mut i, "a path argument").to_string());
            }
            #[cfg(feature = "api")]
            "--serve" => {
                cli.serve = true;
            }
            #[cfg(feature = "api")]
            "--port" => {
                let v = flag_value(&args, &mut i, "a u16 argument");
                if let Ok(p) = v.parse::<u16>() {
                    cli.port = Some(p);
                } else {
                    eprintln!("error: --port value \"{v}\" is not a valid u16");
                    process::exit(1);
                }
            }
            other => {
                eprintln!("error: unknown argument \"{other}\"");
                print_help();
                process::exit(1);
            }
        }
        i += 1;
    }

    cli
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("green_sched=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Loads the config file (or defaults), applies env overrides, and validates.
fn load_config(path: Option<&str>) -> AppConfig {
    let mut config = match path {
        Some(path) => AppConfig::from_toml_file(Path::new(path)).unwrap_or_else(|e| {
            eprintln!("{e}");
            process::exit(1);
        }),
        None => AppConfig::default(),
    };
    if let Err(e) = config.apply_env_overrides() {
        eprintln!("{e}");
        process::exit(1);
    }

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        process::exit(1);
    }
    config
}

fn build_scheduler(config: &AppConfig, clock: Arc<dyn Clock>) -> Scheduler {
    let client = CarbonIntensityClient::from_config(&config.carbon_api).unwrap_or_else(|e| {
        eprintln!("error: failed to build forecast client: {e}");
        process::exit(1);
    });
    let cache = ForecastCache::new(Arc::new(client), Arc::clone(&clock), &config.cache);
    Scheduler::new(cache, clock, config.scheduling.clone())
}

fn print_result(result: &ScheduleResult) {
    println!("Best window:  {}", result.primary);
    for (n, w) in result.alternatives.iter().enumerate() {
        println!("Alternative {}: {w}", n + 1);
    }
    let m = &result.metadata;
    println!();
    println!(
        "{} windows analysed over {}, forecast age {} min, confidence {:?}",
        m.periods_analyzed, m.forecast_range, m.cache_age_minutes, m.confidence
    );
    if m.window_duration_minutes != m.requested_duration_minutes {
        println!(
            "Requested {} min, rounded up to {} min",
            m.requested_duration_minutes, m.window_duration_minutes
        );
    }
}

fn main() {
    let cli = parse_args();
    init_tracing();

    let config = load_config(cli.config_path.as_deref());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let scheduler = build_scheduler(&config, Arc::clone(&clock));

    let rt = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        eprintln!("error: failed to create tokio runtime: {e}");
        process::exit(1);
    });

    #[cfg(feature = "api")]
    if cli.serve {
        use std::net::SocketAddr;

        let port = cli.port.unwrap_or(config.server.port);
        let state = Arc::new(green_sched::api::AppState { scheduler, clock });
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        if let Err(e) = rt.block_on(green_sched::api::serve(state, addr)) {
            eprintln!("error: API server failed: {e}");
            process::exit(1);
        }
        return;
    }

    let (Some(duration), Some(deadline)) = (cli.duration_minutes, cli.deadline) else {
        eprintln!("error: --duration and --deadline are required unless --serve is given");
        print_help();
        process::exit(1);
    };

    let request = ScheduleRequest::new(duration, deadline).with_priority(cli.priority);
    let result = match rt.block_on(scheduler.schedule(&request)) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(2);
        }
    };
    print_result(&result);

    if let Some(ref path) = cli.windows_out {
        if let Err(e) = export_csv(&result, Path::new(path)) {
            eprintln!("error: failed to write CSV: {e}");
            process::exit(1);
        }
        eprintln!("Windows written to {path}");
    }
}
