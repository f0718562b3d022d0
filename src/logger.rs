use log::LevelFilter;
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::append::rolling_file::policy::compound::{
    CompoundPolicy, roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger,
};
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::path::{Path, PathBuf};

const PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {t} - {m}{n}";
const ROLL_SIZE: u64 = 10 * 1024 * 1024;

/// Initializes the logging system from a log4rs config file.
///
/// # Errors
/// Returns an error if the file cannot be read or a logger is already installed.
pub fn init_path(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    log4rs::init_file(path, log4rs::config::Deserializers::default())?;
    Ok(())
}

pub fn parse_level(level: Option<&str>) -> LevelFilter {
    match level.unwrap_or("info").to_ascii_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

/// Build a config writing to `{dir}/mongo-operators.log` with size-based rolling,
/// or to stderr when `dir` is `None`.
///
/// # Errors
/// Returns an error if the directory cannot be created or the appender fails to build.
pub fn build_config(
    dir: Option<&Path>,
    level: Option<&str>,
    retention: Option<u32>,
) -> Result<Config, Box<dyn std::error::Error>> {
    let lvl = parse_level(level);
    let appender: Appender = match dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let keep = retention.unwrap_or(7);
            let roller = FixedWindowRoller::builder()
                .build(&format!("{}", dir.join("mongo-operators.{}.log").display()), keep)?;
            let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(ROLL_SIZE)), Box::new(roller));
            let file = RollingFileAppender::builder()
                .encoder(Box::new(PatternEncoder::new(PATTERN)))
                .build(dir.join("mongo-operators.log"), Box::new(policy))?;
            Appender::builder().build("app", Box::new(file))
        }
        None => {
            let console = ConsoleAppender::builder()
                .target(Target::Stderr)
                .encoder(Box::new(PatternEncoder::new(PATTERN)))
                .build();
            Appender::builder().build("app", Box::new(console))
        }
    };
    let config = Config::builder().appender(appender).build(Root::builder().appender("app").build(lvl))?;
    Ok(config)
}

/// Configure logging globally for the process. Later calls are ignored once a
/// logger is installed.
pub fn configure_logging(dir: Option<&Path>, level: Option<&str>, retention: Option<u32>) {
    match build_config(dir, level, retention) {
        Ok(config) => {
            let _ = log4rs::init_config(config);
        }
        Err(e) => eprintln!("logging disabled: {e}"),
    }
}

/// Configure logging from environment variables if present:
/// - MONGO_OPERATORS_LOG_DIR
/// - MONGO_OPERATORS_LOG_LEVEL
/// - MONGO_OPERATORS_LOG_RETENTION
pub fn configure_from_env() {
    let dir = std::env::var("MONGO_OPERATORS_LOG_DIR").ok().map(PathBuf::from);
    let level = std::env::var("MONGO_OPERATORS_LOG_LEVEL").ok();
    let retention = std::env::var("MONGO_OPERATORS_LOG_RETENTION").ok().and_then(|s| s.parse::<u32>().ok());
    configure_logging(dir.as_deref(), level.as_deref(), retention);
}
