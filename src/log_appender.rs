use anyhow::{Context, Result};
use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::append::rolling_file::policy::compound::{
    CompoundPolicy,
    roll::fixed_window::FixedWindowRoller,
    trigger::size::SizeTrigger,
};
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::fs;
use std::path::Path;

const LOG_FILE_SIZE_LIMIT: u64 = 5 * 1024 * 1024;
const LOG_ARCHIVE_COUNT: u32 = 3;

/// Build the console + rolling file configuration for `log_dir`.
pub fn logging_config(log_dir: &Path, level: LevelFilter) -> Result<Config> {
    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{h({l})} {d(%Y-%m-%d %H:%M:%S)} {M} - {m}{n}")))
        .build();

    let archive_pattern = log_dir.join("pollwheel.{}.log.gz");
    let archive_pattern = archive_pattern
        .to_str()
        .context("Log directory is not valid UTF-8")?;
    let roller = FixedWindowRoller::builder()
        .base(1)
        .build(archive_pattern, LOG_ARCHIVE_COUNT)?;

    let policy = CompoundPolicy::new(
        Box::new(SizeTrigger::new(LOG_FILE_SIZE_LIMIT)),
        Box::new(roller),
    );

    let file = RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{d} {l} {M} - {m}{n}")))
        .build(log_dir.join("pollwheel.log"), Box::new(policy))
        .context("Failed to open log file")?;

    let config = Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .appender(Appender::builder().build("file", Box::new(file)))
        .build(
            Root::builder()
                .appender("stdout")
                .appender("file")
                .build(level),
        )?;
    Ok(config)
}

pub fn setup_logging(log_dir: &Path, level: LevelFilter) -> Result<()> {
    fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    log4rs::init_config(logging_config(log_dir, level)?)?;
    Ok(())
}
