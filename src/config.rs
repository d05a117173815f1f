use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

static SETTINGS_FILE_NAME: &str = "settings.json";

pub struct ProjectConfig {
    pub settings: Settings,
    pub project_dirs: ProjectDirs,
}

impl ProjectConfig {
    /// Resolve project directories and load settings from `settings_path`, or
    /// from the default location under the config directory.
    pub fn new(settings_path: Option<&Path>) -> Result<Self> {
        let proj_dirs = ProjectDirs::from("com", "pollwheel", "pollwheel")
            .ok_or_else(|| anyhow!("Failed to resolve project directories"))?;
        for dir in [proj_dirs.config_dir(), proj_dirs.data_dir()] {
            if !dir.exists() {
                fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create directory {}", dir.display()))?;
            }
        }

        let settings_path = settings_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| proj_dirs.config_dir().join(SETTINGS_FILE_NAME));
        let settings = Settings::new(&settings_path)?;
        Ok(Self {
            settings,
            project_dirs: proj_dirs,
        })
    }

    pub fn log_dir(&self) -> PathBuf {
        self.project_dirs.data_dir().join("logs")
    }
}

/// What the tick handler does after a task's work fails or panics.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkFailurePolicy {
    /// Log the failure and keep the task on its schedule.
    #[default]
    Continue,
    /// Log the failure and stop the task until it is restarted.
    StopTask,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SchedulerConfig {
    pub failure_policy: WorkFailurePolicy,
    /// Runs longer than this count as slow in task metrics.
    pub slow_threshold: Duration,
    /// Number of recent run durations kept per task.
    pub metrics_window: usize,
    /// Cancel in-flight work when the scheduler shuts down.
    pub cancel_on_shutdown: bool,
    /// How long the host waits for in-flight work after shutdown.
    pub shutdown_grace: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            failure_policy: WorkFailurePolicy::Continue,
            slow_threshold: Duration::from_secs(5),
            metrics_window: 10,
            cancel_on_shutdown: false,
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

/// A polling task the host registers at startup
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TaskDefinition {
    pub id: i64,
    pub name: String,
    pub interval: Duration,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Settings {
    pub log_level: String,
    pub scheduler: SchedulerConfig,
    pub tasks: Vec<TaskDefinition>,
}

impl Default for Settings {
    fn default() -> Self {
        let tasks = (1..=3)
            .map(|n| TaskDefinition {
                id: n,
                name: format!("Task {n} Something..."),
                interval: Duration::from_secs(n as u64),
            })
            .collect();
        Self {
            log_level: "info".to_string(),
            scheduler: SchedulerConfig::default(),
            tasks,
        }
    }
}

impl Settings {
    /// Load settings, replacing a missing or unreadable file with saved defaults.
    pub fn new(config_file_path: &Path) -> Result<Self> {
        match Self::load_settings_from_file(config_file_path) {
            Ok(settings) => Ok(settings),
            Err(e) => {
                warn!("Error loading settings from file - creating default config: {}", e);
                let default = Self::default();
                default.save_to_file(config_file_path)?;
                Ok(default)
            }
        }
    }

    pub fn load_settings_from_file(config_file_path: &Path) -> Result<Self> {
        if !config_file_path.exists() {
            return Err(anyhow!("Config file not found"));
        }
        let data = fs::read_to_string(config_file_path)?;
        let settings: Self = serde_json::from_str(&data)?;
        Ok(settings)
    }

    pub fn save_to_file(&self, config_file_path: &Path) -> Result<()> {
        if let Some(parent_path) = config_file_path.parent() {
            fs::create_dir_all(parent_path).context("Failed to create config directory")?;
        }

        let data = serde_json::to_string_pretty(self)?;
        fs::write(config_file_path, data)?;
        Ok(())
    }

    pub fn log_level_filter(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or_else(|_| {
            warn!("Unknown log level '{}', falling back to info", self.log_level);
            log::LevelFilter::Info
        })
    }
}
