use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use tracing::{debug, error, info, warn};

use crate::schedule::{ConfigError, GlobalConfig, Schedule, ScheduleFile};

pub const CONFIG_FILENAME: &str = "_config.yaml";

/// Load schedules from either a single YAML file or a directory of
/// `<schedule-id>.yaml` files.
pub fn load(path: &Path) -> Result<ScheduleFile, ConfigError> {
    if path.is_dir() {
        load_dir(path)
    } else {
        load_file(path)
    }
}

/// Single-file mode. Errors are hard: a schedules.yaml the user pointed at
/// directly must be fully valid.
pub fn load_file(path: &Path) -> Result<ScheduleFile, ConfigError> {
    info!("loading schedules from {}", path.display());
    let text = fs::read_to_string(path)?;

    if text.trim().is_empty() {
        warn!("empty schedules file: {}", path.display());
        return Ok(ScheduleFile::default());
    }

    let file: ScheduleFile = serde_yaml::from_str(&text)?;
    file.config.validate()?;

    let mut seen = BTreeSet::new();
    for schedule in &file.schedules {
        schedule.validate()?;
        if !seen.insert(schedule.id.clone()) {
            return Err(ConfigError::DuplicateId {
                id: schedule.id.clone(),
            });
        }
    }

    info!(
        "loaded {} schedules ({} enabled)",
        file.schedules.len(),
        file.schedules.iter().filter(|s| s.enabled).count()
    );
    Ok(file)
}

/// Directory mode. Individually broken files are logged and skipped so one
/// bad schedule does not take down the batch.
pub fn load_dir(path: &Path) -> Result<ScheduleFile, ConfigError> {
    info!("loading schedules from directory {}", path.display());

    let config = load_dir_config(path);

    let mut entries: Vec<_> = fs::read_dir(path)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.extension().and_then(|x| x.to_str()) == Some("yaml")
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n != CONFIG_FILENAME && !n.starts_with('.'))
        })
        .collect();
    entries.sort();

    let mut schedules: Vec<Schedule> = Vec::new();
    let mut seen = BTreeSet::new();

    for entry in entries {
        let schedule = match load_schedule_file(&entry) {
            Ok(schedule) => schedule,
            Err(e) => {
                error!("skipping {}: {e}", entry.display());
                continue;
            }
        };
        if !seen.insert(schedule.id.clone()) {
            error!(
                "duplicate schedule id '{}' in {}, keeping the first occurrence",
                schedule.id,
                entry.display()
            );
            continue;
        }
        schedules.push(schedule);
    }

    info!(
        "loaded {} schedules ({} enabled)",
        schedules.len(),
        schedules.iter().filter(|s| s.enabled).count()
    );

    Ok(ScheduleFile {
        config,
        schedules,
        ..ScheduleFile::default()
    })
}

fn load_dir_config(dir: &Path) -> GlobalConfig {
    let config_path = dir.join(CONFIG_FILENAME);
    if !config_path.is_file() {
        return GlobalConfig::default();
    }
    match fs::read_to_string(&config_path)
        .map_err(ConfigError::from)
        .and_then(|text| serde_yaml::from_str::<GlobalConfig>(&text).map_err(ConfigError::from))
        .and_then(|config| config.validate().map(|_| config))
    {
        Ok(config) => {
            debug!("loaded global config from {}", config_path.display());
            config
        }
        Err(e) => {
            warn!(
                "failed to load {}, using defaults: {e}",
                config_path.display()
            );
            GlobalConfig::default()
        }
    }
}

fn load_schedule_file(path: &Path) -> Result<Schedule, ConfigError> {
    let text = fs::read_to_string(path)?;
    let schedule: Schedule = serde_yaml::from_str(&text)?;
    schedule.validate()?;

    // The file stem is the schedule's address; a mismatch is almost always
    // a copy-paste error in the id field.
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
    if stem != schedule.id {
        return Err(ConfigError::IdFilenameMismatch {
            id: schedule.id,
            file: path.display().to_string(),
        });
    }

    Ok(schedule)
}

pub fn enabled_schedules(file: &ScheduleFile) -> Vec<&Schedule> {
    file.schedules.iter().filter(|s| s.enabled).collect()
}
