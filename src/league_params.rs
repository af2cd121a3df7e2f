use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::calibration::CalibrationParameters;
use crate::estimator::DixonColesParameters;

const CACHE_DIR: &str = "matchcast";
const CACHE_FILE: &str = "league_params.json";

/// Everything fitted for one league. Each field has a single writer: the calibration pair is
/// only changed by `calibration::update_parameters`, the scoreline parameters only by the
/// estimator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeagueParams {
    pub league_id: u32,
    pub sample_matches: usize,
    #[serde(default)]
    pub calibration: CalibrationParameters,
    #[serde(default)]
    pub dixon_coles: Option<DixonColesParameters>,
    #[serde(default)]
    pub fitted_at: Option<DateTime<Utc>>,
}

impl LeagueParams {
    pub fn defaults(league_id: u32) -> Self {
        Self {
            league_id,
            sample_matches: 0,
            calibration: CalibrationParameters::default(),
            dixon_coles: None,
            fitted_at: None,
        }
    }
}

pub fn load_cached_params() -> HashMap<u32, LeagueParams> {
    let Some(path) = params_path() else {
        return HashMap::new();
    };
    load_params_from(&path)
}

pub fn save_cached_params(params: &HashMap<u32, LeagueParams>) -> Result<()> {
    let Some(path) = params_path() else {
        return Ok(());
    };
    save_params_to(&path, params)
}

/// Missing or unreadable files yield an empty map.
pub fn load_params_from(path: &Path) -> HashMap<u32, LeagueParams> {
    let Ok(raw) = fs::read_to_string(path) else {
        return HashMap::new();
    };
    serde_json::from_str::<HashMap<u32, LeagueParams>>(&raw).unwrap_or_default()
}

pub fn save_params_to(path: &Path, params: &HashMap<u32, LeagueParams>) -> Result<()> {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(params).context("serialize league params")?;
    fs::write(&tmp, json).context("write league params")?;
    fs::rename(&tmp, path).context("swap league params")?;
    Ok(())
}

pub fn params_path() -> Option<PathBuf> {
    // Prefer XDG cache.
    if let Ok(base) = std::env::var("XDG_CACHE_HOME")
        && !base.trim().is_empty()
    {
        return Some(PathBuf::from(base).join(CACHE_DIR).join(CACHE_FILE));
    }
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(
        PathBuf::from(home)
            .join(".cache")
            .join(CACHE_DIR)
            .join(CACHE_FILE),
    )
}
