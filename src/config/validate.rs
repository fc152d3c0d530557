// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{Result, SchedError};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = SchedError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

pub fn validate_config(cfg: &RawConfigFile) -> Result<()> {
    validate_scheduler(cfg)?;
    validate_simulation(cfg)?;
    Ok(())
}

fn validate_scheduler(cfg: &RawConfigFile) -> Result<()> {
    let s = &cfg.scheduler;
    if s.workers == 0 {
        return Err(config_error("[scheduler].workers must be >= 1 (got 0)"));
    }
    if s.write_graph && s.graph_dir.as_ref().is_none_or(|d| d.as_os_str().is_empty()) {
        return Err(config_error(
            "[scheduler].graph_dir must be set when write_graph = true",
        ));
    }
    Ok(())
}

fn validate_simulation(cfg: &RawConfigFile) -> Result<()> {
    let sim = &cfg.simulation;
    if sim.ranks == 0 {
        return Err(config_error("[simulation].ranks must be >= 1 (got 0)"));
    }
    if sim.cells_per_rank < 2 {
        return Err(SchedError::ConfigError(format!(
            "[simulation].cells_per_rank must be >= 2 (got {})",
            sim.cells_per_rank
        )));
    }
    if !(sim.alpha > 0.0 && sim.alpha <= 0.5) {
        return Err(SchedError::ConfigError(format!(
            "[simulation].alpha must be in (0, 0.5] (got {})",
            sim.alpha
        )));
    }
    if sim.steps == 0 {
        return Err(config_error("[simulation].steps must be >= 1 (got 0)"));
    }
    if sim.lookahead == 0 {
        return Err(config_error("[simulation].lookahead must be >= 1 (got 0)"));
    }
    Ok(())
}

fn config_error(msg: &str) -> SchedError {
    SchedError::ConfigError(msg.to_string())
}
