// src/config/validate.rs

use std::time::Duration;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::dag::StepGraph;
use crate::errors::{KbflowError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::KbflowError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        let upstream_timeout = raw
            .execution
            .upstream_timeout
            .as_deref()
            .map(parse_duration)
            .transpose()
            .map_err(|e| KbflowError::ConfigError(format!("[execution].upstream_timeout: {e}")))?;
        Ok(ConfigFile::new_unchecked(
            raw.project,
            raw.store,
            upstream_timeout,
            raw.step,
        ))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_steps(cfg)?;
    validate_project(cfg)?;
    validate_step_shapes(cfg)?;
    validate_step_inputs(cfg)?;
    validate_dag(cfg)?;
    Ok(())
}

fn ensure_has_steps(cfg: &RawConfigFile) -> Result<()> {
    if cfg.step.is_empty() {
        return Err(KbflowError::ConfigError(
            "config must contain at least one [step.<id>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_project(cfg: &RawConfigFile) -> Result<()> {
    if cfg.project.name.trim().is_empty() {
        return Err(KbflowError::ConfigError(
            "[project].name must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_step_shapes(cfg: &RawConfigFile) -> Result<()> {
    for (id, step) in cfg.step.iter() {
        step.to_definition(id).check_shape().map_err(|err| match err {
            KbflowError::Definition(msg) => KbflowError::ConfigError(msg),
            other => other,
        })?;
    }
    Ok(())
}

fn validate_step_inputs(cfg: &RawConfigFile) -> Result<()> {
    for (id, step) in cfg.step.iter() {
        for input in step.inputs.iter() {
            if !cfg.step.contains_key(input) {
                return Err(KbflowError::ConfigError(format!(
                    "step '{}' has unknown input '{}' in `inputs`",
                    id, input
                )));
            }
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawConfigFile) -> Result<()> {
    let graph = StepGraph::new(
        cfg.step
            .iter()
            .map(|(id, step)| step.to_definition(id).into_step(cfg.project.name.as_str())),
    );
    graph.topological_order().map(|_| ())
}

/// Parse durations like `"500ms"`, `"30s"`, `"5m"` or `"1h"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 60 * 60)),
        _ => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, or h",
            unit
        )),
    }
}
