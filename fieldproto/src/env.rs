//! Small environment-variable parsing helpers shared by both binaries'
//! `Config::from_env`, grounded on the `env_string`/`env_u64`/`env_optional`
//! helpers in the teacher's `node-forwarder::config`.

use anyhow::{anyhow, Context, Result};
use std::env;

pub fn env_string(key: &str, default: Option<&str>) -> Result<String> {
    match env::var(key) {
        Ok(value) => Ok(value.trim().to_string()),
        Err(_) => default
            .map(str::to_string)
            .ok_or_else(|| anyhow!("missing env var {key}")),
    }
}

pub fn env_optional(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn env_u64(key: &str, default: Option<u64>) -> Result<u64> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .with_context(|| format!("invalid {key}")),
        Err(_) => default.ok_or_else(|| anyhow!("missing env var {key}")),
    }
}

pub fn env_f64(key: &str, default: Option<f64>) -> Result<f64> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<f64>()
            .with_context(|| format!("invalid {key}")),
        Err(_) => default.ok_or_else(|| anyhow!("missing env var {key}")),
    }
}

pub fn env_u16(key: &str, default: Option<u16>) -> Result<u16> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<u16>()
            .with_context(|| format!("invalid {key}")),
        Err(_) => default.ok_or_else(|| anyhow!("missing env var {key}")),
    }
}

pub fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}
