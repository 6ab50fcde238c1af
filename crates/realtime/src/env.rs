// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the router and worker binaries.

use dalston_core::RouterMode;

use crate::error::ConfigError;

#[derive(Debug, Clone)]
pub struct RouterEnvConfig {
    pub redis_url: String,
    pub bind_addr: String,
    pub mode: RouterMode,
    /// Only consulted in `steer` mode, where utterances are bridged onto the
    /// batch dispatch path.
    pub catalog_path: String,
    pub object_store_dir: String,
    pub bridge_poll_interval_ms: u64,
    pub bridge_poll_timeout_ms: u64,
}

impl RouterEnvConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mode_str = env_or("DALSTON_REALTIME_ROUTER_MODE", "proxy");
        let mode = match mode_str.as_str() {
            "proxy" => RouterMode::Proxy,
            "steer" => RouterMode::Steer,
            _ => {
                return Err(ConfigError::InvalidValue {
                    name: "DALSTON_REALTIME_ROUTER_MODE",
                    value: mode_str,
                })
            }
        };
        Ok(Self {
            redis_url: required("DALSTON_REDIS_URL")?,
            bind_addr: env_or("DALSTON_REALTIME_ROUTER_BIND_ADDR", "0.0.0.0:9090"),
            mode,
            catalog_path: env_or("DALSTON_CATALOG_PATH", "catalog.yaml"),
            object_store_dir: env_or("DALSTON_OBJECT_STORE_DIR", "./data/objects"),
            bridge_poll_interval_ms: parsed_or("DALSTON_REALTIME_BRIDGE_POLL_INTERVAL_MS", 100)?,
            bridge_poll_timeout_ms: parsed_or("DALSTON_REALTIME_BRIDGE_POLL_TIMEOUT_MS", 15_000)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct WorkerEnvConfig {
    pub redis_url: String,
    pub bind_addr: String,
    /// Address the router should dial to reach this worker, which may differ
    /// from `bind_addr` behind NAT/container networking.
    pub advertise_addr: String,
    pub engine_id: String,
    pub max_sessions: u32,
}

impl WorkerEnvConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_addr = env_or("DALSTON_REALTIME_WORKER_BIND_ADDR", "0.0.0.0:9091");
        Ok(Self {
            redis_url: required("DALSTON_REDIS_URL")?,
            advertise_addr: env_or("DALSTON_REALTIME_WORKER_ADVERTISE_ADDR", &bind_addr),
            bind_addr,
            engine_id: required("DALSTON_ENGINE_ID")?,
            max_sessions: parsed_or("DALSTON_REALTIME_MAX_SESSIONS", 16)?,
        })
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingVar(name))
}

fn env_or(name: &'static str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parsed_or<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Err(_) => Ok(default),
        Ok(value) => value.parse().map_err(|_| ConfigError::InvalidValue { name, value }),
    }
}
