use std::env;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use crate::model::Stacking;
use crate::optimizer::PackingConfig;

/// Complete application configuration, loaded from environment variables or default values.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub optimizer: OptimizerConfig,
}

impl AppConfig {
    /// Creates a configuration from the currently available environment variables.
    pub fn from_env() -> Self {
        Self {
            api: ApiConfig::from_env(),
            optimizer: OptimizerConfig::from_env(),
        }
    }
}

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    bind_ip: IpAddr,
    display_host: String,
    port: u16,
}

impl ApiConfig {
    const DEFAULT_HOST: &'static str = "0.0.0.0";
    const DEFAULT_PORT: u16 = 8080;
    const HOST_VAR: &'static str = "CUT_IT_NOW_API_HOST";
    const PORT_VAR: &'static str = "CUT_IT_NOW_API_PORT";

    fn from_env() -> Self {
        let host_value =
            env_string(Self::HOST_VAR).unwrap_or_else(|| Self::DEFAULT_HOST.to_string());
        let (bind_ip, display_host) = match host_value.parse::<IpAddr>() {
            Ok(ip) => (ip, host_value),
            Err(err) => {
                log::warn!(
                    "Could not parse {} ('{}'): {}. Using {}.",
                    Self::HOST_VAR,
                    host_value,
                    err,
                    Self::DEFAULT_HOST
                );
                (
                    IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                    Self::DEFAULT_HOST.to_string(),
                )
            }
        };

        Self {
            bind_ip,
            display_host,
            port: parse_port(env_string(Self::PORT_VAR).as_deref()),
        }
    }

    /// Socket address to bind the server to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.port)
    }

    /// Visible hostname for logging and hints.
    pub fn display_host(&self) -> &str {
        &self.display_host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Indicates whether binding to all interfaces.
    pub fn binds_to_all_interfaces(&self) -> bool {
        match self.bind_ip {
            IpAddr::V4(addr) => addr == Ipv4Addr::UNSPECIFIED,
            IpAddr::V6(addr) => addr == Ipv6Addr::UNSPECIFIED,
        }
    }
}

fn parse_port(raw: Option<&str>) -> u16 {
    let Some(raw) = raw else {
        return ApiConfig::DEFAULT_PORT;
    };
    match raw.parse::<u16>() {
        Ok(value) if value != 0 => value,
        Ok(_) => {
            log::warn!(
                "{} must not be 0. Using {}.",
                ApiConfig::PORT_VAR,
                ApiConfig::DEFAULT_PORT
            );
            ApiConfig::DEFAULT_PORT
        }
        Err(err) => {
            log::warn!(
                "Could not parse {} ('{}'): {}. Using {}.",
                ApiConfig::PORT_VAR,
                raw,
                err,
                ApiConfig::DEFAULT_PORT
            );
            ApiConfig::DEFAULT_PORT
        }
    }
}

/// Defaults of the cutting optimizer. Requests may override every value.
#[derive(Clone, Debug)]
pub struct OptimizerConfig {
    packing: PackingConfig,
}

impl OptimizerConfig {
    const STACKING_VAR: &'static str = "CUT_IT_NOW_STACKING";
    const TRIMSIZE_VAR: &'static str = "CUT_IT_NOW_TRIMSIZE";
    const SAW_KERF_VAR: &'static str = "CUT_IT_NOW_SAW_KERF";
    const BASE_LENGTH_VAR: &'static str = "CUT_IT_NOW_BASE_BIN_LENGTH";
    const BASE_WIDTH_VAR: &'static str = "CUT_IT_NOW_BASE_BIN_WIDTH";
    const PARALLEL_VAR: &'static str = "CUT_IT_NOW_PARALLEL_TRIALS";

    fn from_env() -> Self {
        let stacking = env_string(Self::STACKING_VAR)
            .and_then(|raw| parse_stacking(&raw, Self::STACKING_VAR))
            .unwrap_or(PackingConfig::DEFAULT_STACKING);

        let trimsize = load_f64_with_warning(
            Self::TRIMSIZE_VAR,
            PackingConfig::DEFAULT_TRIMSIZE,
            non_negative,
            "must not be negative",
            "Sheet edges are trimmed before cutting",
        );

        let saw_kerf = load_f64_with_warning(
            Self::SAW_KERF_VAR,
            PackingConfig::DEFAULT_SAW_KERF,
            non_negative,
            "must not be negative",
            "Every cut consumes material",
        );

        let base_bin_length = load_f64_with_warning(
            Self::BASE_LENGTH_VAR,
            PackingConfig::DEFAULT_BASE_BIN_LENGTH,
            non_negative,
            "must not be negative",
            "Fresh stock length configured",
        );

        let base_bin_width = load_f64_with_warning(
            Self::BASE_WIDTH_VAR,
            PackingConfig::DEFAULT_BASE_BIN_WIDTH,
            non_negative,
            "must not be negative",
            "Fresh stock width configured",
        );

        let parallel_trials = env_string(Self::PARALLEL_VAR)
            .and_then(|raw| parse_bool(&raw, Self::PARALLEL_VAR))
            .unwrap_or(PackingConfig::DEFAULT_PARALLEL_TRIALS);

        let packing = PackingConfig::builder()
            .stacking(stacking)
            .trimsize(trimsize)
            .saw_kerf(saw_kerf)
            .base_bin_length(base_bin_length)
            .base_bin_width(base_bin_width)
            .parallel_trials(parallel_trials)
            .build();

        log::info!(
            "Optimizer defaults: stacking={}, trimsize={}, saw_kerf={}, base sheet {}x{}, parallel trials {}",
            packing.stacking.code(),
            packing.trimsize,
            packing.saw_kerf,
            packing.base_bin_length,
            packing.base_bin_width,
            if packing.parallel_trials { "on" } else { "off" }
        );

        Self { packing }
    }

    /// Returns the configured PackingConfig.
    pub fn packing_config(&self) -> PackingConfig {
        self.packing
    }
}

impl From<PackingConfig> for OptimizerConfig {
    fn from(packing: PackingConfig) -> Self {
        Self { packing }
    }
}

fn non_negative(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

fn env_string(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_owned())
            }
        }
        Err(env::VarError::NotPresent) => None,
        Err(err) => {
            log::warn!("Access to {} failed: {}. Using default value.", name, err);
            None
        }
    }
}

fn parse_bool(raw: &str, var_name: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        other => {
            log::warn!(
                "Could not interpret {} ('{}') as boolean value. Using default value.",
                var_name,
                other
            );
            None
        }
    }
}

fn parse_stacking(raw: &str, var_name: &str) -> Option<Stacking> {
    let parsed = Stacking::parse(raw);
    if parsed.is_none() {
        log::warn!(
            "Could not interpret {} ('{}') as stacking mode (none, length, width). Using default value.",
            var_name,
            raw
        );
    }
    parsed
}

fn load_f64_with_warning(
    var_name: &str,
    default: f64,
    validator: impl Fn(f64) -> bool,
    invalid_hint: &str,
    notice: &str,
) -> f64 {
    match env_string(var_name) {
        Some(raw) => match raw.parse::<f64>() {
            Ok(value) => {
                if !validator(value) {
                    log::warn!(
                        "{} contains invalid value '{}': {}. Using {}.",
                        var_name,
                        raw,
                        invalid_hint,
                        default
                    );
                    default
                } else {
                    let tolerance = (default.abs().max(1.0)) * 1e-9;
                    if (value - default).abs() > tolerance {
                        log::info!("{} ({} = {}).", notice, var_name, value);
                    }
                    value
                }
            }
            Err(err) => {
                log::warn!(
                    "Could not parse {} ('{}') as number: {}. Using {}.",
                    var_name,
                    raw,
                    err,
                    default
                );
                default
            }
        },
        None => default,
    }
}
