use std::env;
use std::fmt::Display;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;

use tracing::warn;

use crate::optimizer::PlannerConfig;
use crate::room::{MAX_ROOM_LEVEL, rack_budget_for_room_level};

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
    const HOST_VAR: &'static str = "RACK_PLANNER_API_HOST";
    const PORT_VAR: &'static str = "RACK_PLANNER_API_PORT";
    const DEFAULT_HOST: &'static str = "0.0.0.0";
    const DEFAULT_PORT: u16 = 8080;

    fn from_env() -> Self {
        let host_value =
            env_string(Self::HOST_VAR).unwrap_or_else(|| Self::DEFAULT_HOST.to_string());
        let (bind_ip, display_host) = match host_value.parse::<IpAddr>() {
            Ok(ip) => (ip, host_value),
            Err(err) => {
                warn!(
                    var = Self::HOST_VAR,
                    value = %host_value,
                    error = %err,
                    "could not parse host, using {}",
                    Self::DEFAULT_HOST
                );
                (
                    IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                    Self::DEFAULT_HOST.to_string(),
                )
            }
        };

        let port = parse_or_default(
            Self::PORT_VAR,
            env_string(Self::PORT_VAR),
            Self::DEFAULT_PORT,
            |value| value != 0,
            "must not be 0",
        );

        Self {
            bind_ip,
            display_host,
            port,
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

    /// Configured port.
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

/// Configuration of the layout optimizer.
#[derive(Clone, Debug)]
pub struct OptimizerConfig {
    planner: PlannerConfig,
    default_room_level: u8,
}

impl OptimizerConfig {
    const TOP_N_VAR: &'static str = "RACK_PLANNER_TOP_N";
    const RACK3_FALLBACK_VAR: &'static str = "RACK_PLANNER_RACK3_FALLBACK";
    const RACK4_FALLBACK_VAR: &'static str = "RACK_PLANNER_RACK4_FALLBACK";
    const MAX_RACK_BUDGET_VAR: &'static str = "RACK_PLANNER_MAX_RACK_BUDGET";
    const PARALLEL_TRIALS_VAR: &'static str = "RACK_PLANNER_PARALLEL_TRIALS";
    const ROOM_LEVEL_VAR: &'static str = "RACK_PLANNER_DEFAULT_ROOM_LEVEL";

    pub const DEFAULT_ROOM_LEVEL: u8 = MAX_ROOM_LEVEL;

    pub fn new(planner: PlannerConfig, default_room_level: u8) -> Self {
        Self {
            planner,
            default_room_level,
        }
    }

    fn from_env() -> Self {
        let top_n = load_with_warning(
            Self::TOP_N_VAR,
            PlannerConfig::DEFAULT_TOP_N,
            |value| value > 0,
            "must be at least 1",
        );

        let rack3_fallback = load_with_warning(
            Self::RACK3_FALLBACK_VAR,
            PlannerConfig::DEFAULT_RACK3_FALLBACK,
            |value| value >= 0,
            "must not be negative",
        );

        let rack4_fallback = load_with_warning(
            Self::RACK4_FALLBACK_VAR,
            PlannerConfig::DEFAULT_RACK4_FALLBACK,
            |value| value >= 0,
            "must not be negative",
        );

        let max_rack_budget = load_with_warning(
            Self::MAX_RACK_BUDGET_VAR,
            PlannerConfig::DEFAULT_MAX_RACK_BUDGET,
            |value| value > 0,
            "must be at least 1",
        );

        let parallel_trials = env_string(Self::PARALLEL_TRIALS_VAR)
            .and_then(|raw| parse_bool(&raw, Self::PARALLEL_TRIALS_VAR))
            .unwrap_or(PlannerConfig::DEFAULT_PARALLEL_TRIALS);

        let default_room_level = load_with_warning(
            Self::ROOM_LEVEL_VAR,
            Self::DEFAULT_ROOM_LEVEL,
            |value| value <= MAX_ROOM_LEVEL,
            "must be a known room level",
        );

        let planner = PlannerConfig::builder()
            .top_n(top_n)
            .rack3_fallback(rack3_fallback)
            .rack4_fallback(rack4_fallback)
            .max_rack_budget(max_rack_budget)
            .parallel_trials(parallel_trials)
            .build();

        Self::new(planner, default_room_level)
    }

    /// Returns the configured PlannerConfig.
    pub fn planner_config(&self) -> &PlannerConfig {
        &self.planner
    }

    /// Room level used when a request names neither a budget nor a level.
    pub fn default_room_level(&self) -> u8 {
        self.default_room_level
    }

    /// Rack budget of the default room level.
    pub fn default_rack_budget(&self) -> u32 {
        rack_budget_for_room_level(self.default_room_level)
    }
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self::new(PlannerConfig::default(), Self::DEFAULT_ROOM_LEVEL)
    }
}

/// Output format of the log subscriber.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    const VAR: &'static str = "RACK_PLANNER_LOG_FORMAT";

    /// Reads the log format. Runs before any subscriber exists, so problems
    /// are reported on stderr.
    pub fn from_env() -> Self {
        match env_string(Self::VAR) {
            Some(raw) => Self::parse(&raw).unwrap_or_else(|| {
                eprintln!(
                    "⚠️ Unknown {} ('{}'), expected 'text' or 'json'. Using text.",
                    Self::VAR,
                    raw
                );
                Self::Text
            }),
            None => Self::Text,
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "text" | "plain" | "pretty" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
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
            warn!(var = name, error = %err, "environment access failed, using default value");
            None
        }
    }
}

fn parse_bool(raw: &str, var_name: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        other => {
            warn!(
                var = var_name,
                value = other,
                "could not interpret as boolean, using default value"
            );
            None
        }
    }
}

fn load_with_warning<T>(
    var_name: &str,
    default: T,
    validator: impl Fn(T) -> bool,
    invalid_hint: &str,
) -> T
where
    T: FromStr + Copy + PartialEq + Display,
    T::Err: Display,
{
    parse_or_default(var_name, env_string(var_name), default, validator, invalid_hint)
}

fn parse_or_default<T>(
    var_name: &str,
    raw: Option<String>,
    default: T,
    validator: impl Fn(T) -> bool,
    invalid_hint: &str,
) -> T
where
    T: FromStr + Copy + PartialEq + Display,
    T::Err: Display,
{
    let Some(raw) = raw else {
        return default;
    };
    match raw.parse::<T>() {
        Ok(value) if validator(value) => {
            if value != default {
                warn!(var = var_name, %value, default = %default, "using non-default value");
            }
            value
        }
        Ok(_) => {
            warn!(
                var = var_name,
                value = %raw,
                "invalid value ({}), using {}",
                invalid_hint,
                default
            );
            default
        }
        Err(err) => {
            warn!(
                var = var_name,
                value = %raw,
                error = %err,
                "could not parse value, using {}",
                default
            );
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool_true_values() {
        assert_eq!(parse_bool("1", "TEST_VAR"), Some(true));
        assert_eq!(parse_bool("true", "TEST_VAR"), Some(true));
        assert_eq!(parse_bool("yes", "TEST_VAR"), Some(true));
        assert_eq!(parse_bool("y", "TEST_VAR"), Some(true));
        assert_eq!(parse_bool("on", "TEST_VAR"), Some(true));

        // Test case insensitivity
        assert_eq!(parse_bool("TRUE", "TEST_VAR"), Some(true));
        assert_eq!(parse_bool("On", "TEST_VAR"), Some(true));

        // Test with whitespace
        assert_eq!(parse_bool(" true ", "TEST_VAR"), Some(true));
    }

    #[test]
    fn test_parse_bool_false_values() {
        assert_eq!(parse_bool("0", "TEST_VAR"), Some(false));
        assert_eq!(parse_bool("false", "TEST_VAR"), Some(false));
        assert_eq!(parse_bool("no", "TEST_VAR"), Some(false));
        assert_eq!(parse_bool("n", "TEST_VAR"), Some(false));
        assert_eq!(parse_bool("OFF", "TEST_VAR"), Some(false));
        assert_eq!(parse_bool("  0  ", "TEST_VAR"), Some(false));
    }

    #[test]
    fn test_parse_bool_invalid_values() {
        assert_eq!(parse_bool("maybe", "TEST_VAR"), None);
        assert_eq!(parse_bool("2", "TEST_VAR"), None);
        assert_eq!(parse_bool("", "TEST_VAR"), None);
    }

    #[test]
    fn parse_or_default_accepts_valid_numbers() {
        let top_n = parse_or_default("TEST_VAR", Some("25".to_string()), 10usize, |v| v > 0, "");
        assert_eq!(top_n, 25);

        let fallback = parse_or_default("TEST_VAR", None, 300i64, |v| v >= 0, "");
        assert_eq!(fallback, 300);
    }

    #[test]
    fn parse_or_default_falls_back_on_bad_input() {
        let rejected = parse_or_default("TEST_VAR", Some("0".to_string()), 10usize, |v| v > 0, "");
        assert_eq!(rejected, 10);

        let garbage = parse_or_default("TEST_VAR", Some("ten".to_string()), 8080u16, |_| true, "");
        assert_eq!(garbage, 8080);

        let negative = parse_or_default("TEST_VAR", Some("-5".to_string()), 4u8, |_| true, "");
        assert_eq!(negative, 4);
    }

    #[test]
    fn log_format_parsing() {
        assert_eq!(LogFormat::parse("json"), Some(LogFormat::Json));
        assert_eq!(LogFormat::parse(" JSON "), Some(LogFormat::Json));
        assert_eq!(LogFormat::parse("text"), Some(LogFormat::Text));
        assert_eq!(LogFormat::parse("xml"), None);
    }

    #[test]
    fn default_optimizer_config_covers_the_full_room() {
        let config = OptimizerConfig::default();
        assert_eq!(config.default_room_level(), 3);
        assert_eq!(config.default_rack_budget(), 66);
        assert_eq!(config.planner_config().top_n, PlannerConfig::DEFAULT_TOP_N);
    }
}
