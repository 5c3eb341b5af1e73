use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// How a work-hour rule's break interval feeds the slot generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakMode {
    /// Legacy behaviour: the break is emitted as an extra candidate range and
    /// the primary range is left whole.
    Candidate,
    /// The break is carved out of the primary range.
    Exclude,
}

impl BreakMode {
    fn from_env_value(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "candidate" | "legacy" => Some(BreakMode::Candidate),
            "exclude" | "exclusion" => Some(BreakMode::Exclude),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulingConfig {
    pub data_file: Option<PathBuf>,
    pub slot_stride_minutes: u32,
    /// Minutes since midnight.
    pub default_day_start: u32,
    pub default_day_end: u32,
    pub break_mode: BreakMode,
    pub crm_target_stage: String,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            data_file: None,
            slot_stride_minutes: 15,
            default_day_start: 8 * 60,
            default_day_end: 18 * 60,
            break_mode: BreakMode::Candidate,
            crm_target_stage: "agendado".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub jwt_secret: String,
    pub port: u16,
    pub scheduling: SchedulingConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = SchedulingConfig::default();

        let scheduling = SchedulingConfig {
            data_file: env::var("SCHEDULING_DATA_FILE").ok().map(PathBuf::from),
            slot_stride_minutes: env::var("SCHEDULING_SLOT_STRIDE_MINUTES")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .filter(|v| *v > 0)
                .unwrap_or_else(|| {
                    warn!("SCHEDULING_SLOT_STRIDE_MINUTES not set or invalid, using default");
                    defaults.slot_stride_minutes
                }),
            default_day_start: clock_var("SCHEDULING_DEFAULT_DAY_START", defaults.default_day_start),
            default_day_end: clock_var("SCHEDULING_DEFAULT_DAY_END", defaults.default_day_end),
            break_mode: env::var("SCHEDULING_BREAK_MODE")
                .ok()
                .and_then(|v| BreakMode::from_env_value(&v))
                .unwrap_or(defaults.break_mode),
            crm_target_stage: env::var("SCHEDULING_CRM_TARGET_STAGE")
                .unwrap_or(defaults.crm_target_stage),
        };

        let config = Self {
            jwt_secret: env::var("AUTH_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("AUTH_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            port: env::var("API_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            scheduling,
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }
        if config.scheduling.default_day_start >= config.scheduling.default_day_end {
            warn!("Default working day is empty, slot generation will fall back to no ranges");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.jwt_secret.is_empty()
    }
}

fn clock_var(name: &str, default: u32) -> u32 {
    match env::var(name) {
        Ok(raw) => parse_clock(&raw).unwrap_or_else(|| {
            warn!("{} is not a valid HH:MM value, using default", name);
            default
        }),
        Err(_) => default,
    }
}

/// Same rule as the cell's time-of-day parser: `H:MM`/`HH:MM`, optional `:SS`
/// ignored, ASCII digits only.
fn parse_clock(raw: &str) -> Option<u32> {
    let mut parts = raw.trim().split(':');
    let (h, m) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(m), None, None) | (Some(h), Some(m), Some(_), None) => (h, m),
        _ => return None,
    };
    let field = |f: &str| -> Option<u32> {
        if f.is_empty() || f.len() > 2 || !f.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        f.parse().ok()
    };
    let (h, m) = (field(h)?, field(m)?);
    (h < 24 && m < 60).then_some(h * 60 + m)
}
