//! Provider catalogue and per-provider limits.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiProvider {
    Plantnet,
    Trefle,
    PlantId,
    Kindwise,
    Openweather,
    TomorrowIo,
    Weatherstack,
    VisualCrossing,
    Openai,
    GoogleAi,
    Anthropic,
}

impl ApiProvider {
    pub const ALL: [ApiProvider; 11] = [
        ApiProvider::Plantnet,
        ApiProvider::Trefle,
        ApiProvider::PlantId,
        ApiProvider::Kindwise,
        ApiProvider::Openweather,
        ApiProvider::TomorrowIo,
        ApiProvider::Weatherstack,
        ApiProvider::VisualCrossing,
        ApiProvider::Openai,
        ApiProvider::GoogleAi,
        ApiProvider::Anthropic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ApiProvider::Plantnet => "plantnet",
            ApiProvider::Trefle => "trefle",
            ApiProvider::PlantId => "plant_id",
            ApiProvider::Kindwise => "kindwise",
            ApiProvider::Openweather => "openweather",
            ApiProvider::TomorrowIo => "tomorrow_io",
            ApiProvider::Weatherstack => "weatherstack",
            ApiProvider::VisualCrossing => "visual_crossing",
            ApiProvider::Openai => "openai",
            ApiProvider::GoogleAi => "google_ai",
            ApiProvider::Anthropic => "anthropic",
        }
    }

    pub fn limits(&self) -> ApiLimits {
        use ResetPeriod::*;
        let (free_daily, premium_daily, free_monthly, premium_monthly, reset, priority) = match self
        {
            ApiProvider::Plantnet => (5, 50, 150, 1500, Daily, 1),
            ApiProvider::Trefle => (10, 100, 300, 3000, Daily, 2),
            ApiProvider::PlantId => (3, 30, 90, 900, Daily, 3),
            ApiProvider::Kindwise => (5, 50, 150, 1500, Daily, 4),
            ApiProvider::Openweather => (1000, 10000, 30000, 300000, Daily, 1),
            ApiProvider::TomorrowIo => (100, 1000, 3000, 30000, Daily, 2),
            ApiProvider::Weatherstack => (250, 2500, 7500, 75000, Monthly, 3),
            ApiProvider::VisualCrossing => (1000, 10000, 30000, 300000, Daily, 4),
            ApiProvider::Openai => (20, 200, 600, 6000, Daily, 1),
            ApiProvider::GoogleAi => (15, 150, 450, 4500, Daily, 2),
            ApiProvider::Anthropic => (10, 100, 300, 3000, Daily, 3),
        };
        ApiLimits {
            free_daily_limit: free_daily,
            premium_daily_limit: premium_daily,
            free_monthly_limit: free_monthly,
            premium_monthly_limit: premium_monthly,
            reset_period: reset,
            priority,
        }
    }
}

impl fmt::Display for ApiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ApiProvider::ALL
            .iter()
            .find(|p| p.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown provider '{s}'"))
    }
}

/// Groups of interchangeable providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    PlantIdentification,
    Weather,
    AiChat,
}

impl ServiceType {
    pub const ALL: [ServiceType; 3] = [
        ServiceType::PlantIdentification,
        ServiceType::Weather,
        ServiceType::AiChat,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::PlantIdentification => "plant_identification",
            ServiceType::Weather => "weather",
            ServiceType::AiChat => "ai_chat",
        }
    }

    pub fn providers(&self) -> &'static [ApiProvider] {
        match self {
            ServiceType::PlantIdentification => &[
                ApiProvider::Plantnet,
                ApiProvider::Trefle,
                ApiProvider::PlantId,
                ApiProvider::Kindwise,
            ],
            ServiceType::Weather => &[
                ApiProvider::Openweather,
                ApiProvider::TomorrowIo,
                ApiProvider::Weatherstack,
                ApiProvider::VisualCrossing,
            ],
            ServiceType::AiChat => &[
                ApiProvider::Openai,
                ApiProvider::GoogleAi,
                ApiProvider::Anthropic,
            ],
        }
    }
}

impl FromStr for ServiceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ServiceType::ALL
            .iter()
            .find(|t| t.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown service type '{s}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApiTier {
    #[default]
    Free,
    Premium,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResetPeriod {
    Daily,
    Monthly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ApiLimits {
    pub free_daily_limit: u64,
    pub premium_daily_limit: u64,
    pub free_monthly_limit: u64,
    pub premium_monthly_limit: u64,
    pub reset_period: ResetPeriod,
    /// Lower is preferred.
    pub priority: u32,
}

impl ApiLimits {
    pub fn daily_limit(&self, tier: ApiTier) -> u64 {
        match tier {
            ApiTier::Free => self.free_daily_limit,
            ApiTier::Premium => self.premium_daily_limit,
        }
    }
}
