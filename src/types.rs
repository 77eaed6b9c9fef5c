// src/types.rs
use clap::ValueEnum;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Supported compute-engine algorithms
///
/// The canonical name (as printed by `Display`) is what the compute engine
/// receives in its `algo` field.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
pub enum AlgorithmType {
    /// Minotaurx (KEY, PLSR, AVN, ...)
    #[value(name = "cwm_minotaurx")]
    #[serde(rename = "cwm_minotaurx")]
    Minotaurx,

    /// YesPower (VISH, SMT, YTN, ...)
    #[value(name = "cwm_yespower")]
    #[serde(rename = "cwm_yespower")]
    YesPower,

    /// YesPowerR16 (YTN, ...)
    #[value(name = "cwm_yespowerR16")]
    #[serde(rename = "cwm_yespowerR16")]
    YesPowerR16,

    /// YesPowerSUGAR (SUGAR, ...)
    #[value(name = "cwm_yespowerSUGAR")]
    #[serde(rename = "cwm_yespowerSUGAR")]
    YesPowerSugar,

    /// YesPowerADVC (ADVC, ...)
    #[value(name = "cwm_yespowerADVC")]
    #[serde(rename = "cwm_yespowerADVC")]
    YesPowerAdvc,

    /// Ghostrider (RTM, ...)
    #[value(name = "cwm_ghostrider")]
    #[serde(rename = "cwm_ghostrider")]
    Ghostrider,

    /// Power2B (MicroBitcoin, ...)
    #[value(name = "cwm_power2B")]
    #[serde(rename = "cwm_power2B")]
    Power2B,

    /// Yescrypt (BSTY, XMY, UIS, ...)
    #[value(name = "cwm_yescrypt")]
    #[serde(rename = "cwm_yescrypt")]
    Yescrypt,

    /// YescryptR8 (MBTC, ...)
    #[value(name = "cwm_yescryptR8")]
    #[serde(rename = "cwm_yescryptR8")]
    YescryptR8,

    /// YescryptR16 (GOLD, FENEC, ...)
    #[value(name = "cwm_yescryptR16")]
    #[serde(rename = "cwm_yescryptR16")]
    YescryptR16,

    /// YescryptR32 (UNFY, DMS, ...)
    #[value(name = "cwm_yescryptR32")]
    #[serde(rename = "cwm_yescryptR32")]
    YescryptR32,
}

lazy_static! {
    /// Shorthand names accepted in configs and on the command line
    static ref ALIASES: HashMap<&'static str, AlgorithmType> = {
        let mut m = HashMap::new();
        m.insert("power2b", AlgorithmType::Power2B);
        m.insert("cwm_power2b", AlgorithmType::Power2B);
        m.insert("yespower", AlgorithmType::YesPower);
        m.insert("cpupower", AlgorithmType::YesPower);
        m
    };
}

impl AlgorithmType {
    /// All algorithms in display order; the first one is the default
    pub const ALL: [AlgorithmType; 11] = [
        AlgorithmType::Minotaurx,
        AlgorithmType::YesPower,
        AlgorithmType::YesPowerR16,
        AlgorithmType::YesPowerSugar,
        AlgorithmType::YesPowerAdvc,
        AlgorithmType::Ghostrider,
        AlgorithmType::Power2B,
        AlgorithmType::Yescrypt,
        AlgorithmType::YescryptR8,
        AlgorithmType::YescryptR16,
        AlgorithmType::YescryptR32,
    ];

    /// Canonical name sent to the compute engine
    pub fn name(&self) -> &'static str {
        match self {
            AlgorithmType::Minotaurx => "cwm_minotaurx",
            AlgorithmType::YesPower => "cwm_yespower",
            AlgorithmType::YesPowerR16 => "cwm_yespowerR16",
            AlgorithmType::YesPowerSugar => "cwm_yespowerSUGAR",
            AlgorithmType::YesPowerAdvc => "cwm_yespowerADVC",
            AlgorithmType::Ghostrider => "cwm_ghostrider",
            AlgorithmType::Power2B => "cwm_power2B",
            AlgorithmType::Yescrypt => "cwm_yescrypt",
            AlgorithmType::YescryptR8 => "cwm_yescryptR8",
            AlgorithmType::YescryptR16 => "cwm_yescryptR16",
            AlgorithmType::YescryptR32 => "cwm_yescryptR32",
        }
    }

    /// Human readable label listing example coins
    pub fn label(&self) -> &'static str {
        match self {
            AlgorithmType::Minotaurx => "Minotaurx (KEY, PLSR, AVN, ...)",
            AlgorithmType::YesPower => "YesPower (VISH, SMT, YTN, ...)",
            AlgorithmType::YesPowerR16 => "YesPowerR16 (YTN, ...)",
            AlgorithmType::YesPowerSugar => "YesPowerSUGAR (SUGAR, ...)",
            AlgorithmType::YesPowerAdvc => "YesPowerADVC (ADVC, ...)",
            AlgorithmType::Ghostrider => "Ghostrider (RTM, ...)",
            AlgorithmType::Power2B => "Power2B (MicroBitcoin, ...)",
            AlgorithmType::Yescrypt => "Yescrypt (BSTY, XMY, UIS, ...)",
            AlgorithmType::YescryptR8 => "YescryptR8 (MBTC, ...)",
            AlgorithmType::YescryptR16 => "YescryptR16 (GOLD, FENEC, ...)",
            AlgorithmType::YescryptR32 => "YescryptR32 (UNFY, DMS, ...)",
        }
    }

    /// Lenient lookup: unknown or empty input falls back to the default
    /// algorithm instead of failing.
    pub fn normalize(input: &str) -> AlgorithmType {
        input.parse().unwrap_or_default()
    }
}

impl Default for AlgorithmType {
    fn default() -> Self {
        AlgorithmType::ALL[0]
    }
}

impl fmt::Display for AlgorithmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AlgorithmType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        if let Some(algo) = AlgorithmType::ALL.iter().find(|a| a.name() == raw) {
            return Ok(*algo);
        }
        ALIASES
            .get(raw.to_lowercase().as_str())
            .copied()
            .ok_or_else(|| format!("Unknown algorithm: {}", s))
    }
}
