// src/swa.rs
//! Sliding-window attention membership: which layers attend over a bounded
//! trailing window and which ones see the full context.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Policy used to derive per-layer SWA membership from a single period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "policy", content = "n_pattern", rename_all = "snake_case")]
pub enum SwaPattern {
    /// No sliding-window layers at all.
    #[default]
    Disabled,
    /// Every block of `n_pattern` layers ends with one dense layer.
    TailDense(u32),
    /// Every block of `n_pattern` layers starts with one dense layer.
    HeadDense(u32),
}

impl SwaPattern {
    /// Membership of layer `il` under this policy.
    ///
    /// `n_pattern == 0` marks every layer sliding-window, `n_pattern == 1`
    /// marks none, under both policies.
    pub fn is_swa(&self, il: u32) -> bool {
        match *self {
            SwaPattern::Disabled => false,
            SwaPattern::TailDense(n) => n == 0 || il % n < n - 1,
            SwaPattern::HeadDense(n) => n == 0 || il % n != 0,
        }
    }

    /// Fill one flag per layer.
    pub fn generate(&self, n_layer: u32) -> Box<[bool]> {
        (0..n_layer).map(|il| self.is_swa(il)).collect()
    }

    pub fn n_pattern(&self) -> Option<u32> {
        match *self {
            SwaPattern::Disabled => None,
            SwaPattern::TailDense(n) | SwaPattern::HeadDense(n) => Some(n),
        }
    }
}

impl fmt::Display for SwaPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwaPattern::Disabled => write!(f, "none"),
            SwaPattern::TailDense(n) => write!(f, "tail:{n}"),
            SwaPattern::HeadDense(n) => write!(f, "head:{n}"),
        }
    }
}

/// Accepts `none`, `tail:N` and `head:N`.
impl FromStr for SwaPattern {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("none") {
            return Ok(SwaPattern::Disabled);
        }
        let (policy, n) = s
            .split_once(':')
            .ok_or_else(|| anyhow!("invalid SWA pattern '{s}', expected none, tail:N or head:N"))?;
        let n: u32 = n
            .parse()
            .map_err(|e| anyhow!("invalid SWA period '{n}' in '{s}': {e}"))?;
        match policy {
            "tail" => Ok(SwaPattern::TailDense(n)),
            "head" => Ok(SwaPattern::HeadDense(n)),
            other => Err(anyhow!("unknown SWA policy '{other}', expected tail or head")),
        }
    }
}
