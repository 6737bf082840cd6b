// src/kv_layout.rs
//! Per-layer cache plan derived from [`Hparams`]: how many cells each
//! attention layer needs and how wide every recurrent-state slot is.
//!
//! Attention layers store `cells` rows of `k_width` + `v_width` elements.
//! Sliding-window layers only keep `n_swa` trailing tokens per sequence, so
//! their cell count is bounded by the window instead of the context.
//! Recurrent layers keep one fixed-size state per sequence regardless of
//! context length.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::hparams::{Hparams, LayerKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheType {
    #[default]
    F16,
    F32,
}

impl CacheType {
    pub fn size_bytes(&self) -> u64 {
        match self {
            CacheType::F16 => std::mem::size_of::<half::f16>() as u64,
            CacheType::F32 => std::mem::size_of::<f32>() as u64,
        }
    }
}

impl fmt::Display for CacheType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheType::F16 => f.write_str("f16"),
            CacheType::F32 => f.write_str("f32"),
        }
    }
}

impl FromStr for CacheType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "f16" => Ok(CacheType::F16),
            "f32" => Ok(CacheType::F32),
            other => bail!("unsupported cache type '{other}', expected f16 or f32"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheParams {
    /// Cells of the full-context cache, shared by all sequences.
    pub n_ctx: u32,
    pub n_seq_max: u32,
    pub type_k: CacheType,
    pub type_v: CacheType,
}

impl Default for CacheParams {
    fn default() -> Self {
        Self {
            n_ctx: 4096,
            n_seq_max: 1,
            type_k: CacheType::F16,
            type_v: CacheType::F16,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "slot", rename_all = "snake_case")]
pub enum CacheSlot {
    Attention { cells: u32, k_width: u32, v_width: u32 },
    /// `k_width`/`v_width` are per sequence; there are `n_seq_max` of each.
    Recurrent { k_width: u32, v_width: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LayerCache {
    pub il: u32,
    pub kind: LayerKind,
    #[serde(flatten)]
    pub slot: CacheSlot,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheLayout {
    pub params: CacheParams,
    pub layers: Vec<LayerCache>,
}

impl CacheLayout {
    pub fn plan(hp: &Hparams, params: &CacheParams) -> Result<Self> {
        if params.n_ctx == 0 {
            bail!("cache context size must be greater than zero");
        }
        if params.n_seq_max == 0 {
            bail!("cache must hold at least one sequence");
        }

        let swa_cells = swa_cells(hp.n_swa(), params);
        let layers = (0..hp.n_layer())
            .map(|il| {
                let kind = hp.layer_kind(il);
                let slot = match kind {
                    LayerKind::StateSpace | LayerKind::Rwkv => CacheSlot::Recurrent {
                        k_width: hp.n_embd_k_s(),
                        v_width: hp.n_embd_v_s(),
                    },
                    LayerKind::SlidingWindow => CacheSlot::Attention {
                        cells: swa_cells,
                        k_width: hp.n_embd_k_gqa(il),
                        v_width: hp.n_embd_v_gqa(il),
                    },
                    LayerKind::Dense => CacheSlot::Attention {
                        cells: params.n_ctx,
                        k_width: hp.n_embd_k_gqa(il),
                        v_width: hp.n_embd_v_gqa(il),
                    },
                };
                LayerCache { il, kind, slot }
            })
            .collect();

        let layout = Self {
            params: *params,
            layers,
        };
        tracing::info!(
            n_ctx = params.n_ctx,
            n_seq_max = params.n_seq_max,
            swa_cells,
            windowed = layout.needs_windowed_cache(),
            kv_bytes = layout.kv_bytes(),
            state_bytes = layout.state_bytes(),
            "planned cache layout"
        );
        Ok(layout)
    }

    /// True if any attention layer is sliding-window, i.e. a second,
    /// window-sized cache has to be allocated next to the full one.
    pub fn needs_windowed_cache(&self) -> bool {
        self.layers.iter().any(|l| l.kind == LayerKind::SlidingWindow)
    }

    pub fn layer(&self, il: u32) -> Option<&LayerCache> {
        self.layers.get(il as usize)
    }

    /// Elements of the key and value caches across all attention layers.
    pub fn kv_elements(&self) -> (u64, u64) {
        self.layers
            .iter()
            .fold((0, 0), |(k, v), l| match l.slot {
                CacheSlot::Attention {
                    cells,
                    k_width,
                    v_width,
                } => (
                    k + cells as u64 * k_width as u64,
                    v + cells as u64 * v_width as u64,
                ),
                CacheSlot::Recurrent { .. } => (k, v),
            })
    }

    /// Elements of all recurrent states, for every sequence.
    pub fn state_elements(&self) -> u64 {
        let per_seq: u64 = self
            .layers
            .iter()
            .map(|l| match l.slot {
                CacheSlot::Recurrent { k_width, v_width } => k_width as u64 + v_width as u64,
                CacheSlot::Attention { .. } => 0,
            })
            .sum();
        per_seq * self.params.n_seq_max as u64
    }

    pub fn kv_bytes(&self) -> u64 {
        let (k, v) = self.kv_elements();
        k * self.params.type_k.size_bytes() + v * self.params.type_v.size_bytes()
    }

    /// Recurrent states are always kept in f32.
    pub fn state_bytes(&self) -> u64 {
        self.state_elements() * std::mem::size_of::<f32>() as u64
    }

    pub fn total_bytes(&self) -> u64 {
        self.kv_bytes() + self.state_bytes()
    }
}

fn swa_cells(n_swa: u32, params: &CacheParams) -> u32 {
    if n_swa == 0 {
        return params.n_ctx;
    }
    let window = (n_swa as u64) * (params.n_seq_max as u64);
    window.min(params.n_ctx as u64) as u32
}
