// src/report.rs
//! Human and JSON renderings of a model's derived hyperparameters.

use serde::Serialize;
use std::fmt;

use crate::hparams::{Hparams, LayerKind, StateFamily};
use crate::kv_layout::CacheLayout;

#[derive(Debug, Clone, Serialize)]
pub struct LayerRow {
    pub il: u32,
    pub kind: LayerKind,
    pub n_head: u32,
    pub n_head_kv: u32,
    pub n_ff: u32,
    pub n_gqa: u32,
    pub n_embd_k_gqa: u32,
    pub n_embd_v_gqa: u32,
    pub is_swa: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheTotals {
    pub windowed: bool,
    pub kv_bytes: u64,
    pub state_bytes: u64,
    pub total_bytes: u64,
}

#[derive(Debug, Serialize)]
pub struct ModelReport<'a> {
    pub arch: &'a str,
    pub hparams: &'a Hparams,
    pub state_family: StateFamily,
    pub n_embd_k_s: u32,
    pub n_embd_v_s: u32,
    pub is_swa_any: bool,
    pub layers: Vec<LayerRow>,
    pub cache: &'a CacheLayout,
    pub cache_totals: CacheTotals,
}

impl<'a> ModelReport<'a> {
    pub fn new(arch: &'a str, hp: &'a Hparams, cache: &'a CacheLayout) -> Self {
        let layers = (0..hp.n_layer())
            .map(|il| LayerRow {
                il,
                kind: hp.layer_kind(il),
                n_head: hp.n_head(il),
                n_head_kv: hp.n_head_kv(il),
                n_ff: hp.n_ff(il),
                n_gqa: hp.n_gqa(il),
                n_embd_k_gqa: hp.n_embd_k_gqa(il),
                n_embd_v_gqa: hp.n_embd_v_gqa(il),
                is_swa: hp.is_swa(il),
            })
            .collect();
        Self {
            arch,
            hparams: hp,
            state_family: hp.state_family(),
            n_embd_k_s: hp.n_embd_k_s(),
            n_embd_v_s: hp.n_embd_v_s(),
            is_swa_any: hp.is_swa_any(),
            layers,
            cache,
            cache_totals: CacheTotals {
                windowed: cache.needs_windowed_cache(),
                kv_bytes: cache.kv_bytes(),
                state_bytes: cache.state_bytes(),
                total_bytes: cache.total_bytes(),
            },
        }
    }
}

fn mib(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

impl fmt::Display for ModelReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hp = self.hparams;
        writeln!(f, "arch:            {}", self.arch)?;
        writeln!(f, "n_layer:         {}", hp.n_layer())?;
        writeln!(f, "n_ctx_train:     {}", hp.n_ctx_train())?;
        writeln!(f, "n_embd:          {}", hp.n_embd())?;
        writeln!(f, "n_embd_head_k/v: {}/{}", hp.n_embd_head_k(), hp.n_embd_head_v())?;
        writeln!(f, "n_rot:           {}", hp.n_rot())?;
        writeln!(f, "n_expert:        {} (used {})", hp.n_expert(), hp.n_expert_used())?;
        writeln!(f, "swa pattern:     {} (window {})", hp.swa_pattern(), hp.n_swa())?;
        writeln!(
            f,
            "recurrent state: {:?} k_s={} v_s={}",
            self.state_family, self.n_embd_k_s, self.n_embd_v_s
        )?;
        writeln!(f)?;
        writeln!(
            f,
            "{:>4}  {:<5}  {:>6}  {:>6}  {:>7}  {:>4}  {:>7}  {:>7}",
            "il", "kind", "n_head", "n_kv", "n_ff", "gqa", "k_gqa", "v_gqa"
        )?;
        for row in &self.layers {
            writeln!(
                f,
                "{:>4}  {:<5}  {:>6}  {:>6}  {:>7}  {:>4}  {:>7}  {:>7}",
                row.il,
                row.kind.as_str(),
                row.n_head,
                row.n_head_kv,
                row.n_ff,
                row.n_gqa,
                row.n_embd_k_gqa,
                row.n_embd_v_gqa
            )?;
        }
        writeln!(f)?;
        let p = &self.cache.params;
        writeln!(
            f,
            "cache (n_ctx={}, n_seq_max={}, k={}, v={}): kv {:.2} MiB, state {:.2} MiB, total {:.2} MiB{}",
            p.n_ctx,
            p.n_seq_max,
            p.type_k,
            p.type_v,
            mib(self.cache_totals.kv_bytes),
            mib(self.cache_totals.state_bytes),
            mib(self.cache_totals.total_bytes),
            if self.cache_totals.windowed {
                ", windowed cache required"
            } else {
                ""
            }
        )
    }
}
