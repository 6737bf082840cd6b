// src/hparams.rs
//! Per-layer hyperparameter store.
//!
//! Populated once through [`HparamsBuilder`] while a model loads, then
//! published as an immutable [`Hparams`] that the cache planner and graph
//! builder query per layer. Per-layer accessors treat an out-of-range layer
//! index as a caller bug and panic instead of returning a value.

use anyhow::{anyhow, bail, Result};
use serde::Serialize;

use crate::swa::SwaPattern;

/// Upper bound on `n_layer` accepted from model metadata.
pub const MAX_LAYERS: u32 = 512;

/// Per-layer `u32` attribute as it arrives from metadata: one value broadcast
/// to every layer, or one value per layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerValues {
    Uniform(u32),
    PerLayer(Vec<u32>),
}

impl Default for LayerValues {
    fn default() -> Self {
        LayerValues::Uniform(0)
    }
}

impl From<u32> for LayerValues {
    fn from(v: u32) -> Self {
        LayerValues::Uniform(v)
    }
}

impl From<Vec<u32>> for LayerValues {
    fn from(v: Vec<u32>) -> Self {
        LayerValues::PerLayer(v)
    }
}

impl From<&[u32]> for LayerValues {
    fn from(v: &[u32]) -> Self {
        LayerValues::PerLayer(v.to_vec())
    }
}

impl LayerValues {
    /// Value for the first layer, used for model-wide defaults such as head width.
    pub fn first(&self) -> u32 {
        match self {
            LayerValues::Uniform(v) => *v,
            LayerValues::PerLayer(v) => v.first().copied().unwrap_or(0),
        }
    }

    fn resolve(&self, name: &str, n_layer: u32) -> Result<Box<[u32]>> {
        match self {
            LayerValues::Uniform(v) => Ok(vec![*v; n_layer as usize].into_boxed_slice()),
            LayerValues::PerLayer(v) => {
                if v.len() != n_layer as usize {
                    bail!(
                        "{name} has {} per-layer entries but n_layer is {n_layer}",
                        v.len()
                    );
                }
                Ok(v.clone().into_boxed_slice())
            }
        }
    }
}

/// Which layers keep a recurrent-state slot instead of a key/value cache slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RecurrentLayers {
    /// Pure attention model.
    #[default]
    None,
    /// Pure recurrent model (Mamba, RWKV).
    All,
    /// Hybrid model: a layer is recurrent iff it has no key/value heads.
    WithoutKvHeads,
    Explicit(Vec<bool>),
}

/// Family of the recurrent-state formulas, decided by `wkv_head_size != 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateFamily {
    StateSpace,
    Rwkv,
}

/// What kind of persistent state a layer needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    Dense,
    SlidingWindow,
    StateSpace,
    Rwkv,
}

impl LayerKind {
    pub fn is_attention(&self) -> bool {
        matches!(self, LayerKind::Dense | LayerKind::SlidingWindow)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LayerKind::Dense => "dense",
            LayerKind::SlidingWindow => "swa",
            LayerKind::StateSpace => "ssm",
            LayerKind::Rwkv => "rwkv",
        }
    }
}

/// Write phase of the store. Scalars are plain fields; per-layer attributes
/// are resolved against `n_layer` in [`HparamsBuilder::build`].
#[derive(Debug, Clone)]
pub struct HparamsBuilder {
    pub n_layer: u32,
    pub n_ctx_train: u32,
    pub n_embd: u32,
    pub n_embd_head_k: u32,
    pub n_embd_head_v: u32,
    pub n_rot: u32,
    pub n_swa: u32,
    pub n_expert: u32,
    pub n_expert_used: u32,
    pub f_norm_eps: f32,
    pub f_norm_rms_eps: f32,
    pub rope_freq_base_train: f32,
    pub rope_freq_scale_train: f32,
    pub causal_attn: bool,

    pub ssm_d_conv: u32,
    pub ssm_d_inner: u32,
    pub ssm_d_state: u32,
    pub ssm_dt_rank: u32,

    pub wkv_head_size: u32,
    pub token_shift_count: u32,

    pub n_head: LayerValues,
    /// `None` means one key/value head per query head.
    pub n_head_kv: Option<LayerValues>,
    pub n_ff: LayerValues,
    pub recurrent_layers: RecurrentLayers,

    swa_pattern: SwaPattern,
}

impl Default for HparamsBuilder {
    fn default() -> Self {
        Self {
            n_layer: 0,
            n_ctx_train: 0,
            n_embd: 0,
            n_embd_head_k: 0,
            n_embd_head_v: 0,
            n_rot: 0,
            n_swa: 0,
            n_expert: 0,
            n_expert_used: 0,
            f_norm_eps: 0.0,
            f_norm_rms_eps: 0.0,
            rope_freq_base_train: 10_000.0,
            rope_freq_scale_train: 1.0,
            causal_attn: true,
            ssm_d_conv: 0,
            ssm_d_inner: 0,
            ssm_d_state: 0,
            ssm_dt_rank: 0,
            wkv_head_size: 0,
            token_shift_count: 2,
            n_head: LayerValues::default(),
            n_head_kv: None,
            n_ff: LayerValues::default(),
            recurrent_layers: RecurrentLayers::None,
            swa_pattern: SwaPattern::Disabled,
        }
    }
}

impl HparamsBuilder {
    pub fn new(n_layer: u32) -> Self {
        Self {
            n_layer,
            ..Default::default()
        }
    }

    /// Sliding-window everywhere except the last layer of each `n_pattern` block.
    pub fn set_swa_pattern(&mut self, n_pattern: u32) -> &mut Self {
        self.swa_pattern = SwaPattern::TailDense(n_pattern);
        self
    }

    /// Sliding-window everywhere except the first layer of each `n_pattern` block.
    pub fn set_dense_start_swa_pattern(&mut self, n_pattern: u32) -> &mut Self {
        self.swa_pattern = SwaPattern::HeadDense(n_pattern);
        self
    }

    pub fn set_swa(&mut self, pattern: SwaPattern) -> &mut Self {
        self.swa_pattern = pattern;
        self
    }

    pub fn swa_pattern(&self) -> SwaPattern {
        self.swa_pattern
    }

    /// Resolve per-layer attributes, run the SWA generator and freeze the store.
    pub fn build(self) -> Result<Hparams> {
        let n_layer = self.n_layer;
        if n_layer > MAX_LAYERS {
            bail!("n_layer {n_layer} exceeds the supported maximum of {MAX_LAYERS}");
        }

        let n_head = self.n_head.resolve("n_head", n_layer)?;
        let n_head_kv = match &self.n_head_kv {
            Some(kv) => kv.resolve("n_head_kv", n_layer)?,
            None => n_head.clone(),
        };
        let n_ff = self.n_ff.resolve("n_ff", n_layer)?;

        let recurrent_layers: Box<[bool]> = match self.recurrent_layers {
            RecurrentLayers::None => vec![false; n_layer as usize].into_boxed_slice(),
            RecurrentLayers::All => vec![true; n_layer as usize].into_boxed_slice(),
            RecurrentLayers::WithoutKvHeads => n_head_kv.iter().map(|&kv| kv == 0).collect(),
            RecurrentLayers::Explicit(flags) => {
                if flags.len() != n_layer as usize {
                    bail!(
                        "recurrent_layers has {} per-layer entries but n_layer is {n_layer}",
                        flags.len()
                    );
                }
                flags.into_boxed_slice()
            }
        };

        let kv_max = n_head_kv.iter().copied().max().unwrap_or(0);
        checked_width("n_embd_head_k * n_head_kv", self.n_embd_head_k, kv_max)?;
        checked_width("n_embd_head_v * n_head_kv", self.n_embd_head_v, kv_max)?;
        if self.wkv_head_size != 0 {
            checked_width("token_shift_count * n_embd", self.token_shift_count, self.n_embd)?;
            checked_width("n_embd * wkv_head_size", self.n_embd, self.wkv_head_size)?;
        } else {
            checked_width(
                "(ssm_d_conv - 1) * ssm_d_inner",
                self.ssm_d_conv.saturating_sub(1),
                self.ssm_d_inner,
            )?;
            checked_width("ssm_d_state * ssm_d_inner", self.ssm_d_state, self.ssm_d_inner)?;
        }

        let swa_layers = self.swa_pattern.generate(n_layer);

        Ok(Hparams {
            n_layer,
            n_ctx_train: self.n_ctx_train,
            n_embd: self.n_embd,
            n_embd_head_k: self.n_embd_head_k,
            n_embd_head_v: self.n_embd_head_v,
            n_rot: self.n_rot,
            n_swa: self.n_swa,
            n_expert: self.n_expert,
            n_expert_used: self.n_expert_used,
            f_norm_eps: self.f_norm_eps,
            f_norm_rms_eps: self.f_norm_rms_eps,
            rope_freq_base_train: self.rope_freq_base_train,
            rope_freq_scale_train: self.rope_freq_scale_train,
            causal_attn: self.causal_attn,
            ssm_d_conv: self.ssm_d_conv,
            ssm_d_inner: self.ssm_d_inner,
            ssm_d_state: self.ssm_d_state,
            ssm_dt_rank: self.ssm_dt_rank,
            wkv_head_size: self.wkv_head_size,
            token_shift_count: self.token_shift_count,
            swa_pattern: self.swa_pattern,
            n_head_arr: n_head,
            n_head_kv_arr: n_head_kv,
            n_ff_arr: n_ff,
            swa_layers,
            recurrent_layers,
        })
    }
}

/// Every cache or state width must fit in `u32` so the read-phase calculators
/// never overflow.
fn checked_width(name: &str, a: u32, b: u32) -> Result<u32> {
    a.checked_mul(b)
        .ok_or_else(|| anyhow!("{name} overflows u32 ({a} * {b})"))
}

/// Read phase of the store. No method takes `&mut self` and no field is
/// public; share it as `&Hparams` or `Arc<Hparams>` once built.
///
/// ```compile_fail
/// let mut hp = llm_hparams::HparamsBuilder::new(1).build().unwrap();
/// hp.wkv_head_size = 64;
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct Hparams {
    n_layer: u32,
    n_ctx_train: u32,
    n_embd: u32,
    n_embd_head_k: u32,
    n_embd_head_v: u32,
    n_rot: u32,
    n_swa: u32,
    n_expert: u32,
    n_expert_used: u32,
    f_norm_eps: f32,
    f_norm_rms_eps: f32,
    rope_freq_base_train: f32,
    rope_freq_scale_train: f32,
    causal_attn: bool,

    ssm_d_conv: u32,
    ssm_d_inner: u32,
    ssm_d_state: u32,
    ssm_dt_rank: u32,

    wkv_head_size: u32,
    token_shift_count: u32,

    swa_pattern: SwaPattern,
    #[serde(rename = "n_head")]
    n_head_arr: Box<[u32]>,
    #[serde(rename = "n_head_kv")]
    n_head_kv_arr: Box<[u32]>,
    #[serde(rename = "n_ff")]
    n_ff_arr: Box<[u32]>,
    swa_layers: Box<[bool]>,
    recurrent_layers: Box<[bool]>,
}

/// Scalar getters. The store is frozen after [`HparamsBuilder::build`].
impl Hparams {
    pub fn n_ctx_train(&self) -> u32 {
        self.n_ctx_train
    }

    pub fn n_embd(&self) -> u32 {
        self.n_embd
    }

    pub fn n_embd_head_k(&self) -> u32 {
        self.n_embd_head_k
    }

    pub fn n_embd_head_v(&self) -> u32 {
        self.n_embd_head_v
    }

    pub fn n_rot(&self) -> u32 {
        self.n_rot
    }

    pub fn n_swa(&self) -> u32 {
        self.n_swa
    }

    pub fn n_expert(&self) -> u32 {
        self.n_expert
    }

    pub fn n_expert_used(&self) -> u32 {
        self.n_expert_used
    }

    pub fn ssm_d_conv(&self) -> u32 {
        self.ssm_d_conv
    }

    pub fn ssm_d_inner(&self) -> u32 {
        self.ssm_d_inner
    }

    pub fn ssm_d_state(&self) -> u32 {
        self.ssm_d_state
    }

    pub fn ssm_dt_rank(&self) -> u32 {
        self.ssm_dt_rank
    }

    pub fn wkv_head_size(&self) -> u32 {
        self.wkv_head_size
    }

    pub fn token_shift_count(&self) -> u32 {
        self.token_shift_count
    }

    pub fn f_norm_eps(&self) -> f32 {
        self.f_norm_eps
    }

    pub fn f_norm_rms_eps(&self) -> f32 {
        self.f_norm_rms_eps
    }

    pub fn rope_freq_base_train(&self) -> f32 {
        self.rope_freq_base_train
    }

    pub fn rope_freq_scale_train(&self) -> f32 {
        self.rope_freq_scale_train
    }

    pub fn causal_attn(&self) -> bool {
        self.causal_attn
    }
}

impl Hparams {
    pub fn n_layer(&self) -> u32 {
        self.n_layer
    }

    pub fn swa_pattern(&self) -> SwaPattern {
        self.swa_pattern
    }

    #[track_caller]
    fn layer(&self, il: u32) -> usize {
        assert!(
            il < self.n_layer,
            "layer index {il} out of range (n_layer = {})",
            self.n_layer
        );
        il as usize
    }

    #[track_caller]
    pub fn n_head(&self, il: u32) -> u32 {
        self.n_head_arr[self.layer(il)]
    }

    #[track_caller]
    pub fn n_head_kv(&self, il: u32) -> u32 {
        self.n_head_kv_arr[self.layer(il)]
    }

    #[track_caller]
    pub fn n_ff(&self, il: u32) -> u32 {
        self.n_ff_arr[self.layer(il)]
    }

    #[track_caller]
    pub fn is_swa(&self, il: u32) -> bool {
        self.swa_layers[self.layer(il)]
    }

    #[track_caller]
    pub fn is_recurrent(&self, il: u32) -> bool {
        self.recurrent_layers[self.layer(il)]
    }

    /// True if at least one layer uses sliding-window attention.
    pub fn is_swa_any(&self) -> bool {
        self.swa_layers.iter().any(|&swa| swa)
    }

    pub fn is_recurrent_any(&self) -> bool {
        self.recurrent_layers.iter().any(|&r| r)
    }

    /// Query heads per key/value head; `0` for layers without key/value heads.
    #[track_caller]
    pub fn n_gqa(&self, il: u32) -> u32 {
        let n_head = self.n_head(il);
        let n_head_kv = self.n_head_kv(il);

        if n_head_kv == 0 {
            return 0;
        }

        n_head / n_head_kv
    }

    /// Key width of one cached token for layer `il`.
    #[track_caller]
    pub fn n_embd_k_gqa(&self, il: u32) -> u32 {
        self.n_embd_head_k * self.n_head_kv(il)
    }

    /// Value width of one cached token for layer `il`.
    #[track_caller]
    pub fn n_embd_v_gqa(&self, il: u32) -> u32 {
        self.n_embd_head_v * self.n_head_kv(il)
    }

    pub fn n_embd_k_gqa_max(&self) -> u32 {
        (0..self.n_layer)
            .map(|il| self.n_embd_k_gqa(il))
            .max()
            .unwrap_or(0)
    }

    pub fn n_embd_v_gqa_max(&self) -> u32 {
        (0..self.n_layer)
            .map(|il| self.n_embd_v_gqa(il))
            .max()
            .unwrap_or(0)
    }

    pub fn state_family(&self) -> StateFamily {
        if self.wkv_head_size != 0 {
            StateFamily::Rwkv
        } else {
            StateFamily::StateSpace
        }
    }

    /// Width of the rolling recurrent state (token shift or conv window).
    pub fn n_embd_k_s(&self) -> u32 {
        match self.state_family() {
            StateFamily::Rwkv => self.token_shift_count * self.n_embd,
            // the oldest conv column is shifted out on every step and never read back
            StateFamily::StateSpace => self.ssm_d_conv.saturating_sub(1) * self.ssm_d_inner,
        }
    }

    /// Width of the recurrent hidden state (wkv state or SSM state).
    pub fn n_embd_v_s(&self) -> u32 {
        match self.state_family() {
            StateFamily::Rwkv => self.n_embd * self.wkv_head_size,
            StateFamily::StateSpace => self.ssm_d_state * self.ssm_d_inner,
        }
    }

    #[track_caller]
    pub fn layer_kind(&self, il: u32) -> LayerKind {
        if self.is_recurrent(il) {
            return match self.state_family() {
                StateFamily::StateSpace => LayerKind::StateSpace,
                StateFamily::Rwkv => LayerKind::Rwkv,
            };
        }
        if self.is_swa(il) {
            LayerKind::SlidingWindow
        } else {
            LayerKind::Dense
        }
    }
}
