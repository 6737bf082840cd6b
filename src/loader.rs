// src/loader.rs
//! Populate an [`Hparams`] store from GGUF metadata.

use anyhow::{anyhow, bail, Context, Result};
use std::collections::HashMap;

use crate::arch::Arch;
use crate::gguf::{GgufModel, GgufValue};
use crate::hparams::{Hparams, HparamsBuilder, LayerValues};
use crate::swa::SwaPattern;

/// Window length llama4 uses for its chunked layers; not stored in GGUF.
const LLAMA4_CHUNK_SIZE: u32 = 8192;
const SMALLTHINKER_WINDOW: u32 = 4096;

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Replace the architecture's sliding-window policy.
    pub swa_pattern: Option<SwaPattern>,
}

impl Hparams {
    pub fn from_gguf(gguf: &GgufModel) -> Result<Self> {
        load_hparams(&gguf.metadata, &LoadOptions::default())
    }
}

/// Typed lookups of `{arch}.<suffix>` keys.
struct ArchKeys<'a> {
    prefix: &'a str,
    metadata: &'a HashMap<String, GgufValue>,
}

impl<'a> ArchKeys<'a> {
    fn key(&self, suffix: &str) -> String {
        format!("{}.{}", self.prefix, suffix)
    }

    fn get(&self, suffix: &str) -> (String, Option<&'a GgufValue>) {
        let key = self.key(suffix);
        let v = self.metadata.get(&key);
        (key, v)
    }

    fn u32_opt(&self, suffix: &str) -> Result<Option<u32>> {
        match self.get(suffix) {
            (_, None) => Ok(None),
            (key, Some(v)) => v
                .as_u32()
                .map(Some)
                .ok_or_else(|| anyhow!("metadata key '{key}' is not an unsigned 32-bit integer: {v:?}")),
        }
    }

    fn u32_req(&self, suffix: &str) -> Result<u32> {
        self.u32_opt(suffix)?
            .ok_or_else(|| anyhow!("missing required metadata key '{}'", self.key(suffix)))
    }

    fn f32_opt(&self, suffix: &str) -> Result<Option<f32>> {
        match self.get(suffix) {
            (_, None) => Ok(None),
            (key, Some(v)) => v
                .as_f32()
                .map(Some)
                .ok_or_else(|| anyhow!("metadata key '{key}' is not a float: {v:?}")),
        }
    }

    fn bool_opt(&self, suffix: &str) -> Result<Option<bool>> {
        match self.get(suffix) {
            (_, None) => Ok(None),
            (key, Some(v)) => v
                .as_bool()
                .map(Some)
                .ok_or_else(|| anyhow!("metadata key '{key}' is not a bool: {v:?}")),
        }
    }

    /// Scalar keys broadcast to every layer; array keys give one value per layer.
    fn layer_values(&self, suffix: &str) -> Result<Option<LayerValues>> {
        match self.get(suffix) {
            (_, None) => Ok(None),
            (key, Some(v)) if matches!(v, GgufValue::Array(_)) => v
                .as_u32_array()
                .map(|a| Some(LayerValues::PerLayer(a)))
                .ok_or_else(|| anyhow!("metadata key '{key}' is not an array of unsigned integers")),
            (key, Some(v)) => v
                .as_u32()
                .map(|x| Some(LayerValues::Uniform(x)))
                .ok_or_else(|| anyhow!("metadata key '{key}' is not an unsigned 32-bit integer: {v:?}")),
        }
    }
}

pub fn load_hparams(metadata: &HashMap<String, GgufValue>, opts: &LoadOptions) -> Result<Hparams> {
    let arch_name = metadata
        .get("general.architecture")
        .and_then(GgufValue::as_str)
        .context("missing required metadata key 'general.architecture'")?;
    let arch = Arch::from_name(arch_name);
    let keys = ArchKeys {
        prefix: arch.name(),
        metadata,
    };

    let n_layer = keys.u32_req("block_count")?;
    if n_layer == 0 {
        bail!("{} must be greater than zero", keys.key("block_count"));
    }

    let mut b = HparamsBuilder::new(n_layer);
    b.n_embd = keys.u32_req("embedding_length")?;
    b.n_ctx_train = keys.u32_opt("context_length")?.unwrap_or(0);

    b.n_head = match keys.layer_values("attention.head_count")? {
        Some(v) => v,
        None if arch.is_recurrent() => LayerValues::Uniform(0),
        None => bail!(
            "missing required metadata key '{}'",
            keys.key("attention.head_count")
        ),
    };
    b.n_head_kv = keys.layer_values("attention.head_count_kv")?;
    b.n_ff = keys.layer_values("feed_forward_length")?.unwrap_or_default();

    let head_k = keys.u32_opt("attention.key_length")?;
    let head_v = keys.u32_opt("attention.value_length")?;
    let n_head0 = b.n_head.first();
    if (head_k.is_none() || head_v.is_none()) && n_head0 != 0 && b.n_embd % n_head0 != 0 {
        bail!(
            "embedding_length {} is not divisible by attention_head_count {}",
            b.n_embd,
            n_head0
        );
    }
    let default_head = if n_head0 == 0 { 0 } else { b.n_embd / n_head0 };
    b.n_embd_head_k = head_k.unwrap_or(default_head);
    b.n_embd_head_v = head_v.unwrap_or(default_head);
    b.n_rot = keys.u32_opt("rope.dimension_count")?.unwrap_or(b.n_embd_head_k);

    b.n_expert = keys.u32_opt("expert_count")?.unwrap_or(0);
    b.n_expert_used = keys.u32_opt("expert_used_count")?.unwrap_or(0);
    if b.n_expert_used > b.n_expert {
        bail!(
            "expert_used_count {} exceeds expert_count {}",
            b.n_expert_used,
            b.n_expert
        );
    }

    b.f_norm_eps = keys.f32_opt("attention.layer_norm_epsilon")?.unwrap_or(0.0);
    b.f_norm_rms_eps = keys.f32_opt("attention.layer_norm_rms_epsilon")?.unwrap_or(0.0);
    b.rope_freq_base_train = keys.f32_opt("rope.freq_base")?.unwrap_or(10_000.0);
    b.rope_freq_scale_train = match keys.f32_opt("rope.scaling.factor")? {
        Some(factor) if factor != 0.0 => 1.0 / factor,
        _ => 1.0,
    };
    b.causal_attn = keys.bool_opt("attention.causal")?.unwrap_or(true);

    b.ssm_d_conv = keys.u32_opt("ssm.conv_kernel")?.unwrap_or(0);
    b.ssm_d_inner = keys.u32_opt("ssm.inner_size")?.unwrap_or(0);
    b.ssm_d_state = keys.u32_opt("ssm.state_size")?.unwrap_or(0);
    b.ssm_dt_rank = keys.u32_opt("ssm.time_step_rank")?.unwrap_or(0);

    b.wkv_head_size = keys.u32_opt("wkv.head_size")?.unwrap_or(0);
    if let Some(n) = keys.u32_opt("token_shift_count")? {
        b.token_shift_count = n;
    }

    b.recurrent_layers = arch.recurrent_layers();

    b.n_swa = match keys.u32_opt("attention.sliding_window")? {
        Some(n) => n,
        None if arch.requires_window() => bail!(
            "missing required metadata key '{}'",
            keys.key("attention.sliding_window")
        ),
        None => 0,
    };

    let pattern = match opts.swa_pattern {
        Some(p) => p,
        None => arch_swa_pattern(&arch, &keys, &mut b)?,
    };
    b.set_swa(pattern);

    let hp = b
        .build()
        .with_context(|| format!("invalid hyperparameters for architecture '{arch}'"))?;

    if hp.is_swa_any() && hp.n_swa() == 0 {
        tracing::warn!(%arch, swa = %hp.swa_pattern(), "sliding-window layers present but window length is 0");
    }
    tracing::debug!(
        %arch,
        n_layer = hp.n_layer(),
        n_embd = hp.n_embd(),
        n_embd_head_k = hp.n_embd_head_k(),
        n_embd_head_v = hp.n_embd_head_v(),
        n_swa = hp.n_swa(),
        swa = %hp.swa_pattern(),
        family = ?hp.state_family(),
        "loaded hyperparameters"
    );

    Ok(hp)
}

fn arch_swa_pattern(arch: &Arch, keys: &ArchKeys<'_>, b: &mut HparamsBuilder) -> Result<SwaPattern> {
    let pattern = match arch {
        Arch::SmallThinker => {
            if b.n_swa > 0 {
                b.n_swa = SMALLTHINKER_WINDOW;
                SwaPattern::HeadDense(4)
            } else {
                SwaPattern::Disabled
            }
        }
        Arch::Llama4 => {
            if b.n_swa == 0 {
                b.n_swa = LLAMA4_CHUNK_SIZE;
            }
            SwaPattern::TailDense(4)
        }
        _ => match arch.swa_pattern() {
            Some(p) => p,
            None => keys
                .u32_opt("attention.sliding_window_pattern")?
                .map(SwaPattern::TailDense)
                .unwrap_or_default(),
        },
    };
    Ok(pattern)
}
