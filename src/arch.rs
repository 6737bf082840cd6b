// src/arch.rs
//! Model architectures known to the loader, keyed by `general.architecture`.

use serde::Serialize;
use std::fmt;

use crate::hparams::RecurrentLayers;
use crate::swa::SwaPattern;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Arch {
    Llama,
    Qwen2,
    Gemma2,
    Gemma3,
    Cohere2,
    Llama4,
    SmallThinker,
    Mamba,
    Rwkv6,
    Rwkv7,
    Jamba,
    /// Any other name; treated as a plain attention model.
    Other(String),
}

impl Arch {
    pub fn from_name(name: &str) -> Self {
        match name {
            "llama" => Arch::Llama,
            "qwen2" => Arch::Qwen2,
            "gemma2" => Arch::Gemma2,
            "gemma3" => Arch::Gemma3,
            "cohere2" => Arch::Cohere2,
            "llama4" => Arch::Llama4,
            "smallthinker" => Arch::SmallThinker,
            "mamba" => Arch::Mamba,
            "rwkv6" => Arch::Rwkv6,
            "rwkv7" => Arch::Rwkv7,
            "jamba" => Arch::Jamba,
            other => Arch::Other(other.to_string()),
        }
    }

    /// Metadata key prefix, e.g. `gemma3` in `gemma3.block_count`.
    pub fn name(&self) -> &str {
        match self {
            Arch::Llama => "llama",
            Arch::Qwen2 => "qwen2",
            Arch::Gemma2 => "gemma2",
            Arch::Gemma3 => "gemma3",
            Arch::Cohere2 => "cohere2",
            Arch::Llama4 => "llama4",
            Arch::SmallThinker => "smallthinker",
            Arch::Mamba => "mamba",
            Arch::Rwkv6 => "rwkv6",
            Arch::Rwkv7 => "rwkv7",
            Arch::Jamba => "jamba",
            Arch::Other(name) => name,
        }
    }

    pub fn recurrent_layers(&self) -> RecurrentLayers {
        match self {
            Arch::Mamba | Arch::Rwkv6 | Arch::Rwkv7 => RecurrentLayers::All,
            Arch::Jamba => RecurrentLayers::WithoutKvHeads,
            _ => RecurrentLayers::None,
        }
    }

    /// Pure recurrent models carry no attention heads in their metadata.
    pub fn is_recurrent(&self) -> bool {
        matches!(self.recurrent_layers(), RecurrentLayers::All)
    }

    /// SWA layout fixed by the architecture itself, if any.
    /// Architectures that return `None` may still opt in through metadata.
    pub fn swa_pattern(&self) -> Option<SwaPattern> {
        match self {
            Arch::Gemma2 => Some(SwaPattern::TailDense(2)),
            Arch::Gemma3 => Some(SwaPattern::TailDense(6)),
            Arch::Cohere2 | Arch::Llama4 => Some(SwaPattern::TailDense(4)),
            Arch::SmallThinker => Some(SwaPattern::HeadDense(4)),
            _ => None,
        }
    }

    /// Whether the window length must be present in metadata.
    pub fn requires_window(&self) -> bool {
        matches!(self, Arch::Gemma2 | Arch::Gemma3 | Arch::Cohere2)
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
