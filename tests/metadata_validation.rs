use llm_hparams::gguf::{GgufScalar, GgufValue};
use llm_hparams::loader::{load_hparams, LoadOptions};
use std::collections::HashMap;

fn base_metadata() -> HashMap<String, GgufValue> {
    let mut meta = HashMap::new();
    meta.insert(
        "general.architecture".into(),
        GgufValue::Scalar(GgufScalar::Str("llama".into())),
    );
    meta.insert(
        "llama.embedding_length".into(),
        GgufValue::Scalar(GgufScalar::U32(16)),
    );
    meta.insert(
        "llama.attention.head_count".into(),
        GgufValue::Scalar(GgufScalar::U32(4)),
    );
    meta.insert(
        "llama.block_count".into(),
        GgufValue::Scalar(GgufScalar::U32(2)),
    );
    meta.insert(
        "llama.context_length".into(),
        GgufValue::Scalar(GgufScalar::U32(16)),
    );
    meta.insert(
        "llama.feed_forward_length".into(),
        GgufValue::Scalar(GgufScalar::U32(64)),
    );
    meta
}

fn err_msg(meta: &HashMap<String, GgufValue>) -> String {
    let err = load_hparams(meta, &LoadOptions::default()).unwrap_err();
    format!("{err:#}")
}

#[test]
fn parses_required_fields() {
    let hp = load_hparams(&base_metadata(), &LoadOptions::default()).expect("config should parse");
    assert_eq!(hp.n_embd(), 16);
    assert_eq!(hp.n_head(0), 4);
    assert_eq!(hp.n_head_kv(1), 4);
    assert_eq!(hp.n_ff(1), 64);
    assert_eq!(hp.n_embd_head_k(), 4);
}

#[test]
fn missing_architecture_fails() {
    let mut meta = base_metadata();
    meta.remove("general.architecture");
    assert!(err_msg(&meta).contains("general.architecture"));
}

#[test]
fn missing_head_count_fails() {
    let mut meta = base_metadata();
    meta.remove("llama.attention.head_count");
    assert!(err_msg(&meta).contains("head_count"));
}

#[test]
fn missing_block_count_fails() {
    let mut meta = base_metadata();
    meta.remove("llama.block_count");
    assert!(err_msg(&meta).contains("llama.block_count"));
}

#[test]
fn zero_layers_fails() {
    let mut meta = base_metadata();
    meta.insert(
        "llama.block_count".into(),
        GgufValue::Scalar(GgufScalar::U32(0)),
    );
    assert!(err_msg(&meta).contains("greater than zero"));
}

#[test]
fn rejects_non_divisible_d_model() {
    let mut meta = base_metadata();
    meta.insert(
        "llama.embedding_length".into(),
        GgufValue::Scalar(GgufScalar::U32(10)),
    );
    meta.insert(
        "llama.attention.head_count".into(),
        GgufValue::Scalar(GgufScalar::U32(3)),
    );
    assert!(err_msg(&meta).contains("not divisible"));
}

#[test]
fn explicit_head_widths_skip_divisibility_check() {
    let mut meta = base_metadata();
    meta.insert(
        "llama.embedding_length".into(),
        GgufValue::Scalar(GgufScalar::U32(10)),
    );
    meta.insert(
        "llama.attention.head_count".into(),
        GgufValue::Scalar(GgufScalar::U32(3)),
    );
    meta.insert(
        "llama.attention.key_length".into(),
        GgufValue::Scalar(GgufScalar::U32(8)),
    );
    meta.insert(
        "llama.attention.value_length".into(),
        GgufValue::Scalar(GgufScalar::U32(6)),
    );
    let hp = load_hparams(&meta, &LoadOptions::default()).unwrap();
    assert_eq!(hp.n_embd_k_gqa(0), 24);
    assert_eq!(hp.n_embd_v_gqa(0), 18);
}

#[test]
fn respects_kv_head_override() {
    let mut meta = base_metadata();
    meta.insert(
        "llama.attention.head_count_kv".into(),
        GgufValue::Scalar(GgufScalar::U32(2)),
    );
    let hp = load_hparams(&meta, &LoadOptions::default()).unwrap();
    assert_eq!(hp.n_head(0), 4);
    assert_eq!(hp.n_head_kv(0), 2);
    assert_eq!(hp.n_gqa(0), 2);
}

#[test]
fn rejects_per_layer_array_of_wrong_length() {
    let mut meta = base_metadata();
    meta.insert(
        "llama.attention.head_count_kv".into(),
        GgufValue::Array(vec![GgufScalar::U32(2); 3]),
    );
    let msg = err_msg(&meta);
    assert!(msg.contains("n_head_kv"), "{msg}");
    assert!(msg.contains("llama"), "{msg}");
}

#[test]
fn rejects_wrong_value_type() {
    let mut meta = base_metadata();
    meta.insert(
        "llama.feed_forward_length".into(),
        GgufValue::Scalar(GgufScalar::Str("lots".into())),
    );
    assert!(err_msg(&meta).contains("llama.feed_forward_length"));
}

#[test]
fn rejects_non_integer_array() {
    let mut meta = base_metadata();
    meta.insert(
        "llama.feed_forward_length".into(),
        GgufValue::Array(vec![GgufScalar::F32(1.0), GgufScalar::F32(2.0)]),
    );
    assert!(err_msg(&meta).contains("array of unsigned integers"));
}

#[test]
fn rejects_more_used_experts_than_experts() {
    let mut meta = base_metadata();
    meta.insert(
        "llama.expert_count".into(),
        GgufValue::Scalar(GgufScalar::U32(2)),
    );
    meta.insert(
        "llama.expert_used_count".into(),
        GgufValue::Scalar(GgufScalar::U32(4)),
    );
    assert!(err_msg(&meta).contains("expert_used_count"));
}

#[test]
fn rejects_kv_width_past_u32() {
    let mut meta = base_metadata();
    meta.insert(
        "llama.attention.head_count".into(),
        GgufValue::Scalar(GgufScalar::U32(70_000)),
    );
    meta.insert(
        "llama.attention.key_length".into(),
        GgufValue::Scalar(GgufScalar::U32(70_000)),
    );
    meta.insert(
        "llama.attention.value_length".into(),
        GgufValue::Scalar(GgufScalar::U32(4)),
    );
    let msg = err_msg(&meta);
    assert!(msg.contains("n_embd_head_k * n_head_kv overflows u32"), "{msg}");
}

#[test]
fn rejects_rwkv_state_width_past_u32() {
    let mut meta = HashMap::new();
    meta.insert(
        "general.architecture".into(),
        GgufValue::Scalar(GgufScalar::Str("rwkv6".into())),
    );
    meta.insert(
        "rwkv6.block_count".into(),
        GgufValue::Scalar(GgufScalar::U32(2)),
    );
    meta.insert(
        "rwkv6.embedding_length".into(),
        GgufValue::Scalar(GgufScalar::U32(70_000)),
    );
    meta.insert(
        "rwkv6.wkv.head_size".into(),
        GgufValue::Scalar(GgufScalar::U32(70_000)),
    );
    let msg = err_msg(&meta);
    assert!(msg.contains("n_embd * wkv_head_size"), "{msg}");
    assert!(msg.contains("rwkv6"), "{msg}");
}

#[test]
fn rejects_ssm_state_width_past_u32() {
    let mut meta = HashMap::new();
    meta.insert(
        "general.architecture".into(),
        GgufValue::Scalar(GgufScalar::Str("mamba".into())),
    );
    meta.insert(
        "mamba.block_count".into(),
        GgufValue::Scalar(GgufScalar::U32(2)),
    );
    meta.insert(
        "mamba.embedding_length".into(),
        GgufValue::Scalar(GgufScalar::U32(768)),
    );
    meta.insert(
        "mamba.ssm.inner_size".into(),
        GgufValue::Scalar(GgufScalar::U32(100_000)),
    );
    meta.insert(
        "mamba.ssm.state_size".into(),
        GgufValue::Scalar(GgufScalar::U32(100_000)),
    );
    let msg = err_msg(&meta);
    assert!(msg.contains("ssm_d_state * ssm_d_inner"), "{msg}");
}
