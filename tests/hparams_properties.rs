use llm_hparams::{Hparams, HparamsBuilder, LayerValues};
use proptest::prelude::*;

fn pattern_store(n_layer: u32, n_pattern: u32, head_dense: bool) -> Hparams {
    let mut b = HparamsBuilder::new(n_layer);
    if head_dense {
        b.set_dense_start_swa_pattern(n_pattern);
    } else {
        b.set_swa_pattern(n_pattern);
    }
    b.build().unwrap()
}

proptest! {
    #[test]
    fn prop_policies_place_dense_layer_at_opposite_block_ends(
        n_layer in 1u32..128,
        n_pattern in 2u32..16,
    ) {
        let tail = pattern_store(n_layer, n_pattern, false);
        let head = pattern_store(n_layer, n_pattern, true);
        for il in 0..n_layer {
            let pos = il % n_pattern;
            prop_assert_eq!(tail.is_swa(il), pos != n_pattern - 1, "tail-dense layer {}", il);
            prop_assert_eq!(head.is_swa(il), pos != 0, "head-dense layer {}", il);
            if pos != 0 && pos != n_pattern - 1 {
                prop_assert!(tail.is_swa(il) && head.is_swa(il));
            }
        }
    }

    #[test]
    fn prop_is_swa_any_is_or_over_layers(
        n_layer in 0u32..64,
        n_pattern in 0u32..10,
        head_dense in any::<bool>(),
    ) {
        let hp = pattern_store(n_layer, n_pattern, head_dense);
        let any = (0..n_layer).any(|il| hp.is_swa(il));
        prop_assert_eq!(hp.is_swa_any(), any);
    }

    #[test]
    fn prop_degenerate_periods(n_layer in 1u32..64, head_dense in any::<bool>()) {
        let all = pattern_store(n_layer, 0, head_dense);
        let none = pattern_store(n_layer, 1, head_dense);
        for il in 0..n_layer {
            prop_assert!(all.is_swa(il));
            prop_assert!(!none.is_swa(il));
        }
        prop_assert!(all.is_swa_any());
        prop_assert!(!none.is_swa_any());
    }

    #[test]
    fn prop_gqa_and_kv_widths(
        heads in proptest::collection::vec((0u32..128, 0u32..64), 1..32),
        head_k in 0u32..512,
        head_v in 0u32..512,
    ) {
        let n_layer = heads.len() as u32;
        let mut b = HparamsBuilder::new(n_layer);
        b.n_embd_head_k = head_k;
        b.n_embd_head_v = head_v;
        b.n_head = LayerValues::PerLayer(heads.iter().map(|h| h.0).collect());
        b.n_head_kv = Some(LayerValues::PerLayer(heads.iter().map(|h| h.1).collect()));
        let hp = b.build().unwrap();
        for (il, &(n_head, n_head_kv)) in heads.iter().enumerate() {
            let il = il as u32;
            prop_assert_eq!(hp.n_gqa(il) == 0, n_head_kv == 0 || n_head < n_head_kv);
            if n_head_kv != 0 {
                prop_assert_eq!(hp.n_gqa(il), n_head / n_head_kv);
            } else {
                prop_assert_eq!(hp.n_gqa(il), 0);
            }
            prop_assert_eq!(hp.n_embd_k_gqa(il), head_k * n_head_kv);
            prop_assert_eq!(hp.n_embd_v_gqa(il), head_v * n_head_kv);
        }
    }

    #[test]
    fn prop_rwkv_state_ignores_ssm_fields(
        n_embd in 1u32..8192,
        wkv in 1u32..128,
        shift in 0u32..4,
        conv in 0u32..8,
        inner in 0u32..4096,
        state in 0u32..64,
    ) {
        let mut b = HparamsBuilder::new(1);
        b.n_embd = n_embd;
        b.wkv_head_size = wkv;
        b.token_shift_count = shift;
        b.ssm_d_conv = conv;
        b.ssm_d_inner = inner;
        b.ssm_d_state = state;
        let hp = b.build().unwrap();
        prop_assert_eq!(hp.n_embd_k_s(), shift * n_embd);
        prop_assert_eq!(hp.n_embd_v_s(), n_embd * wkv);
    }

    #[test]
    fn prop_ssm_state_widths(conv in 0u32..8, inner in 0u32..8192, state in 0u32..256) {
        let mut b = HparamsBuilder::new(1);
        b.ssm_d_conv = conv;
        b.ssm_d_inner = inner;
        b.ssm_d_state = state;
        let hp = b.build().unwrap();
        prop_assert_eq!(hp.n_embd_k_s(), conv.saturating_sub(1) * inner);
        prop_assert_eq!(hp.n_embd_v_s(), state * inner);
    }
}
