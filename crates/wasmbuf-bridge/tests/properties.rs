//! Property tests: round trips and zero-copy parity over arbitrary input.

use proptest::collection::vec;
use proptest::prelude::*;

use wasmbuf_bridge::{Bridge, BridgeConfig, BridgeRuntime, TransformOp};

const RLE_WAT: &str = include_str!("fixtures/rle.wat");

fn bridge() -> Bridge {
    let runtime = BridgeRuntime::new(BridgeConfig::default()).expect("failed to create runtime");
    let module = runtime
        .load_module_bytes("rle", RLE_WAT.as_bytes())
        .expect("failed to load module");
    runtime.instantiate(&module).expect("failed to instantiate")
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325, |hash, &b| {
        (hash ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
    })
}

/// Input built from runs, so long runs past the 255 cap show up often.
fn runs() -> impl Strategy<Value = Vec<u8>> {
    vec((1usize..600, any::<u8>()), 0..16).prop_map(|runs| {
        runs.into_iter()
            .flat_map(|(count, byte)| std::iter::repeat(byte).take(count))
            .collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn round_trip(input in vec(any::<u8>(), 0..2048)) {
        let mut bridge = bridge();
        let packed = bridge.codec().compress(&input).expect("compress failed");
        let unpacked = bridge.codec().decompress(&packed).expect("decompress failed");
        prop_assert_eq!(unpacked, input);
        prop_assert_eq!(bridge.stats().leases.outstanding(), 0);
    }

    #[test]
    fn round_trip_long_runs(input in runs()) {
        let mut bridge = bridge();
        let packed = bridge.codec().compress(&input).expect("compress failed");
        prop_assert!(packed.len() % 2 == 0);
        let unpacked = bridge.codec().decompress(&packed).expect("decompress failed");
        prop_assert_eq!(unpacked, input);
    }

    #[test]
    fn zero_copy_matches_copy(input in runs()) {
        let mut bridge = bridge();
        let decompress = TransformOp::new("decompress");
        let packed = bridge.codec().compress(&input).expect("compress failed");

        let copied = bridge.transform(&decompress, &packed).expect("transform failed");
        let lent = bridge
            .transform_map(&decompress, &packed, fnv1a)
            .expect("transform_map failed");

        prop_assert_eq!(lent, fnv1a(&copied));
        prop_assert_eq!(bridge.call_i32("live").expect("live call failed"), 0);
    }
}
