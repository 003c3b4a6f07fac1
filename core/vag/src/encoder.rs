//! Predictor search: pick the `(filter, shift)` pair that minimizes
//! reconstruction error for a 28-sample block.

use crate::frame::{
    FRAME_LEN, NUM_ENCODE_FILTERS, PredictorState, SAMPLES_PER_FRAME, SHIFT_RANGE, encode_trial,
};

/// Estimates a starting shift for `filter` by running the residual
/// computation without quantization, then finding the smallest right-shift
/// that brings the block's residual range into the 4-bit nibble window.
fn estimate_shift(samples: &[i16; SAMPLES_PER_FRAME], f0: i32, f1: i32, state: PredictorState) -> u32 {
    let mut prev1 = state.prev1;
    let mut prev2 = state.prev2;
    let mut min = 0i64;
    let mut max = 0i64;

    for &s in samples.iter() {
        let pred = (f0 * prev1 + f1 * prev2 + 32) >> 6;
        let residual = s as i64 - pred as i64;
        min = min.min(residual);
        max = max.max(residual);
        prev2 = prev1;
        prev1 = s as i32;
    }

    // A block with no residual at all (silence under a zero predictor state,
    // most notably) needs no shift to represent exactly; every shift ties at
    // zero error, so anchor the search at 0 rather than the top of the range
    // the "find the smallest rshift" loop below would otherwise settle on.
    if min == 0 && max == 0 {
        return 0;
    }

    let nibble_max = 0x7FFFi64 >> SHIFT_RANGE;
    let nibble_min = -0x8000i64 >> SHIFT_RANGE;

    let mut rshift = 0u32;
    while rshift < SHIFT_RANGE && (max >> rshift > nibble_max || min >> rshift < nibble_min) {
        rshift += 1;
    }

    SHIFT_RANGE - rshift
}

/// Encodes a 28-sample block, searching filters `0..NUM_ENCODE_FILTERS` and a
/// narrow shift window around each filter's estimated shift for the
/// minimum-MSE pair. Commits the winning trial's end state into `state` and
/// returns the encoded frame bytes.
pub fn encode_block(
    samples: &[i16; SAMPLES_PER_FRAME],
    flags: u8,
    state: &mut PredictorState,
) -> [u8; FRAME_LEN] {
    let mut best: Option<(i64, [u8; FRAME_LEN], PredictorState)> = None;

    for filter in 0..NUM_ENCODE_FILTERS as u8 {
        let f0 = crate::frame::COEF0[filter as usize];
        let f1 = crate::frame::COEF1[filter as usize];
        let candidate = estimate_shift(samples, f0, f1, *state);

        let lo = candidate.saturating_sub(1);
        let hi = (candidate + 1).min(SHIFT_RANGE);

        for shift in lo..=hi {
            let trial = encode_trial(samples, filter, shift as u8, flags, *state);
            let better = match &best {
                Some((best_mse, _, _)) => trial.mse < *best_mse,
                None => true,
            };
            if better {
                best = Some((trial.mse, trial.bytes, trial.end_state));
            }
        }
    }

    let (_, bytes, end_state) = best.expect("filter range is never empty");
    *state = end_state;
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_picks_filter_zero_shift_zero() {
        let samples = [0i16; SAMPLES_PER_FRAME];
        let mut state = PredictorState::default();
        let bytes = encode_block(&samples, 0x01, &mut state);
        assert_eq!(bytes[0], 0x00);
        assert_eq!(bytes[1], 0x01);
        assert_eq!(&bytes[2..], &[0u8; 14]);
    }

    #[test]
    fn test_encoder_converges_on_a_ramp() {
        let mut samples = [0i16; SAMPLES_PER_FRAME];
        for (i, s) in samples.iter_mut().enumerate() {
            *s = (i as i32 * 1000 - 13000) as i16;
        }
        let mut state = PredictorState::default();
        let bytes = encode_block(&samples, 0x00, &mut state);

        let mut decode_state = PredictorState::default();
        let decoded = crate::frame::decode_frame(&bytes, &mut decode_state);
        for (orig, dec) in samples.iter().zip(decoded.iter()) {
            assert!((*orig as i32 - *dec as i32).abs() < 2000);
        }
    }
}
