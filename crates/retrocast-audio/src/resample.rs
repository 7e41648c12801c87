//! Linear-interpolation resampler.

use std::borrow::Cow;

use crate::{AudioError, AudioResult};

/// Resample interleaved `i16` audio from `from_rate` to `to_rate`.
///
/// Output frame `i` reads source position `s = i * from_rate / to_rate` and
/// blends frames `floor(s)` and `min(floor(s) + 1, last)` by the fractional
/// part. Equal rates return the input unchanged. There is no anti-aliasing
/// filter, so downsampling folds content above the new Nyquist frequency.
pub fn resample_linear(
    input: &[i16],
    from_rate: u32,
    to_rate: u32,
    channels: u16,
) -> AudioResult<Cow<'_, [i16]>> {
    if from_rate == 0 {
        return Err(AudioError::InvalidSampleRate(from_rate));
    }
    if to_rate == 0 {
        return Err(AudioError::InvalidSampleRate(to_rate));
    }
    if channels == 0 {
        return Err(AudioError::InvalidChannels(channels));
    }

    let ch = channels as usize;
    if input.len() % ch != 0 {
        return Err(AudioError::MisalignedSamples {
            samples: input.len(),
            channels,
        });
    }

    if from_rate == to_rate || input.is_empty() {
        return Ok(Cow::Borrowed(input));
    }

    let in_frames = input.len() / ch;
    let ratio = f64::from(from_rate) / f64::from(to_rate);
    let out_frames = (in_frames as f64 / ratio).floor() as usize;
    let last = in_frames - 1;

    let mut output = Vec::with_capacity(out_frames * ch);
    for i in 0..out_frames {
        let pos = i as f64 * ratio;
        let idx = (pos.floor() as usize).min(last);
        let next = (idx + 1).min(last);
        let frac = pos - pos.floor();

        for c in 0..ch {
            let a = f64::from(input[idx * ch + c]);
            let b = f64::from(input[next * ch + c]);
            let v = (a + (b - a) * frac).round();
            output.push(v.clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16);
        }
    }

    Ok(Cow::Owned(output))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_rates_borrow_input() {
        let input = [1i16, 2, 3, 4];
        let out = resample_linear(&input, 48_000, 48_000, 2).unwrap();
        assert!(matches!(out, Cow::Borrowed(_)));
        assert_eq!(&*out, &input);
    }

    #[test]
    fn test_output_frame_count() {
        // 534 stereo frames at 32040 Hz is one 60 fps tick.
        let input = vec![0i16; 534 * 2];
        let out = resample_linear(&input, 32_040, 48_000, 2).unwrap();
        let expected = (534.0 / (32_040.0 / 48_000.0f64)).floor() as usize;
        assert_eq!(out.len(), expected * 2);
    }

    #[test]
    fn test_upsample_interpolates() {
        // Mono ramp 0, 100 doubled: positions 0.0, 0.5, 1.0, 1.5.
        let out = resample_linear(&[0, 100], 1, 2, 1).unwrap();
        assert_eq!(&*out, &[0, 50, 100, 100]);
    }

    #[test]
    fn test_downsample_picks_sources() {
        let out = resample_linear(&[10, 20, 30, 40], 2, 1, 1).unwrap();
        assert_eq!(&*out, &[10, 30]);
    }

    #[test]
    fn test_channels_are_independent() {
        let out = resample_linear(&[0, 1000, 100, -1000], 1, 2, 2).unwrap();
        assert_eq!(&*out, &[0, 1000, 50, 0, 100, -1000, 100, -1000]);
    }

    #[test]
    fn test_rejects_invalid_parameters() {
        assert!(matches!(
            resample_linear(&[0], 0, 48_000, 1),
            Err(AudioError::InvalidSampleRate(0))
        ));
        assert!(matches!(
            resample_linear(&[0], 48_000, 48_000, 0),
            Err(AudioError::InvalidChannels(0))
        ));
        assert!(matches!(
            resample_linear(&[0, 0, 0], 32_040, 48_000, 2),
            Err(AudioError::MisalignedSamples { samples: 3, .. })
        ));
    }

    #[test]
    fn test_empty_input() {
        let out = resample_linear(&[], 32_040, 48_000, 2).unwrap();
        assert!(out.is_empty());
    }
}
