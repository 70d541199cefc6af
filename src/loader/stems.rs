use std::fs::File;
use std::io::BufReader;

use super::Locator;
use crate::composition::StemBuffer;
use crate::error::LoadError;

/// Decodes a WAV file into interleaved `f32` samples in -1..=1.
pub fn decode_wav(locator: &Locator) -> Result<StemBuffer, LoadError> {
    let path = locator.path();
    let decode_error = |message: String| LoadError::AudioDecode {
        path: path.to_path_buf(),
        message,
    };

    let file = File::open(path).map_err(|e| LoadError::io(path, e))?;
    let wav_reader =
        hound::WavReader::new(BufReader::new(file)).map_err(|e| decode_error(e.to_string()))?;

    let spec = wav_reader.spec();
    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => wav_reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| decode_error(e.to_string()))?,
        hound::SampleFormat::Int => {
            let max_value = (1i64 << (spec.bits_per_sample - 1)) as f32;
            wav_reader
                .into_samples::<i32>()
                .map(|s| s.map(|s| s as f32 / max_value))
                .collect::<Result<_, _>>()
                .map_err(|e| decode_error(e.to_string()))?
        }
    };

    if spec.channels == 0 || spec.sample_rate == 0 {
        return Err(decode_error("wav header declares no channels".into()));
    }

    Ok(StemBuffer {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        samples,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &std::path::Path, channels: u16, frames: usize) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for _ in 0..frames * channels as usize {
            writer.write_sample(i16::MAX / 2).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn decodes_int_wav_to_unit_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_wav(&path, 2, 4_000);

        let locator = Locator::resolve("tone.wav", dir.path()).unwrap();
        let buffer = decode_wav(&locator).unwrap();
        assert_eq!(buffer.channels, 2);
        assert_eq!(buffer.frames(), 4_000);
        assert!((buffer.duration_seconds() - 0.5).abs() < 1e-9);
        assert!(buffer.samples.iter().all(|s| (*s - 0.5).abs() < 1e-3));
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.wav");
        std::fs::write(&path, b"not a wav file").unwrap();

        let locator = Locator::resolve("broken.wav", dir.path()).unwrap();
        assert!(matches!(
            decode_wav(&locator),
            Err(LoadError::AudioDecode { .. })
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let locator = Locator::resolve("nope.wav", dir.path()).unwrap();
        assert!(matches!(decode_wav(&locator), Err(LoadError::Io { .. })));
    }
}
