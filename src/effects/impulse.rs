use anyhow::Context;
use hound::{SampleFormat, WavSpec, WavWriter};
use rand::Rng;
use std::path::Path;

/// Stereo impulse response for the convolution reverb.
#[derive(Debug, Clone)]
pub struct ImpulseResponse {
    pub sample_rate: u32,
    pub left: Vec<f32>,
    pub right: Vec<f32>,
}

impl ImpulseResponse {
    /// Exponentially decaying white noise, independent per channel.
    pub fn synthesize<G: Rng>(sample_rate: u32, decay_secs: f32, rng: &mut G) -> Self {
        let len = (sample_rate as f32 * decay_secs).max(1.0) as usize;
        let channel = |rng: &mut G| -> Vec<f32> {
            (0..len)
                .map(|i| {
                    // -60 dB by the end of the tail
                    let envelope = (-6.9 * i as f32 / len as f32).exp();
                    rng.random_range(-1.0f32..1.0) * envelope
                })
                .collect()
        };
        let left = channel(&mut *rng);
        let right = channel(&mut *rng);
        Self {
            sample_rate,
            left,
            right,
        }
    }

    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    pub fn duration_secs(&self) -> f32 {
        self.len() as f32 / self.sample_rate as f32
    }

    /// Write as a 32-bit float stereo WAV so the media backend can load it.
    pub fn write_wav(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create dir {}", parent.display()))?;
        }
        let spec = WavSpec {
            channels: 2,
            sample_rate: self.sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut writer = WavWriter::create(path, spec)
            .with_context(|| format!("create {}", path.display()))?;
        for (l, r) in self.left.iter().zip(&self.right) {
            writer.write_sample(*l).context("write impulse sample")?;
            writer.write_sample(*r).context("write impulse sample")?;
        }
        writer.finalize().context("finalize impulse wav")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decays_towards_silence() {
        let ir = ImpulseResponse::synthesize(8000, 1.5, &mut rand::rng());
        assert_eq!(ir.len(), 12000);
        assert!((ir.duration_secs() - 1.5).abs() < 1e-3);

        let energy = |s: &[f32]| s.iter().map(|x| x * x).sum::<f32>();
        let head = energy(&ir.left[..1000]);
        let tail = energy(&ir.left[11000..]);
        assert!(head > tail * 10.0);
        assert!(ir.left.iter().chain(&ir.right).all(|x| x.abs() <= 1.0));
    }

    #[test]
    fn writes_readable_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ir").join("impulse.wav");
        let ir = ImpulseResponse::synthesize(8000, 0.1, &mut rand::rng());
        ir.write_wav(&path).unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.len() as usize, ir.len() * 2);
    }
}
