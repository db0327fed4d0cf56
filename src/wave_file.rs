use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::error::{DspError, Result};
use crate::signal::{DiscreteSignal, SampleRate};
use crate::utils::Float;

/// Which view of a multichannel file to take
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Channel {
    Left,
    Right,
    Sum,
    Average,
    Interleave,
}

/* WaveFile:
 * RIFF/WAVE container as one signal per channel
 *
 * Integer PCM (8/16/24/32 bits) is scaled into [-1, 1) by 1 / 2^(bits-1),
 * i.e. /128, /32768, /8388608, /2147483648; 32-bit float is taken as is.
 * Writing scales back, rounds and clamps to the integer range.
 */
#[derive(Debug, Clone)]
pub struct WaveFile {
    signals: Vec<DiscreteSignal>,
    bits_per_sample: u16,
    float: bool,
}

impl WaveFile {
    /// Integer PCM file from channel signals of equal length and rate
    pub fn new(signals: Vec<DiscreteSignal>, bits_per_sample: u16) -> Result<Self> {
        if !matches!(bits_per_sample, 8 | 16 | 24 | 32) {
            return Err(DspError::config(format!("unsupported pcm depth: {bits_per_sample} bits")));
        }
        let first = signals.first().ok_or_else(|| DspError::config("wave file needs at least one channel"))?;
        if signals.len() > u16::MAX as usize {
            return Err(DspError::config(format!("too many channels: {}", signals.len())));
        }
        let (fs, len) = (first.sampling_rate(), first.len());
        if signals.iter().any(|s| s.sampling_rate() != fs || s.len() != len) {
            return Err(DspError::config("channels must share sampling rate and length"));
        }
        Ok(Self { signals, bits_per_sample, float: false })
    }

    pub fn from_signal(signal: DiscreteSignal, bits_per_sample: u16) -> Result<Self> {
        Self::new(vec![signal], bits_per_sample)
    }

    /// Store samples as 32-bit IEEE float instead of integer PCM
    pub fn into_float(mut self) -> Self {
        self.float = true;
        self.bits_per_sample = 32;
        self
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_reader(BufReader::new(File::open(path).map_err(hound::Error::from)?))
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = WavReader::new(reader)?;
        let spec = reader.spec();
        let channels = spec.channels as usize;
        if channels == 0 {
            return Err(DspError::config("wave file declares zero channels"));
        }

        let interleaved: Vec<Float> = match spec.sample_format {
            SampleFormat::Float => reader.samples::<f32>().collect::<std::result::Result<_, _>>()?,
            SampleFormat::Int => {
                let scale = pcm_scale(spec.bits_per_sample)?;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| (v as f64 / scale) as Float))
                    .collect::<std::result::Result<_, _>>()?
            }
        };

        let frames = interleaved.len() / channels;
        let signals = (0..channels)
            .map(|c| {
                let samples = interleaved.iter().skip(c).step_by(channels).take(frames).copied().collect();
                DiscreteSignal::new(spec.sample_rate, samples)
            })
            .collect::<Result<Vec<_>>>()?;
        log::debug!(
            "read {} channel(s) x {} samples, {} bits at {} Hz",
            channels, frames, spec.bits_per_sample, spec.sample_rate
        );
        Ok(Self {
            signals,
            bits_per_sample: spec.bits_per_sample,
            float: spec.sample_format == SampleFormat::Float,
        })
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path).map_err(hound::Error::from)?;
        self.write_to(BufWriter::new(file))
    }

    pub fn write_to<W: Write + Seek>(&self, writer: W) -> Result<()> {
        let mut writer = WavWriter::new(writer, self.spec())?;
        let len = self.len();
        if self.float {
            for i in 0..len {
                for s in &self.signals {
                    writer.write_sample(s.samples()[i])?;
                }
            }
        } else {
            let scale = pcm_scale(self.bits_per_sample)?;
            let (lo, hi) = (-scale, scale - 1.0);
            for i in 0..len {
                for s in &self.signals {
                    let v = (s.samples()[i] as f64 * scale).round().clamp(lo, hi);
                    writer.write_sample(v as i32)?;
                }
            }
        }
        writer.finalize()?;
        Ok(())
    }

    pub fn spec(&self) -> WavSpec {
        WavSpec {
            channels: self.signals.len() as u16,
            sample_rate: self.sampling_rate(),
            bits_per_sample: self.bits_per_sample,
            sample_format: if self.float { SampleFormat::Float } else { SampleFormat::Int },
        }
    }

    pub fn signals(&self) -> &[DiscreteSignal] {
        &self.signals
    }

    pub fn channel_count(&self) -> usize {
        self.signals.len()
    }

    pub fn sampling_rate(&self) -> SampleRate {
        self.signals[0].sampling_rate()
    }

    pub fn bits_per_sample(&self) -> u16 {
        self.bits_per_sample
    }

    // samples per channel
    pub fn len(&self) -> usize {
        self.signals[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn signal(&self, channel: Channel) -> Result<DiscreteSignal> {
        let fs = self.sampling_rate();
        match channel {
            Channel::Left => Ok(self.signals[0].clone()),
            Channel::Right => self
                .signals
                .get(1)
                .cloned()
                .ok_or_else(|| DspError::config("mono file has no right channel")),
            Channel::Sum | Channel::Average => {
                let mut acc = vec![0.0; self.len()];
                for s in &self.signals {
                    for (a, &x) in acc.iter_mut().zip(s.samples()) {
                        *a += x;
                    }
                }
                if channel == Channel::Average {
                    let n = self.signals.len() as Float;
                    acc.iter_mut().for_each(|a| *a /= n);
                }
                DiscreteSignal::new(fs, acc)
            }
            Channel::Interleave => {
                let mut samples = Vec::with_capacity(self.len() * self.signals.len());
                for i in 0..self.len() {
                    samples.extend(self.signals.iter().map(|s| s.samples()[i]));
                }
                DiscreteSignal::new(fs, samples)
            }
        }
    }
}

fn pcm_scale(bits: u16) -> Result<f64> {
    match bits {
        8 | 16 | 24 | 32 => Ok((1u64 << (bits - 1)) as f64),
        _ => Err(DspError::unsupported(format!("{bits}-bit pcm"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn round_trip(file: &WaveFile) -> WaveFile {
        let mut buf = Cursor::new(Vec::new());
        file.write_to(&mut buf).unwrap();
        buf.set_position(0);
        WaveFile::from_reader(buf).unwrap()
    }

    #[test]
    fn test_pcm_round_trip() {
        for (bits, step) in [(8u16, 1.0 / 128.0), (16, 1.0 / 32768.0), (24, 1.0 / 8388608.0), (32, 1.0 / 2147483648.0)] {
            let samples: Vec<Float> = (0..50).map(|i| (i as Float - 25.0) * 3.0 * step as Float).collect();
            let file = WaveFile::from_signal(DiscreteSignal::new(8000, samples.clone()).unwrap(), bits).unwrap();
            let back = round_trip(&file);
            assert_eq!(back.bits_per_sample(), bits);
            assert_eq!(back.sampling_rate(), 8000);
            assert_eq!(back.signals()[0].samples(), &samples[..]);
        }
    }

    #[test]
    fn test_header_fields() {
        let left = DiscreteSignal::new(44100, vec![0.5; 10]).unwrap();
        let right = DiscreteSignal::new(44100, vec![-0.5; 10]).unwrap();
        let file = WaveFile::new(vec![left, right], 16).unwrap();
        let mut buf = Cursor::new(Vec::new());
        file.write_to(&mut buf).unwrap();
        let bytes = buf.into_inner();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(&bytes[12..16], b"fmt ");
        // byte rate and block align
        assert_eq!(u32::from_le_bytes([bytes[28], bytes[29], bytes[30], bytes[31]]), 44100 * 4);
        assert_eq!(u16::from_le_bytes([bytes[32], bytes[33]]), 4);
        assert_eq!(bytes.len(), 44 + 40);
    }

    #[test]
    fn test_channels() {
        let left = DiscreteSignal::new(8000, vec![0.25, 0.5]).unwrap();
        let right = DiscreteSignal::new(8000, vec![0.75, -0.5]).unwrap();
        let file = WaveFile::new(vec![left, right], 16).unwrap();
        assert_eq!(file.signal(Channel::Left).unwrap().samples(), &[0.25, 0.5]);
        assert_eq!(file.signal(Channel::Right).unwrap().samples(), &[0.75, -0.5]);
        assert_eq!(file.signal(Channel::Sum).unwrap().samples(), &[1.0, 0.0]);
        assert_eq!(file.signal(Channel::Average).unwrap().samples(), &[0.5, 0.0]);
        assert_eq!(file.signal(Channel::Interleave).unwrap().samples(), &[0.25, 0.75, 0.5, -0.5]);

        let mono = WaveFile::from_signal(DiscreteSignal::new(8000, vec![0.1]).unwrap(), 16).unwrap();
        assert!(mono.signal(Channel::Right).is_err());
    }

    #[test]
    fn test_clamping_and_float() {
        let loud = DiscreteSignal::new(8000, vec![1.5, -1.5, 1.0]).unwrap();
        let back = round_trip(&WaveFile::from_signal(loud.clone(), 16).unwrap());
        assert_eq!(back.signals()[0].samples(), &[32767.0 / 32768.0, -1.0, 32767.0 / 32768.0]);

        let back = round_trip(&WaveFile::from_signal(loud.clone(), 16).unwrap().into_float());
        assert_eq!(back.spec().sample_format, SampleFormat::Float);
        assert_eq!(back.signals()[0].samples(), loud.samples());
    }

    #[test]
    fn test_invalid() {
        let a = DiscreteSignal::new(8000, vec![0.0; 4]).unwrap();
        let b = DiscreteSignal::new(16000, vec![0.0; 4]).unwrap();
        assert!(WaveFile::new(vec![], 16).is_err());
        assert!(WaveFile::new(vec![a.clone()], 12).is_err());
        assert!(WaveFile::new(vec![a, b], 16).is_err());
        assert!(WaveFile::from_reader(Cursor::new(b"not a wave file".to_vec())).is_err());
    }
}
