//! Antenna front-ends: a `FileAntenna` reading recorded baseband I/Q and a Unix-only
//! `RtlSdrAntenna` reading live from an RTL-SDR dongle, behind one trait (§4 overview).

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use rustfft::num_complex::Complex64;

use crate::constants::SAMPLES_PER_MS;
use crate::error::ReceiverError;
use crate::types::SampleBlock;

/// One complex sample is 8 bytes: little-endian f32 I followed by little-endian f32 Q,
/// matching the teacher's `TypePairFloat32` recording format.
const BYTES_PER_SAMPLE: usize = 8;

pub trait Antenna {
    /// Reads the next 1 ms block of samples. `ReceiverError::EndOfStream` is a clean
    /// termination signal, not a bug (§7).
    fn next_1ms_of_samples(&mut self) -> Result<SampleBlock, ReceiverError>;
}

/// Reads pre-recorded baseband I/Q from a binary file of interleaved little-endian f32
/// I/Q pairs (§4 overview's "file reader" collaborator).
pub struct FileAntenna {
    reader: BufReader<File>,
    start_timestamp: DateTime<Utc>,
    samples_read: u64,
}

impl FileAntenna {
    pub fn open(path: &PathBuf, start_timestamp: DateTime<Utc>) -> std::io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            reader: BufReader::with_capacity(SAMPLES_PER_MS * BYTES_PER_SAMPLE, file),
            start_timestamp,
            samples_read: 0,
        })
    }

    fn timestamp_for_sample_index(&self, index: u64) -> DateTime<Utc> {
        self.start_timestamp
            + chrono::Duration::nanoseconds(
                (index as f64 / crate::constants::SAMPLE_RATE_HZ * 1e9) as i64,
            )
    }
}

impl Antenna for FileAntenna {
    fn next_1ms_of_samples(&mut self) -> Result<SampleBlock, ReceiverError> {
        let mut buf = vec![0u8; SAMPLES_PER_MS * BYTES_PER_SAMPLE];
        match self.reader.read_exact(&mut buf) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(ReceiverError::EndOfStream)
            }
            Err(e) => {
                return Err(ReceiverError::InvariantViolation(format!(
                    "file antenna read error: {e}"
                )))
            }
        }

        let mut samples = Vec::with_capacity(SAMPLES_PER_MS);
        for chunk in buf.chunks_exact(BYTES_PER_SAMPLE) {
            let i = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            let q = f32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]);
            samples.push(Complex64::new(i as f64, q as f64));
        }

        let start_timestamp = self.timestamp_for_sample_index(self.samples_read);
        self.samples_read += SAMPLES_PER_MS as u64;
        let end_timestamp = self.timestamp_for_sample_index(self.samples_read);

        Ok(SampleBlock {
            samples,
            start_timestamp,
            end_timestamp,
        })
    }
}

/// Reads live baseband I/Q from an RTL-SDR dongle (Unix-only, per the teacher's own
/// `#[cfg(target_os = "linux")]` gating in `device.rs`). `rtlsdr_mt`'s `Reader` is
/// callback-driven (`read_async`), so a background thread runs it and forwards raw byte
/// chunks over a channel; `next_1ms_of_samples` pulls from that channel, buffering
/// leftover samples across calls since device reads don't land on 1 ms boundaries
/// (mirrors the original Python antenna's own leftover-buffering for the same reason).
#[cfg(unix)]
pub struct RtlSdrAntenna {
    samples_rx: std::sync::mpsc::Receiver<Vec<u8>>,
    leftover: Vec<Complex64>,
    samples_produced: u64,
    start_timestamp: DateTime<Utc>,
}

#[cfg(unix)]
impl RtlSdrAntenna {
    pub fn open(gain: i32, start_timestamp: DateTime<Utc>) -> Result<Self, ReceiverError> {
        let (mut ctl, mut reader) = rtlsdr_mt::open(0)
            .map_err(|e| ReceiverError::InvariantViolation(format!("failed to open rtl-sdr: {e:?}")))?;

        ctl.enable_agc()
            .map_err(|e| ReceiverError::InvariantViolation(format!("enable_agc failed: {e:?}")))?;
        ctl.set_ppm(0)
            .map_err(|e| ReceiverError::InvariantViolation(format!("set_ppm failed: {e:?}")))?;
        ctl.set_center_freq(crate::constants::L1_FREQUENCY_HZ as u32)
            .map_err(|e| ReceiverError::InvariantViolation(format!("set_center_freq failed: {e:?}")))?;
        ctl.set_sample_rate(crate::constants::SAMPLE_RATE_HZ as u32)
            .map_err(|e| ReceiverError::InvariantViolation(format!("set_sample_rate failed: {e:?}")))?;
        ctl.set_tuner_gain_nearest(gain * 10)
            .map_err(|e| ReceiverError::InvariantViolation(format!("set_tuner_gain failed: {e:?}")))?;

        let (samples_tx, samples_rx) = std::sync::mpsc::channel::<Vec<u8>>();
        std::thread::Builder::new()
            .name("rtlsdr-reader".into())
            .spawn(move || {
                // 512-sample (1024-byte) buffers: the smallest read size the device
                // accepts, per the teacher's own comment in `device.rs`.
                let _ = reader.read_async(4, 1024, |bytes| {
                    if samples_tx.send(bytes.to_vec()).is_err() {
                        // Receiver dropped (antenna dropped); nothing more to do.
                    }
                });
            })
            .map_err(|e| ReceiverError::InvariantViolation(format!("failed to spawn rtl-sdr reader thread: {e}")))?;

        Ok(Self {
            samples_rx,
            leftover: Vec::new(),
            samples_produced: 0,
            start_timestamp,
        })
    }

    fn timestamp_for_sample_index(&self, index: u64) -> DateTime<Utc> {
        self.start_timestamp
            + chrono::Duration::nanoseconds(
                (index as f64 / crate::constants::SAMPLE_RATE_HZ * 1e9) as i64,
            )
    }
}

#[cfg(unix)]
impl Antenna for RtlSdrAntenna {
    fn next_1ms_of_samples(&mut self) -> Result<SampleBlock, ReceiverError> {
        while self.leftover.len() < SAMPLES_PER_MS {
            let bytes = self
                .samples_rx
                .recv()
                .map_err(|_| ReceiverError::InvariantViolation("rtl-sdr reader thread exited".into()))?;
            for chunk in bytes.chunks_exact(2) {
                let i = (chunk[0] as f64 - 127.5) / 127.5;
                let q = (chunk[1] as f64 - 127.5) / 127.5;
                self.leftover.push(Complex64::new(i, q));
            }
        }

        let samples: Vec<Complex64> = self.leftover.drain(0..SAMPLES_PER_MS).collect();
        let start_timestamp = self.timestamp_for_sample_index(self.samples_produced);
        self.samples_produced += SAMPLES_PER_MS as u64;
        let end_timestamp = self.timestamp_for_sample_index(self.samples_produced);

        Ok(SampleBlock {
            samples,
            start_timestamp,
            end_timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn file_antenna_reads_one_block_then_reports_end_of_stream() {
        let mut path = std::env::temp_dir();
        path.push(format!("gps-l1ca-receiver-test-{}.iq", std::process::id()));

        {
            let mut file = File::create(&path).unwrap();
            let mut buf = Vec::with_capacity(SAMPLES_PER_MS * BYTES_PER_SAMPLE);
            for k in 0..SAMPLES_PER_MS {
                buf.extend_from_slice(&(k as f32).to_le_bytes());
                buf.extend_from_slice(&(-(k as f32)).to_le_bytes());
            }
            file.write_all(&buf).unwrap();
        }

        let start = DateTime::<Utc>::from_timestamp(0, 0).unwrap();
        let mut antenna = FileAntenna::open(&path, start).unwrap();

        let block = antenna.next_1ms_of_samples().expect("first block reads fine");
        assert_eq!(block.samples.len(), SAMPLES_PER_MS);
        assert_eq!(block.samples[1].re, 1.0);
        assert_eq!(block.samples[1].im, -1.0);

        let err = antenna.next_1ms_of_samples().expect_err("file only had one block");
        assert!(matches!(err, ReceiverError::EndOfStream));

        let _ = std::fs::remove_file(&path);
    }
}
