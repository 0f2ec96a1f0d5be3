//! Audio input capture
//!
//! This module handles capturing stereo audio from input devices and pushing
//! every callback block into the dual capture buffer.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use thiserror::Error;

use super::buffer::{CaptureWriter, DualCaptureBuffer};

/// Errors that can occur while opening a capture device
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("No input devices available")]
    NoDevices,

    #[error("Input device {0} not found")]
    DeviceNotFound(usize),

    #[error("Failed to enumerate input devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("Failed to query input config: {0}")]
    Config(#[from] cpal::DefaultStreamConfigError),

    #[error("Unsupported sample format: {0:?}")]
    UnsupportedFormat(cpal::SampleFormat),

    #[error("Failed to build input stream: {0}")]
    Build(#[from] cpal::BuildStreamError),

    #[error("Failed to start input stream: {0}")]
    Play(#[from] cpal::PlayStreamError),

    #[error("Capture buffer writer is still held by another stream")]
    WriterBusy,
}

/// Audio input capture engine
pub struct AudioInput {
    /// The audio input stream
    stream: Option<cpal::Stream>,

    /// Shared capture buffer
    buffer: DualCaptureBuffer,

    /// Available input devices
    pub devices: Vec<String>,

    /// Index of the device currently capturing
    pub selected_device: Option<usize>,

    /// Status message
    pub status: String,
}

impl AudioInput {
    /// Create a new audio input handler
    pub fn new(buffer: DualCaptureBuffer) -> Self {
        let mut input = Self {
            stream: None,
            buffer,
            devices: Vec::new(),
            selected_device: None,
            status: String::new(),
        };
        input.refresh_devices();
        input
    }

    /// Re-enumerate capture devices
    pub fn refresh_devices(&mut self) {
        let host = cpal::default_host();
        self.devices = named_input_devices(&host)
            .map(|devices| devices.into_iter().map(|(_, name)| name).collect())
            .unwrap_or_default();

        if !self.is_capturing() {
            self.status = if self.devices.is_empty() {
                "No input devices found".to_string()
            } else {
                format!("Found {} input device(s)", self.devices.len())
            };
        }
    }

    /// Check if currently capturing
    pub fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }

    /// Start capturing from the device at `index`
    pub fn start(&mut self, index: usize) -> Result<(), CaptureError> {
        if self.stream.is_some() {
            return Ok(());
        }

        log::info!("Starting audio capture...");

        let host = cpal::default_host();
        let mut devices = named_input_devices(&host)?;
        if devices.is_empty() {
            return Err(CaptureError::NoDevices);
        }
        if index >= devices.len() {
            return Err(CaptureError::DeviceNotFound(index));
        }
        let (device, device_name) = devices.swap_remove(index);
        log::info!("Using input device: {}", device_name);

        let config = device.default_input_config()?;
        log::info!("Audio config: {:?}", config);

        let writer = self.buffer.writer().ok_or(CaptureError::WriterBusy)?;
        let channels = config.channels() as usize;
        let sample_format = config.sample_format();
        let config: cpal::StreamConfig = config.into();

        let stream = match sample_format {
            cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, channels, writer)?,
            cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, channels, writer)?,
            cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, channels, writer)?,
            format => return Err(CaptureError::UnsupportedFormat(format)),
        };

        stream.play()?;

        self.stream = Some(stream);
        self.selected_device = Some(index);
        self.status = format!("Capturing: {}", device_name);
        log::info!("Capture started");
        Ok(())
    }

    /// Stop audio capture
    ///
    /// Dropping the stream drops its callback, which releases the buffer's
    /// writer role for the next `start`.
    pub fn stop(&mut self) {
        if self.stream.take().is_some() {
            self.status = "Stopped".to_string();
            log::info!("Capture stopped");
        }
    }

    /// Re-point capture at another device: stop, reconfigure, start
    pub fn select(&mut self, index: usize) -> Result<(), CaptureError> {
        self.stop();
        self.refresh_devices();
        self.start(index)
    }
}

impl Drop for AudioInput {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Input devices paired with their names, in host order.
///
/// Devices whose name cannot be read are skipped. The menu and `start` both
/// index into this list, so "n - name" always opens that device.
fn named_input_devices(
    host: &cpal::Host,
) -> Result<Vec<(cpal::Device, String)>, cpal::DevicesError> {
    Ok(with_names(host.input_devices()?, |d| d.name().ok()))
}

fn with_names<D>(
    devices: impl Iterator<Item = D>,
    name: impl Fn(&D) -> Option<String>,
) -> Vec<(D, String)> {
    devices
        .filter_map(|device| {
            let name = name(&device)?;
            Some((device, name))
        })
        .collect()
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: usize,
    mut writer: CaptureWriter,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            writer.write_interleaved(data, channels);
        },
        |err| log::error!("Audio error: {}", err),
        None,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unnamed_devices_do_not_shift_indices() {
        // Device 1 has no readable name
        let names = [Some("Built-in"), None, Some("USB Interface"), Some("Loopback")];
        let devices = with_names(0..names.len(), |&i| names[i].map(str::to_string));

        let listed: Vec<&str> = devices.iter().map(|(_, name)| name.as_str()).collect();
        assert_eq!(listed, vec!["Built-in", "USB Interface", "Loopback"]);

        // Menu entry 1 opens the device it names
        assert_eq!(devices[1], (2, "USB Interface".to_string()));
        assert_eq!(devices[2].0, 3);
    }
}
