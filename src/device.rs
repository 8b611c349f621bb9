//! Audio device wiring
//!
//! Thin cpal layer that opens the primary and monitor devices, reports the
//! "device became ready" event, and invokes the engines' block callbacks
//! from the stream threads. cpal has no duplex callback, so the primary
//! input stream is bridged to the output callback through a lock-free feed
//! ring; the output callback drives the routing engine with whatever input
//! frames arrived (silence on shortfall).
//!
//! Failures here are `DeviceConfig` errors reported upward - the caller
//! decides whether to continue without that device.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::HeapRb;
use tracing::{error, info, warn};

use crate::config::AudioSettings;
use crate::host::types::{HostError, HostResult};
use crate::monitor::MonitorEngine;
use crate::routing::AudioRoutingEngine;

/// Block size requested when the settings do not name one.
pub const DEFAULT_BLOCK_SIZE: usize = 512;

/// The "device became ready" event: what a device agreed to run at.
#[derive(Clone, Copy, Debug)]
pub struct DeviceReady {
    pub sample_rate: f64,
    pub block_size: usize,
}

/// The primary duplex pair: input feeds the routing engine, output carries
/// the processed chain.
pub struct PrimaryDevice {
    pub ready: DeviceReady,
    pub input_channels: usize,
    pub output_channels: usize,
    _input: Option<cpal::Stream>,
    _output: cpal::Stream,
}

impl PrimaryDevice {
    /// Open the primary device pair and start the routing engine on it.
    /// A missing or unusable input device degrades to silence rather than
    /// failing the whole pair; an unusable output device is fatal here.
    pub fn open(settings: &AudioSettings, mut engine: AudioRoutingEngine) -> HostResult<Self> {
        let host = cpal::default_host();

        let output_device = pick_output(&host, settings.output_device.as_deref())?;
        let output_config = output_device
            .default_output_config()
            .map_err(|e| HostError::DeviceConfig(e.to_string()))?;
        if output_config.sample_format() != cpal::SampleFormat::F32 {
            return Err(HostError::DeviceConfig(format!(
                "unsupported output sample format {:?}",
                output_config.sample_format()
            )));
        }

        let sample_rate = settings.sample_rate.unwrap_or(output_config.sample_rate().0);
        let block_size = settings.block_size.map(|b| b as usize).unwrap_or(DEFAULT_BLOCK_SIZE);
        let output_channels = output_config.channels() as usize;

        let mut stream_config: cpal::StreamConfig = output_config.into();
        stream_config.sample_rate = cpal::SampleRate(sample_rate);
        stream_config.buffer_size = cpal::BufferSize::Fixed(block_size as u32);

        info!(
            device = %output_device.name().unwrap_or_else(|_| "?".to_string()),
            sample_rate,
            block_size,
            channels = output_channels,
            "primary output ready"
        );

        // Input is best-effort: without one the chain runs on silence
        let input = match pick_input(&host, settings.input_device.as_deref()) {
            Ok(device) => Some(device),
            Err(e) => {
                warn!("continuing without input device: {}", e);
                None
            }
        };

        let mut input_channels = 0usize;
        let mut input_stream = None;

        // One second of feed capacity absorbs scheduling jitter between
        // the two independently clocked callbacks
        let feed = HeapRb::<f32>::new((sample_rate as usize).max(block_size * 4));
        let (mut feed_producer, mut feed_consumer) = feed.split();

        if let Some(device) = input {
            match device.default_input_config() {
                Ok(input_config) if input_config.sample_format() == cpal::SampleFormat::F32 => {
                    input_channels = input_config.channels() as usize;
                    let mut config: cpal::StreamConfig = input_config.into();
                    config.sample_rate = cpal::SampleRate(sample_rate);
                    config.buffer_size = cpal::BufferSize::Fixed(block_size as u32);

                    match device.build_input_stream(
                        &config,
                        move |data: &[f32], _: &cpal::InputCallbackInfo| {
                            // Excess beyond the feed capacity is dropped
                            let _ = feed_producer.push_slice(data);
                        },
                        stream_error("input"),
                        None,
                    ) {
                        Ok(stream) => {
                            info!(
                                device = %device.name().unwrap_or_else(|_| "?".to_string()),
                                channels = input_channels,
                                "primary input ready"
                            );
                            input_stream = Some(stream);
                        }
                        Err(e) => {
                            warn!("continuing without input device: {}", e);
                            input_channels = 0;
                        }
                    }
                }
                Ok(other) => {
                    warn!(
                        "continuing without input device: unsupported sample format {:?}",
                        other.sample_format()
                    );
                }
                Err(e) => warn!("continuing without input device: {}", e),
            }
        }

        let ready = DeviceReady {
            sample_rate: sample_rate as f64,
            block_size,
        };
        engine.on_device_about_to_start(ready.sample_rate, ready.block_size);

        let in_ch = input_channels;
        let mut input_scratch = vec![0.0f32; block_size * in_ch.max(1)];
        let output_stream = output_device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let frames = if output_channels > 0 {
                        data.len() / output_channels
                    } else {
                        0
                    };
                    let needed = frames * in_ch;
                    if input_scratch.len() < needed {
                        input_scratch.resize(needed, 0.0);
                    }
                    let block_input = &mut input_scratch[..needed];
                    if in_ch > 0 {
                        let got = feed_consumer.pop_slice(block_input);
                        block_input[got..].fill(0.0);
                    }
                    engine.on_block(block_input, in_ch, data, output_channels);
                },
                stream_error("output"),
                None,
            )
            .map_err(|e| HostError::DeviceConfig(e.to_string()))?;

        if let Some(stream) = &input_stream {
            stream
                .play()
                .map_err(|e| HostError::DeviceConfig(e.to_string()))?;
        }
        output_stream
            .play()
            .map_err(|e| HostError::DeviceConfig(e.to_string()))?;

        Ok(Self {
            ready,
            input_channels,
            output_channels,
            _input: input_stream,
            _output: output_stream,
        })
    }
}

/// The monitor output device, fed exclusively from the transport.
pub struct MonitorDevice {
    pub ready: DeviceReady,
    pub output_channels: usize,
    _output: cpal::Stream,
}

impl MonitorDevice {
    pub fn open(settings: &AudioSettings, mut engine: MonitorEngine) -> HostResult<Self> {
        let host = cpal::default_host();
        let device = pick_output(&host, settings.monitor_device.as_deref())?;
        let config = device
            .default_output_config()
            .map_err(|e| HostError::DeviceConfig(e.to_string()))?;
        if config.sample_format() != cpal::SampleFormat::F32 {
            return Err(HostError::DeviceConfig(format!(
                "unsupported monitor sample format {:?}",
                config.sample_format()
            )));
        }

        let sample_rate = config.sample_rate().0;
        let block_size = settings.block_size.map(|b| b as usize).unwrap_or(DEFAULT_BLOCK_SIZE);
        let channels = config.channels() as usize;

        let mut stream_config: cpal::StreamConfig = config.into();
        stream_config.buffer_size = cpal::BufferSize::Fixed(block_size as u32);

        let ready = DeviceReady {
            sample_rate: sample_rate as f64,
            block_size,
        };
        engine.on_device_about_to_start(ready.sample_rate, ready.block_size);

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    engine.on_block(data, channels);
                },
                stream_error("monitor"),
                None,
            )
            .map_err(|e| HostError::DeviceConfig(e.to_string()))?;
        stream
            .play()
            .map_err(|e| HostError::DeviceConfig(e.to_string()))?;

        info!(
            device = %device.name().unwrap_or_else(|_| "?".to_string()),
            sample_rate,
            channels,
            "monitor output ready"
        );

        Ok(Self {
            ready,
            output_channels: channels,
            _output: stream,
        })
    }
}

/// Print every input and output device the default host exposes.
pub fn print_devices() -> HostResult<()> {
    let host = cpal::default_host();
    println!("Host: {:?}", host.id());

    println!("Input devices:");
    let inputs = host
        .input_devices()
        .map_err(|e| HostError::DeviceConfig(e.to_string()))?;
    for device in inputs {
        println!("  {}", device.name().unwrap_or_else(|_| "?".to_string()));
    }

    println!("Output devices:");
    let outputs = host
        .output_devices()
        .map_err(|e| HostError::DeviceConfig(e.to_string()))?;
    for device in outputs {
        println!("  {}", device.name().unwrap_or_else(|_| "?".to_string()));
    }
    Ok(())
}

fn pick_output(host: &cpal::Host, name: Option<&str>) -> HostResult<cpal::Device> {
    match name {
        Some(wanted) => host
            .output_devices()
            .map_err(|e| HostError::DeviceConfig(e.to_string()))?
            .find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
            .ok_or_else(|| {
                HostError::DeviceConfig(format!("output device '{}' not found", wanted))
            }),
        None => host
            .default_output_device()
            .ok_or_else(|| HostError::DeviceConfig("no default output device".to_string())),
    }
}

fn pick_input(host: &cpal::Host, name: Option<&str>) -> HostResult<cpal::Device> {
    match name {
        Some(wanted) => host
            .input_devices()
            .map_err(|e| HostError::DeviceConfig(e.to_string()))?
            .find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
            .ok_or_else(|| {
                HostError::DeviceConfig(format!("input device '{}' not found", wanted))
            }),
        None => host
            .default_input_device()
            .ok_or_else(|| HostError::DeviceConfig("no default input device".to_string())),
    }
}

fn stream_error(which: &'static str) -> impl FnMut(cpal::StreamError) {
    move |e| error!("{} stream error: {}", which, e)
}
