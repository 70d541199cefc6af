use std::sync::Arc;

use arc_swap::ArcSwap;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use ringbuf::{
    HeapProd, HeapRb,
    traits::{Consumer, Producer, Split},
};
use tracing::{error, info, warn};

use super::{Instrument, MixSnapshot, Mixer, VoiceTrigger};
use crate::error::AudioError;

/// Where the session sends its mix state and voice triggers.
pub trait AudioOutput {
    fn sample_rate(&self) -> u32;

    fn publish(&mut self, snapshot: MixSnapshot);

    fn trigger(&mut self, trigger: VoiceTrigger);

    /// Error reported by the backend since the last call, if any.
    fn take_error(&mut self) -> Option<String>;
}

/// Output that plays nothing and remembers what it was sent.
#[derive(Debug, Default)]
pub struct NullOutput {
    pub snapshots: usize,
    pub last_snapshot: Option<MixSnapshot>,
    pub triggers: Vec<VoiceTrigger>,
}

impl AudioOutput for NullOutput {
    fn sample_rate(&self) -> u32 {
        44_100
    }

    fn publish(&mut self, snapshot: MixSnapshot) {
        self.snapshots += 1;
        self.last_snapshot = Some(snapshot);
    }

    fn trigger(&mut self, trigger: VoiceTrigger) {
        self.triggers.push(trigger);
    }

    fn take_error(&mut self) -> Option<String> {
        None
    }
}

/// The default output device, fed by a [`Mixer`] running in the cpal callback.
pub struct CpalOutput {
    _stream: cpal::Stream,
    snapshot: Arc<ArcSwap<MixSnapshot>>,
    producer: HeapProd<VoiceTrigger>,
    errors: Arc<Mutex<Option<String>>>,
    sample_rate: u32,
}

impl CpalOutput {
    pub fn open(instrument: Instrument) -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(AudioError::NoDevice)?;
        let config = device
            .default_output_config()
            .map_err(|e| AudioError::Config(e.to_string()))?;
        let stream_config: cpal::StreamConfig = config.into();

        let sample_rate = stream_config.sample_rate as u32;
        let channels = stream_config.channels as usize;
        info!(channels, sample_rate, "audio output opened");

        let snapshot = Arc::new(ArcSwap::from_pointee(MixSnapshot::default()));
        let errors = Arc::new(Mutex::new(None));

        let ring_buffer = HeapRb::<VoiceTrigger>::new(1024);
        let (producer, mut consumer) = ring_buffer.split();

        let mut mixer = Mixer::new(instrument, sample_rate as f32);
        let snapshot_audio = Arc::clone(&snapshot);
        let errors_audio = Arc::clone(&errors);

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let current = snapshot_audio.load();
                    if !Arc::ptr_eq(&current, mixer.snapshot()) {
                        mixer.set_snapshot(Arc::clone(&current));
                    }
                    while let Some(trigger) = consumer.try_pop() {
                        mixer.trigger(trigger);
                    }
                    mixer.render(data, channels);
                },
                move |err| {
                    error!(%err, "audio stream error");
                    *errors_audio.lock() = Some(err.to_string());
                },
                None,
            )
            .map_err(|e| AudioError::Stream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| AudioError::Stream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            snapshot,
            producer,
            errors,
            sample_rate,
        })
    }
}

impl AudioOutput for CpalOutput {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn publish(&mut self, snapshot: MixSnapshot) {
        self.snapshot.store(Arc::new(snapshot));
    }

    fn trigger(&mut self, trigger: VoiceTrigger) {
        if self.producer.try_push(trigger).is_err() {
            warn!(pitch = trigger.pitch, "voice queue full, note dropped");
        }
    }

    fn take_error(&mut self) -> Option<String> {
        self.errors.lock().take()
    }
}
