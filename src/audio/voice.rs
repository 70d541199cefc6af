use serde::{Deserialize, Serialize};

use super::{Instrument, midi_to_freq};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ADSRConfig {
    /// Seconds
    pub attack: f32,
    /// Seconds
    pub decay: f32,
    /// 0.0 -> 1.0
    pub sustain: f32,
    /// Seconds
    pub release: f32,
}

impl Default for ADSRConfig {
    fn default() -> Self {
        Self {
            attack: 0.005,
            decay: 0.3,
            sustain: 0.4,
            release: 0.35,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnvelopeState {
    Attack { time: f32 },
    Decay { time: f32 },
    Sustain,
    Release { time: f32, from_level: f32 },
    Finished,
}

/// One note of the synthesized instrument, as delivered by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceTrigger {
    pub pitch: u8,
    pub velocity: f32,
    pub duration_seconds: f32,
}

/// A sounding note. Every trigger gets its own voice, so two overlapping
/// notes on the same pitch ring independently.
#[derive(Debug, Clone)]
pub struct Voice {
    pub pitch: u8,
    pub velocity: f32,
    pub hold_remaining: f32,
    pub envelope_state: EnvelopeState,
    pub envelope_level: f32,
    pub oscillator_phases: Vec<f32>,
}

impl Voice {
    pub fn new(trigger: VoiceTrigger, num_oscillators: usize) -> Self {
        Self {
            pitch: trigger.pitch,
            velocity: trigger.velocity.clamp(0.0, 1.0),
            hold_remaining: trigger.duration_seconds.max(0.0),
            envelope_state: EnvelopeState::Attack { time: 0.0 },
            envelope_level: 0.0,
            oscillator_phases: vec![0.0; num_oscillators],
        }
    }

    pub fn is_finished(&self) -> bool {
        self.envelope_state == EnvelopeState::Finished
    }

    /// Renders one mono sample and advances the envelope by one sample period.
    pub fn render_sample(&mut self, instrument: &Instrument, sample_rate: f32) -> f32 {
        if self.is_finished() {
            return 0.0;
        }

        let mut sample = 0.0;
        for (osc, phase) in instrument
            .oscillators
            .iter()
            .zip(self.oscillator_phases.iter_mut())
        {
            let pitch = (self.pitch as i16 + osc.semitone as i16).clamp(0, 127) as u8;
            sample += osc.wave.sample(*phase) * osc.gain;

            *phase += midi_to_freq(pitch) / sample_rate;
            if *phase >= 1.0 {
                *phase -= 1.0;
            }
        }

        let dt = 1.0 / sample_rate;
        if self.hold_remaining > 0.0 {
            self.hold_remaining -= dt;
            if self.hold_remaining <= 0.0 {
                self.release();
            }
        } else {
            self.release();
        }

        let level = calculate_envelope(self, &instrument.adsr);
        advance_envelope(self, &instrument.adsr, dt);
        sample * level * self.velocity
    }

    pub fn release(&mut self) {
        if !matches!(
            self.envelope_state,
            EnvelopeState::Release { .. } | EnvelopeState::Finished
        ) {
            self.envelope_state = EnvelopeState::Release {
                time: 0.0,
                from_level: self.envelope_level,
            };
        }
    }
}

pub fn calculate_envelope(voice: &Voice, adsr: &ADSRConfig) -> f32 {
    match &voice.envelope_state {
        EnvelopeState::Attack { time } => {
            if adsr.attack == 0.0 {
                1.0
            } else {
                (time / adsr.attack).min(1.0)
            }
        }
        EnvelopeState::Decay { time } => {
            let decay_progress = if adsr.decay == 0.0 {
                1.0
            } else {
                (time / adsr.decay).min(1.0)
            };
            1.0 - (1.0 - adsr.sustain) * decay_progress
        }
        EnvelopeState::Sustain => adsr.sustain,
        EnvelopeState::Release { time, from_level } => {
            let release_progress = if adsr.release == 0.0 {
                1.0
            } else {
                (time / adsr.release).min(1.0)
            };
            from_level * (1.0 - release_progress)
        }
        EnvelopeState::Finished => 0.0,
    }
}

pub fn advance_envelope(voice: &mut Voice, adsr: &ADSRConfig, dt: f32) {
    match &mut voice.envelope_state {
        EnvelopeState::Attack { time } => {
            *time += dt;
            if *time >= adsr.attack {
                voice.envelope_state = EnvelopeState::Decay { time: 0.0 };
                voice.envelope_level = 1.0;
            } else {
                voice.envelope_level = calculate_envelope(voice, adsr);
            }
        }
        EnvelopeState::Decay { time } => {
            *time += dt;
            if *time >= adsr.decay {
                voice.envelope_state = EnvelopeState::Sustain;
                voice.envelope_level = adsr.sustain;
            } else {
                voice.envelope_level = calculate_envelope(voice, adsr);
            }
        }
        EnvelopeState::Sustain => {
            voice.envelope_level = adsr.sustain;
        }
        EnvelopeState::Release { time, .. } => {
            *time += dt;
            if *time >= adsr.release {
                voice.envelope_state = EnvelopeState::Finished;
                voice.envelope_level = 0.0;
            } else {
                voice.envelope_level = calculate_envelope(voice, adsr);
            }
        }
        EnvelopeState::Finished => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trigger(duration_seconds: f32) -> VoiceTrigger {
        VoiceTrigger {
            pitch: 69,
            velocity: 1.0,
            duration_seconds,
        }
    }

    #[test]
    fn voice_releases_after_hold_and_finishes() {
        let instrument = Instrument::default();
        let sample_rate = 1000.0;
        let mut voice = Voice::new(trigger(0.1), instrument.oscillators.len());

        for _ in 0..105 {
            voice.render_sample(&instrument, sample_rate);
        }
        assert!(matches!(voice.envelope_state, EnvelopeState::Release { .. }));

        let release_samples = (instrument.adsr.release * sample_rate) as usize + 2;
        for _ in 0..release_samples {
            voice.render_sample(&instrument, sample_rate);
        }
        assert!(voice.is_finished());
        assert_eq!(voice.render_sample(&instrument, sample_rate), 0.0);
    }

    #[test]
    fn envelope_reaches_sustain_level() {
        let instrument = Instrument::default();
        let mut voice = Voice::new(trigger(10.0), instrument.oscillators.len());
        for _ in 0..1000 {
            voice.render_sample(&instrument, 1000.0);
        }
        assert_eq!(voice.envelope_state, EnvelopeState::Sustain);
        assert_eq!(voice.envelope_level, instrument.adsr.sustain);
    }
}
