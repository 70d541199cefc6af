use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{DrawCommand, Pos, Rgba};
use crate::config::ParticleConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    pub pos: Pos,
    pub velocity: Pos,
    /// 1.0 at spawn, removed at 0.
    pub life: f32,
    pub color: Rgba,
}

/// Short-lived sparks emitted where notes cross the playhead.
#[derive(Debug)]
pub struct ParticleSystem {
    config: ParticleConfig,
    particles: Vec<Particle>,
    rng: StdRng,
    /// Remaining cooldown per note index before it may burst again.
    cooldowns: HashMap<usize, f32>,
}

impl ParticleSystem {
    pub fn new(config: ParticleConfig, seed: u64) -> Self {
        Self {
            config,
            particles: Vec::new(),
            rng: StdRng::seed_from_u64(seed),
            cooldowns: HashMap::new(),
        }
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn clear(&mut self) {
        self.particles.clear();
        self.cooldowns.clear();
    }

    /// Emits a burst for `note` at `origin` unless that note burst less than
    /// the configured interval ago.
    pub fn burst(&mut self, note: usize, origin: Pos, color: Rgba) -> bool {
        if self.cooldowns.get(&note).is_some_and(|left| *left > 0.0) {
            return false;
        }
        self.cooldowns
            .insert(note, self.config.burst_interval_seconds);

        let horizontal = self.config.max_horizontal_speed.max(0.0);
        let rise_low = self.config.min_rise_speed.min(self.config.max_rise_speed);
        let rise_high = self.config.max_rise_speed.max(rise_low + f32::EPSILON);
        for _ in 0..self.config.burst_size {
            let vx = if horizontal > 0.0 {
                self.rng.gen_range(-horizontal..=horizontal)
            } else {
                0.0
            };
            let vy = -self.rng.gen_range(rise_low..rise_high);
            self.particles.push(Particle {
                pos: origin,
                velocity: Pos::new(vx, vy),
                life: 1.0,
                color,
            });
        }
        true
    }

    /// Moves every particle by `dt` seconds of real time and drops the dead.
    pub fn advance(&mut self, dt: f32) {
        let dt = dt.max(0.0);
        for particle in &mut self.particles {
            particle.velocity.y += self.config.gravity * dt;
            particle.pos.x += particle.velocity.x * dt;
            particle.pos.y += particle.velocity.y * dt;
            particle.life -= self.config.decay_per_second * dt;
        }
        self.particles.retain(|p| p.life > 0.0);

        for left in self.cooldowns.values_mut() {
            *left -= dt;
        }
        self.cooldowns.retain(|_, left| *left > 0.0);
    }

    pub fn draw(&self, out: &mut Vec<DrawCommand>) {
        for particle in &self.particles {
            let alpha = (particle.life.clamp(0.0, 1.0) * 255.0) as u8;
            out.push(DrawCommand::Circle {
                center: particle.pos,
                radius: self.config.radius,
                fill: particle.color.with_alpha(alpha),
            });
        }
    }
}
