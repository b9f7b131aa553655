//! Backoff exponencial entre tentativas.

use rand::Rng;
use std::time::Duration;

use crate::types::config::RetryConfig;

/// Agenda de espera: `base * 2^(retry-1)` mais até `jitter` dela ao acaso,
/// sempre limitada por `cap`.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    jitter: f64,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration, jitter: f64) -> Self {
        Self {
            base,
            cap,
            jitter: jitter.clamp(0.0, 1.0),
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
            config.jitter,
        )
    }

    /// Espera antes do retry número `retry` (base 1), sem jitter.
    pub fn base_delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        self.base
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.cap)
            .min(self.cap)
    }

    /// Espera antes do retry número `retry`, com jitter e nunca acima do teto.
    pub fn delay(&self, retry: u32) -> Duration {
        let delay = self.base_delay(retry);
        if self.jitter <= 0.0 || delay.is_zero() {
            return delay;
        }
        let extra = rand::thread_rng().gen_range(0.0..=self.jitter);
        (delay + delay.mul_f64(extra)).min(self.cap)
    }
}
