//! Sample-time gated PID controller with anti-windup.
//!
//! Follows the Arduino PID library formulation: gains are discretised once
//! at construction (`Ki * dt`, `Kd / dt`), the derivative acts on the
//! measurement rather than the error, and the integral only accumulates
//! while the previous output was not saturated.

use std::time::Duration;
use tokio::time::Instant;

use crate::config::{ControllerConfig, MIN_INTERVAL};
use crate::error::PidError;

/// Individual contributions of the last completed calculation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PidTerms {
    pub p: f64,
    pub i: f64,
    pub d: f64,
}

#[derive(Debug, Clone)]
pub struct PidController {
    kp: f64,
    ki: f64,
    kd: f64,
    sample_time: Duration,
    output_min: f64,
    output_max: f64,

    i_term: f64,
    last_input: f64,
    last_output: f64,
    last_calc: Option<Instant>,
    last_terms: PidTerms,
}

impl PidController {
    pub fn new(
        sample_time_secs: f64,
        kp: f64,
        ki: f64,
        kd: f64,
        output_min: f64,
        output_max: f64,
    ) -> Result<Self, PidError> {
        for (name, gain) in [("kp", kp), ("ki", ki), ("kd", kd)] {
            if !gain.is_finite() {
                return Err(PidError::NonFiniteGain { name });
            }
        }
        if sample_time_secs.is_nan() || sample_time_secs <= 0.0 {
            return Err(PidError::InvalidSampleTime(sample_time_secs));
        }
        let sample_time = Duration::try_from_secs_f64(sample_time_secs)
            .map_err(|_| PidError::InvalidSampleTime(sample_time_secs))?;
        if sample_time < MIN_INTERVAL {
            return Err(PidError::InvalidSampleTime(sample_time_secs));
        }
        if output_min.is_nan() || output_max.is_nan() || output_min >= output_max {
            return Err(PidError::InvalidOutputRange {
                min: output_min,
                max: output_max,
            });
        }

        Ok(Self {
            kp,
            ki: ki * sample_time_secs,
            kd: kd / sample_time_secs,
            sample_time,
            output_min,
            output_max,
            i_term: 0.0,
            last_input: 0.0,
            last_output: 0.0,
            last_calc: None,
            last_terms: PidTerms::default(),
        })
    }

    /// Heater PID: output range `0..=max_output` percent.
    pub fn from_config(config: &ControllerConfig) -> Result<Self, PidError> {
        Self::new(
            config.sample_time,
            config.kp,
            config.ki,
            config.kd,
            0.0,
            config.max_output,
        )
    }

    /// New output for `input` against `setpoint`, at most once per sample time.
    pub fn calc(&mut self, input: f64, setpoint: f64) -> f64 {
        self.calc_at(input, setpoint, Instant::now())
    }

    /// Same as [`calc`](Self::calc) with an explicit clock reading.
    ///
    /// Calls that arrive less than one sample time after the last completed
    /// calculation return the previous output and leave the state untouched.
    pub fn calc_at(&mut self, input: f64, setpoint: f64, now: Instant) -> f64 {
        if let Some(last) = self.last_calc {
            if now.saturating_duration_since(last) < self.sample_time {
                return self.last_output;
            }
        }

        let error = setpoint - input;
        let d_input = input - self.last_input;

        // Only integrate while the output is not saturated.
        if self.last_output < self.output_max && self.last_output > self.output_min {
            self.i_term += self.ki * error;
            self.i_term = self.i_term.clamp(self.output_min, self.output_max);
        }

        let terms = PidTerms {
            p: self.kp * error,
            i: self.i_term,
            d: -(self.kd * d_input),
        };
        let output = (terms.p + terms.i + terms.d).clamp(self.output_min, self.output_max);

        tracing::debug!(
            "PID P: {:.3} I: {:.3} D: {:.3} output: {:.2}",
            terms.p,
            terms.i,
            terms.d,
            output
        );

        self.last_terms = terms;
        self.last_output = output;
        self.last_input = input;
        self.last_calc = Some(now);
        output
    }

    pub fn last_output(&self) -> f64 {
        self.last_output
    }

    pub fn integral(&self) -> f64 {
        self.i_term
    }

    pub fn last_terms(&self) -> PidTerms {
        self.last_terms
    }

    pub fn sample_time(&self) -> Duration {
        self.sample_time
    }

    pub fn output_limits(&self) -> (f64, f64) {
        (self.output_min, self.output_max)
    }
}
