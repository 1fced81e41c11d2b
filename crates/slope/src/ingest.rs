//! First gate of the pipeline: rejects fixes that cannot be real.

use std::time::Duration;

use serde::Serialize;

use crate::{config::EngineConfig, errors::InputError, models::Fix};

/// Advisory signal-quality events raised by the validator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// Input has been rejected `consecutive_rejects` times in a row.
    SignalDropout {
        consecutive_rejects: u32,
        since: Option<Duration>,
    },
    /// A fix was accepted again after a dropout warning.
    SignalRestored { after_rejects: u32 },
}

#[derive(Debug, Clone)]
pub struct FixValidator {
    max_horizontal_accuracy_m: f64,
    max_missing_altitude: u32,
    dropout_threshold: u32,
    last_accepted: Option<Duration>,
    missing_altitude: u32,
    consecutive_rejects: u32,
    dropout_raised: bool,
    pending: Option<Warning>,
}

impl FixValidator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            max_horizontal_accuracy_m: config.max_horizontal_accuracy_m,
            max_missing_altitude: config.max_missing_altitude,
            dropout_threshold: config.dropout_warning_threshold,
            last_accepted: None,
            missing_altitude: 0,
            consecutive_rejects: 0,
            dropout_raised: false,
            pending: None,
        }
    }

    pub fn validate(&mut self, fix: &Fix) -> Result<(), InputError> {
        match self.check(fix) {
            Ok(()) => {
                self.accept(fix);
                Ok(())
            }
            Err(reason) => {
                self.record_reject();
                Err(reason)
            }
        }
    }

    /// Counts a rejection made further down the pipeline (e.g. a GPS jump)
    /// towards the dropout streak.
    pub fn record_reject(&mut self) {
        self.consecutive_rejects += 1;
        if !self.dropout_raised && self.consecutive_rejects >= self.dropout_threshold {
            self.dropout_raised = true;
            tracing::warn!(
                "Signal dropout: {} consecutive fixes rejected",
                self.consecutive_rejects
            );
            self.pending = Some(Warning::SignalDropout {
                consecutive_rejects: self.consecutive_rejects,
                since: self.last_accepted,
            });
        }
    }

    /// Takes the warning raised by the latest call, if any.
    pub fn take_warning(&mut self) -> Option<Warning> {
        self.pending.take()
    }

    pub fn consecutive_rejects(&self) -> u32 {
        self.consecutive_rejects
    }

    pub fn reset(&mut self) {
        self.last_accepted = None;
        self.missing_altitude = 0;
        self.consecutive_rejects = 0;
        self.dropout_raised = false;
        self.pending = None;
    }

    fn check(&mut self, fix: &Fix) -> Result<(), InputError> {
        check_well_formed(fix)?;

        if fix.horizontal_accuracy_m > self.max_horizontal_accuracy_m {
            return Err(InputError::HorizontalAccuracy {
                accuracy_m: fix.horizontal_accuracy_m,
                ceiling_m: self.max_horizontal_accuracy_m,
            });
        }

        if let Some(last) = self.last_accepted
            && fix.monotonic <= last
        {
            return Err(InputError::NonMonotonic {
                got: fix.monotonic,
                last,
            });
        }

        if fix.altitude.is_none() {
            self.missing_altitude += 1;
            if self.missing_altitude > self.max_missing_altitude {
                return Err(InputError::AltitudeDropout {
                    consecutive: self.missing_altitude,
                });
            }
        } else {
            self.missing_altitude = 0;
        }

        Ok(())
    }

    fn accept(&mut self, fix: &Fix) {
        if self.dropout_raised {
            tracing::info!(
                "Signal restored after {} rejected fixes",
                self.consecutive_rejects
            );
            self.pending = Some(Warning::SignalRestored {
                after_rejects: self.consecutive_rejects,
            });
        }
        self.last_accepted = Some(fix.monotonic);
        self.consecutive_rejects = 0;
        self.dropout_raised = false;
    }
}

fn check_well_formed(fix: &Fix) -> Result<(), InputError> {
    if !fix.latitude.is_finite() || !(-90.0..=90.0).contains(&fix.latitude) {
        return Err(InputError::Malformed(format!(
            "latitude {} out of range",
            fix.latitude
        )));
    }
    if !fix.longitude.is_finite() || !(-180.0..=180.0).contains(&fix.longitude) {
        return Err(InputError::Malformed(format!(
            "longitude {} out of range",
            fix.longitude
        )));
    }
    if !fix.horizontal_accuracy_m.is_finite() || fix.horizontal_accuracy_m < 0.0 {
        return Err(InputError::Malformed(format!(
            "horizontal accuracy {}",
            fix.horizontal_accuracy_m
        )));
    }
    if let Some(altitude) = fix.altitude {
        let accuracy = altitude.source.accuracy_m();
        if !altitude.meters.is_finite() {
            return Err(InputError::Malformed("non-finite altitude".to_string()));
        }
        if !accuracy.is_finite() || accuracy < 0.0 {
            return Err(InputError::Malformed(format!(
                "vertical accuracy {}",
                accuracy
            )));
        }
    }
    Ok(())
}
