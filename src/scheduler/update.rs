//! Content-pull trigger times
//!
//! A rolling alarm clock over configured times of day. Each trigger is
//! materialized against the current date at startup; triggers already in
//! the past are advanced by one day so they do not fire immediately. A
//! due check consumes (and re-arms for the next day) at most one trigger,
//! so several overdue triggers drain over successive ticks.

use crate::error::{Error, Result};
use chrono::{Duration, NaiveDateTime, NaiveTime};

/// Format accepted for configured trigger times
const TRIGGER_TIME_FORMAT: &str = "%H:%M";

/// Decides when a new content pull is due
#[derive(Debug, Clone)]
pub struct UpdateScheduler {
    /// Materialized trigger timestamps, always in the future relative to
    /// the last due check that consumed them
    triggers: Vec<NaiveDateTime>,
}

impl UpdateScheduler {
    /// Materialize trigger times against the current date
    pub fn from_times(times: &[NaiveTime], now: NaiveDateTime) -> Self {
        let triggers = times
            .iter()
            .map(|&time| {
                let at = now.date().and_time(time);
                if at < now {
                    at + Duration::days(1)
                } else {
                    at
                }
            })
            .collect();

        Self { triggers }
    }

    /// Parse `HH:MM` strings and materialize them
    ///
    /// # Errors
    ///
    /// Returns a config error on any malformed time string (fatal at
    /// startup).
    pub fn from_strings(times: &[String], now: NaiveDateTime) -> Result<Self> {
        let parsed: Vec<NaiveTime> = times
            .iter()
            .map(|s| {
                NaiveTime::parse_from_str(s, TRIGGER_TIME_FORMAT)
                    .map_err(|_| Error::config(format!("invalid trigger time '{s}', expected HH:MM")))
            })
            .collect::<Result<_>>()?;

        Ok(Self::from_times(&parsed, now))
    }

    /// Check whether a content pull is due
    ///
    /// The first trigger found in the past is advanced by exactly one day
    /// and the check reports due; repeated checks in the same tick window
    /// do not re-trigger.
    pub fn is_due(&mut self, now: NaiveDateTime) -> bool {
        for trigger in &mut self.triggers {
            if *trigger < now {
                *trigger += Duration::days(1);
                return true;
            }
        }
        false
    }

    /// Minimum positive interval until any trigger, capped at one day
    ///
    /// Used to bound the publish-time window for newly scheduled posts.
    pub fn time_until_next(&self, now: NaiveDateTime) -> Duration {
        let horizon = now + Duration::days(1);
        let next = self
            .triggers
            .iter()
            .filter(|&&t| now < t && t < horizon)
            .min()
            .copied()
            .unwrap_or(horizon);
        next - now
    }
}
