//! Uniform time grid shared by every DER profile of a scenario.

use chrono::{DateTime, TimeDelta, Utc};
use eg_project::TimestepsDef;

use crate::error::{DerError, DerResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timesteps {
    start: DateTime<Utc>,
    interval: TimeDelta,
    count: usize,
}

impl Timesteps {
    pub fn new(start: DateTime<Utc>, interval: TimeDelta, count: usize) -> DerResult<Self> {
        if interval <= TimeDelta::zero() {
            return Err(DerError::InvalidTimesteps {
                reason: format!("interval must be positive, got {interval}"),
            });
        }
        if count == 0 {
            return Err(DerError::InvalidTimesteps {
                reason: "at least one timestep is required".to_string(),
            });
        }
        Ok(Self {
            start,
            interval,
            count,
        })
    }

    pub fn from_def(def: &TimestepsDef) -> DerResult<Self> {
        let interval = TimeDelta::try_seconds(def.interval_s).ok_or_else(|| {
            DerError::InvalidTimesteps {
                reason: format!("interval of {} s is out of range", def.interval_s),
            }
        })?;
        Self::new(def.start, interval, def.count)
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn interval(&self) -> TimeDelta {
        self.interval
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Timestamp of step `t`, `None` past the end.
    pub fn get(&self, t: usize) -> Option<DateTime<Utc>> {
        if t >= self.count {
            return None;
        }
        let offset = self.interval.checked_mul(i32::try_from(t).ok()?)?;
        self.start.checked_add_signed(offset)
    }

    pub fn iter(&self) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        (0..self.count).map_while(|t| self.get(t))
    }

    /// Last timestamp.
    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.get(self.count - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn timestamps_are_uniform() {
        let ts = Timesteps::new(start(), TimeDelta::minutes(15), 4).unwrap();
        let stamps: Vec<_> = ts.iter().collect();
        assert_eq!(stamps.len(), 4);
        assert_eq!(stamps[1] - stamps[0], TimeDelta::minutes(15));
        assert_eq!(ts.end(), Some(start() + TimeDelta::minutes(45)));
        assert_eq!(ts.get(4), None);
    }

    #[test]
    fn from_def_converts_seconds() {
        let def = TimestepsDef {
            start: start(),
            interval_s: 3600,
            count: 24,
        };
        let ts = Timesteps::from_def(&def).unwrap();
        assert_eq!(ts.interval(), TimeDelta::hours(1));
        assert_eq!(ts.len(), 24);
    }

    #[test]
    fn degenerate_grids_rejected() {
        assert!(Timesteps::new(start(), TimeDelta::zero(), 3).is_err());
        assert!(Timesteps::new(start(), TimeDelta::seconds(60), 0).is_err());
    }
}
