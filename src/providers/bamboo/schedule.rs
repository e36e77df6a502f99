use chrono::{DateTime, Duration, NaiveTime, Timelike, Utc};
use chrono_tz::Tz;
use indexmap::IndexMap;

use crate::config::{EnvironmentConfig, ScheduleConfig};
use crate::error::{ReleaseBotError, Result};

/// A daily run time of an environment, optionally named after the
/// deployment window it serves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSlot {
    pub at: NaiveTime,
    pub label: Option<String>,
}

/// A deployment target: its CI plan and its ordered daily run slots.
#[derive(Debug, Clone)]
pub struct Environment {
    pub name: String,
    pub plan: String,
    slots: Vec<RunSlot>,
}

/// Prediction of the next scheduled run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextRun {
    /// Time left until the run starts
    pub wait: Duration,
    /// Local wall-clock time of the run
    pub at: NaiveTime,
    /// The run is on the following day
    pub tomorrow: bool,
}

impl Environment {
    fn from_config(name: &str, config: &EnvironmentConfig) -> Result<Self> {
        let mut slots = config
            .runs
            .iter()
            .map(|run| {
                Ok(RunSlot {
                    at: parse_slot_time(&run.at).ok_or_else(|| {
                        ReleaseBotError::Config(format!(
                            "Invalid run time '{}' for environment {name}",
                            run.at
                        ))
                    })?,
                    label: run.label.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        slots.sort_by_key(|slot| slot.at);

        Ok(Self {
            name: name.to_string(),
            plan: config.plan.clone(),
            slots,
        })
    }

    pub fn slots(&self) -> &[RunSlot] {
        &self.slots
    }

    /// Finds the next slot at or after `now`, wrapping to the first slot of
    /// the next day once every slot of today has passed.
    ///
    /// With a `label`, only slots carrying that label are considered.
    /// Returns `None` when no slot qualifies at all.
    pub fn next_run(&self, now: NaiveTime, label: Option<&str>) -> Option<NextRun> {
        let mut candidates = self
            .slots
            .iter()
            .filter(|slot| label.is_none_or(|label| slot.label.as_deref() == Some(label)))
            .peekable();

        let first = *candidates.peek()?;
        // Sub-second precision is irrelevant for a daily schedule
        let now = now.with_nanosecond(0).unwrap_or(now);

        if let Some(slot) = candidates.find(|slot| slot.at >= now) {
            return Some(NextRun {
                wait: slot.at.signed_duration_since(now),
                at: slot.at,
                tomorrow: false,
            });
        }

        Some(NextRun {
            wait: Duration::hours(24) - now.signed_duration_since(first.at),
            at: first.at,
            tomorrow: true,
        })
    }
}

fn parse_slot_time(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .ok()
}

/// Immutable table of environments, built once at start-up and shared by the
/// resolvers.
#[derive(Debug, Clone)]
pub struct EnvironmentTable {
    timezone: Tz,
    environments: IndexMap<String, Environment>,
}

impl EnvironmentTable {
    pub fn from_config(config: &ScheduleConfig) -> Result<Self> {
        let timezone: Tz = config.timezone.parse().map_err(|e| {
            ReleaseBotError::Config(format!("Invalid timezone '{}': {e}", config.timezone))
        })?;

        let environments = config
            .environments
            .iter()
            .map(|(name, env)| Ok((name.clone(), Environment::from_config(name, env)?)))
            .collect::<Result<IndexMap<_, _>>>()?;

        Ok(Self {
            timezone,
            environments,
        })
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn get(&self, name: &str) -> Result<&Environment> {
        self.environments
            .get(name)
            .ok_or_else(|| ReleaseBotError::UnknownEnvironment(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.environments.keys().map(String::as_str)
    }

    /// Time until the environment's next scheduled run, seen from `now`.
    pub fn predict_next_run(&self, name: &str, now: DateTime<Utc>) -> Result<Option<NextRun>> {
        let local = now.with_timezone(&self.timezone).time();
        Ok(self.get(name)?.next_run(local, None))
    }

    /// Like [`predict_next_run`](Self::predict_next_run), restricted to the
    /// slots named `label`.
    pub fn predict_next_named_run(
        &self,
        name: &str,
        label: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<NextRun>> {
        let local = now.with_timezone(&self.timezone).time();
        Ok(self.get(name)?.next_run(local, Some(label)))
    }
}
