//! Periodic schedules, queues and the default beat table.

use chrono::{DateTime, Datelike, Duration, DurationRound, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Named priority queues, drained high to low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Queue {
    HighPriority,
    #[default]
    MediumPriority,
    LowPriority,
}

impl Queue {
    pub const ALL: [Queue; 3] = [Queue::HighPriority, Queue::MediumPriority, Queue::LowPriority];

    pub fn as_str(&self) -> &'static str {
        match self {
            Queue::HighPriority => "high_priority",
            Queue::MediumPriority => "medium_priority",
            Queue::LowPriority => "low_priority",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            Queue::HighPriority => 0,
            Queue::MediumPriority => 1,
            Queue::LowPriority => 2,
        }
    }
}

impl fmt::Display for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Queue {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Queue::ALL
            .iter()
            .find(|q| q.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown queue '{s}'"))
    }
}

fn one() -> u32 {
    1
}

/// When a periodic job fires, at minute resolution in UTC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Schedule {
    /// Minutes of the hour divisible by `minutes` (`*/15`).
    Every { minutes: u32 },
    /// At `minute` of every `every_hours`-th hour.
    Hourly {
        minute: u32,
        #[serde(default = "one")]
        every_hours: u32,
    },
    Daily { hour: u32, minute: u32 },
    /// `weekday` is a name such as "mon" or "monday".
    Weekly { weekday: String, hour: u32, minute: u32 },
}

impl Schedule {
    pub fn validate(&self) -> Result<(), String> {
        let check_minute = |m: u32| {
            if m < 60 {
                Ok(())
            } else {
                Err(format!("minute {m} out of range 0-59"))
            }
        };
        let check_hour = |h: u32| {
            if h < 24 {
                Ok(())
            } else {
                Err(format!("hour {h} out of range 0-23"))
            }
        };
        match self {
            Schedule::Every { minutes } => {
                if *minutes == 0 || *minutes > 60 {
                    return Err("minutes must be between 1 and 60".into());
                }
                Ok(())
            }
            Schedule::Hourly { minute, every_hours } => {
                check_minute(*minute)?;
                if *every_hours == 0 || *every_hours > 24 {
                    return Err("every_hours must be between 1 and 24".into());
                }
                Ok(())
            }
            Schedule::Daily { hour, minute } => {
                check_hour(*hour)?;
                check_minute(*minute)
            }
            Schedule::Weekly {
                weekday,
                hour,
                minute,
            } => {
                Weekday::from_str(weekday).map_err(|_| format!("unknown weekday '{weekday}'"))?;
                check_hour(*hour)?;
                check_minute(*minute)
            }
        }
    }

    /// Whether the schedule fires in the minute containing `at`.
    pub fn matches(&self, at: DateTime<Utc>) -> bool {
        let (hour, minute) = (at.hour(), at.minute());
        match self {
            Schedule::Every { minutes } => *minutes > 0 && minute % minutes == 0,
            Schedule::Hourly {
                minute: m,
                every_hours,
            } => *every_hours > 0 && minute == *m && hour % every_hours == 0,
            Schedule::Daily { hour: h, minute: m } => hour == *h && minute == *m,
            Schedule::Weekly {
                weekday,
                hour: h,
                minute: m,
            } => Weekday::from_str(weekday).is_ok_and(|d| at.weekday() == d) && hour == *h && minute == *m,
        }
    }

    /// First firing minute strictly after `after`. `None` for invalid schedules.
    pub fn next_run(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.validate().is_err() {
            return None;
        }
        let mut candidate = after.duration_trunc(Duration::minutes(1)).ok()? + Duration::minutes(1);
        // A weekly schedule repeats within 7 days.
        for _ in 0..(8 * 24 * 60) {
            if self.matches(candidate) {
                return Some(candidate);
            }
            candidate += Duration::minutes(1);
        }
        None
    }
}

/// One entry of the periodic schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub name: String,
    /// Registered task to run.
    pub task: String,
    #[serde(default)]
    pub queue: Queue,
    pub schedule: Schedule,
}

impl JobSpec {
    fn new(name: &str, task: &str, queue: Queue, schedule: Schedule) -> Self {
        Self {
            name: name.to_string(),
            task: task.to_string(),
            queue,
            schedule,
        }
    }
}

pub fn default_beat_schedule() -> Vec<JobSpec> {
    use Queue::*;
    let hourly = |every_hours| Schedule::Hourly {
        minute: 0,
        every_hours,
    };
    let daily = |hour| Schedule::Daily { hour, minute: 0 };
    vec![
        JobSpec::new("send-care-reminders", "send_care_reminders", HighPriority, Schedule::Every { minutes: 15 }),
        JobSpec::new("check-plant-health", "check_plant_health", MediumPriority, Schedule::Every { minutes: 30 }),
        JobSpec::new("update-weather-data", "update_weather_data", MediumPriority, hourly(1)),
        JobSpec::new("rotate-api-usage", "rotate_api_usage", MediumPriority, hourly(1)),
        JobSpec::new("expire-subscriptions", "expire_subscriptions", MediumPriority, hourly(1)),
        JobSpec::new("process-analytics", "process_analytics", LowPriority, hourly(6)),
        JobSpec::new("cleanup-old-data", "cleanup_old_data", LowPriority, daily(2)),
        JobSpec::new("generate-daily-reports", "generate_daily_reports", LowPriority, daily(6)),
        JobSpec::new(
            "send-weekly-summaries",
            "send_weekly_summaries",
            MediumPriority,
            Schedule::Weekly {
                weekday: "mon".into(),
                hour: 8,
                minute: 0,
            },
        ),
        JobSpec::new("update-plant-library", "update_plant_library", LowPriority, daily(3)),
        JobSpec::new("process-milestones", "process_milestones", MediumPriority, hourly(2)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_every_matches_divisible_minutes() {
        let s = Schedule::Every { minutes: 15 };
        assert!(s.matches(at(2024, 5, 1, 10, 45)));
        assert!(!s.matches(at(2024, 5, 1, 10, 46)));
        assert_eq!(s.next_run(at(2024, 5, 1, 10, 46)), Some(at(2024, 5, 1, 11, 0)));
    }

    #[test]
    fn test_hourly_every_six() {
        let s = Schedule::Hourly {
            minute: 0,
            every_hours: 6,
        };
        assert!(s.matches(at(2024, 5, 1, 12, 0)));
        assert!(!s.matches(at(2024, 5, 1, 13, 0)));
        assert_eq!(s.next_run(at(2024, 5, 1, 12, 0)), Some(at(2024, 5, 1, 18, 0)));
    }

    #[test]
    fn test_weekly_monday() {
        let s = Schedule::Weekly {
            weekday: "mon".into(),
            hour: 8,
            minute: 0,
        };
        // 2024-05-01 is a Wednesday.
        assert_eq!(s.next_run(at(2024, 5, 1, 9, 0)), Some(at(2024, 5, 6, 8, 0)));
        assert!(s.matches(at(2024, 5, 6, 8, 0)));
    }

    #[test]
    fn test_validation() {
        assert!(Schedule::Every { minutes: 0 }.validate().is_err());
        assert!(Schedule::Daily { hour: 24, minute: 0 }.validate().is_err());
        assert!(Schedule::Weekly {
            weekday: "funday".into(),
            hour: 1,
            minute: 0
        }
        .validate()
        .is_err());
        assert!(default_beat_schedule().iter().all(|j| j.schedule.validate().is_ok()));
    }

    #[test]
    fn test_spec_toml_shape() {
        let spec: JobSpec = toml::from_str(
            r#"
            name = "nightly"
            task = "cleanup_old_data"
            queue = "low_priority"
            schedule = { kind = "daily", hour = 2, minute = 30 }
            "#,
        )
        .unwrap();
        assert_eq!(spec.queue, Queue::LowPriority);
        assert_eq!(spec.schedule, Schedule::Daily { hour: 2, minute: 30 });

        let spec: JobSpec = toml::from_str(
            r#"
            name = "h"
            task = "t"
            schedule = { kind = "hourly", minute = 5 }
            "#,
        )
        .unwrap();
        assert_eq!(spec.queue, Queue::MediumPriority);
        assert!(matches!(spec.schedule, Schedule::Hourly { every_hours: 1, .. }));
    }
}
