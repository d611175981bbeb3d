use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, Offset, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// One hour of the external weather feed, keyed by local calendar hour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherHour {
    pub time: NaiveDateTime,
    pub temperature: f64,
    pub humidity: f64,
    #[serde(default)]
    pub precipitation: f64,
    #[serde(default)]
    pub weather_code: u16,
    #[serde(default)]
    pub direct_radiation: f64,
    #[serde(default)]
    pub diffuse_radiation: f64,
}

impl WeatherHour {
    pub fn ambient(&self) -> AmbientSample {
        AmbientSample {
            temperature: self.temperature,
            humidity: self.humidity,
            light: self.direct_radiation + self.diffuse_radiation,
            precipitation: self.precipitation,
        }
    }
}

/// Raw conditions before location damping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AmbientSample {
    pub temperature: f64,
    pub humidity: f64,
    pub light: f64,
    pub precipitation: f64,
}

/// A cached hourly series for one user, plus the offset its keys are in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeatherSeries {
    #[serde(default)]
    pub utc_offset_minutes: i32,
    #[serde(default)]
    pub hours: Vec<WeatherHour>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeatherSegment<'a> {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub hour: &'a WeatherHour,
}

impl WeatherSeries {
    pub fn new(utc_offset_minutes: i32, mut hours: Vec<WeatherHour>) -> Self {
        hours.sort_by_key(|h| h.time);
        Self {
            utc_offset_minutes,
            hours,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hours.is_empty()
    }

    fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .unwrap_or_else(|| Utc.fix())
    }

    /// Local calendar hour containing `at`.
    pub fn local_hour(&self, at: DateTime<Utc>) -> NaiveDateTime {
        let local = at.with_timezone(&self.offset()).naive_local();
        local
            .with_minute(0)
            .and_then(|t| t.with_second(0))
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(local)
    }

    /// Entry for the hour containing `at`, or the nearest available one.
    pub fn hour_at(&self, at: DateTime<Utc>) -> Option<&WeatherHour> {
        let key = self.local_hour(at);
        match self.hours.binary_search_by_key(&key, |h| h.time) {
            Ok(index) => self.hours.get(index),
            Err(index) => {
                let before = index.checked_sub(1).and_then(|i| self.hours.get(i));
                let after = self.hours.get(index);
                match (before, after) {
                    (Some(b), Some(a)) => {
                        if key - b.time <= a.time - key {
                            Some(b)
                        } else {
                            Some(a)
                        }
                    }
                    (Some(b), None) => Some(b),
                    (None, Some(a)) => Some(a),
                    (None, None) => None,
                }
            }
        }
    }

    /// Splits `[from, to)` at local hour boundaries, pairing each piece with
    /// the entry for that hour.
    pub fn segments(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<WeatherSegment<'_>> {
        let mut segments = Vec::new();
        if to <= from || self.hours.is_empty() {
            return segments;
        }
        let mut cursor = from;
        while cursor < to {
            let hour_start_local = self.local_hour(cursor);
            let offset_in_hour =
                cursor.with_timezone(&self.offset()).naive_local() - hour_start_local;
            let boundary = cursor + (Duration::hours(1) - offset_in_hour);
            let end = boundary.min(to);
            if let Some(hour) = self.hour_at(cursor) {
                segments.push(WeatherSegment {
                    from: cursor,
                    to: end,
                    hour,
                });
            }
            cursor = end;
        }
        segments
    }
}
