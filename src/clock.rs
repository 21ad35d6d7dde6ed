//! Time source and market calendar
//!
//! Everything that depends on "now" takes a [`Clock`] so the supervisor and
//! the scheduled jobs can be driven with synthetic time in tests.

use crate::config::MarketConfig;
use crate::error::{Result, VigilError};
use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Timelike, Utc, Weekday,
};
use std::collections::HashSet;
use std::sync::Mutex;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;
}

/// Wall clock expressed in the market's UTC offset
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.offset)
    }
}

/// Manually advanced clock
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<FixedOffset>>,
}

impl FixedClock {
    pub fn new(now: DateTime<FixedOffset>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<FixedOffset>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Where a moment falls relative to the trading session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayPhase {
    /// Trading day, before the open
    PreOpen,
    Open,
    /// Trading day, after the close
    PostClose,
    /// Weekend or exchange holiday
    NonTradingDay,
}

impl DayPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            DayPhase::PreOpen => "pre-open",
            DayPhase::Open => "open",
            DayPhase::PostClose => "post-close",
            DayPhase::NonTradingDay => "non-trading day",
        }
    }
}

#[derive(Debug, Clone)]
pub struct MarketCalendar {
    open: NaiveTime,
    close: NaiveTime,
    offset: FixedOffset,
    trading_days: HashSet<Weekday>,
    holidays: HashSet<NaiveDate>,
}

impl MarketCalendar {
    pub fn from_config(config: &MarketConfig) -> Result<Self> {
        let open = config.open_time().map_err(VigilError::InvalidConfig)?;
        let close = config.close_time().map_err(VigilError::InvalidConfig)?;
        let offset = FixedOffset::east_opt(config.utc_offset_minutes * 60).ok_or_else(|| {
            VigilError::InvalidConfig(format!(
                "utc_offset_minutes out of range: {}",
                config.utc_offset_minutes
            ))
        })?;

        let mut trading_days = HashSet::new();
        for day in &config.trading_days {
            let weekday = day
                .parse::<Weekday>()
                .map_err(|_| VigilError::InvalidConfig(format!("unknown weekday '{day}'")))?;
            trading_days.insert(weekday);
        }

        Ok(Self {
            open,
            close,
            offset,
            trading_days,
            holidays: config.holidays.iter().copied().collect(),
        })
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        self.trading_days.contains(&date.weekday()) && !self.holidays.contains(&date)
    }

    /// Open is inclusive, close is exclusive
    pub fn is_open(&self, now: DateTime<FixedOffset>) -> bool {
        self.phase(now) == DayPhase::Open
    }

    pub fn phase(&self, now: DateTime<FixedOffset>) -> DayPhase {
        let local = now.with_timezone(&self.offset);
        if !self.is_trading_day(local.date_naive()) {
            return DayPhase::NonTradingDay;
        }

        let time = local.time();
        if time < self.open {
            DayPhase::PreOpen
        } else if time < self.close {
            DayPhase::Open
        } else {
            DayPhase::PostClose
        }
    }

    /// Calendar date in market time
    pub fn local_date(&self, now: DateTime<FixedOffset>) -> NaiveDate {
        now.with_timezone(&self.offset).date_naive()
    }
}

/// Hour bucket for alert rate limiting, `YYYYMMDDHH` in the offset of `at`
///
/// Clocks report market-local time, so keys from `Clock::now` are in
/// market time.
pub fn hour_key(at: DateTime<FixedOffset>) -> u64 {
    at.year() as u64 * 1_000_000
        + at.month() as u64 * 10_000
        + at.day() as u64 * 100
        + at.hour() as u64
}
