//! Optimization levels, query windows and the answer both models must agree on.

use crate::temporal::CalendarDate;
use std::fmt;

/// Cumulative optimization levels. Each level keeps what the previous one built.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OptimizationLevel {
    /// No secondary indexes and no precomputed data.
    Baseline,
    /// Lookup indexes on the filtered and joined fields.
    Indexed,
    /// Per band window sales computed ahead of time.
    Precomputed,
    /// The final answer computed ahead of time.
    FullyPrecomputed,
}

impl OptimizationLevel {
    pub const ALL: [OptimizationLevel; 4] = [
        OptimizationLevel::Baseline,
        OptimizationLevel::Indexed,
        OptimizationLevel::Precomputed,
        OptimizationLevel::FullyPrecomputed,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            OptimizationLevel::Baseline => "L0 baseline",
            OptimizationLevel::Indexed => "L1 indexed",
            OptimizationLevel::Precomputed => "L2 precomputed",
            OptimizationLevel::FullyPrecomputed => "L3 fully precomputed",
        }
    }

    /// Whether this level includes everything `other` builds.
    pub fn includes(&self, other: OptimizationLevel) -> bool {
        *self >= other
    }
}

impl fmt::Display for OptimizationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Half-open date range `[start, end)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeWindow {
    pub label: &'static str,
    pub start: CalendarDate,
    pub end: CalendarDate,
}

fn date(year: i32, month: u32, day: u32) -> CalendarDate {
    CalendarDate::from_ymd(year, month, day).expect("window bounds are valid dates")
}

impl TimeWindow {
    pub fn early_decade() -> Self {
        TimeWindow {
            label: "early_decade",
            start: date(1990, 1, 1),
            end: date(2000, 1, 1),
        }
    }

    pub fn late_decade() -> Self {
        TimeWindow {
            label: "late_decade",
            start: date(2010, 1, 1),
            end: date(2020, 1, 1),
        }
    }

    pub fn all() -> [TimeWindow; 2] {
        [TimeWindow::early_decade(), TimeWindow::late_decade()]
    }

    pub fn contains(&self, day: CalendarDate) -> bool {
        self.start <= day && day < self.end
    }
}

/// Result of the benchmark query: the best selling genre in the early window,
/// then the best selling band of that genre in the late window.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TopAnswer {
    pub genre: String,
    pub band_url: String,
}

impl fmt::Display for TopAnswer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "genre {} / band {}", self.genre, self.band_url)
    }
}
