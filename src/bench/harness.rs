//! Timing of the benchmark query across optimization levels.

use super::levels::{OptimizationLevel, TopAnswer};
use anyhow::Result;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BenchError {
    #[error("at least one trial is required")]
    NoTrials,

    #[error("{target} at {level}: {query} returned no result")]
    EmptyResult {
        target: &'static str,
        level: OptimizationLevel,
        query: &'static str,
    },

    #[error("{target} at {level}: {query} overflowed the integer sales total")]
    SalesOverflow {
        target: &'static str,
        level: OptimizationLevel,
        query: &'static str,
    },

    #[error("answer mismatch: {reference_level} returned {reference}, {level} returned {actual}")]
    AnswerMismatch {
        reference_level: OptimizationLevel,
        reference: TopAnswer,
        level: OptimizationLevel,
        actual: TopAnswer,
    },
}

/// A store the benchmark can drive through the optimization levels.
pub trait BenchTarget {
    /// Connection used for one trial; released when dropped.
    type Session;

    fn name(&self) -> &'static str;

    fn connect(&self) -> Result<Self::Session>;

    /// Bring the store into the state of `level`, dropping whatever higher
    /// levels built.
    fn prepare(&self, level: OptimizationLevel) -> Result<()>;

    fn answer(&self, session: &mut Self::Session, level: OptimizationLevel) -> Result<TopAnswer>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LevelAnswer {
    pub level: OptimizationLevel,
    pub answer: TopAnswer,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LevelReport {
    pub level: OptimizationLevel,
    pub answer: TopAnswer,
    pub trials: usize,
    pub mean_latency: Duration,
}

/// Mean latency of the query at `level` over `trials` runs. Each trial opens
/// its own session; only the query itself is timed.
pub fn measure<T: BenchTarget>(target: &T, level: OptimizationLevel, trials: usize) -> Result<Duration> {
    if trials == 0 {
        return Err(BenchError::NoTrials.into());
    }

    let mut total = Duration::ZERO;
    for trial in 0..trials {
        let mut session = target.connect()?;
        let started = Instant::now();
        let _ = target.answer(&mut session, level)?;
        let elapsed = started.elapsed();
        debug!("{} {} trial {}: {:?}", target.name(), level, trial, elapsed);
        total += elapsed;
    }
    Ok(total.div_f64(trials as f64))
}

/// Fails unless every level produced the same answer as the first one.
pub fn verify_agreement(answers: &[LevelAnswer]) -> Result<(), BenchError> {
    let Some(reference) = answers.first() else {
        return Ok(());
    };
    for other in &answers[1..] {
        if other.answer != reference.answer {
            return Err(BenchError::AnswerMismatch {
                reference_level: reference.level,
                reference: reference.answer.clone(),
                level: other.level,
                actual: other.answer.clone(),
            });
        }
    }
    Ok(())
}

/// Prepare each level in turn, check that it answers like the levels before
/// it, then time it.
pub fn run_ladder<T: BenchTarget>(target: &T, trials: usize) -> Result<Vec<LevelReport>> {
    if trials == 0 {
        return Err(BenchError::NoTrials.into());
    }

    let mut answers = Vec::with_capacity(OptimizationLevel::ALL.len());
    let mut reports = Vec::with_capacity(OptimizationLevel::ALL.len());
    for level in OptimizationLevel::ALL {
        target.prepare(level)?;

        let answer = {
            let mut session = target.connect()?;
            target.answer(&mut session, level)?
        };
        answers.push(LevelAnswer {
            level,
            answer: answer.clone(),
        });
        verify_agreement(&answers)?;

        let mean_latency = measure(target, level, trials)?;
        info!(
            "{} {}: {} (mean of {} trials: {:?})",
            target.name(),
            level,
            answer,
            trials,
            mean_latency
        );
        reports.push(LevelReport {
            level,
            answer,
            trials,
            mean_latency,
        });
    }
    Ok(reports)
}
