//! ---
//! gpm_section: "02-power-management"
//! gpm_subsection: "module"
//! gpm_type: "source"
//! gpm_scope: "code"
//! gpm_description: "Power-transition orchestration and client-object replay."
//! gpm_version: "v0.0.0-prealpha"
//! gpm_owner: "tbd"
//! ---
//! Fallible step sequences.
//!
//! Neither strategy unwinds completed steps. [`ShortCircuit`] stops at the first failure and
//! hands it back immediately; [`BestEffortSweep`] runs every step and reports the first
//! failure once the sweep is over.

use std::fmt::Display;

use tracing::{debug, warn};

use crate::status::{RmError, RmResult};

/// Stop at the first failing step.
#[derive(Debug, Default)]
pub struct ShortCircuit {
    completed: usize,
}

impl ShortCircuit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run one step, returning its error so the caller can bail out with `?`.
    pub fn step<L, F>(&mut self, label: L, run: F) -> RmResult<()>
    where
        L: Display,
        F: FnOnce() -> RmResult<()>,
    {
        if let Err(err) = run() {
            debug!(step = %label, completed = self.completed, %err, "sequence aborted");
            return Err(err);
        }
        self.completed += 1;
        Ok(())
    }

    /// Number of steps that succeeded so far.
    pub fn completed(&self) -> usize {
        self.completed
    }
}

/// Run every step and remember the first failure.
#[derive(Debug, Default)]
pub struct BestEffortSweep {
    attempted: usize,
    failed: usize,
    first_error: Option<RmError>,
}

impl BestEffortSweep {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step<L, F>(&mut self, label: L, run: F)
    where
        L: Display,
        F: FnOnce() -> RmResult<()>,
    {
        self.attempted += 1;
        if let Err(err) = run() {
            warn!(step = %label, %err, "step failed; continuing sweep");
            self.failed += 1;
            self.first_error.get_or_insert(err);
        }
    }

    pub fn attempted(&self) -> usize {
        self.attempted
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    pub fn finish(self) -> RmResult<()> {
        match self.first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_circuit_stops_at_first_failure() {
        let mut ran = Vec::new();
        let mut seq = ShortCircuit::new();
        let result = (0..4).try_for_each(|i| {
            seq.step(i, || {
                ran.push(i);
                if i == 1 {
                    Err(RmError::Timeout)
                } else {
                    Ok(())
                }
            })
        });
        assert_eq!(result, Err(RmError::Timeout));
        assert_eq!(ran, vec![0, 1]);
        assert_eq!(seq.completed(), 1);
    }

    #[test]
    fn sweep_runs_everything_and_keeps_first_error() {
        let mut ran = Vec::new();
        let mut sweep = BestEffortSweep::new();
        for (i, status) in [Ok(()), Err(RmError::Busy), Err(RmError::Generic), Ok(())]
            .into_iter()
            .enumerate()
        {
            sweep.step(i, || {
                ran.push(i);
                status
            });
        }
        assert_eq!(ran, vec![0, 1, 2, 3]);
        assert_eq!(sweep.attempted(), 4);
        assert_eq!(sweep.failed(), 2);
        assert_eq!(sweep.finish(), Err(RmError::Busy));
    }
}
