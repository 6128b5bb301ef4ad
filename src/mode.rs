//! Execution mode and the precedence rules that pick it
//!
//! The CLI exposes both an explicit `--mode` and three shorthand flags. They
//! are folded into one [`ExecutionMode`] by fixed precedence:
//! `--fwd-no-grad` beats `--bwd`, which beats `--fwd-bwd`, which beats
//! `--mode`. Contradictory combinations are not rejected; scripts depend on
//! the tie-break.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which pass(es) of an operator are measured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Forward pass
    #[default]
    #[value(name = "fwd")]
    Fwd,
    /// Backward pass only
    #[value(name = "bwd")]
    Bwd,
    /// Forward followed by backward
    #[value(name = "fwd_bwd")]
    FwdBwd,
    /// Forward pass without gradient bookkeeping
    #[value(name = "fwd_no_grad")]
    FwdNoGrad,
}

impl ExecutionMode {
    /// All modes, in declaration order
    pub fn all() -> [ExecutionMode; 4] {
        [
            ExecutionMode::Fwd,
            ExecutionMode::Bwd,
            ExecutionMode::FwdBwd,
            ExecutionMode::FwdNoGrad,
        ]
    }

    /// Short name used on the command line and in reports
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Fwd => "fwd",
            ExecutionMode::Bwd => "bwd",
            ExecutionMode::FwdBwd => "fwd_bwd",
            ExecutionMode::FwdNoGrad => "fwd_no_grad",
        }
    }

    /// Whether the forward pass is timed
    pub fn runs_forward(&self) -> bool {
        !matches!(self, ExecutionMode::Bwd)
    }

    /// Whether the backward pass is timed
    pub fn runs_backward(&self) -> bool {
        matches!(self, ExecutionMode::Bwd | ExecutionMode::FwdBwd)
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The raw mode inputs before precedence is applied
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeOverrides {
    /// `--bwd`
    pub bwd: bool,
    /// `--fwd-bwd`
    pub fwd_bwd: bool,
    /// `--fwd-no-grad`
    pub fwd_no_grad: bool,
}

impl ModeOverrides {
    /// Fold the override flags onto `base`.
    ///
    /// Checked in a fixed order and the last set flag wins.
    pub fn resolve(&self, base: ExecutionMode) -> ExecutionMode {
        let mut mode = base;
        if self.fwd_bwd {
            mode = ExecutionMode::FwdBwd;
        }
        if self.bwd {
            mode = ExecutionMode::Bwd;
        }
        if self.fwd_no_grad {
            mode = ExecutionMode::FwdNoGrad;
        }
        mode
    }

    /// True when at least one override flag is set
    pub fn any(&self) -> bool {
        self.bwd || self.fwd_bwd || self.fwd_no_grad
    }
}
