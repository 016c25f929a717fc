//! # Guarded Dispatch
//!
//! Pattern-matched branching. Each [`Case`] matches its pattern against the
//! local part of the scope; the branch runs on the variables the pattern
//! extracted and its result is weighted by the match confidence. Results of
//! all branches that ran are summed structurally, so soft inputs blend the
//! branches they partially match. A branch that tail-calls adds nothing to
//! the sum; the layer hands the tail call on only when no branch produced a
//! value.
//!
//! ```text
//!   bag ──split(pointer)──▶ before | after
//!                                   │ pattern.get_trees
//!                                   ▼
//!            before ++ extracted ──▶ case net ──▶ × confidence ──▶ Σ
//! ```

use structnet_tree::TensorTree;

use crate::data::{DataBag, DataPointer};
use crate::error::RuntimeError;
use crate::network::{Evaluation, NetRef, Network};
use crate::pattern::{Match, Pattern};

/// Default confidence a case needs in at least one row to run.
pub const DEFAULT_GUARD_THRESHOLD: f32 = 1e-3;

/// One branch of a guarded layer.
#[derive(Debug, Clone)]
pub struct Case {
    pattern: Pattern,
    net: NetRef,
    threshold: f32,
    select_rows: bool,
}

enum Outcome {
    NoMatch,
    BelowThreshold,
    Ran(Evaluation),
}

impl Case {
    pub fn new(pattern: Pattern, net: NetRef) -> Self {
        Self {
            pattern,
            net,
            threshold: DEFAULT_GUARD_THRESHOLD,
            select_rows: false,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Run the branch only on the rows whose confidence clears the
    /// threshold; the other rows of its result are zero.
    pub fn with_select_rows(mut self, select_rows: bool) -> Self {
        self.select_rows = select_rows;
        self
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    fn run(&self, bag: &DataBag, pointer: DataPointer) -> Result<Outcome, RuntimeError> {
        let (before, after) = bag.split(pointer)?;
        let Some(Match {
            confidence,
            extracted,
        }) = self.pattern.get_trees(after.data())?
        else {
            return Ok(Outcome::NoMatch);
        };

        let mask = confidence.row_mask(|c| c > self.threshold);
        tracing::trace!(
            pattern = ?self.pattern,
            confidence = ?confidence.data(),
            "case confidence"
        );
        if !mask.iter().any(|&m| m) {
            return Ok(Outcome::BelowThreshold);
        }

        let args = DataBag::from_slots(extracted, after.nets().to_vec(), bag.size())?;
        if self.select_rows && mask.iter().any(|&m| !m) {
            let scope = before.select_rows(&mask)?.append(&args.select_rows(&mask)?)?;
            return match self.net.forward(&scope)? {
                Evaluation::Ready(tree) => Ok(Outcome::Ran(
                    tree.expand_rows(&mask)?.cmul(&confidence)?.into(),
                )),
                Evaluation::TailCall(_) => Err(RuntimeError::PartialTailCall),
            };
        }

        let scope = before.append(&args)?;
        match self.net.forward(&scope)? {
            Evaluation::Ready(tree) => Ok(Outcome::Ran(tree.cmul(&confidence)?.into())),
            tail => Ok(Outcome::Ran(tail)),
        }
    }
}

/// Dispatch over a list of cases with a fallback for inputs no case matches.
#[derive(Debug, Clone)]
pub struct GuardedLayer {
    cases: Vec<Case>,
    mismatch_handler: NetRef,
    pointer: DataPointer,
}

impl GuardedLayer {
    pub fn new(cases: Vec<Case>, mismatch_handler: NetRef, pointer: DataPointer) -> Self {
        Self {
            cases,
            mismatch_handler,
            pointer,
        }
    }

    pub fn cases(&self) -> &[Case] {
        &self.cases
    }
}

impl Network for GuardedLayer {
    fn forward(&self, bag: &DataBag) -> Result<Evaluation, RuntimeError> {
        let mut total: Option<TensorTree> = None;
        let mut tail: Option<DataBag> = None;
        let mut matched = 0;

        for case in &self.cases {
            match case.run(bag, self.pointer)? {
                Outcome::NoMatch => {}
                Outcome::BelowThreshold => matched += 1,
                Outcome::Ran(Evaluation::Ready(tree)) => {
                    total = Some(match total {
                        Some(sum) => sum.add(&tree)?,
                        None => tree,
                    });
                }
                // a tail call contributes no value; only the newest
                // arguments are kept
                Outcome::Ran(Evaluation::TailCall(args)) => tail = Some(args),
            }
        }

        match (total, tail) {
            (Some(tree), _) => Ok(tree.into()),
            (None, Some(args)) => Ok(Evaluation::TailCall(args)),
            (None, None) => {
                tracing::debug!(
                    cases = self.cases.len(),
                    matched,
                    handler = self.mismatch_handler.name(),
                    "no case cleared its threshold, running mismatch handler"
                );
                self.mismatch_handler.forward(bag)
            }
        }
    }

    fn pointer(&self) -> DataPointer {
        self.pointer
    }

    fn name(&self) -> &'static str {
        "GuardedLayer"
    }
}
