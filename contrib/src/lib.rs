//! Contribution accumulation: named modifiers (material groups), per-bin
//! double-precision accumulators, and periodic flushing to output sinks.

use std::collections::HashMap;

use radiometry::{Color, DColor};
use thiserror::Error;

pub mod expr;
pub mod output;

pub use expr::{BinContext, Expr, ExprError};
pub use output::{OutputError, OutputFormat, OutputSpec, SharedBuffer, SinkTable};

#[derive(Debug, Error)]
pub enum ContribError {
    #[error("duplicate modifier '{0}'")]
    DuplicateModifier(String),
    #[error("unspecified or illegal bin count {count} for modifier '{name}'")]
    InvalidBinCount { name: String, count: i64 },
    #[error("illegal non-zero constant bin expression for modifier '{0}'")]
    NonZeroConstant(String),
    #[error(transparent)]
    Expr(#[from] ExprError),
    #[error(transparent)]
    Output(#[from] OutputError),
}

/// One tracked modifier: where its records go, how rays map to bins, and the
/// growing bin accumulators.
pub struct ModContrib {
    name: String,
    out_spec: OutputSpec,
    sink_key: Option<String>,
    bin_expr: Expr,
    bins: Vec<DColor>,
}

impl ModContrib {
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn nbins(&self) -> usize {
        self.bins.len()
    }
    pub fn bins(&self) -> &[DColor] {
        &self.bins
    }
    pub fn out_spec(&self) -> &OutputSpec {
        &self.out_spec
    }

    /// Maps a hit context to this modifier's bin index, rounding to nearest.
    pub fn eval_bin(&self, ctx: &BinContext) -> i64 {
        (self.bin_expr.eval(ctx) + 0.5).floor() as i64
    }
}

/// The set of registered modifiers and their accumulators. One registry per
/// evaluation loop; workers stay disjoint by tracing into samples that the
/// owning loop applies here sequentially.
#[derive(Default)]
pub struct ContribRegistry {
    mods: Vec<ModContrib>,
    index: HashMap<String, usize>,
}

impl ContribRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a modifier. `bin_expr == None` means a single bin selected
    /// by the constant 0. A constant expression is only legal if it selects
    /// bin 0 exactly, in which case the bin count is forced to 1; otherwise
    /// `bin_count` must be positive.
    pub fn register(
        &mut self,
        name: &str,
        out_spec: OutputSpec,
        bin_expr: Option<&str>,
        bin_count: i64,
    ) -> Result<usize, ContribError> {
        if self.index.contains_key(name) {
            return Err(ContribError::DuplicateModifier(name.to_string()));
        }
        let expr = Expr::parse_or_zero(bin_expr)?;
        let nbins = match expr.constant() {
            Some(v) => {
                if (v + 1.5) as i64 != 1 {
                    return Err(ContribError::NonZeroConstant(name.to_string()));
                }
                1
            }
            None => {
                if bin_count <= 0 {
                    return Err(ContribError::InvalidBinCount {
                        name: name.to_string(),
                        count: bin_count,
                    });
                }
                bin_count as usize
            }
        };
        let idx = self.mods.len();
        self.mods.push(ModContrib {
            name: name.to_string(),
            out_spec,
            sink_key: None,
            bin_expr: expr,
            bins: vec![DColor::zero(); nbins],
        });
        self.index.insert(name.to_string(), idx);
        Ok(idx)
    }

    pub fn len(&self) -> usize {
        self.mods.len()
    }
    pub fn is_empty(&self) -> bool {
        self.mods.is_empty()
    }
    pub fn find(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }
    pub fn get(&self, idx: usize) -> &ModContrib {
        &self.mods[idx]
    }
    pub fn mods(&self) -> &[ModContrib] {
        &self.mods
    }

    /// Opens (or reuses) one output stream per distinct destination.
    pub fn connect_sinks(&mut self, sinks: &mut SinkTable) -> Result<(), ContribError> {
        for m in self.mods.iter_mut() {
            let key = sinks.open(&m.out_spec)?;
            m.sink_key = Some(key);
        }
        Ok(())
    }

    /// Like `connect_sinks` but routing every modifier to an in-memory
    /// buffer. Used by tests and embedders.
    pub fn connect_buffers(&mut self, sinks: &mut SinkTable, buffer: &SharedBuffer) {
        for m in self.mods.iter_mut() {
            let key = sinks.open_buffer(&m.out_spec, buffer.clone());
            m.sink_key = Some(key);
        }
    }

    /// Adds one sample into a modifier's bin. An out-of-range bin index is a
    /// recovered per-sample error: the contribution is dropped with a
    /// warning and `false` is returned, leaving every bin untouched.
    pub fn contribute(&mut self, mod_idx: usize, bin: i64, value: Color) -> bool {
        let m = &mut self.mods[mod_idx];
        if bin < 0 || bin >= m.bins.len() as i64 {
            log::warn!(
                "bad bin number {} for modifier '{}' (ignored)",
                bin,
                m.name
            );
            return false;
        }
        m.bins[bin as usize].add_sample(value);
        true
    }

    /// Emits every modifier's bin array to its sink, then zeroes all bins.
    pub fn flush(&mut self, sinks: &mut SinkTable) -> Result<(), ContribError> {
        for m in self.mods.iter_mut() {
            let key = m
                .sink_key
                .as_ref()
                .expect("flush before sinks were connected");
            sinks.put_record(key, m.out_spec.format, &m.bins)?;
            for bin in m.bins.iter_mut() {
                *bin = DColor::zero();
            }
        }
        Ok(())
    }
}
