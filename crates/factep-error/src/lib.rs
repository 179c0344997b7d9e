//! Errors for caller mistakes: bad indices, inconsistent array layouts,
//! rejected configurations. Numerical trouble inside an EP update is
//! deliberately *not* an [EpError] — the driver reports it through its
//! status codes, and the scheduler keeps going.
//!
//! Manager descriptions arrive as flat arrays from host environments, so
//! an error about them is only useful if it can say *which* block and
//! *which* potential is broken. [EpError] therefore carries those
//! positions as data, not just as text; hosts with 1-based indexing shift
//! them before attaching.

use std::fmt::{self, Display, Formatter};

pub type EpResult<T> = Result<T, EpError>;

/// Failure class of an [EpError].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// A scalar or index argument is out of range.
    InvalidParameter,
    /// A configuration (thresholds, damping factor, array sizes, subset
    /// filter) was rejected as a whole.
    InvalidConfig,
    /// The sparse representation fails its structural checks.
    Representation,
    /// A potential block cannot be built or holds invalid parameters.
    Potential,
    /// A top-K tracker invariant was violated (no eligible producer left
    /// for some variable).
    Tracker,
}

impl ErrorKind {
    fn label(self) -> &'static str {
        match self {
            ErrorKind::InvalidParameter => "invalid parameter",
            ErrorKind::InvalidConfig => "invalid configuration",
            ErrorKind::Representation => "representation error",
            ErrorKind::Potential => "potential error",
            ErrorKind::Tracker => "tracker error",
        }
    }
}

/// A caller error: what class of mistake, a rendered message, and —
/// where a manager description is involved — the offending block and
/// potential position within that block.
#[derive(Debug)]
pub struct EpError {
    kind: ErrorKind,
    message: String,
    block: Option<usize>,
    potential: Option<usize>,
}

impl EpError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        EpError {
            kind,
            message: message.into(),
            block: None,
            potential: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Attach the block index the error refers to.
    pub fn at_block(mut self, block: usize) -> Self {
        self.block = Some(block);
        self
    }

    /// Attach the potential position (within its block, if one is set).
    pub fn at_potential(mut self, potential: usize) -> Self {
        self.potential = Some(potential);
        self
    }

    pub fn block(&self) -> Option<usize> {
        self.block
    }

    pub fn potential(&self) -> Option<usize> {
        self.potential
    }
}

impl Display for EpError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.kind.label())?;
        match (self.block, self.potential) {
            (Some(b), Some(p)) => write!(f, "potential {} in block {}: ", p, b)?,
            (Some(b), None) => write!(f, "block {}: ", b)?,
            (None, Some(p)) => write!(f, "potential {}: ", p)?,
            (None, None) => {}
        }
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for EpError {}

/// Build an [EpError]: `ep_err!(Kind: "format", args...)`.
#[macro_export]
macro_rules! ep_err {
    ($kind:ident: $($msg:tt)+) => {
        $crate::EpError::new($crate::ErrorKind::$kind, format!($($msg)+))
    };
}

/// Guard an argument condition, returning early with an [EpError] when it
/// does not hold: `require!(cond, Kind: "format", args...)`.
#[macro_export]
macro_rules! require {
    ($cond:expr, $kind:ident: $($msg:tt)+) => {
        if !$cond {
            return Err($crate::ep_err!($kind: $($msg)+));
        }
    };
}
