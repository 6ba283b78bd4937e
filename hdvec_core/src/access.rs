use core::fmt;
use core::ops::Sub;

/// Level of access to one memory domain.
///
/// The levels are ordered, `None < Read < Write`, and a write implies a read. The same type is
/// used for two things: the intent a caller states when asking for a view, and the level of
/// access a domain can currently serve without triggering a copy.
///
/// # Examples:
///
/// ```
/// use hdvec_core::GpuAccess;
///
/// assert!(GpuAccess::Write > GpuAccess::Read);
/// assert!(GpuAccess::Write.allows(GpuAccess::Read));
/// assert_eq!(GpuAccess::Write - GpuAccess::Read, GpuAccess::Read);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GpuAccess {
    /// No access.
    None,
    /// Read-only access.
    Read,
    /// Read-write access.
    Write,
}

impl GpuAccess {
    /// Returns true if a domain holding `self` can serve a request for `requested` as-is.
    pub fn allows(self, requested: GpuAccess) -> bool {
        self >= requested
    }

    fn level(self) -> u8 {
        match self {
            GpuAccess::None => 0,
            GpuAccess::Read => 1,
            GpuAccess::Write => 2,
        }
    }

    fn from_level(level: u8) -> GpuAccess {
        match level {
            0 => GpuAccess::None,
            1 => GpuAccess::Read,
            _ => GpuAccess::Write,
        }
    }
}

impl Default for GpuAccess {
    fn default() -> Self {
        GpuAccess::None
    }
}

/// Level difference, saturating at `None`.
///
/// `Write - access` is the strongest access the *other* domain may hold while this domain still
/// serves `access`.
impl Sub for GpuAccess {
    type Output = GpuAccess;

    fn sub(self, rhs: GpuAccess) -> GpuAccess {
        GpuAccess::from_level(self.level().saturating_sub(rhs.level()))
    }
}

impl fmt::Display for GpuAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GpuAccess::None => "none",
            GpuAccess::Read => "read",
            GpuAccess::Write => "write",
        };
        f.write_str(name)
    }
}
