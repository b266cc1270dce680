//! ---
//! gpm_section: "02-power-management"
//! gpm_subsection: "module"
//! gpm_type: "source"
//! gpm_scope: "code"
//! gpm_description: "Power-transition orchestration and client-object replay."
//! gpm_version: "v0.0.0-prealpha"
//! gpm_owner: "tbd"
//! ---
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

/// Flags handed to device-state load/unload and to every engine hook.
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash)]
#[repr(transparent)]
pub struct StateFlags(u32);

impl StateFlags {
    pub const NONE: Self = Self(0);
    /// Software state must survive the transition.
    pub const PRESERVING: Self = Self(1 << 0);
    /// The load/unload is part of a suspend/resume cycle.
    pub const PM_TRANSITION: Self = Self(1 << 1);
    /// The GPU is entering or leaving GC6.
    pub const GC6_TRANSITION: Self = Self(1 << 2);

    const NAMES: [(Self, &'static str); 3] = [
        (Self::PRESERVING, "PRESERVING"),
        (Self::PM_TRANSITION, "PM_TRANSITION"),
        (Self::GC6_TRANSITION, "GC6_TRANSITION"),
    ];

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Build flags from raw bits, dropping unknown bits.
    #[inline]
    pub const fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & 0b111)
    }

    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[inline]
    pub const fn is_pm_transition(self) -> bool {
        self.contains(Self::PM_TRANSITION)
    }

    /// Flag set used by suspend and resume, with GC6 added when an entry is in progress.
    pub const fn for_pm_transition(gc6_entering: bool) -> Self {
        let base = Self::PRESERVING.union(Self::PM_TRANSITION);
        if gc6_entering {
            base.union(Self::GC6_TRANSITION)
        } else {
            base
        }
    }
}

impl BitOr for StateFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for StateFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for StateFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return f.write_str("NONE");
        }
        let mut first = true;
        for (flag, name) in Self::NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str(" | ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

impl fmt::Display for StateFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Boolean properties recorded on the GPU object.
///
/// The three PM markers are owned by the power-transition controller. `Gc6StateEntering`
/// is maintained by the platform and only read here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GpuProperty {
    InPmCodepath,
    InStandby,
    InPmResumeCodepath,
    Gc6StateEntering,
}

impl GpuProperty {
    const fn mask(self) -> u32 {
        match self {
            GpuProperty::InPmCodepath => 1 << 0,
            GpuProperty::InStandby => 1 << 1,
            GpuProperty::InPmResumeCodepath => 1 << 2,
            GpuProperty::Gc6StateEntering => 1 << 3,
        }
    }
}

/// Property storage for one GPU object.
#[derive(Debug, Default)]
pub struct PropertySet {
    bits: AtomicU32,
}

impl PropertySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, property: GpuProperty) -> bool {
        self.bits.load(Ordering::Acquire) & property.mask() != 0
    }

    pub fn set(&self, property: GpuProperty, value: bool) {
        if value {
            self.bits.fetch_or(property.mask(), Ordering::AcqRel);
        } else {
            self.bits.fetch_and(!property.mask(), Ordering::AcqRel);
        }
    }

    /// Copy of the PM transition markers.
    pub fn pm_snapshot(&self) -> PmProperties {
        PmProperties {
            in_pm_codepath: self.get(GpuProperty::InPmCodepath),
            in_standby: self.get(GpuProperty::InStandby),
            in_pm_resume_codepath: self.get(GpuProperty::InPmResumeCodepath),
        }
    }
}

/// Point-in-time view of the PM transition markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PmProperties {
    pub in_pm_codepath: bool,
    pub in_standby: bool,
    pub in_pm_resume_codepath: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pm_transition_flags_include_gc6_only_when_entering() {
        let plain = StateFlags::for_pm_transition(false);
        assert!(plain.contains(StateFlags::PRESERVING | StateFlags::PM_TRANSITION));
        assert!(!plain.contains(StateFlags::GC6_TRANSITION));

        let gc6 = StateFlags::for_pm_transition(true);
        assert!(gc6.contains(StateFlags::GC6_TRANSITION));
        assert_eq!(format!("{gc6:?}"), "PRESERVING | PM_TRANSITION | GC6_TRANSITION");
    }

    #[test]
    fn none_is_not_a_pm_transition() {
        assert!(!StateFlags::NONE.is_pm_transition());
        assert!(!StateFlags::PRESERVING.is_pm_transition());
        assert_eq!(StateFlags::from_bits_truncate(0xff).bits(), 0b111);
    }

    #[test]
    fn properties_toggle_independently() {
        let props = PropertySet::new();
        props.set(GpuProperty::InStandby, true);
        props.set(GpuProperty::InPmCodepath, true);
        props.set(GpuProperty::InStandby, false);
        assert!(!props.get(GpuProperty::InStandby));
        assert!(props.get(GpuProperty::InPmCodepath));
        assert_eq!(
            props.pm_snapshot(),
            PmProperties {
                in_pm_codepath: true,
                in_standby: false,
                in_pm_resume_codepath: false,
            }
        );
    }
}
