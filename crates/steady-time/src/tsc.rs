//! Raw hardware cycle counter access.
//!
//! Only x86-64 has a usable counter here; other targets report the counter as
//! unavailable and the clock stays on its trusted fallback.

#[cfg(target_arch = "x86_64")]
pub(crate) fn available() -> bool {
    true
}

#[cfg(target_arch = "x86_64")]
pub(crate) fn read_counter() -> u64 {
    // SAFETY: RDTSC is unprivileged and has no preconditions on x86-64.
    unsafe { core::arch::x86_64::_rdtsc() }
}

#[cfg(not(target_arch = "x86_64"))]
pub(crate) fn available() -> bool {
    false
}

#[cfg(not(target_arch = "x86_64"))]
pub(crate) fn read_counter() -> u64 {
    0
}
