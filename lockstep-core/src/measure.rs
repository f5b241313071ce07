//! Step Timing and Thread Placement
//!
//! Uses RDTSCP on x86_64 and CNTVCT_EL0 on AArch64 for low-overhead cycle
//! counting alongside `std::time::Instant`. Also hosts the Linux affinity and
//! niceness helpers workers use to place themselves before their first round.

use std::time::Duration;

/// Read the CPU cycle/tick counter (platform-specific).
#[cfg(target_arch = "x86_64")]
#[inline(always)]
fn read_cycles() -> u64 {
    // SAFETY: RDTSCP is available on all x86_64 CPUs since ~2006 and waits
    // for prior instructions to retire before reading the counter.
    unsafe {
        let mut _aux: u32 = 0;
        std::arch::x86_64::__rdtscp(&mut _aux)
    }
}

/// Read the virtual counter timer on AArch64.
#[cfg(target_arch = "aarch64")]
#[inline(always)]
fn read_cycles() -> u64 {
    let cnt: u64;
    // SAFETY: CNTVCT_EL0 is readable from EL0 on all AArch64 implementations.
    unsafe {
        std::arch::asm!("mrs {}, cntvct_el0", out(reg) cnt, options(nostack, nomem));
    }
    cnt
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
#[inline(always)]
fn read_cycles() -> u64 {
    0
}

/// Whether this platform provides real cycle counters.
pub const HAS_CYCLE_COUNTER: bool = cfg!(target_arch = "x86_64") || cfg!(target_arch = "aarch64");

/// Brackets a single step call
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    start: std::time::Instant,
    cycles_start: u64,
}

impl Timer {
    /// Start a new timer
    #[inline(always)]
    pub fn start() -> Self {
        let cycles_start = read_cycles();
        Self {
            start: std::time::Instant::now(),
            cycles_start,
        }
    }

    /// Stop the timer and return elapsed time and cycles
    #[inline(always)]
    pub fn stop(&self) -> (Duration, u64) {
        let elapsed = self.start.elapsed();
        let cycles = read_cycles().saturating_sub(self.cycles_start);
        (elapsed, cycles)
    }
}

/// Number of CPUs the process may run on (at least 1)
pub fn available_cores() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Set CPU affinity to pin the current thread to a specific core
#[cfg(target_os = "linux")]
pub fn pin_to_cpu(cpu: usize) -> Result<(), std::io::Error> {
    use std::mem::MaybeUninit;

    unsafe {
        let mut set = MaybeUninit::<libc::cpu_set_t>::zeroed();
        let set_ref = set.assume_init_mut();

        libc::CPU_ZERO(set_ref);
        libc::CPU_SET(cpu, set_ref);

        let result = libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), set_ref);

        if result == 0 {
            Ok(())
        } else {
            Err(std::io::Error::last_os_error())
        }
    }
}

/// CPU pinning is not supported on this platform
#[cfg(not(target_os = "linux"))]
pub fn pin_to_cpu(_cpu: usize) -> Result<(), std::io::Error> {
    Ok(())
}

/// Raise the niceness of the current thread by `increment`
///
/// Workers run below the controller so the controller is never starved while
/// a step is in flight. Only lowering is attempted.
#[cfg(target_os = "linux")]
pub fn lower_thread_priority(increment: i32) -> Result<(), std::io::Error> {
    if increment <= 0 {
        return Ok(());
    }

    // SAFETY: gettid has no preconditions; setpriority with PRIO_PROCESS and a
    // thread id adjusts only that thread on Linux.
    unsafe {
        let tid = libc::syscall(libc::SYS_gettid) as libc::id_t;
        *libc::__errno_location() = 0;
        let current = libc::getpriority(libc::PRIO_PROCESS, tid);
        if current == -1 && *libc::__errno_location() != 0 {
            return Err(std::io::Error::last_os_error());
        }
        let target = (current + increment).min(19);
        if libc::setpriority(libc::PRIO_PROCESS, tid, target) == 0 {
            Ok(())
        } else {
            Err(std::io::Error::last_os_error())
        }
    }
}

/// Thread priorities are not adjusted on this platform
#[cfg(not(target_os = "linux"))]
pub fn lower_thread_priority(_increment: i32) -> Result<(), std::io::Error> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer() {
        let timer = Timer::start();
        std::thread::sleep(Duration::from_millis(10));
        let (elapsed, _cycles) = timer.stop();

        assert!(elapsed >= Duration::from_millis(5));
    }

    #[test]
    fn test_cycle_counter() {
        if HAS_CYCLE_COUNTER {
            let a = read_cycles();
            let b = read_cycles();
            assert!(b >= a, "cycle counter should be monotonic");
        }
    }

    #[test]
    fn test_available_cores_nonzero() {
        assert!(available_cores() >= 1);
    }

    #[test]
    fn test_lower_priority_noop_for_zero() {
        assert!(lower_thread_priority(0).is_ok());
    }

    #[test]
    fn test_lower_priority_on_spawned_thread() {
        let handle = std::thread::spawn(|| lower_thread_priority(1));
        assert!(handle.join().unwrap().is_ok());
    }
}
