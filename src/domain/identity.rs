//! Process identity: `(pid, startTimeTicks)` rather than bare pid, so a
//! reused pid doesn't get attributed the old process's CPU history.
//! Ported from `Domain::ProcessModel::makeUniqueKey`.

/// A process's identity across samples. Two samples with the same pid but
/// different `start_time_ticks` are different processes (the old one exited,
/// the kernel recycled the pid).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessIdentity {
    pub pid: u32,
    pub start_time_ticks: u64,
}

impl ProcessIdentity {
    pub fn new(pid: u32, start_time_ticks: u64) -> Self {
        Self { pid, start_time_ticks }
    }

    /// 64-bit hash-combine of `(pid, start_time_ticks)`, mirroring the
    /// original's `hash_combine(pid, startTimeTicks)` mixer. Not required to
    /// match any particular bit pattern externally — only to be deterministic
    /// within one process, which a plain boost-style combine already is.
    pub fn unique_key(&self) -> u64 {
        hash_combine(self.pid as u64, self.start_time_ticks)
    }
}

fn hash_combine(mut seed: u64, value: u64) -> u64 {
    seed ^= value
        .wrapping_add(0x9e3779b9)
        .wrapping_add(seed << 6)
        .wrapping_add(seed >> 2);
    seed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_pid_and_start_time_yields_same_key() {
        let a = ProcessIdentity::new(100, 5000);
        let b = ProcessIdentity::new(100, 5000);
        assert_eq!(a.unique_key(), b.unique_key());
        assert_eq!(a, b);
    }

    #[test]
    fn pid_reuse_with_different_start_time_yields_different_identity() {
        let original = ProcessIdentity::new(100, 5000);
        let reused = ProcessIdentity::new(100, 9000);
        assert_ne!(original, reused);
        assert_ne!(original.unique_key(), reused.unique_key());
    }
}
