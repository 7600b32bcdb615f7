use std::{env, fmt, thread};

use log::{debug, warn};

/// Overrides the amount of worker threads the compute kernels use.
pub const THREADS_ENV: &str = "BACKBONE_HEADS_THREADS";

/// Where the models run. Only the CPU is supported, optionally spreading the
/// batch parallel kernels over several threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
    CpuParallel { threads: usize },
}

impl Device {
    /// Picks the device once at startup from `BACKBONE_HEADS_THREADS` or the
    /// available hardware parallelism.
    pub fn detect() -> Self {
        let requested = env::var(THREADS_ENV).ok().and_then(|raw| match raw.parse::<usize>() {
            Ok(threads) => Some(threads),
            Err(e) => {
                warn!("ignoring {THREADS_ENV}={raw}: {e}");
                None
            }
        });

        let threads = requested
            .or_else(|| thread::available_parallelism().ok().map(|n| n.get()))
            .unwrap_or(1);

        Self::with_threads(threads)
    }

    pub fn with_threads(threads: usize) -> Self {
        match threads {
            0 | 1 => Self::Cpu,
            threads => Self::CpuParallel { threads },
        }
    }

    pub fn threads(&self) -> usize {
        match self {
            Self::Cpu => 1,
            Self::CpuParallel { threads } => *threads,
        }
    }

    /// Sizes the global thread pool. The pool can only be built once per
    /// process, later calls keep the existing one.
    pub fn init(&self) {
        match rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads())
            .build_global()
        {
            Ok(()) => debug!("thread pool started with {} threads", self.threads()),
            Err(e) => warn!("keeping the existing thread pool: {e}"),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::CpuParallel { threads } => write!(f, "cpu ({threads} threads)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_thread_is_plain_cpu() {
        assert_eq!(Device::with_threads(0), Device::Cpu);
        assert_eq!(Device::with_threads(1), Device::Cpu);
        assert_eq!(Device::with_threads(1).threads(), 1);
    }

    #[test]
    fn display() {
        assert_eq!(Device::Cpu.to_string(), "cpu");
        assert_eq!(Device::with_threads(8).to_string(), "cpu (8 threads)");
    }
}
