//! Thread Manager
//!
//! Decides how many encoder processes run side by side and how many threads
//! each of them may use:
//! - parallel width defaults to the available processing units
//! - the per-child thread budget shrinks as width grows
//! - `AUDIO_MIRROR_MULTI_INSTANCE` halves the budget when several runs share a machine

/// Environment switch for multi-instance mode.
pub const MULTI_INSTANCE_ENV: &str = "AUDIO_MIRROR_MULTI_INSTANCE";

/// Configuration for thread allocation
#[derive(Debug, Clone)]
pub struct ThreadConfig {
    /// Percentage of cores to use (0-100)
    pub core_percentage: usize,
    /// Minimum threads to allocate
    pub min_threads: usize,
    /// Maximum threads to allocate
    pub max_threads: usize,
    /// Whether to account for multi-instance scenarios
    pub multi_instance_aware: bool,
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self {
            core_percentage: 100,
            min_threads: 1,
            max_threads: 64,
            multi_instance_aware: true,
        }
    }
}

/// Thread count for `config` on this machine.
pub fn calculate_optimal_threads(config: &ThreadConfig) -> usize {
    calculate_for_cores(num_cpus::get(), config)
}

fn calculate_for_cores(cpu_count: usize, config: &ThreadConfig) -> usize {
    let effective_percentage = if config.multi_instance_aware && is_multi_instance() {
        config.core_percentage / 2
    } else {
        config.core_percentage
    };

    let calculated = (cpu_count * effective_percentage / 100).max(1);

    calculated.clamp(config.min_threads.max(1), config.max_threads.max(1))
}

/// Thread allocation result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadAllocation {
    /// Number of encoder processes running at once
    pub parallel_tasks: usize,
    /// Threads handed to each encoder process
    pub child_threads: usize,
}

/// Splits the core budget between width and depth so that
/// `parallel_tasks * child_threads` stays within the available cores.
///
/// `requested` overrides the width; `None` uses [`default_parallelism`].
pub fn allocate(requested: Option<usize>) -> ThreadAllocation {
    allocate_for_cores(num_cpus::get(), requested)
}

fn allocate_for_cores(total_cores: usize, requested: Option<usize>) -> ThreadAllocation {
    let total_cores = total_cores.max(1);
    let parallel_tasks = requested
        .unwrap_or_else(|| calculate_for_cores(total_cores, &ThreadConfig::default()))
        .max(1);
    let child_threads = (total_cores / parallel_tasks).max(1);

    ThreadAllocation {
        parallel_tasks,
        child_threads,
    }
}

/// Default number of simultaneous transcodes: one per processing unit.
pub fn default_parallelism() -> usize {
    calculate_optimal_threads(&ThreadConfig::default())
}

/// True when `AUDIO_MIRROR_MULTI_INSTANCE` is set.
pub fn is_multi_instance() -> bool {
    std::env::var_os(MULTI_INSTANCE_ENV).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_parallelism_is_positive() {
        let threads = default_parallelism();
        assert!(threads >= 1);
        assert!(threads <= 64);
    }

    #[test]
    fn test_thread_config_bounds() {
        let config = ThreadConfig {
            core_percentage: 50,
            min_threads: 2,
            max_threads: 8,
            multi_instance_aware: true,
        };
        let threads = calculate_optimal_threads(&config);
        assert!(threads >= config.min_threads);
        assert!(threads <= config.max_threads);
    }

    #[test]
    fn test_calculate_for_cores() {
        let config = ThreadConfig {
            multi_instance_aware: false,
            ..ThreadConfig::default()
        };
        assert_eq!(calculate_for_cores(8, &config), 8);
        assert_eq!(calculate_for_cores(0, &config), 1);

        let half = ThreadConfig {
            core_percentage: 50,
            multi_instance_aware: false,
            ..ThreadConfig::default()
        };
        assert_eq!(calculate_for_cores(8, &half), 4);
        assert_eq!(calculate_for_cores(1, &half), 1);
    }

    #[test]
    fn test_allocate_respects_override() {
        let allocation = allocate_for_cores(8, Some(2));
        assert_eq!(
            allocation,
            ThreadAllocation {
                parallel_tasks: 2,
                child_threads: 4
            }
        );

        let wide = allocate_for_cores(4, Some(16));
        assert_eq!(wide.parallel_tasks, 16);
        assert_eq!(wide.child_threads, 1);
    }

    #[test]
    fn test_allocate_never_returns_zero() {
        let allocation = allocate_for_cores(0, Some(0));
        assert_eq!(allocation.parallel_tasks, 1);
        assert_eq!(allocation.child_threads, 1);
    }
}
