use std::fmt::Display;
use std::time::Duration;

/// Counters and timers of one caching solver.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub queries: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub solver_calls: u64,
    pub lookup_time: Duration,
    pub insertion_time: Duration,
    pub total_time: Duration,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hit(&mut self) {
        self.cache_hits += 1;
    }

    pub fn miss(&mut self) {
        self.cache_misses += 1;
    }

    pub fn looked_up(&mut self, time: Duration) {
        self.lookup_time += time;
    }

    pub fn inserted(&mut self, time: Duration) {
        self.insertion_time += time;
    }

    pub fn merge_with(&mut self, rhs: &Self) {
        self.queries += rhs.queries;
        self.cache_hits += rhs.cache_hits;
        self.cache_misses += rhs.cache_misses;
        self.solver_calls += rhs.solver_calls;
        self.lookup_time += rhs.lookup_time;
        self.insertion_time += rhs.insertion_time;
        self.total_time += rhs.total_time;
    }
}

impl Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn percent(total: u64, part: u64) -> f64 {
            if total == 0 {
                0.0
            } else {
                (part as f64) / (total as f64) * 100.0
            }
        }

        let lookups = self.cache_hits + self.cache_misses;

        writeln!(f, "queries:          {}", self.queries)
            .and_then(|_| {
                writeln!(
                    f,
                    "cache:            hits: {}({:.2}%)  misses: {}({:.2}%)",
                    self.cache_hits,
                    percent(lookups, self.cache_hits),
                    self.cache_misses,
                    percent(lookups, self.cache_misses),
                )
            })
            .and_then(|_| writeln!(f, "solver calls:     {}", self.solver_calls))
            .and_then(|_| {
                write!(
                    f,
                    "took:             lookup: {:?}  insertion: {:?}  total: {:?}",
                    self.lookup_time, self.insertion_time, self.total_time
                )
            })
    }
}
