//! Configuration for the lab runtime.
//!
//! The lab configuration bounds deterministic execution:
//! - Maximum number of scheduling steps per run
//! - Whether a stalled run (blocked tasks, nothing runnable) panics

/// Environment variable read by [`LabConfig::from_env`].
pub const MAX_STEPS_ENV: &str = "COOPSYNC_LAB_MAX_STEPS";

/// Configuration for the lab runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabConfig {
    /// Maximum number of steps before a run stops.
    pub max_steps: Option<u64>,
    /// Whether to panic when a run ends with tasks still blocked.
    pub panic_on_stall: bool,
}

impl LabConfig {
    /// Creates the default configuration.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_steps: Some(100_000),
            panic_on_stall: false,
        }
    }

    /// Creates a configuration whose step limit comes from
    /// `COOPSYNC_LAB_MAX_STEPS`.
    ///
    /// `0` disables the limit. A missing or unparsable value keeps the
    /// default.
    #[must_use]
    pub fn from_env() -> Self {
        Self::new().with_max_steps_var(std::env::var(MAX_STEPS_ENV).ok().as_deref())
    }

    fn with_max_steps_var(self, value: Option<&str>) -> Self {
        let Some(value) = value else {
            return self;
        };
        match value.trim().parse::<u64>() {
            Ok(0) => self.no_step_limit(),
            Ok(steps) => self.max_steps(steps),
            Err(err) => {
                tracing::warn!(%value, %err, "ignoring invalid {MAX_STEPS_ENV}");
                self
            }
        }
    }

    /// Sets the maximum number of steps.
    #[must_use]
    pub const fn max_steps(mut self, steps: u64) -> Self {
        self.max_steps = Some(steps);
        self
    }

    /// Disables the step limit.
    #[must_use]
    pub const fn no_step_limit(mut self) -> Self {
        self.max_steps = None;
        self
    }

    /// Sets whether to panic when a run stalls.
    #[must_use]
    pub const fn panic_on_stall(mut self, value: bool) -> Self {
        self.panic_on_stall = value;
        self
    }
}

impl Default for LabConfig {
    fn default() -> Self {
        Self::new()
    }
}
