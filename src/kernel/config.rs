// Static configuration of a task: name, stack, priority, placement
//
// Plain fields; nothing is acquired until start().

use core::fmt;

/// Stack budget used by [`TaskConfig::default`], in bytes.
pub const DEFAULT_STACK_SIZE: usize = 4096;

/// Host threads never get less than this, whatever was requested.
pub const MIN_STACK_SIZE: usize = 64 * 1024;

/// Scheduling weight; higher preempts lower.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(u8);

impl Priority {
    pub const IDLE: Priority = Priority(0);
    /// Lowest level above idle.
    pub const DEFAULT: Priority = Priority(1);
    pub const MAX: Priority = Priority(15);

    /// Clamps to [`Priority::MAX`].
    pub const fn new(level: u8) -> Self {
        if level > Self::MAX.0 {
            Self::MAX
        } else {
            Priority(level)
        }
    }

    pub const fn level(self) -> u8 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// Which execution unit runs the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoreAffinity {
    Core(usize),
    #[default]
    Any,
}

impl fmt::Display for CoreAffinity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreAffinity::Core(n) => write!(f, "core{}", n),
            CoreAffinity::Any => write!(f, "any"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskConfig {
    pub name: String,
    pub stack: usize,
    pub priority: Priority,
    pub core: CoreAffinity,
}

impl TaskConfig {
    pub fn new(name: impl Into<String>, stack: usize) -> Self {
        Self {
            name: name.into(),
            stack,
            priority: Priority::DEFAULT,
            core: CoreAffinity::Any,
        }
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn core(mut self, core: CoreAffinity) -> Self {
        self.core = core;
        self
    }

    // stack size actually handed to the thread builder
    pub(crate) fn thread_stack(&self) -> usize {
        self.stack.max(MIN_STACK_SIZE)
    }
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self::new("task", DEFAULT_STACK_SIZE)
    }
}

impl fmt::Display for TaskConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (stack {}, {}, {})",
            self.name, self.stack, self.priority, self.core
        )
    }
}
