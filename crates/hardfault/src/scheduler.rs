//! Optional scheduler awareness.
//!
//! The capture engine may record which task was running, but only through two
//! independent gates:
//!
//! 1. both hooks are present (`Some`), i.e. a scheduler integration was
//!    compiled and linked in, and
//! 2. the `is_running` hook reports the scheduler has actually started.
//!
//! A linked scheduler that has not started (fault during early boot) yields no
//! task info. So does a missing hook. Neither is a capture failure.
//!
//! Both hooks run inside the fault handler. They must only read scheduler
//! state and must never block, yield or allocate.

use crate::config::MAX_TASK_NAME_LEN;

/// Size of the stored name field: name plus NUL terminator.
pub const TASK_NAME_FIELD: usize = MAX_TASK_NAME_LEN + 1;

/// Identity of the task that was running at fault time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TaskInfo {
    /// Current (possibly inherited) priority.
    pub priority: u32,
    /// Minimum free stack ever observed, in bytes.
    pub stack_high_water_bytes: u32,
    /// Lowest address of the task's stack.
    pub stack_base: u32,
    name: [u8; TASK_NAME_FIELD],
}

impl TaskInfo {
    /// Build task info, copying at most [`MAX_TASK_NAME_LEN`] bytes of `name`.
    ///
    /// Copying stops at the first NUL. The stored field is always
    /// NUL-terminated.
    #[must_use]
    pub fn new(name: &[u8], priority: u32, stack_high_water_bytes: u32, stack_base: u32) -> Self {
        let mut field = [0u8; TASK_NAME_FIELD];
        for (dst, &src) in field
            .iter_mut()
            .take(MAX_TASK_NAME_LEN)
            .zip(name.iter().take_while(|&&b| b != 0))
        {
            *dst = src;
        }
        Self {
            priority,
            stack_high_water_bytes,
            stack_base,
            name: field,
        }
    }

    /// Rebuild from a stored name field.
    ///
    /// The terminator is forced even if the stored field lacks one.
    #[must_use]
    pub fn from_raw(
        name: [u8; TASK_NAME_FIELD],
        priority: u32,
        stack_high_water_bytes: u32,
        stack_base: u32,
    ) -> Self {
        Self::new(&name, priority, stack_high_water_bytes, stack_base)
    }

    /// Stored name field, NUL-padded.
    #[must_use]
    pub fn name_field(&self) -> &[u8; TASK_NAME_FIELD] {
        &self.name
    }

    /// Task name up to the terminator.
    ///
    /// Invalid UTF-8 is cut at the first bad byte.
    #[must_use]
    pub fn name(&self) -> &str {
        let len = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(MAX_TASK_NAME_LEN);
        let bytes = self.name.get(..len).unwrap_or(&[]);
        match core::str::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => bytes
                .get(..e.valid_up_to())
                .and_then(|b| core::str::from_utf8(b).ok())
                .unwrap_or(""),
        }
    }
}

/// Link-time scheduler hooks.
///
/// Each field is `None` when the image carries no scheduler integration. The
/// firmware fills them from its `freertos` feature; host tests construct them
/// directly.
#[derive(Clone, Copy)]
pub struct SchedulerHooks {
    /// Returns `true` once the scheduler has started.
    pub is_running: Option<fn() -> bool>,
    /// Describes the currently running task.
    pub current_task: Option<fn() -> TaskInfo>,
}

impl SchedulerHooks {
    /// No scheduler linked.
    pub const ABSENT: Self = Self {
        is_running: None,
        current_task: None,
    };

    /// Query the running task, if both gates pass.
    #[must_use]
    pub fn query(&self) -> Option<TaskInfo> {
        let (Some(is_running), Some(current_task)) = (self.is_running, self.current_task) else {
            return None;
        };
        if !is_running() {
            return None;
        }
        Some(current_task())
    }

    /// `true` if both hooks are linked, regardless of runtime state.
    #[must_use]
    pub fn is_linked(&self) -> bool {
        self.is_running.is_some() && self.current_task.is_some()
    }
}

impl Default for SchedulerHooks {
    fn default() -> Self {
        Self::ABSENT
    }
}
