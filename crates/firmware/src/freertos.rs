//! FreeRTOS scheduler hooks for the capture path.
//!
//! With the `freertos` feature (and a hardware build), [`HOOKS`] points at
//! two thin wrappers over the kernel's C API:
//!
//! - `xTaskGetSchedulerState()`: anything but `taskSCHEDULER_NOT_STARTED`
//!   counts as running, so a fault while the scheduler is suspended still
//!   names the task;
//! - `vTaskGetInfo(NULL, ..)`: the calling (i.e. faulted) task.
//!
//! Without the feature [`HOOKS`] is [`SchedulerHooks::ABSENT`] and nothing
//! references the kernel symbols, so images without FreeRTOS link cleanly.
//!
//! Availability is therefore decided at build time, not link time. Stable
//! Rust has no weak extern declarations, so with `freertos` on the two
//! symbols are strong references: an image that enables the feature but
//! does not link the kernel fails to link instead of recording no task.
//! The running-scheduler gate is still checked on every fault.
//!
//! `vTaskGetInfo` with `xGetFreeStackSpace = pdTRUE` walks the task's stack
//! to find the high-water mark. That is bounded by the stack size and takes
//! no locks, which is what the fault path needs.

use core::mem::size_of;

use hardfault::{SchedulerHooks, TaskInfo, MAX_TASK_NAME_LEN};

/// `UBaseType_t` on Cortex-M ports.
pub type UBaseType = u32;
/// `BaseType_t` on Cortex-M ports.
pub type BaseType = i32;
/// `StackType_t` on Cortex-M ports.
pub type StackType = u32;

/// `taskSCHEDULER_NOT_STARTED`
pub const SCHEDULER_NOT_STARTED: BaseType = 1;
/// `pdTRUE`
pub const PD_TRUE: BaseType = 1;
/// `eInvalid`, which makes `vTaskGetInfo` look the state up itself.
pub const E_INVALID: u32 = 5;

/// `TaskStatus_t` as laid out by FreeRTOS 10.x and 11.x on a single-core
/// Cortex-M port with a 32-bit `configRUN_TIME_COUNTER_TYPE`.
///
/// `configRECORD_STACK_HIGH_ADDRESS` inserts two pointers before the
/// high-water mark; enable the `freertos-stack-high-address` feature to match.
/// A 32-bit `configSTACK_DEPTH_TYPE` fills the padding after the `u16` on
/// this little-endian target, so the low half still reads correctly.
///
/// Kernel configurations that append fields (SMP core affinity) write into
/// `_reserved` rather than past the end of the fault-path stack slot.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct TaskStatus {
    /// `xHandle`
    pub handle: *mut core::ffi::c_void,
    /// `pcTaskName`
    pub name: *const u8,
    /// `xTaskNumber`
    pub task_number: UBaseType,
    /// `eCurrentState`
    pub current_state: u32,
    /// `uxCurrentPriority`
    pub current_priority: UBaseType,
    /// `uxBasePriority`
    pub base_priority: UBaseType,
    /// `ulRunTimeCounter`
    pub run_time_counter: u32,
    /// `pxStackBase`
    pub stack_base: *mut StackType,
    /// `pxTopOfStack`
    #[cfg(feature = "freertos-stack-high-address")]
    pub top_of_stack: *mut StackType,
    /// `pxEndOfStack`
    #[cfg(feature = "freertos-stack-high-address")]
    pub end_of_stack: *mut StackType,
    /// `usStackHighWaterMark`, in stack words
    pub stack_high_water_mark: u16,
    _reserved: [u32; TaskStatus::RESERVED_WORDS],
}

impl TaskStatus {
    /// Spare words after the last known field.
    pub const RESERVED_WORDS: usize = 4;

    /// All-zero status, used as the out-parameter for `vTaskGetInfo`.
    pub const EMPTY: Self = Self {
        handle: core::ptr::null_mut(),
        name: core::ptr::null(),
        task_number: 0,
        current_state: 0,
        current_priority: 0,
        base_priority: 0,
        run_time_counter: 0,
        stack_base: core::ptr::null_mut(),
        #[cfg(feature = "freertos-stack-high-address")]
        top_of_stack: core::ptr::null_mut(),
        #[cfg(feature = "freertos-stack-high-address")]
        end_of_stack: core::ptr::null_mut(),
        stack_high_water_mark: 0,
        _reserved: [0; Self::RESERVED_WORDS],
    };
}

/// Convert a high-water mark in stack words to bytes.
pub fn high_water_bytes(words: u16) -> u32 {
    #[allow(clippy::cast_possible_truncation)] // size_of::<u32>() == 4
    let word = size_of::<StackType>() as u32;
    u32::from(words).saturating_mul(word)
}

/// Build [`TaskInfo`] from a kernel status block and the task's name bytes.
///
/// `name` need not be terminated; copying stops at the first NUL or after
/// [`MAX_TASK_NAME_LEN`] bytes.
#[allow(clippy::cast_possible_truncation)] // 32-bit target: pointers are u32
pub fn task_info(status: &TaskStatus, name: &[u8]) -> TaskInfo {
    TaskInfo::new(
        name,
        status.current_priority,
        high_water_bytes(status.stack_high_water_mark),
        status.stack_base as usize as u32,
    )
}

/// Copy up to [`MAX_TASK_NAME_LEN`] bytes of a C string.
///
/// # Safety
///
/// `ptr` is null or points to at least `MAX_TASK_NAME_LEN` readable bytes or
/// a NUL before that.
#[allow(unsafe_code)]
pub unsafe fn copy_c_name(ptr: *const u8) -> [u8; MAX_TASK_NAME_LEN] {
    let mut out = [0u8; MAX_TASK_NAME_LEN];
    if ptr.is_null() {
        return out;
    }
    for (i, slot) in out.iter_mut().enumerate() {
        // SAFETY: i < MAX_TASK_NAME_LEN and we stop at the first NUL, which
        // the caller guarantees lies within readable memory.
        let b = unsafe { ptr.add(i).read() };
        if b == 0 {
            break;
        }
        *slot = b;
    }
    out
}

#[cfg(all(feature = "freertos", feature = "hardware"))]
mod ffi {
    use super::{BaseType, TaskStatus};

    extern "C" {
        pub fn xTaskGetSchedulerState() -> BaseType;
        pub fn vTaskGetInfo(
            task: *mut core::ffi::c_void,
            status: *mut TaskStatus,
            get_free_stack_space: BaseType,
            state: u32,
        );
    }
}

#[cfg(all(feature = "freertos", feature = "hardware"))]
#[allow(unsafe_code)]
fn scheduler_started() -> bool {
    // SAFETY: pure read of kernel state; callable from any context.
    unsafe { ffi::xTaskGetSchedulerState() != SCHEDULER_NOT_STARTED }
}

#[cfg(all(feature = "freertos", feature = "hardware"))]
#[allow(unsafe_code)]
fn current_task() -> TaskInfo {
    let mut status = TaskStatus::EMPTY;
    // SAFETY: NULL selects the calling task; `status` is a valid out-pointer.
    // Only called after `scheduler_started` returned true.
    unsafe { ffi::vTaskGetInfo(core::ptr::null_mut(), &mut status, PD_TRUE, E_INVALID) };
    // SAFETY: pcTaskName points into the TCB's configMAX_TASK_NAME_LEN array,
    // which the kernel keeps NUL-terminated.
    let name = unsafe { copy_c_name(status.name) };
    task_info(&status, &name)
}

/// Hooks handed to the capture function.
#[cfg(all(feature = "freertos", feature = "hardware"))]
pub const HOOKS: SchedulerHooks = SchedulerHooks {
    is_running: Some(scheduler_started),
    current_task: Some(current_task),
};

/// Hooks handed to the capture function.
#[cfg(not(all(feature = "freertos", feature = "hardware")))]
pub const HOOKS: SchedulerHooks = SchedulerHooks::ABSENT;

#[cfg(test)]
#[allow(clippy::indexing_slicing, clippy::arithmetic_side_effects, unsafe_code)]
mod tests {
    use super::*;

    #[test]
    fn high_water_is_reported_in_bytes() {
        assert_eq!(high_water_bytes(0), 0);
        assert_eq!(high_water_bytes(37), 148);
        assert_eq!(high_water_bytes(u16::MAX), 262_140);
    }

    #[test]
    fn status_maps_to_task_info() {
        let status = TaskStatus {
            current_priority: 4,
            stack_high_water_mark: 25,
            stack_base: 0x2000_4000 as *mut StackType,
            ..TaskStatus::EMPTY
        };
        let info = task_info(&status, b"blinky\0");
        assert_eq!(info.name(), "blinky");
        assert_eq!(info.priority, 4);
        assert_eq!(info.stack_high_water_bytes, 100);
        assert_eq!(info.stack_base, 0x2000_4000);
    }

    #[test]
    fn c_name_copy_stops_at_nul() {
        let raw = b"tmr svc\0ignored-tail-bytes";
        // SAFETY: `raw` is longer than MAX_TASK_NAME_LEN.
        let name = unsafe { copy_c_name(raw.as_ptr()) };
        assert_eq!(&name[..8], b"tmr svc\0");
    }

    #[test]
    fn c_name_copy_is_bounded() {
        let raw = [b'n'; 64];
        // SAFETY: 64 readable bytes.
        let name = unsafe { copy_c_name(raw.as_ptr()) };
        assert_eq!(name, [b'n'; MAX_TASK_NAME_LEN]);
    }

    #[test]
    fn null_name_is_empty() {
        // SAFETY: null is explicitly allowed.
        let name = unsafe { copy_c_name(core::ptr::null()) };
        assert_eq!(TaskInfo::new(&name, 0, 0, 0).name(), "");
    }

    #[test]
    fn status_leaves_room_after_known_fields() {
        let known = core::mem::offset_of!(TaskStatus, stack_high_water_mark) + size_of::<u32>();
        assert!(size_of::<TaskStatus>() >= known + TaskStatus::RESERVED_WORDS * 4);
    }

    #[test]
    fn high_water_mark_follows_stack_base() {
        let base = core::mem::offset_of!(TaskStatus, stack_base);
        #[cfg(not(feature = "freertos-stack-high-address"))]
        assert_eq!(core::mem::offset_of!(TaskStatus, stack_high_water_mark), base + size_of::<usize>());
        #[cfg(feature = "freertos-stack-high-address")]
        assert_eq!(
            core::mem::offset_of!(TaskStatus, stack_high_water_mark),
            base + 3 * size_of::<usize>()
        );
    }

    #[test]
    fn host_build_links_no_scheduler() {
        assert!(!HOOKS.is_linked());
        assert!(HOOKS.query().is_none());
    }
}
