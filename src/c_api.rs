//! C ABI over [`BodySystem`].
//!
//! Handles are opaque pointers created by `NBody_SystemCreate` or
//! `NBody_SystemCopy` and released with `NBody_SystemDestroy`. Fallible calls
//! return one of the `NBODY_*` status codes.

use std::ffi::{c_char, CStr};
use std::fs::File;
use std::io::BufReader;

use crate::{
    body::Body,
    error::SystemError,
    math::{Float, Vector2},
    system::BodySystem,
};

pub const NBODY_OK: i32 = 0;
pub const NBODY_OUT_OF_MEMORY: i32 = 1;
pub const NBODY_CAPACITY_UNUSABLE: i32 = 2;
pub const NBODY_INDEX_OUT_OF_RANGE: i32 = 3;
pub const NBODY_MALFORMED_STREAM: i32 = 4;
pub const NBODY_IO: i32 = 5;
pub const NBODY_INVALID_ARGUMENT: i32 = 6;

/// Plain-data snapshot of one body, without its name.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BodyState {
    pub pos_x: Float,
    pub pos_y: Float,
    pub vel_x: Float,
    pub vel_y: Float,
    pub force_x: Float,
    pub force_y: Float,
    pub mass: Float,
    pub radius: Float,
}

impl From<&Body> for BodyState {
    fn from(body: &Body) -> Self {
        Self {
            pos_x: body.pos.x,
            pos_y: body.pos.y,
            vel_x: body.vel.x,
            vel_y: body.vel.y,
            force_x: body.force.x,
            force_y: body.force.y,
            mass: body.mass,
            radius: body.radius,
        }
    }
}

fn status(result: Result<(), SystemError>) -> i32 {
    match result {
        Ok(()) => NBODY_OK,
        Err(SystemError::OutOfMemory) => NBODY_OUT_OF_MEMORY,
        Err(SystemError::CapacityUnusable) => NBODY_CAPACITY_UNUSABLE,
        Err(SystemError::IndexOutOfRange { .. }) => NBODY_INDEX_OUT_OF_RANGE,
        Err(SystemError::MalformedStream(_)) => NBODY_MALFORMED_STREAM,
        Err(SystemError::Io(_)) => NBODY_IO,
        Err(
            SystemError::InvalidBody { .. }
            | SystemError::InvalidTimeStep(_)
            | SystemError::InvalidSettings(_)
            | SystemError::ThreadPool(_),
        ) => NBODY_INVALID_ARGUMENT,
    }
}

/// Reads a UTF-8 path; `None` for null or non-UTF-8 input.
unsafe fn path_arg<'a>(path: *const c_char) -> Option<&'a str> {
    if path.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(path) }.to_str().ok()
}

/// Returns a new empty system, or null if it could not be allocated.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn NBody_SystemCreate() -> *mut BodySystem {
    match BodySystem::new() {
        Ok(system) => Box::into_raw(Box::new(system)),
        Err(_) => std::ptr::null_mut(),
    }
}

/// Returns a deep copy of `handle`, or null on failure.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn NBody_SystemCopy(handle: *const BodySystem) -> *mut BodySystem {
    match unsafe { handle.as_ref() }.map(BodySystem::try_clone) {
        Some(Ok(copy)) => Box::into_raw(Box::new(copy)),
        _ => std::ptr::null_mut(),
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn NBody_SystemDestroy(handle: *mut BodySystem) {
    if !handle.is_null() {
        unsafe { drop(Box::from_raw(handle)) };
    }
}

/// Adds a body. `name` may be null; mass and radius must be positive.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn NBody_SystemAddBody(
    handle: *mut BodySystem,
    name: *const c_char,
    x: Float,
    y: Float,
    vx: Float,
    vy: Float,
    mass: Float,
    radius: Float,
) -> i32 {
    let Some(system) = (unsafe { handle.as_mut() }) else {
        return NBODY_INVALID_ARGUMENT;
    };
    let name = if name.is_null() {
        &[][..]
    } else {
        unsafe { CStr::from_ptr(name) }.to_bytes()
    };
    status(
        Body::try_new("", Vector2::new(x, y), Vector2::new(vx, vy), mass, radius).and_then(|mut body| {
            body.set_name_bytes(name);
            system.add_body(body)
        }),
    )
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn NBody_SystemRemoveBody(handle: *mut BodySystem, index: usize) -> i32 {
    match unsafe { handle.as_mut() } {
        Some(system) => status(system.remove_body(index).map(drop)),
        None => NBODY_INVALID_ARGUMENT,
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn NBody_SystemClear(handle: *mut BodySystem) -> i32 {
    match unsafe { handle.as_mut() } {
        Some(system) => status(system.clear()),
        None => NBODY_INVALID_ARGUMENT,
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn NBody_SystemRun(handle: *mut BodySystem, dt: Float, parallel: bool) -> i32 {
    match unsafe { handle.as_mut() } {
        Some(system) => status(system.run(dt, parallel)),
        None => NBODY_INVALID_ARGUMENT,
    }
}

/// Replaces the contents of `handle` with the system stored at `path`.
/// On a bad file the system is reset to its empty default.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn NBody_SystemLoad(handle: *mut BodySystem, path: *const c_char) -> i32 {
    let (Some(system), Some(path)) = (unsafe { handle.as_mut() }, unsafe { path_arg(path) }) else {
        return NBODY_INVALID_ARGUMENT;
    };
    let result = File::open(path)
        .map_err(SystemError::from)
        .and_then(|file| system.read_from(&mut BufReader::new(file)));
    status(result)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn NBody_SystemSave(handle: *const BodySystem, path: *const c_char) -> i32 {
    match (unsafe { handle.as_ref() }, unsafe { path_arg(path) }) {
        (Some(system), Some(path)) => status(system.save(path)),
        _ => NBODY_INVALID_ARGUMENT,
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn NBody_SystemGetBodyCount(handle: *const BodySystem) -> usize {
    unsafe { handle.as_ref() }.map_or(0, BodySystem::len)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn NBody_SystemGetCapacity(handle: *const BodySystem) -> usize {
    unsafe { handle.as_ref() }.map_or(0, BodySystem::capacity)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn NBody_SystemGetTime(handle: *const BodySystem) -> Float {
    unsafe { handle.as_ref() }.map_or(0.0, BodySystem::time)
}

/// Copies the state of body `index` into `out`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn NBody_SystemGetBody(
    handle: *const BodySystem,
    index: usize,
    out: *mut BodyState,
) -> i32 {
    let (Some(system), Some(out)) = (unsafe { handle.as_ref() }, unsafe { out.as_mut() }) else {
        return NBODY_INVALID_ARGUMENT;
    };
    match system.body(index) {
        Some(body) => {
            *out = BodyState::from(body);
            NBODY_OK
        }
        None => NBODY_INDEX_OUT_OF_RANGE,
    }
}
