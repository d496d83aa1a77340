use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use tracing::{debug, warn};

use crate::body::Body;
use crate::error::SystemError;
use crate::integrator::{Integrator, Parallel, Sequential};
use crate::math::{read_exact_or_malformed, read_float, write_float, Float, Vector2};

/// Owns a resizable, ordered collection of bodies and the simulation clock.
///
/// Capacity is tracked explicitly: it doubles when an insertion would exceed
/// it and is quartered once a removal leaves fewer than `capacity / 4`
/// bodies, never dropping below 1. A capacity of 0 marks a system that failed
/// to initialize or was destroyed; it rejects insertions until it is
/// re-initialized.
#[derive(Debug)]
pub struct BodySystem {
    bodies: Vec<Body>,
    capacity: usize,
    time: Float,
}

/// Reserves exactly `capacity` slots, reporting allocation failure.
fn allocate(capacity: usize) -> Result<Vec<Body>, SystemError> {
    let mut storage = Vec::new();
    storage.try_reserve_exact(capacity)?;
    Ok(storage)
}

impl BodySystem {
    /// Creates an empty system with capacity 1 at time 0.
    pub fn new() -> Result<Self, SystemError> {
        let mut system = Self {
            bodies: Vec::new(),
            capacity: 0,
            time: 0.0,
        };
        system.init_default()?;
        Ok(system)
    }

    /// Resets to an empty system with capacity 1 at time 0.
    ///
    /// On allocation failure the system is left with capacity 0.
    pub fn init_default(&mut self) -> Result<(), SystemError> {
        self.bodies = Vec::new();
        self.capacity = 0;
        self.time = 0.0;
        self.bodies = allocate(1)?;
        self.capacity = 1;
        Ok(())
    }

    /// Deep copy with the same count, capacity and time.
    pub fn try_clone(&self) -> Result<Self, SystemError> {
        let mut bodies = allocate(self.capacity)?;
        bodies.extend(self.bodies.iter().cloned());
        Ok(Self {
            bodies,
            capacity: self.capacity,
            time: self.time,
        })
    }

    /// Copies `src` into `self`, keeping the current buffer when it is large
    /// enough and not oversized by more than four times.
    ///
    /// On allocation failure `self` is left unchanged.
    pub fn assign_from(&mut self, src: &BodySystem) -> Result<(), SystemError> {
        if src.capacity > self.capacity || src.capacity <= self.capacity / 4 {
            self.bodies = allocate(src.capacity)?;
            self.capacity = src.capacity;
        } else {
            self.bodies.clear();
        }
        self.bodies.extend(src.bodies.iter().cloned());
        self.time = src.time;
        Ok(())
    }

    /// Releases all storage and zeroes count, capacity and time.
    /// Destroying twice is harmless.
    pub fn destroy(&mut self) {
        if self.capacity == 0 && self.bodies.capacity() == 0 {
            return;
        }
        self.bodies = Vec::new();
        self.capacity = 0;
        self.time = 0.0;
    }

    /// Appends a body, doubling the capacity when full.
    ///
    /// If the larger buffer cannot be allocated the system keeps its previous
    /// contents and capacity.
    pub fn add_body(&mut self, body: Body) -> Result<(), SystemError> {
        if self.capacity == 0 {
            return Err(SystemError::CapacityUnusable);
        }
        if self.bodies.len() + 1 > self.capacity {
            let new_capacity = self.capacity.checked_mul(2).ok_or(SystemError::OutOfMemory)?;
            self.bodies.try_reserve_exact(new_capacity - self.bodies.len())?;
            debug!(from = self.capacity, to = new_capacity, "grew body storage");
            self.capacity = new_capacity;
        }
        self.bodies.push(body);
        Ok(())
    }

    /// Removes and returns the body at `index`, keeping the others in order.
    ///
    /// Shrinking the buffer afterwards is best effort: if the smaller buffer
    /// cannot be allocated the removal still stands and the old buffer stays.
    pub fn remove_body(&mut self, index: usize) -> Result<Body, SystemError> {
        let count = self.bodies.len();
        if index >= count {
            return Err(SystemError::IndexOutOfRange { index, count });
        }
        let removed = self.bodies.remove(index);
        if self.bodies.len() < self.capacity / 4 {
            self.shrink_storage((self.capacity / 4).max(1));
        }
        Ok(removed)
    }

    /// Equivalent to [`destroy`](Self::destroy) then [`init_default`](Self::init_default).
    pub fn clear(&mut self) -> Result<(), SystemError> {
        self.destroy();
        self.init_default()
    }

    /// Advances the system by `dt`, sequentially or in parallel with default
    /// integrator settings.
    pub fn run(&mut self, dt: Float, parallel: bool) -> Result<(), SystemError> {
        if parallel {
            self.run_with(&Parallel::new(), dt)
        } else {
            self.run_with(&Sequential::default(), dt)
        }
    }

    /// Advances the system by `dt` with an explicit integrator.
    pub fn run_with<I: Integrator + ?Sized>(&mut self, integrator: &I, dt: Float) -> Result<(), SystemError> {
        if !(dt > 0.0 && dt.is_finite()) {
            return Err(SystemError::InvalidTimeStep(dt));
        }
        integrator.step(&mut self.bodies, dt);
        self.time += dt;
        Ok(())
    }

    /// Replaces the contents of the system with a serialized one.
    ///
    /// On any failure the system is reset to its default state (empty,
    /// capacity 1, time 0) and the error is returned.
    pub fn read_from<R: Read>(&mut self, reader: &mut R) -> Result<(), SystemError> {
        match self.read_records(reader) {
            Ok(()) => Ok(()),
            Err(err) => {
                if let Err(reset) = self.clear() {
                    warn!(%reset, "could not reset system after a failed read");
                }
                Err(err)
            }
        }
    }

    fn read_records<R: Read>(&mut self, reader: &mut R) -> Result<(), SystemError> {
        let mut count = [0u8; std::mem::size_of::<usize>()];
        read_exact_or_malformed(reader, &mut count, "system header")?;
        let count = usize::from_ne_bytes(count);
        let time = read_float(reader, "system time")?;
        if !(time >= 0.0 && time.is_finite()) {
            return Err(SystemError::MalformedStream("system time is negative or not finite"));
        }

        if self.capacity == 0 {
            self.init_default()?;
        }
        // Overwrite in place; the buffer only grows as records arrive.
        self.bodies.clear();
        for _ in 0..count {
            let body = Body::read_from(reader)?;
            self.add_body(body)?;
        }
        self.time = time;

        let mut new_capacity = self.capacity;
        while self.bodies.len() < new_capacity / 4 {
            new_capacity /= 4;
        }
        let new_capacity = new_capacity.max(1);
        if new_capacity != self.capacity {
            self.shrink_storage(new_capacity);
        }
        Ok(())
    }

    /// Writes the body count, the time and every body record.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), SystemError> {
        writer.write_all(&self.bodies.len().to_ne_bytes())?;
        write_float(writer, self.time)?;
        for body in &self.bodies {
            body.write_to(writer)?;
        }
        Ok(())
    }

    /// Loads a system from a file written by [`save`](Self::save).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SystemError> {
        let mut reader = BufReader::new(File::open(path)?);
        let mut system = Self::new()?;
        system.read_from(&mut reader)?;
        Ok(system)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SystemError> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_to(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Writes the human readable dump produced by `Display`.
    pub fn print_to<W: Write>(&self, writer: &mut W) -> Result<(), SystemError> {
        write!(writer, "{self}")?;
        Ok(())
    }

    pub fn bodies(&self) -> &[Body] {
        &self.bodies
    }

    /// Mutable view of the bodies. The slice cannot be resized.
    pub fn bodies_mut(&mut self) -> &mut [Body] {
        &mut self.bodies
    }

    pub fn body(&self, index: usize) -> Option<&Body> {
        self.bodies.get(index)
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn time(&self) -> Float {
        self.time
    }

    /// False once the system has been destroyed or failed to initialize.
    pub fn is_usable(&self) -> bool {
        self.capacity > 0
    }

    pub fn total_mass(&self) -> Float {
        self.bodies.iter().map(|b| b.mass).sum()
    }

    pub fn total_momentum(&self) -> Vector2 {
        self.bodies.iter().fold(Vector2::zero(), |acc, b| acc + b.momentum())
    }

    pub fn kinetic_energy(&self) -> Float {
        self.bodies.iter().map(Body::kinetic_energy).sum()
    }

    /// Moves the bodies into a buffer of `new_capacity` slots. Failure only
    /// costs memory, so it is logged rather than returned.
    fn shrink_storage(&mut self, new_capacity: usize) {
        match allocate(new_capacity) {
            Ok(mut storage) => {
                storage.append(&mut self.bodies);
                self.bodies = storage;
                debug!(from = self.capacity, to = new_capacity, "shrank body storage");
                self.capacity = new_capacity;
            }
            Err(err) => {
                warn!(%err, capacity = self.capacity, "keeping oversized body storage");
            }
        }
    }
}

impl fmt::Display for BodySystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "System information:")?;
        writeln!(f, "Count of bodies: {}", self.bodies.len())?;
        writeln!(f, "System capacity: {}", self.capacity)?;
        writeln!(f, "Time: {:.6}", self.time)?;
        writeln!(f)?;
        for (i, body) in self.bodies.iter().enumerate() {
            writeln!(f, "Body index: {i}")?;
            write!(f, "{body}")?;
            writeln!(f)?;
        }
        Ok(())
    }
}
