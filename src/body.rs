use std::borrow::Cow;
use std::fmt;
use std::io::{Read, Write};

use crate::error::SystemError;
use crate::math::{read_exact_or_malformed, read_float, write_float, DisplayVector, Float, Vector2, VectorExt};

/// Longest name a body can carry, in bytes. Serialized names add a NUL.
pub const MAX_NAME_LEN: usize = 255;

/// A named point mass in the simulation.
#[derive(Clone, Debug, PartialEq)]
pub struct Body {
    /// Name bytes, at most [`MAX_NAME_LEN`] of them and never NUL. Names
    /// from files are kept verbatim, even when they are not UTF-8.
    name: Vec<u8>,
    /// Position vector.
    pub pos: Vector2,
    /// Velocity vector.
    pub vel: Vector2,
    /// Gravitational force accumulated during the last step.
    pub force: Vector2,
    /// Mass of the body.
    pub mass: Float,
    /// Collision radius of the body.
    pub radius: Float,
}

impl Default for Body {
    fn default() -> Self {
        Self::new("", Vector2::zero(), Vector2::zero(), 1.0, 1.0)
    }
}

impl Body {
    /// Creates a new Body with the given properties.
    /// Initial force is zero. Mass and radius are not checked; see [`Body::try_new`].
    pub fn new(name: &str, pos: Vector2, vel: Vector2, mass: Float, radius: Float) -> Self {
        Self::with_state(name, pos, vel, Vector2::zero(), mass, radius)
    }

    /// Creates a body with an explicit force, as stored in system files.
    pub fn with_state(
        name: &str,
        pos: Vector2,
        vel: Vector2,
        force: Vector2,
        mass: Float,
        radius: Float,
    ) -> Self {
        Self {
            name: bounded_name(name),
            pos,
            vel,
            force,
            mass,
            radius,
        }
    }

    /// Like [`Body::new`], but rejects non-positive (or NaN) mass and radius.
    pub fn try_new(
        name: &str,
        pos: Vector2,
        vel: Vector2,
        mass: Float,
        radius: Float,
    ) -> Result<Self, SystemError> {
        if !(mass > 0.0 && radius > 0.0) {
            return Err(SystemError::InvalidBody { mass, radius });
        }
        Ok(Self::new(name, pos, vel, mass, radius))
    }

    /// The name as text; invalid UTF-8 shows up as U+FFFD.
    pub fn name(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.name)
    }

    /// The name exactly as stored and serialized.
    pub fn name_bytes(&self) -> &[u8] {
        &self.name
    }

    /// Replaces the name, truncating it like the constructors do.
    pub fn set_name(&mut self, name: &str) {
        self.name = bounded_name(name);
    }

    /// Replaces the name with raw bytes, cut at the first NUL and after
    /// [`MAX_NAME_LEN`] bytes.
    pub fn set_name_bytes(&mut self, name: &[u8]) {
        let end = name.iter().position(|&b| b == 0).unwrap_or(name.len());
        self.name = name[..end.min(MAX_NAME_LEN)].to_vec();
    }

    /// Deep copy of every field of `src` into `self`, reusing the name buffer.
    pub fn copy_from(&mut self, src: &Body) {
        self.clone_from(src);
    }

    /// Linear momentum `m * v`.
    #[inline]
    pub fn momentum(&self) -> Vector2 {
        self.vel * self.mass
    }

    #[inline]
    pub fn kinetic_energy(&self) -> Float {
        0.5 * self.mass * self.vel.mag_sq()
    }

    /// Applies the end of an integration step.
    ///
    /// `vel_after_collision` is the velocity after collision response; the
    /// accumulated force is then applied over `dt` and the position advanced.
    /// With `trapezoidal` the position moves by the mean of the two
    /// velocities, otherwise by the final velocity (semi-implicit Euler).
    #[inline]
    pub fn advance(&mut self, vel_after_collision: Vector2, dt: Float, trapezoidal: bool) {
        let vel = vel_after_collision + self.force * (dt / self.mass);
        if trapezoidal {
            self.pos += vel_after_collision * dt + (vel - vel_after_collision) * (dt / 2.0);
        } else {
            self.pos += vel * dt;
        }
        self.vel = vel;
    }

    /// Writes the NUL-terminated name followed by the fixed-width fields:
    /// position, velocity, force, mass, radius.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), SystemError> {
        writer.write_all(&self.name)?;
        writer.write_all(&[0])?;
        self.pos.write_to(writer)?;
        self.vel.write_to(writer)?;
        self.force.write_to(writer)?;
        write_float(writer, self.mass)?;
        write_float(writer, self.radius)
    }

    /// Reads a record written by [`Body::write_to`].
    ///
    /// The name is scanned byte by byte up to its terminator; a name longer
    /// than [`MAX_NAME_LEN`] or a stream ending early is `MalformedStream`.
    /// Wrap unbuffered readers in a `BufReader`.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, SystemError> {
        let mut name = Vec::with_capacity(32);
        loop {
            let mut byte = [0u8; 1];
            read_exact_or_malformed(reader, &mut byte, "body name ended early")?;
            if byte[0] == 0 {
                break;
            }
            if name.len() == MAX_NAME_LEN {
                return Err(SystemError::MalformedStream("body name is not terminated"));
            }
            name.push(byte[0]);
        }

        let pos = Vector2::read_from(reader)?;
        let vel = Vector2::read_from(reader)?;
        let force = Vector2::read_from(reader)?;
        let mass = read_float(reader, "body mass")?;
        let radius = read_float(reader, "body radius")?;

        Ok(Self {
            name,
            pos,
            vel,
            force,
            mass,
            radius,
        })
    }

    /// Writes the human readable form produced by `Display`.
    pub fn print_to<W: Write>(&self, writer: &mut W) -> Result<(), SystemError> {
        write!(writer, "{self}")?;
        Ok(())
    }
}

impl fmt::Display for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Body: {}", self.name())?;
        writeln!(f, "Coordinates = {}", DisplayVector(&self.pos))?;
        writeln!(f, "Speed = {}", DisplayVector(&self.vel))?;
        writeln!(f, "Force = {}", DisplayVector(&self.force))?;
        writeln!(f, "Mass = {:.6}", self.mass)?;
        writeln!(f, "Radius = {:.6}", self.radius)
    }
}

/// Cuts a name at its first NUL and then to at most `MAX_NAME_LEN` bytes,
/// backing off to a char boundary.
fn bounded_name(name: &str) -> Vec<u8> {
    let name = name.split('\0').next().unwrap_or_default();
    let mut end = name.len().min(MAX_NAME_LEN);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name.as_bytes()[..end].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample(name: &str) -> Body {
        Body::with_state(
            name,
            Vector2::new(1.5, -2.0),
            Vector2::new(0.25, 3.0),
            Vector2::new(-7.0, 8.5),
            5.972e24,
            6.371e6,
        )
    }

    fn round_trip(body: &Body) -> Body {
        let mut buf = Vec::new();
        body.write_to(&mut buf).unwrap();
        Body::read_from(&mut Cursor::new(buf)).unwrap()
    }

    #[test]
    fn short_name_round_trips() {
        let body = sample("Earth");
        assert_eq!(round_trip(&body), body);
    }

    #[test]
    fn max_length_name_round_trips() {
        let body = sample(&"x".repeat(MAX_NAME_LEN));
        assert_eq!(body.name().len(), MAX_NAME_LEN);
        assert_eq!(round_trip(&body), body);
    }

    #[test]
    fn long_names_are_truncated() {
        let body = sample(&"y".repeat(MAX_NAME_LEN + 40));
        assert_eq!(body.name(), "y".repeat(MAX_NAME_LEN));
        assert_eq!(round_trip(&body).name(), body.name());
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        // 254 ASCII bytes then a 2-byte char straddling the limit.
        let name = format!("{}é", "a".repeat(MAX_NAME_LEN - 1));
        let body = sample(&name);
        assert_eq!(body.name(), "a".repeat(MAX_NAME_LEN - 1));
    }

    #[test]
    fn nul_ends_the_name() {
        let body = sample("Mars\0ignored");
        assert_eq!(body.name(), "Mars");
    }

    #[test]
    fn non_utf8_names_from_files_round_trip_byte_for_byte() {
        let raw = [b'K', 0xe9, b'p', 0xff, 0xfe];
        let mut buf = raw.to_vec();
        buf.push(0);
        let mut tail = Vec::new();
        sample("").write_to(&mut tail).unwrap();
        buf.extend_from_slice(&tail[1..]);

        let body = Body::read_from(&mut Cursor::new(buf.clone())).unwrap();
        assert_eq!(body.name_bytes(), &raw);
        assert_eq!(body.name(), "K\u{fffd}p\u{fffd}\u{fffd}");

        let mut out = Vec::new();
        body.write_to(&mut out).unwrap();
        assert_eq!(out, buf);
    }

    #[test]
    fn max_length_non_utf8_name_is_not_truncated() {
        let mut body = sample("");
        body.set_name_bytes(&[0xff; MAX_NAME_LEN + 3]);
        assert_eq!(body.name_bytes().len(), MAX_NAME_LEN);
        assert_eq!(round_trip(&body), body);

        body.set_name_bytes(b"Ph\0obos");
        assert_eq!(body.name_bytes(), b"Ph");
    }

    #[test]
    fn record_layout_is_name_nul_then_eight_floats() {
        let mut buf = Vec::new();
        sample("Io").write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), 3 + 8 * crate::math::FLOAT_SIZE);
        assert_eq!(&buf[..3], b"Io\0");
    }

    #[test]
    fn unterminated_name_is_rejected() {
        let buf = vec![b'z'; MAX_NAME_LEN + 1];
        let err = Body::read_from(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, SystemError::MalformedStream(_)));
    }

    #[test]
    fn truncated_tail_is_rejected() {
        let mut buf = Vec::new();
        sample("Venus").write_to(&mut buf).unwrap();
        buf.truncate(buf.len() - 1);
        let err = Body::read_from(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, SystemError::MalformedStream(_)));
    }

    #[test]
    fn try_new_rejects_non_positive_mass_or_radius() {
        let zero = Vector2::zero();
        assert!(Body::try_new("a", zero, zero, 0.0, 1.0).is_err());
        assert!(Body::try_new("a", zero, zero, 1.0, -1.0).is_err());
        assert!(Body::try_new("a", zero, zero, Float::NAN, 1.0).is_err());
        assert!(Body::try_new("a", zero, zero, 1.0, 1.0).is_ok());
    }

    #[test]
    fn copy_from_is_deep() {
        let src = sample("Ceres");
        let mut dst = Body::default();
        dst.copy_from(&src);
        assert_eq!(dst, src);
    }

    #[test]
    fn advance_without_force_is_uniform_motion() {
        let mut body = Body::new("drift", Vector2::zero(), Vector2::new(2.0, -1.0), 1.0, 1.0);
        let vel = body.vel;
        body.advance(vel, 0.5, true);
        assert_eq!(body.pos, Vector2::new(1.0, -0.5));
        assert_eq!(body.vel, vel);
    }

    #[test]
    fn display_lists_every_field() {
        let text = sample("Luna").to_string();
        assert!(text.starts_with("Body: Luna\n"));
        assert!(text.contains("Coordinates = (1.500000, -2.000000)"));
        assert!(text.contains("Speed = (0.250000, 3.000000)"));
        assert!(text.contains("Force = (-7.000000, 8.500000)"));
        assert!(text.contains("Mass = "));
        assert!(text.contains("Radius = "));
    }
}
