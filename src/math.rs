//! Scalar and vector types shared by the whole crate.
//!
//! The float width is a build-time choice: the default build uses `f64`,
//! the `single-precision` feature switches every float to `f32`. The width is
//! baked into the binary system format, so files only round-trip between
//! builds that agree on it.

use std::fmt;
use std::io::{Read, Write};

use crate::error::SystemError;

/// Floating point type used for positions, velocities, masses and time.
#[cfg(not(feature = "single-precision"))]
pub type Float = f64;
/// Floating point type used for positions, velocities, masses and time.
#[cfg(feature = "single-precision")]
pub type Float = f32;

/// 2D vector type for positions, velocities and forces.
#[cfg(not(feature = "single-precision"))]
pub type Vector2 = ultraviolet::DVec2;
/// 2D vector type for positions, velocities and forces.
#[cfg(feature = "single-precision")]
pub type Vector2 = ultraviolet::Vec2;

/// Newtonian gravitational constant in SI units.
pub const GRAVITY_CONST: Float = 6.6743015e-11;

/// Size in bytes of one serialized float.
pub const FLOAT_SIZE: usize = std::mem::size_of::<Float>();

/// Operations the simulation needs on top of what `ultraviolet` provides.
///
/// Addition, subtraction, scaling, division and the dot product come straight
/// from the vector type's operators and `dot`; `mag` is the Euclidean norm.
pub trait VectorExt: Sized {
    /// Euclidean distance between two points.
    fn distance(&self, other: &Self) -> Float;

    /// Unit vector in the same direction.
    ///
    /// The caller must ensure the vector is not zero; no guard is applied and
    /// a zero vector yields NaN components.
    fn unit(&self) -> Self;

    /// Reads a fixed-width record of two native-endian floats.
    fn read_from<R: Read>(reader: &mut R) -> Result<Self, SystemError>;

    /// Writes the vector as two native-endian floats, `x` then `y`.
    fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), SystemError>;
}

impl VectorExt for Vector2 {
    #[inline]
    fn distance(&self, other: &Self) -> Float {
        (*self - *other).mag()
    }

    #[inline]
    fn unit(&self) -> Self {
        *self / self.mag()
    }

    fn read_from<R: Read>(reader: &mut R) -> Result<Self, SystemError> {
        let x = read_float(reader, "vector x component")?;
        let y = read_float(reader, "vector y component")?;
        Ok(Vector2::new(x, y))
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), SystemError> {
        write_float(writer, self.x)?;
        write_float(writer, self.y)
    }
}

/// Renders a vector as `(x, y)` with six decimals.
pub struct DisplayVector<'a>(pub &'a Vector2);

impl fmt::Display for DisplayVector<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.0.x, self.0.y)
    }
}

/// Reads one native-endian float. `what` names the field for error reports.
pub(crate) fn read_float<R: Read>(reader: &mut R, what: &'static str) -> Result<Float, SystemError> {
    let mut buf = [0u8; FLOAT_SIZE];
    read_exact_or_malformed(reader, &mut buf, what)?;
    Ok(Float::from_ne_bytes(buf))
}

pub(crate) fn write_float<W: Write>(writer: &mut W, value: Float) -> Result<(), SystemError> {
    writer.write_all(&value.to_ne_bytes())?;
    Ok(())
}

/// Fills `buf` completely; a short read becomes `MalformedStream`.
pub(crate) fn read_exact_or_malformed<R: Read>(
    reader: &mut R,
    buf: &mut [u8],
    what: &'static str,
) -> Result<(), SystemError> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => SystemError::MalformedStream(what),
        _ => SystemError::Io(e),
    })
}
