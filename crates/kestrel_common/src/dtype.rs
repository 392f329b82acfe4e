//! Element types for numeric buffers.
//!
//! Every buffer is homogeneously typed. Flat scalar types map directly onto
//! machine integers and floats; structured records are described by a static
//! list of [`Field`]s so that a buffer of records can still be fingerprinted
//! field by field in a layout-independent way.

use std::fmt;

/// The element type of a buffer.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    /// Signed 8-bit integer.
    I8,
    /// Signed 16-bit integer.
    I16,
    /// Signed 32-bit integer.
    I32,
    /// Signed 64-bit integer.
    I64,
    /// Unsigned 8-bit integer.
    U8,
    /// Unsigned 16-bit integer.
    U16,
    /// Unsigned 32-bit integer.
    U32,
    /// Unsigned 64-bit integer.
    U64,
    /// IEEE 754 single precision float.
    F32,
    /// IEEE 754 double precision float.
    F64,
    /// A structured record made of named, fixed-size fields.
    Record(&'static [Field]),
}

/// One named field of a [`DType::Record`].
///
/// `count` is the fixed sub-shape of the field: a field holding a 3-vector
/// of `f64` has `dtype: DType::F64` and `count: 3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Field {
    /// Field name, part of the record's identity.
    pub name: &'static str,
    /// Element type of a single field value.
    pub dtype: DType,
    /// Number of consecutive values of `dtype` stored in the field.
    pub count: usize,
}

impl DType {
    /// Returns `true` for scalar (non-record) element types.
    pub fn is_flat(&self) -> bool {
        !matches!(self, DType::Record(_))
    }

    /// Size of one element in bytes.
    pub fn itemsize(&self) -> usize {
        match self {
            DType::I8 | DType::U8 => 1,
            DType::I16 | DType::U16 => 2,
            DType::I32 | DType::U32 | DType::F32 => 4,
            DType::I64 | DType::U64 | DType::F64 => 8,
            DType::Record(fields) => fields.iter().map(|f| f.dtype.itemsize() * f.count).sum(),
        }
    }

    /// Appends a canonical, platform-independent description of this type.
    ///
    /// Scalars are encoded as a kind byte and a size byte. Records are
    /// encoded as `R`, the field count, and each field's name, count and
    /// nested descriptor.
    pub fn write_descriptor(&self, out: &mut Vec<u8>) {
        match self {
            DType::Record(fields) => {
                out.push(b'R');
                out.extend_from_slice(&(fields.len() as u32).to_le_bytes());
                for field in fields.iter() {
                    out.extend_from_slice(&(field.name.len() as u32).to_le_bytes());
                    out.extend_from_slice(field.name.as_bytes());
                    out.extend_from_slice(&(field.count as u32).to_le_bytes());
                    field.dtype.write_descriptor(out);
                }
            }
            scalar => {
                let kind = match scalar {
                    DType::I8 | DType::I16 | DType::I32 | DType::I64 => b'i',
                    DType::U8 | DType::U16 | DType::U32 | DType::U64 => b'u',
                    _ => b'f',
                };
                out.push(kind);
                out.push(scalar.itemsize() as u8);
            }
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::I8 => write!(f, "int8"),
            DType::I16 => write!(f, "int16"),
            DType::I32 => write!(f, "int32"),
            DType::I64 => write!(f, "int64"),
            DType::U8 => write!(f, "uint8"),
            DType::U16 => write!(f, "uint16"),
            DType::U32 => write!(f, "uint32"),
            DType::U64 => write!(f, "uint64"),
            DType::F32 => write!(f, "float32"),
            DType::F64 => write!(f, "float64"),
            DType::Record(fields) => {
                write!(f, "record{{")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    if field.count == 1 {
                        write!(f, "{}: {}", field.name, field.dtype)?;
                    } else {
                        write!(f, "{}: [{}; {}]", field.name, field.dtype, field.count)?;
                    }
                }
                write!(f, "}}")
            }
        }
    }
}

impl fmt::Debug for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DType({self})")
    }
}

/// A value that can be stored in a tracked buffer.
///
/// The `bytemuck::Pod` bound guarantees a padding-free, plain-old-data
/// representation, which lets flat buffers be hashed straight from memory.
/// Record types implement this trait by hand and write their fields in
/// declaration order.
pub trait Element: bytemuck::Pod + PartialEq + fmt::Debug + 'static {
    /// The element type descriptor.
    const DTYPE: DType;

    /// Appends this value's canonical little-endian encoding.
    fn write_le(&self, out: &mut Vec<u8>);
}

macro_rules! impl_scalar_element {
    ($($ty:ty => $dtype:ident),* $(,)?) => {
        $(
            impl Element for $ty {
                const DTYPE: DType = DType::$dtype;

                #[inline]
                fn write_le(&self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

impl_scalar_element! {
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
}

/// Element-wise arithmetic applied to whole buffers.
///
/// Integer kinds wrap on overflow, so `255u8 + 1` is `0` and
/// `i32::MIN / -1` is `i32::MIN`. Integer division by zero has no value;
/// callers check [`Numeric::is_zero_divisor`] on every divisor before
/// writing anything. Float kinds follow IEEE 754 throughout.
pub trait Numeric: Element {
    /// Returns `self + rhs`.
    fn add(self, rhs: Self) -> Self;

    /// Returns `self - rhs`.
    fn sub(self, rhs: Self) -> Self;

    /// Returns `self * rhs`.
    fn mul(self, rhs: Self) -> Self;

    /// Returns `self / rhs`, truncating for integers.
    ///
    /// # Panics
    ///
    /// Panics for integers if `rhs` is zero.
    fn div(self, rhs: Self) -> Self;

    /// Returns `floor(self / rhs)`.
    ///
    /// # Panics
    ///
    /// Panics for integers if `rhs` is zero.
    fn floor_div(self, rhs: Self) -> Self;

    /// Returns `true` if dividing by `self` is undefined for this type.
    fn is_zero_divisor(self) -> bool;
}

macro_rules! impl_numeric_int {
    ($($ty:ty),*) => {
        $(
            impl Numeric for $ty {
                #[inline]
                fn add(self, rhs: Self) -> Self {
                    self.wrapping_add(rhs)
                }

                #[inline]
                fn sub(self, rhs: Self) -> Self {
                    self.wrapping_sub(rhs)
                }

                #[inline]
                fn mul(self, rhs: Self) -> Self {
                    self.wrapping_mul(rhs)
                }

                #[inline]
                fn div(self, rhs: Self) -> Self {
                    self.wrapping_div(rhs)
                }

                #[inline]
                #[allow(unused_comparisons)]
                fn floor_div(self, rhs: Self) -> Self {
                    let q = self.wrapping_div(rhs);
                    let r = self.wrapping_rem(rhs);
                    // Unsigned remainders are never negative, so this only
                    // adjusts signed quotients that were rounded toward zero.
                    if r != 0 && ((r < 0) != (rhs < 0)) {
                        q.wrapping_sub(1)
                    } else {
                        q
                    }
                }

                #[inline]
                fn is_zero_divisor(self) -> bool {
                    self == 0
                }
            }
        )*
    };
}

macro_rules! impl_numeric_float {
    ($($ty:ty),*) => {
        $(
            impl Numeric for $ty {
                #[inline]
                fn add(self, rhs: Self) -> Self {
                    self + rhs
                }

                #[inline]
                fn sub(self, rhs: Self) -> Self {
                    self - rhs
                }

                #[inline]
                fn mul(self, rhs: Self) -> Self {
                    self * rhs
                }

                #[inline]
                fn div(self, rhs: Self) -> Self {
                    self / rhs
                }

                #[inline]
                fn floor_div(self, rhs: Self) -> Self {
                    (self / rhs).floor()
                }

                #[inline]
                fn is_zero_divisor(self) -> bool {
                    false
                }
            }
        )*
    };
}

impl_numeric_int!(i8, i16, i32, i64, u8, u16, u32, u64);
impl_numeric_float!(f32, f64);

#[cfg(test)]
mod tests {
    use super::*;

    static POINT_FIELDS: [Field; 2] = [
        Field {
            name: "position",
            dtype: DType::F32,
            count: 3,
        },
        Field {
            name: "id",
            dtype: DType::U32,
            count: 1,
        },
    ];

    #[test]
    fn scalar_itemsize() {
        assert_eq!(DType::I8.itemsize(), 1);
        assert_eq!(DType::U16.itemsize(), 2);
        assert_eq!(DType::F32.itemsize(), 4);
        assert_eq!(DType::I64.itemsize(), 8);
    }

    #[test]
    fn record_itemsize_sums_fields() {
        let dtype = DType::Record(&POINT_FIELDS);
        assert_eq!(dtype.itemsize(), 16);
        assert!(!dtype.is_flat());
        assert!(DType::F64.is_flat());
    }

    #[test]
    fn descriptors_distinguish_same_size_types() {
        let mut a = Vec::new();
        let mut b = Vec::new();
        DType::I64.write_descriptor(&mut a);
        DType::F64.write_descriptor(&mut b);
        assert_ne!(a, b);
    }

    #[test]
    fn record_descriptor_includes_field_names() {
        static RENAMED: [Field; 2] = [
            Field {
                name: "pos",
                dtype: DType::F32,
                count: 3,
            },
            Field {
                name: "id",
                dtype: DType::U32,
                count: 1,
            },
        ];
        let mut a = Vec::new();
        let mut b = Vec::new();
        DType::Record(&POINT_FIELDS).write_descriptor(&mut a);
        DType::Record(&RENAMED).write_descriptor(&mut b);
        assert_ne!(a, b);
    }

    #[test]
    fn display_names() {
        assert_eq!(DType::F64.to_string(), "float64");
        assert_eq!(
            DType::Record(&POINT_FIELDS).to_string(),
            "record{position: [float32; 3], id: uint32}"
        );
    }

    #[test]
    fn write_le_matches_to_le_bytes() {
        let mut out = Vec::new();
        0x0102_0304i32.write_le(&mut out);
        assert_eq!(out, vec![4, 3, 2, 1]);
    }

    #[test]
    fn floor_div_signed_rounds_down() {
        assert_eq!(7i64.floor_div(2), 3);
        assert_eq!((-7i64).floor_div(2), -4);
        assert_eq!(7i64.floor_div(-2), -4);
        assert_eq!((-8i32).floor_div(2), -4);
    }

    #[test]
    fn floor_div_float() {
        assert_eq!(7.5f64.floor_div(2.0), 3.0);
        assert_eq!((-7.5f64).floor_div(2.0), -4.0);
        assert_eq!(9u8.floor_div(4), 2);
    }

    #[test]
    fn integer_arithmetic_wraps() {
        assert_eq!(Numeric::add(255u8, 1), 0);
        assert_eq!(Numeric::sub(0u16, 1), u16::MAX);
        assert_eq!(Numeric::mul(i8::MAX, 2), -2);
        assert_eq!(Numeric::div(i32::MIN, -1), i32::MIN);
        assert_eq!(i32::MIN.floor_div(-1), i32::MIN);
        assert_eq!(i64::MIN.floor_div(2), i64::MIN / 2);
    }

    #[test]
    fn zero_divisor_only_for_integers() {
        assert!(0u8.is_zero_divisor());
        assert!(0i64.is_zero_divisor());
        assert!(!3i64.is_zero_divisor());
        assert!(!0.0f64.is_zero_divisor());
        assert_eq!(Numeric::div(1.0f32, 0.0), f32::INFINITY);
    }
}
