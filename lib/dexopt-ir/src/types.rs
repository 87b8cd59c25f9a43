//! Dalvik type descriptors.

use crate::errors::{IrError, IrResult};
use std::fmt;

/// A Dalvik type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Type {
    /// `void`, only valid as a return type.
    Void,
    /// `boolean`.
    Boolean,
    /// `byte`.
    Byte,
    /// `short`.
    Short,
    /// `char`.
    Char,
    /// `int`.
    Int,
    /// `long`.
    Long,
    /// `float`.
    Float,
    /// `double`.
    Double,
    /// Array with the given number of dimensions over a non-array
    /// element type.
    Array(usize, Box<Self>),
    /// A class, identified by its internal name (`java/lang/Object`).
    Class(String),
}

impl Type {
    /// Shorthand for a class type.
    #[must_use]
    pub fn class(name: &str) -> Self {
        Self::Class(name.to_string())
    }

    /// Returns whether values of this type occupy a register pair.
    #[inline]
    #[must_use]
    pub const fn is_wide(&self) -> bool {
        matches!(self, Self::Long | Self::Double)
    }

    /// Returns whether this is a class or array type.
    #[inline]
    #[must_use]
    pub const fn is_reference(&self) -> bool {
        matches!(self, Self::Class(_) | Self::Array(_, _))
    }

    pub fn as_class_name(&self) -> IrResult<&str> {
        if let Self::Class(name) = self {
            Ok(name)
        } else {
            Err(IrError::NotAClass(self.to_string()))
        }
    }

    /// Returns the element type obtained by removing one array
    /// dimension.
    pub fn array_element(&self) -> IrResult<Self> {
        match self {
            Self::Array(1, elt) => Ok(elt.as_ref().clone()),
            Self::Array(n, elt) => Ok(Self::Array(n - 1, elt.clone())),
            _ => Err(IrError::NotAnArray(self.to_string())),
        }
    }
}

impl TryFrom<&str> for Type {
    type Error = IrError;

    fn try_from(descriptor: &str) -> IrResult<Self> {
        let invalid = || IrError::InvalidDescriptor(descriptor.to_string());
        match descriptor.as_bytes().first().ok_or_else(invalid)? {
            b'V' if descriptor.len() == 1 => Ok(Self::Void),
            b'Z' if descriptor.len() == 1 => Ok(Self::Boolean),
            b'B' if descriptor.len() == 1 => Ok(Self::Byte),
            b'S' if descriptor.len() == 1 => Ok(Self::Short),
            b'C' if descriptor.len() == 1 => Ok(Self::Char),
            b'I' if descriptor.len() == 1 => Ok(Self::Int),
            b'J' if descriptor.len() == 1 => Ok(Self::Long),
            b'F' if descriptor.len() == 1 => Ok(Self::Float),
            b'D' if descriptor.len() == 1 => Ok(Self::Double),
            b'L' if descriptor.ends_with(';') => Ok(Self::Class(
                descriptor[1..descriptor.len() - 1].to_string(),
            )),
            b'[' => {
                let dims = descriptor.bytes().take_while(|b| *b == b'[').count();
                let elt = Self::try_from(&descriptor[dims..])?;
                if matches!(elt, Self::Void | Self::Array(_, _)) {
                    return Err(invalid());
                }
                Ok(Self::Array(dims, Box::new(elt)))
            }
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Void => write!(f, "V"),
            Self::Boolean => write!(f, "Z"),
            Self::Byte => write!(f, "B"),
            Self::Short => write!(f, "S"),
            Self::Char => write!(f, "C"),
            Self::Int => write!(f, "I"),
            Self::Long => write!(f, "J"),
            Self::Float => write!(f, "F"),
            Self::Double => write!(f, "D"),
            Self::Array(n, elt) => {
                for _ in 0..*n {
                    write!(f, "[")?;
                }
                write!(f, "{elt}")
            }
            Self::Class(name) => write!(f, "L{name};"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_roundtrip() {
        for descr in ["I", "J", "Ljava/lang/Object;", "[I", "[[Ljava/util/List;"] {
            let typ = Type::try_from(descr).unwrap();
            assert_eq!(typ.to_string(), descr);
        }
    }

    #[test]
    fn invalid_descriptors() {
        for descr in ["", "X", "Ljava/lang/Object", "[", "[V", "II"] {
            assert!(Type::try_from(descr).is_err(), "{descr} should not parse");
        }
    }

    #[test]
    fn array_element_strips_one_dimension() {
        let arr = Type::try_from("[[I").unwrap();
        assert_eq!(arr.array_element().unwrap(), Type::try_from("[I").unwrap());
        assert_eq!(
            Type::try_from("[I").unwrap().array_element().unwrap(),
            Type::Int
        );
        assert!(Type::Int.array_element().is_err());
    }
}
