//! Erased value kinds.
//!
//! [`BasicType`] is the erasure every handle computation is expressed in:
//! references collapse to `L`, sub-word integers to `I`. [`PrimitiveKind`]
//! keeps the full primitive vocabulary needed for conversions and boxing.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BasicType {
    L,
    I,
    J,
    F,
    D,
    V,
}

impl BasicType {
    /// The basic types a captured slot or a parameter may have.
    pub const ARG_TYPES: [BasicType; 5] = [
        BasicType::L,
        BasicType::I,
        BasicType::J,
        BasicType::F,
        BasicType::D,
    ];

    pub fn as_char(self) -> char {
        match self {
            BasicType::L => 'L',
            BasicType::I => 'I',
            BasicType::J => 'J',
            BasicType::F => 'F',
            BasicType::D => 'D',
            BasicType::V => 'V',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'L' => Some(BasicType::L),
            'I' => Some(BasicType::I),
            'J' => Some(BasicType::J),
            'F' => Some(BasicType::F),
            'D' => Some(BasicType::D),
            'V' => Some(BasicType::V),
            _ => None,
        }
    }

    /// Position of this type in [`BasicType::ARG_TYPES`]; `None` for `V`.
    pub fn ordinal(self) -> Option<usize> {
        match self {
            BasicType::L => Some(0),
            BasicType::I => Some(1),
            BasicType::J => Some(2),
            BasicType::F => Some(3),
            BasicType::D => Some(4),
            BasicType::V => None,
        }
    }

    /// Call-stack slots taken by a value of this type.
    pub fn slot_count(self) -> usize {
        match self {
            BasicType::J | BasicType::D => 2,
            BasicType::V => 0,
            _ => 1,
        }
    }

    pub fn is_void(self) -> bool {
        self == BasicType::V
    }

    pub fn is_reference(self) -> bool {
        self == BasicType::L
    }

    /// The primitive kind a value of this basic type is stored as.
    pub fn primitive_kind(self) -> Option<PrimitiveKind> {
        match self {
            BasicType::I => Some(PrimitiveKind::Int),
            BasicType::J => Some(PrimitiveKind::Long),
            BasicType::F => Some(PrimitiveKind::Float),
            BasicType::D => Some(PrimitiveKind::Double),
            BasicType::V => Some(PrimitiveKind::Void),
            BasicType::L => None,
        }
    }

    pub fn signature(types: &[BasicType]) -> String {
        types.iter().map(|ty| ty.as_char()).collect()
    }

    pub fn parse_signature(signature: &str) -> Option<Vec<BasicType>> {
        signature.chars().map(BasicType::from_char).collect()
    }
}

impl Display for BasicType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// The primitive types of the host language, `void` included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PrimitiveKind {
    Boolean,
    Byte,
    Short,
    Char,
    Int,
    Long,
    Float,
    Double,
    Void,
}

impl PrimitiveKind {
    pub const ALL: [PrimitiveKind; 9] = [
        PrimitiveKind::Boolean,
        PrimitiveKind::Byte,
        PrimitiveKind::Short,
        PrimitiveKind::Char,
        PrimitiveKind::Int,
        PrimitiveKind::Long,
        PrimitiveKind::Float,
        PrimitiveKind::Double,
        PrimitiveKind::Void,
    ];

    pub fn basic_type(self) -> BasicType {
        match self {
            PrimitiveKind::Boolean
            | PrimitiveKind::Byte
            | PrimitiveKind::Short
            | PrimitiveKind::Char
            | PrimitiveKind::Int => BasicType::I,
            PrimitiveKind::Long => BasicType::J,
            PrimitiveKind::Float => BasicType::F,
            PrimitiveKind::Double => BasicType::D,
            PrimitiveKind::Void => BasicType::V,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PrimitiveKind::Boolean => "boolean",
            PrimitiveKind::Byte => "byte",
            PrimitiveKind::Short => "short",
            PrimitiveKind::Char => "char",
            PrimitiveKind::Int => "int",
            PrimitiveKind::Long => "long",
            PrimitiveKind::Float => "float",
            PrimitiveKind::Double => "double",
            PrimitiveKind::Void => "void",
        }
    }

    pub fn descriptor_char(self) -> char {
        match self {
            PrimitiveKind::Boolean => 'Z',
            PrimitiveKind::Byte => 'B',
            PrimitiveKind::Short => 'S',
            PrimitiveKind::Char => 'C',
            PrimitiveKind::Int => 'I',
            PrimitiveKind::Long => 'J',
            PrimitiveKind::Float => 'F',
            PrimitiveKind::Double => 'D',
            PrimitiveKind::Void => 'V',
        }
    }

    pub fn from_descriptor_char(c: char) -> Option<Self> {
        PrimitiveKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.descriptor_char() == c)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        PrimitiveKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == name)
    }

    /// Fully qualified name of the boxing class.
    pub fn wrapper_name(self) -> &'static str {
        match self {
            PrimitiveKind::Boolean => "java.lang.Boolean",
            PrimitiveKind::Byte => "java.lang.Byte",
            PrimitiveKind::Short => "java.lang.Short",
            PrimitiveKind::Char => "java.lang.Character",
            PrimitiveKind::Int => "java.lang.Integer",
            PrimitiveKind::Long => "java.lang.Long",
            PrimitiveKind::Float => "java.lang.Float",
            PrimitiveKind::Double => "java.lang.Double",
            PrimitiveKind::Void => "java.lang.Void",
        }
    }

    pub fn is_subword(self) -> bool {
        matches!(
            self,
            PrimitiveKind::Boolean | PrimitiveKind::Byte | PrimitiveKind::Short | PrimitiveKind::Char
        )
    }

    pub fn is_integral(self) -> bool {
        matches!(
            self,
            PrimitiveKind::Byte
                | PrimitiveKind::Short
                | PrimitiveKind::Char
                | PrimitiveKind::Int
                | PrimitiveKind::Long
        )
    }

    pub fn is_floating(self) -> bool {
        matches!(self, PrimitiveKind::Float | PrimitiveKind::Double)
    }

    pub fn is_numeric(self) -> bool {
        self.is_integral() || self.is_floating()
    }

    /// Whether a widening (or identity) primitive conversion from `src` to
    /// `self` exists.
    pub fn is_convertible_from(self, src: PrimitiveKind) -> bool {
        use PrimitiveKind::*;
        if self == src {
            return true;
        }
        match src {
            Byte => matches!(self, Short | Int | Long | Float | Double),
            Short | Char => matches!(self, Int | Long | Float | Double),
            Int => matches!(self, Long | Float | Double),
            Long => matches!(self, Float | Double),
            Float => matches!(self, Double),
            Boolean | Double | Void => false,
        }
    }
}

impl Display for PrimitiveKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widening_follows_the_primitive_lattice() {
        assert!(PrimitiveKind::Long.is_convertible_from(PrimitiveKind::Int));
        assert!(PrimitiveKind::Int.is_convertible_from(PrimitiveKind::Char));
        assert!(!PrimitiveKind::Short.is_convertible_from(PrimitiveKind::Char));
        assert!(!PrimitiveKind::Int.is_convertible_from(PrimitiveKind::Long));
        assert!(!PrimitiveKind::Int.is_convertible_from(PrimitiveKind::Boolean));
        assert!(PrimitiveKind::Double.is_convertible_from(PrimitiveKind::Float));
    }

    #[test]
    fn signature_round_trips_through_chars() {
        let types = vec![BasicType::L, BasicType::I, BasicType::D];
        let sig = BasicType::signature(&types);
        assert_eq!(sig, "LID");
        assert_eq!(BasicType::parse_signature(&sig), Some(types));
        assert_eq!(BasicType::parse_signature("LX"), None);
    }
}
