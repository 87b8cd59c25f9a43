//! The abstract type lattices of the typing pass.
//!
//! Registers carry two orthogonal pieces of information: a scalar
//! lattice element ([`IRType`]) tracking the value kind and width, and
//! a reference domain element ([`DexTypeDomain`]) tracking the
//! concrete class and nullness of references.

use crate::repo::Repo;
use dexopt_ir::types::Type;
use lazy_static::lazy_static;
use std::fmt;

lazy_static! {
    pub static ref JAVA_LANG_OBJECT: Type = Type::class("java/lang/Object");
    pub static ref JAVA_LANG_STRING: Type = Type::class("java/lang/String");
    pub static ref JAVA_LANG_CLASS: Type = Type::class("java/lang/Class");
    pub static ref JAVA_LANG_THROWABLE: Type = Type::class("java/lang/Throwable");
}

/// The scalar register lattice.
///
/// The ordering, bottom to top:
///
/// ```text
/// Bottom <= Zero <= Const1 <= { Boolean, Float, Reference }
/// Boolean <= { Byte, Char } ; Byte <= Short <= Int ; Char <= Int
/// { Int, Float, Reference } <= Scalar <= Top
/// Bottom <= Const2 <= { Long1, Long2, Double1, Double2 } <= Top
/// ```
///
/// The narrow and wide families only meet at `Bottom` and `Top`:
/// joining across widths is a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IRType {
    Top,
    /// A 32-bit value of unknown kind (int, float or reference).
    Scalar,
    /// A nullable object or array reference.
    Reference,
    Int,
    Float,
    Short,
    Char,
    Byte,
    Boolean,
    /// A 32-bit constant of unknown numeric kind.
    Const1,
    /// The literal 0, usable as an integer or as null.
    Zero,
    /// A 64-bit constant of unknown kind; both halves carry this tag.
    Const2,
    /// First half of a long pair.
    Long1,
    /// Second half of a long pair.
    Long2,
    /// First half of a double pair.
    Double1,
    /// Second half of a double pair.
    Double2,
    Bottom,
}

impl fmt::Display for IRType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Top => write!(f, "⊤"),
            Self::Scalar => write!(f, "scalar"),
            Self::Reference => write!(f, "reference"),
            Self::Int => write!(f, "int"),
            Self::Float => write!(f, "float"),
            Self::Short => write!(f, "short"),
            Self::Char => write!(f, "char"),
            Self::Byte => write!(f, "byte"),
            Self::Boolean => write!(f, "boolean"),
            Self::Const1 => write!(f, "const"),
            Self::Zero => write!(f, "zero"),
            Self::Const2 => write!(f, "const-wide"),
            Self::Long1 => write!(f, "long1"),
            Self::Long2 => write!(f, "long2"),
            Self::Double1 => write!(f, "double1"),
            Self::Double2 => write!(f, "double2"),
            Self::Bottom => write!(f, "⊥"),
        }
    }
}

impl IRType {
    /// The lattice partial order: `a.leq(b)` iff `a ⊔ b = b`.
    #[must_use]
    pub fn leq(self, other: Self) -> bool {
        use IRType::*;
        match (self, other) {
            (Bottom, _) | (_, Top) => true,
            (a, b) if a == b => true,
            (Zero, Const1 | Boolean | Byte | Short | Char | Int | Float | Reference | Scalar) => {
                true
            }
            (Const1, Boolean | Byte | Short | Char | Int | Float | Reference | Scalar) => true,
            (Boolean, Byte | Short | Char | Int | Scalar) => true,
            (Byte, Short | Int | Scalar) => true,
            (Short, Int | Scalar) => true,
            (Char, Int | Scalar) => true,
            (Int | Float | Reference, Scalar) => true,
            (Const2, Long1 | Long2 | Double1 | Double2) => true,
            _ => false,
        }
    }

    /// The least upper bound.
    #[must_use]
    pub fn join(self, other: Self) -> Self {
        if self.leq(other) {
            return other;
        }
        if other.leq(self) {
            return self;
        }
        // incomparable: two distinct int subtypes meet at Int, any two
        // narrow kinds meet at Scalar, width conflicts at Top
        if self.leq(Self::Int) && other.leq(Self::Int) {
            Self::Int
        } else if self.leq(Self::Scalar) && other.leq(Self::Scalar) {
            Self::Scalar
        } else {
            Self::Top
        }
    }

    /// Whether the element belongs to the wide (register pair) family.
    #[inline]
    #[must_use]
    pub fn is_wide(self) -> bool {
        matches!(
            self,
            Self::Const2 | Self::Long1 | Self::Long2 | Self::Double1 | Self::Double2
        )
    }

    /// Whether the element may tag the first half of a pair.
    #[inline]
    #[must_use]
    pub fn is_wide_first(self) -> bool {
        matches!(self, Self::Const2 | Self::Long1 | Self::Double1)
    }

    /// Whether the element may tag the second half of a pair.
    #[inline]
    #[must_use]
    pub fn is_wide_second(self) -> bool {
        matches!(self, Self::Const2 | Self::Long2 | Self::Double2)
    }

    /// The tag of the second pair half matching a first half.
    #[must_use]
    pub fn wide_pair_of(self) -> Self {
        match self {
            Self::Long1 => Self::Long2,
            Self::Double1 => Self::Double2,
            Self::Const2 => Self::Const2,
            _ => Self::Top,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_reference(self) -> bool {
        self.leq(Self::Reference)
    }

    #[inline]
    #[must_use]
    pub fn is_integer(self) -> bool {
        self.leq(Self::Int)
    }
}

/// The nullness lattice of the reference domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nullness {
    Bottom,
    IsNull,
    NotNull,
    MaybeNull,
    Unknown,
}

impl fmt::Display for Nullness {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Bottom => write!(f, "⊥"),
            Self::IsNull => write!(f, "null"),
            Self::NotNull => write!(f, "not-null"),
            Self::MaybeNull => write!(f, "maybe-null"),
            Self::Unknown => write!(f, "?"),
        }
    }
}

impl Nullness {
    #[must_use]
    pub fn leq(self, other: Self) -> bool {
        match (self, other) {
            (Self::Bottom, _) | (_, Self::Unknown) => true,
            (a, b) if a == b => true,
            (Self::IsNull | Self::NotNull, Self::MaybeNull) => true,
            _ => false,
        }
    }

    #[must_use]
    pub fn join(self, other: Self) -> Self {
        if self.leq(other) {
            other
        } else if other.leq(self) {
            self
        } else {
            // IsNull ⊔ NotNull
            Self::MaybeNull
        }
    }
}

/// The reference domain: optional concrete class identity, nullness,
/// and object initialization state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DexTypeDomain {
    Bottom,
    /// A freshly allocated object before its constructor ran, or the
    /// receiver of a constructor before the superclass constructor
    /// call.
    Uninit { class: Type, is_this: bool },
    /// An initialized value; `class` is absent when the concrete type
    /// could not be inferred.
    Typed {
        class: Option<Type>,
        nullness: Nullness,
    },
}

impl fmt::Display for DexTypeDomain {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Bottom => write!(f, "⊥"),
            Self::Uninit { class, is_this } => {
                write!(f, "uninit<{class}>{}", if *is_this { " (this)" } else { "" })
            }
            Self::Typed { class: None, nullness } => write!(f, "?[{nullness}]"),
            Self::Typed {
                class: Some(class),
                nullness,
            } => write!(f, "{class}[{nullness}]"),
        }
    }
}

impl DexTypeDomain {
    /// The domain top: nothing known.
    #[must_use]
    pub const fn top() -> Self {
        Self::Typed {
            class: None,
            nullness: Nullness::Unknown,
        }
    }

    /// A value of known concrete type.
    #[must_use]
    pub const fn of_type(class: Type, nullness: Nullness) -> Self {
        Self::Typed {
            class: Some(class),
            nullness,
        }
    }

    /// The null literal: no class, known to be null.
    #[must_use]
    pub const fn null() -> Self {
        Self::Typed {
            class: None,
            nullness: Nullness::IsNull,
        }
    }

    #[must_use]
    pub fn get_dex_type(&self) -> Option<&Type> {
        match self {
            Self::Typed {
                class: Some(class), ..
            } => Some(class),
            _ => None,
        }
    }

    #[must_use]
    pub fn nullness(&self) -> Nullness {
        match self {
            Self::Bottom => Nullness::Bottom,
            Self::Uninit { .. } => Nullness::NotNull,
            Self::Typed { nullness, .. } => *nullness,
        }
    }

    #[must_use]
    pub const fn is_uninit(&self) -> bool {
        matches!(self, Self::Uninit { .. })
    }

    /// Replaces the nullness, keeping the class identity; meaningful
    /// on initialized values only.
    #[must_use]
    pub fn with_nullness(&self, nullness: Nullness) -> Self {
        match self {
            Self::Typed { class, .. } => Self::Typed {
                class: class.clone(),
                nullness,
            },
            other => other.clone(),
        }
    }

    pub fn leq(&self, other: &Self, repo: &Repo) -> bool {
        match (self, other) {
            (Self::Bottom, _) => true,
            (_, Self::Bottom) => false,
            (Self::Uninit { .. }, Self::Uninit { .. }) => self == other,
            (Self::Uninit { .. }, Self::Typed { class, nullness }) => {
                class.is_none() && self.nullness().leq(*nullness)
            }
            (Self::Typed { .. }, Self::Uninit { .. }) => false,
            (
                Self::Typed {
                    class: c1,
                    nullness: n1,
                },
                Self::Typed {
                    class: c2,
                    nullness: n2,
                },
            ) => {
                if !n1.leq(*n2) {
                    return false;
                }
                match (c1, c2) {
                    (_, None) => true,
                    (None, Some(_)) => false,
                    (Some(class1), Some(class2)) => class_leq(class1, class2, repo),
                }
            }
        }
    }

    pub fn join(self, other: Self, repo: &Repo) -> Self {
        match (self, other) {
            (Self::Bottom, other) => other,
            (this, Self::Bottom) => this,
            (this @ Self::Uninit { .. }, other @ Self::Uninit { .. }) => {
                if this == other {
                    this
                } else {
                    Self::top()
                }
            }
            (Self::Uninit { .. }, _) | (_, Self::Uninit { .. }) => Self::top(),
            (
                Self::Typed {
                    class: c1,
                    nullness: n1,
                },
                Self::Typed {
                    class: c2,
                    nullness: n2,
                },
            ) => Self::Typed {
                class: join_classes(c1, c2, repo),
                nullness: n1.join(n2),
            },
        }
    }
}

fn class_leq(class1: &Type, class2: &Type, repo: &Repo) -> bool {
    if class1 == class2 || class2 == &*JAVA_LANG_OBJECT {
        return true;
    }
    match (class1, class2) {
        (Type::Class(name1), Type::Class(name2)) => {
            repo.is_typeable_as(name1, name2).unwrap_or(false)
        }
        (Type::Array(n1, elt1), Type::Array(n2, elt2)) => n1 == n2 && class_leq(elt1, elt2, repo),
        _ => false,
    }
}

/// Join of optional class identities: absent stays absent, known
/// classes join at their least common superclass, arrays decay to
/// `java/lang/Object` unless identical.
fn join_classes(class1: Option<Type>, class2: Option<Type>, repo: &Repo) -> Option<Type> {
    let (class1, class2) = match (class1, class2) {
        (Some(c1), Some(c2)) => (c1, c2),
        _ => return None,
    };
    if class1 == class2 {
        return Some(class1);
    }
    match (&class1, &class2) {
        (Type::Class(name1), Type::Class(name2)) => {
            repo.least_common_class(name1, name2).map(Type::Class)
        }
        _ => Some(JAVA_LANG_OBJECT.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ALL: [IRType; 17] = [
        IRType::Top,
        IRType::Scalar,
        IRType::Reference,
        IRType::Int,
        IRType::Float,
        IRType::Short,
        IRType::Char,
        IRType::Byte,
        IRType::Boolean,
        IRType::Const1,
        IRType::Zero,
        IRType::Const2,
        IRType::Long1,
        IRType::Long2,
        IRType::Double1,
        IRType::Double2,
        IRType::Bottom,
    ];

    fn arb_irtype() -> impl Strategy<Value = IRType> {
        prop::sample::select(ALL.to_vec())
    }

    proptest! {
        #[test]
        fn join_is_commutative(a in arb_irtype(), b in arb_irtype()) {
            prop_assert_eq!(a.join(b), b.join(a));
        }

        #[test]
        fn join_is_associative(a in arb_irtype(), b in arb_irtype(), c in arb_irtype()) {
            prop_assert_eq!(a.join(b.join(c)), a.join(b).join(c));
        }

        #[test]
        fn join_is_idempotent(a in arb_irtype()) {
            prop_assert_eq!(a.join(a), a);
        }

        #[test]
        fn join_is_an_upper_bound(a in arb_irtype(), b in arb_irtype()) {
            prop_assert!(a.leq(a.join(b)));
            prop_assert!(b.leq(a.join(b)));
        }

        #[test]
        fn leq_agrees_with_join(a in arb_irtype(), b in arb_irtype()) {
            prop_assert_eq!(a.leq(b), a.join(b) == b);
        }
    }

    #[test]
    fn bottom_is_identity_and_top_absorbs() {
        for t in ALL {
            assert_eq!(IRType::Bottom.join(t), t);
            assert_eq!(IRType::Top.join(t), IRType::Top);
        }
    }

    #[test]
    fn zero_and_const_dualities() {
        assert_eq!(IRType::Zero.join(IRType::Reference), IRType::Reference);
        assert_eq!(IRType::Zero.join(IRType::Int), IRType::Int);
        assert_eq!(IRType::Const1.join(IRType::Int), IRType::Int);
        assert_eq!(IRType::Const1.join(IRType::Float), IRType::Float);
        assert_eq!(IRType::Const1.join(IRType::Reference), IRType::Reference);
    }

    #[test]
    fn distinct_width_families_conflict() {
        assert_eq!(IRType::Long1.join(IRType::Int), IRType::Top);
        assert_eq!(IRType::Long1.join(IRType::Double1), IRType::Top);
        assert_eq!(IRType::Long1.join(IRType::Long2), IRType::Top);
        assert_eq!(IRType::Const2.join(IRType::Const1), IRType::Top);
    }

    #[test]
    fn integer_subtypes_join_at_int() {
        assert_eq!(IRType::Byte.join(IRType::Char), IRType::Int);
        assert_eq!(IRType::Short.join(IRType::Char), IRType::Int);
        assert_eq!(IRType::Boolean.join(IRType::Byte), IRType::Byte);
        assert_eq!(IRType::Int.join(IRType::Float), IRType::Scalar);
        assert_eq!(IRType::Int.join(IRType::Reference), IRType::Scalar);
    }

    #[test]
    fn nullness_lattice_laws() {
        const ALL_NULLNESS: [Nullness; 5] = [
            Nullness::Bottom,
            Nullness::IsNull,
            Nullness::NotNull,
            Nullness::MaybeNull,
            Nullness::Unknown,
        ];
        for a in ALL_NULLNESS {
            assert_eq!(a.join(a), a);
            assert_eq!(Nullness::Bottom.join(a), a);
            assert_eq!(Nullness::Unknown.join(a), Nullness::Unknown);
            for b in ALL_NULLNESS {
                assert_eq!(a.join(b), b.join(a));
                assert!(a.leq(a.join(b)));
                for c in ALL_NULLNESS {
                    assert_eq!(a.join(b.join(c)), a.join(b).join(c));
                }
            }
        }
        assert_eq!(
            Nullness::IsNull.join(Nullness::NotNull),
            Nullness::MaybeNull
        );
    }
}
