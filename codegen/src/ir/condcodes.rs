//! Condition codes for integer and floating-point compares.

use core::fmt;

/// Condition for `icmp`/`br_icmp`/`select`-with-int-compare.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum IntCC {
    Equal,
    NotEqual,
    SignedLessThan,
    SignedGreaterThanOrEqual,
    SignedGreaterThan,
    SignedLessThanOrEqual,
    UnsignedLessThan,
    UnsignedGreaterThanOrEqual,
    UnsignedGreaterThan,
    UnsignedLessThanOrEqual,
}

impl IntCC {
    /// Flip operand order: `a cc b` == `b cc.reverse() a`.
    pub fn reverse(self) -> Self {
        use IntCC::*;
        match self {
            Equal => Equal,
            NotEqual => NotEqual,
            SignedLessThan => SignedGreaterThan,
            SignedGreaterThanOrEqual => SignedLessThanOrEqual,
            SignedGreaterThan => SignedLessThan,
            SignedLessThanOrEqual => SignedGreaterThanOrEqual,
            UnsignedLessThan => UnsignedGreaterThan,
            UnsignedGreaterThanOrEqual => UnsignedLessThanOrEqual,
            UnsignedGreaterThan => UnsignedLessThan,
            UnsignedLessThanOrEqual => UnsignedGreaterThanOrEqual,
        }
    }

    /// Logical negation: `!(a cc b) == a cc.inverse() b`.
    pub fn inverse(self) -> Self {
        use IntCC::*;
        match self {
            Equal => NotEqual,
            NotEqual => Equal,
            SignedLessThan => SignedGreaterThanOrEqual,
            SignedGreaterThanOrEqual => SignedLessThan,
            SignedGreaterThan => SignedLessThanOrEqual,
            SignedLessThanOrEqual => SignedGreaterThan,
            UnsignedLessThan => UnsignedGreaterThanOrEqual,
            UnsignedGreaterThanOrEqual => UnsignedLessThan,
            UnsignedGreaterThan => UnsignedLessThanOrEqual,
            UnsignedLessThanOrEqual => UnsignedGreaterThan,
        }
    }

    pub fn is_signed(self) -> bool {
        use IntCC::*;
        matches!(
            self,
            SignedLessThan | SignedGreaterThanOrEqual | SignedGreaterThan | SignedLessThanOrEqual
        )
    }
}

impl fmt::Display for IntCC {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use IntCC::*;
        let s = match self {
            Equal => "eq",
            NotEqual => "ne",
            SignedLessThan => "slt",
            SignedGreaterThanOrEqual => "sge",
            SignedGreaterThan => "sgt",
            SignedLessThanOrEqual => "sle",
            UnsignedLessThan => "ult",
            UnsignedGreaterThanOrEqual => "uge",
            UnsignedGreaterThan => "ugt",
            UnsignedLessThanOrEqual => "ule",
        };
        f.write_str(s)
    }
}

/// Condition for `fcmp`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FloatCC {
    Ordered,
    Unordered,
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

impl fmt::Display for FloatCC {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use FloatCC::*;
        let s = match self {
            Ordered => "ord",
            Unordered => "uno",
            Equal => "eq",
            NotEqual => "ne",
            LessThan => "lt",
            LessThanOrEqual => "le",
            GreaterThan => "gt",
            GreaterThanOrEqual => "ge",
        };
        f.write_str(s)
    }
}
