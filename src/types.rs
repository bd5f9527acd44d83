//! Common column and transaction types.

/// Native column type reported by the driver for a result column or parameter.
///
/// The tags follow the MySQL field types. Binary buffers for the numeric
/// types are little-endian and fixed width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ColumnType {
    /// 1-byte integer (also used for BOOL)
    Tiny = 1,
    /// 2-byte integer
    Short = 2,
    /// 4-byte integer
    Long = 3,
    /// 4-byte IEEE 754 float
    Float = 4,
    /// 8-byte IEEE 754 float
    Double = 5,
    /// Untyped / NULL. As a parameter type it means "use the value's natural type".
    #[default]
    Null = 6,
    /// 8-byte integer
    LongLong = 8,
    /// DATE
    Date = 10,
    /// DATETIME
    DateTime = 12,
    /// VARCHAR
    VarString = 15,
    /// DECIMAL (text representation in both protocols)
    Decimal = 246,
    /// BLOB / BINARY
    Blob = 252,
    /// CHAR
    String = 254,
}

impl ColumnType {
    /// Width in bytes of the binary representation, or `None` for variable-length types.
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            ColumnType::Tiny => Some(1),
            ColumnType::Short => Some(2),
            ColumnType::Long | ColumnType::Float => Some(4),
            ColumnType::LongLong | ColumnType::Double => Some(8),
            _ => None,
        }
    }

    /// Returns true for the integer types.
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            ColumnType::Tiny | ColumnType::Short | ColumnType::Long | ColumnType::LongLong
        )
    }

    /// Returns true for the character and binary string types.
    pub fn is_string(self) -> bool {
        matches!(
            self,
            ColumnType::VarString | ColumnType::String | ColumnType::Blob
        )
    }
}

/// State of a transaction guard.
///
/// `Committed` and `RolledBack` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionState {
    /// Not started
    #[default]
    Inactive,
    /// Started and not yet finished
    Active,
    /// Finished by COMMIT
    Committed,
    /// Finished by ROLLBACK
    RolledBack,
}

impl TransactionState {
    /// Returns true if the guard can no longer commit or roll back.
    pub fn is_finished(self) -> bool {
        matches!(self, TransactionState::Committed | TransactionState::RolledBack)
    }
}
