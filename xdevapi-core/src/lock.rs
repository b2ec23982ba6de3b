//! Row locking modes for `lock_shared` / `lock_exclusive`

use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result, Value};

/// Behaviour of a locking read when another session holds a conflicting lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockContention {
    /// Block until the conflicting lock is released
    #[default]
    Default,
    /// Fail immediately if a requested row is locked
    #[serde(rename = "NOWAIT")]
    NoWait,
    /// Never wait, leave locked rows out of the result
    SkipLocked,
}

impl LockContention {
    pub const ALL: [LockContention; 3] = [Self::Default, Self::NoWait, Self::SkipLocked];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "DEFAULT",
            Self::NoWait => "NOWAIT",
            Self::SkipLocked => "SKIP_LOCKED",
        }
    }

    /// SQL suffix appended after `FOR SHARE` / `FOR UPDATE`
    pub(crate) fn sql_suffix(&self) -> &'static str {
        match self {
            Self::Default => "",
            Self::NoWait => " NOWAIT",
            Self::SkipLocked => " SKIP LOCKED",
        }
    }
}

impl Display for LockContention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LockContention {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Invalid lock contention mode '{s}'"))
    }
}

/// Which lock a select statement requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared(LockContention),
    Exclusive(LockContention),
}

impl LockMode {
    pub fn contention(&self) -> LockContention {
        match self {
            Self::Shared(c) | Self::Exclusive(c) => *c,
        }
    }

    pub(crate) fn to_sql(self) -> String {
        match self {
            Self::Shared(c) => format!(" FOR SHARE{}", c.sql_suffix()),
            Self::Exclusive(c) => format!(" FOR UPDATE{}", c.sql_suffix()),
        }
    }
}

/// Trait for arguments accepted by `lock_shared` / `lock_exclusive`
pub trait IntoLockContention {
    fn into_lock_contention(self, context: &str) -> Result<LockContention>;
}

fn invalid_mode(context: &str) -> Error {
    Error::invalid_argument(
        context,
        "Argument #1 is expected to be one of DEFAULT, NOWAIT or SKIP_LOCKED",
    )
}

/// No argument: the default mode
impl IntoLockContention for () {
    fn into_lock_contention(self, _context: &str) -> Result<LockContention> {
        Ok(LockContention::Default)
    }
}

impl IntoLockContention for LockContention {
    fn into_lock_contention(self, _context: &str) -> Result<LockContention> {
        Ok(self)
    }
}

impl IntoLockContention for &str {
    fn into_lock_contention(self, context: &str) -> Result<LockContention> {
        self.parse().map_err(|_| invalid_mode(context))
    }
}

impl IntoLockContention for String {
    fn into_lock_contention(self, context: &str) -> Result<LockContention> {
        self.as_str().into_lock_contention(context)
    }
}

impl IntoLockContention for Value {
    fn into_lock_contention(self, context: &str) -> Result<LockContention> {
        match self {
            Value::String(s) => s.into_lock_contention(context),
            _ => Err(invalid_mode(context)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!("nowait".parse::<LockContention>().unwrap(), LockContention::NoWait);
        assert_eq!("Skip_Locked".parse::<LockContention>().unwrap(), LockContention::SkipLocked);
        assert_eq!("DEFAULT".parse::<LockContention>().unwrap(), LockContention::Default);
        assert!("SKIP LOCKED".parse::<LockContention>().is_err());
    }

    #[test]
    fn test_lock_sql() {
        assert_eq!(LockMode::Shared(LockContention::Default).to_sql(), " FOR SHARE");
        assert_eq!(LockMode::Shared(LockContention::NoWait).to_sql(), " FOR SHARE NOWAIT");
        assert_eq!(
            LockMode::Exclusive(LockContention::SkipLocked).to_sql(),
            " FOR UPDATE SKIP LOCKED"
        );
    }

    #[test]
    fn test_into_lock_contention() {
        assert_eq!(().into_lock_contention("ctx").unwrap(), LockContention::Default);
        assert_eq!(
            Value::from("nowait").into_lock_contention("ctx").unwrap(),
            LockContention::NoWait
        );

        let err = Value::I64(5).into_lock_contention("TableSelect.lock_shared").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
        assert!("whatever".into_lock_contention("ctx").is_err());
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&LockContention::SkipLocked).unwrap();
        assert_eq!(json, "\"SKIP_LOCKED\"");
    }
}
