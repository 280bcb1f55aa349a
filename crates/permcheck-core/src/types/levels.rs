//! Permission levels a principal can hold on a set of models.

use std::str::FromStr;

/// Ordered authorization tier: `None < Read < Write`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PermissionLevel {
    None,
    Read,
    Write,
}

/// Error type for parsing PermissionLevel from string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseLevelError(pub String);

impl std::fmt::Display for ParseLevelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid permission level: {}", self.0)
    }
}

impl std::error::Error for ParseLevelError {}

impl FromStr for PermissionLevel {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(PermissionLevel::None),
            "read" => Ok(PermissionLevel::Read),
            "write" => Ok(PermissionLevel::Write),
            _ => Err(ParseLevelError(s.to_string())),
        }
    }
}

impl std::fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PermissionLevel {
    pub const ALL: [PermissionLevel; 3] = [
        PermissionLevel::None,
        PermissionLevel::Read,
        PermissionLevel::Write,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionLevel::None => "none",
            PermissionLevel::Read => "read",
            PermissionLevel::Write => "write",
        }
    }

    /// Check if this level grants at least the permissions of another level
    pub fn includes(&self, other: &PermissionLevel) -> bool {
        self >= other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_total_order() {
        assert!(PermissionLevel::None < PermissionLevel::Read);
        assert!(PermissionLevel::Read < PermissionLevel::Write);
        assert!(PermissionLevel::None < PermissionLevel::Write);
    }

    #[test]
    fn test_level_includes() {
        assert!(PermissionLevel::Write.includes(&PermissionLevel::Read));
        assert!(PermissionLevel::Write.includes(&PermissionLevel::Write));
        assert!(!PermissionLevel::Read.includes(&PermissionLevel::Write));
        assert!(PermissionLevel::Read.includes(&PermissionLevel::None));
        assert!(!PermissionLevel::None.includes(&PermissionLevel::Read));
    }

    #[test]
    fn test_level_parse() {
        assert_eq!("none".parse::<PermissionLevel>().unwrap(), PermissionLevel::None);
        assert_eq!("read".parse::<PermissionLevel>().unwrap(), PermissionLevel::Read);
        assert_eq!("write".parse::<PermissionLevel>().unwrap(), PermissionLevel::Write);
    }

    #[test]
    fn test_level_parse_invalid() {
        assert!("admin".parse::<PermissionLevel>().is_err());
        assert!("Read".parse::<PermissionLevel>().is_err()); // Case sensitive
        assert!("".parse::<PermissionLevel>().is_err());
    }

    #[test]
    fn test_level_display_matches_as_str() {
        for level in PermissionLevel::ALL {
            assert_eq!(level.to_string(), level.as_str());
        }
    }

    #[test]
    fn test_parse_level_error_display() {
        let err = ParseLevelError("owner".to_string());
        assert!(err.to_string().contains("owner"));
    }
}
