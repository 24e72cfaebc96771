//! Connection-related data models.

use serde::{Deserialize, Serialize};

/// Supported database backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    /// Client-server database reached via host/port/credentials.
    PostgreSQL,
    /// File-based single-writer database.
    SQLite,
}

impl DatabaseType {
    /// Parse database type from a connection string.
    pub fn from_connection_string(connection_string: &str) -> Option<Self> {
        let lower = connection_string.to_lowercase();
        if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
            Some(Self::PostgreSQL)
        } else if lower.starts_with("sqlite://") || lower.starts_with("sqlite:") {
            Some(Self::SQLite)
        } else {
            None
        }
    }

    /// Get the display name for this database type.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "PostgreSQL",
            Self::SQLite => "SQLite",
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// A database the session can connect to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionTarget {
    /// Database identifier. Keys the persisted schema index.
    pub id: String,
    pub db_type: DatabaseType,
    /// Contains sensitive data - never log
    #[serde(skip_serializing)]
    pub connection_string: String,
}

impl ConnectionTarget {
    /// Get a display-safe version of the connection string (credentials masked).
    pub fn masked_connection_string(&self) -> String {
        if let Some(at_pos) = self.connection_string.find('@') {
            if let Some(colon_pos) = self.connection_string[..at_pos].rfind(':') {
                // Only mask when the colon belongs to userinfo, not the scheme
                if !self.connection_string[colon_pos..].starts_with("://") {
                    let prefix = &self.connection_string[..colon_pos + 1];
                    let suffix = &self.connection_string[at_pos..];
                    return format!("{}****{}", prefix, suffix);
                }
            }
        }
        self.connection_string.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_type_from_connection_string() {
        assert_eq!(
            DatabaseType::from_connection_string("postgres://localhost/db"),
            Some(DatabaseType::PostgreSQL)
        );
        assert_eq!(
            DatabaseType::from_connection_string("postgresql://localhost/db"),
            Some(DatabaseType::PostgreSQL)
        );
        assert_eq!(
            DatabaseType::from_connection_string("sqlite:test.db"),
            Some(DatabaseType::SQLite)
        );
        assert_eq!(
            DatabaseType::from_connection_string("mysql://localhost/db"),
            None
        );
    }

    #[test]
    fn test_masked_connection_string() {
        let target = ConnectionTarget {
            id: "shop".to_string(),
            db_type: DatabaseType::PostgreSQL,
            connection_string: "postgres://admin:s3cret@db:5432/shop".to_string(),
        };
        let masked = target.masked_connection_string();
        assert_eq!(masked, "postgres://admin:****@db:5432/shop");
        assert!(!masked.contains("s3cret"));
    }

    #[test]
    fn test_masked_connection_string_without_password() {
        let target = ConnectionTarget {
            id: "shop".to_string(),
            db_type: DatabaseType::PostgreSQL,
            connection_string: "postgres://admin@db/shop".to_string(),
        };
        assert_eq!(target.masked_connection_string(), "postgres://admin@db/shop");
    }
}
