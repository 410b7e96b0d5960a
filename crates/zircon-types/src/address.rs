use std::fmt;

use serde::{Deserialize, Serialize};

/// A network address in `host:port` form.
///
/// Addresses are only ever produced by the coordination service's role
/// registry or by configuration; they are not parsed or validated here.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerAddress(pub String);

/// An opaque logical server name, resolved to a [`ServerAddress`] through the
/// coordination service.
///
/// Metadata entries name replicas by `ServerName` rather than address so that
/// a chunkserver can move without rewriting every entry that references it.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerName(pub String);

macro_rules! impl_string_newtype {
    ($name:ident) => {
        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:?})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

impl_string_newtype!(ServerAddress);
impl_string_newtype!(ServerName);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_display() {
        let addr = ServerAddress::from("10.0.0.1:9000");
        assert_eq!(format!("{}", addr), "10.0.0.1:9000");
        assert_eq!(format!("{:?}", addr), "ServerAddress(\"10.0.0.1:9000\")");
    }

    #[test]
    fn test_name_conversions() {
        let name: ServerName = "cs0".into();
        assert_eq!(name.as_str(), "cs0");
        assert!(!name.is_empty());
        assert!(ServerName::default().is_empty());
    }

    #[test]
    fn test_address_as_map_key() {
        use std::collections::HashMap;
        let mut m = HashMap::new();
        m.insert(ServerAddress::from("a:1"), 1);
        m.insert(ServerAddress::from("a:1"), 2);
        assert_eq!(m.len(), 1);
        assert_eq!(m[&ServerAddress::from("a:1")], 2);
    }

    #[test]
    fn test_serde_transparent() {
        let name = ServerName::from("mdc0");
        let json = serde_json::to_string(&name).unwrap();
        assert_eq!(json, "\"mdc0\"");
        let parsed: ServerName = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, name);
    }
}
