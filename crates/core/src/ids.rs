use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
  ($name:ident) => {
    #[derive(
      Debug,
      Clone,
      Copy,
      PartialEq,
      Eq,
      Hash,
      PartialOrd,
      Ord,
      Serialize,
      Deserialize,
    )]
    #[serde(transparent)]
    pub struct $name(pub Uuid);

    impl $name {
      pub fn new() -> Self {
        Self(Uuid::new_v4())
      }
    }

    impl Default for $name {
      fn default() -> Self {
        Self::new()
      }
    }

    impl fmt::Display for $name {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
      }
    }

    impl std::str::FromStr for $name {
      type Err = uuid::Error;
      fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
      }
    }

    impl From<Uuid> for $name {
      fn from(id: Uuid) -> Self {
        Self(id)
      }
    }
  };
}

uuid_id!(ProjectId);
uuid_id!(TokenId);
uuid_id!(JobId);
uuid_id!(ShellId);

#[cfg(test)]
mod tests {
  use std::str::FromStr;

  use super::*;

  #[test]
  fn display_and_parse_round_trip() {
    let id = JobId::new();
    let parsed = JobId::from_str(&id.to_string()).unwrap();
    assert_eq!(id, parsed);
  }

  #[test]
  fn serializes_as_bare_string() {
    let id = ProjectId::new();
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, format!("\"{}\"", id.0));
  }
}
