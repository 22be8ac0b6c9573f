//! Unknown-field preservation (§9 "Dynamic JSON with unknown fields") and
//! the file-permission helpers every secret-bearing store needs (§6).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

/// Wraps a typed `head` with whatever fields the JSON object carried that
/// `T` does not model, so re-saving an object written by a newer or older
/// version of this code round-trips those fields unchanged.
///
/// `T` must not itself reject unknown fields (no `#[serde(deny_unknown_fields)]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WithExtra<T> {
    #[serde(flatten)]
    pub head: T,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl<T> WithExtra<T> {
    pub fn new(head: T) -> Self {
        Self {
            head,
            extra: Map::new(),
        }
    }
}

impl<T> std::ops::Deref for WithExtra<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.head
    }
}

impl<T> std::ops::DerefMut for WithExtra<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.head
    }
}

/// Sets mode 0600 on a file holding key material, shares, or approvals.
/// A no-op on non-unix targets, where the embedder is expected to apply an
/// equivalent ACL.
pub fn restrict_secret_file(path: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(path)?.permissions();
        perms.set_mode(crate::constants::SECRET_FILE_MODE);
        std::fs::set_permissions(path, perms)?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

/// Sets mode 0700 on a directory holding secret files.
pub fn restrict_secret_dir(path: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(path)?.permissions();
        perms.set_mode(crate::constants::SECRET_DIR_MODE);
        std::fs::set_permissions(path, perms)?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
    struct Head {
        name: String,
        count: u32,
    }

    #[test]
    fn unknown_fields_round_trip() {
        let json = r#"{"name":"a","count":1,"from_the_future":true}"#;
        let parsed: WithExtra<Head> = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.head.name, "a");
        assert_eq!(parsed.extra.get("from_the_future"), Some(&Value::Bool(true)));

        let back = serde_json::to_value(&parsed).unwrap();
        assert_eq!(back["from_the_future"], Value::Bool(true));
        assert_eq!(back["name"], Value::String("a".into()));
    }
}
