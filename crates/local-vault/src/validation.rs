use vaultpush_upload::{ArchiveError, ArchiveErrorKind};

/// Validates a vault name before it is used as a directory name.
///
/// Allows 1 to 255 characters from `a-z`, `A-Z`, `0-9`, `_`, `-` and `.`,
/// excluding the names `.` and `..`.
pub fn validate_vault_name(name: &str) -> Result<(), ArchiveError> {
    if name.is_empty() {
        return Err(ArchiveError::new(
            ArchiveErrorKind::MissingParameterValue,
            "vault name is required",
        ));
    }
    if name.len() > 255 {
        return Err(ArchiveError::new(
            ArchiveErrorKind::InvalidParameterValue,
            format!("vault name longer than 255 characters: {name}"),
        ));
    }
    if name == "." || name == ".." {
        return Err(ArchiveError::new(
            ArchiveErrorKind::InvalidParameterValue,
            format!("invalid vault name: {name}"),
        ));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
    {
        return Err(ArchiveError::new(
            ArchiveErrorKind::InvalidParameterValue,
            format!("invalid character {bad:?} in vault name: {name}"),
        ));
    }
    Ok(())
}

/// Validates a session identifier issued by this vault.
///
/// Anything that is not a UUID cannot name a session here.
pub fn validate_session_id(id: &str) -> Result<(), ArchiveError> {
    if id.is_empty() {
        return Err(ArchiveError::new(
            ArchiveErrorKind::MissingParameterValue,
            "upload id is required",
        ));
    }
    uuid::Uuid::parse_str(id)
        .map(|_| ())
        .map_err(|_| {
            ArchiveError::new(
                ArchiveErrorKind::ResourceNotFound,
                format!("no such upload: {id}"),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_typical_vault_names() {
        for name in ["photos", "backup-2024", "a.b_c", "X"] {
            validate_vault_name(name).unwrap();
        }
    }

    #[test]
    fn rejects_traversal_and_separators() {
        for name in ["..", ".", "a/b", "../etc", "a\\b", "with space"] {
            let err = validate_vault_name(name).unwrap_err();
            assert_eq!(err.kind, ArchiveErrorKind::InvalidParameterValue, "{name}");
        }
    }

    #[test]
    fn empty_vault_name_is_missing() {
        let err = validate_vault_name("").unwrap_err();
        assert_eq!(err.kind, ArchiveErrorKind::MissingParameterValue);
    }

    #[test]
    fn rejects_overlong_vault_name() {
        assert!(validate_vault_name(&"a".repeat(256)).is_err());
        validate_vault_name(&"a".repeat(255)).unwrap();
    }

    #[test]
    fn session_ids_must_be_uuids() {
        validate_session_id("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap();
        assert_eq!(
            validate_session_id("../../x").unwrap_err().kind,
            ArchiveErrorKind::ResourceNotFound
        );
        assert_eq!(
            validate_session_id("").unwrap_err().kind,
            ArchiveErrorKind::MissingParameterValue
        );
    }
}
