use std::fmt;

use snafu::ResultExt;
use uuid::Uuid;

use super::error::{InvalidIdSnafu, StorageResult};

/// Store-assigned document identifier.
///
/// Stores mint v7 ids so that ids of documents inserted by one store instance
/// roughly follow insertion time, which keeps SQLite index pages append-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentId(Uuid);

impl DocumentId {
    pub fn new_v7() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn parse(raw: &str) -> StorageResult<Self> {
        let parsed = Uuid::parse_str(raw).context(InvalidIdSnafu {
            stage: "parse-document-id",
            id_type: "document-id",
            raw: raw.to_string(),
        })?;
        Ok(Self(parsed))
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;

    #[test]
    fn document_id_round_trips_through_display() {
        let id = DocumentId::new_v7();
        assert_eq!(DocumentId::parse(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn invalid_document_id_names_the_id_type() {
        let error = DocumentId::parse("not-a-uuid").unwrap_err();
        match error {
            StorageError::InvalidId { id_type, raw, .. } => {
                assert_eq!(id_type, "document-id");
                assert_eq!(raw, "not-a-uuid");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
