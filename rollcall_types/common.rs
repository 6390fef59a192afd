use serde::{Deserialize, Serialize};

/// A matched record from the `users` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRow {
    pub id: String,
    pub first_name: String,
}

impl UserRow {
    pub fn new(id: impl Into<String>, first_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            first_name: first_name.into(),
        }
    }
}

impl From<UserRow> for (String, String) {
    fn from(row: UserRow) -> Self {
        (row.id, row.first_name)
    }
}

impl From<(String, String)> for UserRow {
    fn from((id, first_name): (String, String)) -> Self {
        Self { id, first_name }
    }
}
