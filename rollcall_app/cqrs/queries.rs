use std::iter::FusedIterator;

use rollcall_types::{
    Result,
    common::UserRow,
    errors::{AppError, ApplicationError},
};

use crate::cqrs::Query;

/// Fetch the users matching a non-empty list of ids.
///
/// The setters do not validate; an empty list is rejected by
/// [`GetUsers::new`] and again by the handler when the query is accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetUsers {
    user_ids: Vec<String>,
}

impl GetUsers {
    pub fn new<I, S>(user_ids: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let query = Self::default().with_user_ids(user_ids);
        query.validate()?;
        Ok(query)
    }

    pub fn user_ids(&self) -> &[String] {
        &self.user_ids
    }

    pub fn set_user_ids<I, S>(&mut self, user_ids: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.user_ids = user_ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_user_ids<I, S>(mut self, user_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_user_ids(user_ids);
        self
    }

    pub fn validate(&self) -> Result<(), ApplicationError> {
        if self.user_ids.is_empty() {
            return Err(AppError::EmptyUserIds.into());
        }
        Ok(())
    }
}

impl Query for GetUsers {
    type Output = UserRows;
}

/// Rows of a committed [`GetUsers`] call, in storage order.
///
/// Forward-only: once drained it keeps returning `None`.
#[derive(Debug, Default)]
pub struct UserRows {
    rows: std::vec::IntoIter<UserRow>,
}

impl UserRows {
    pub fn new(rows: Vec<UserRow>) -> Self {
        Self {
            rows: rows.into_iter(),
        }
    }
}

impl Iterator for UserRows {
    type Item = UserRow;

    fn next(&mut self) -> Option<Self::Item> {
        self.rows.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rows.size_hint()
    }
}

impl ExactSizeIterator for UserRows {}

impl FusedIterator for UserRows {}
