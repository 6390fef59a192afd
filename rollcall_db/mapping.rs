use sqlx::{Row as _, postgres::PgRow};

use rollcall_app::uow::Row;
use rollcall_types::errors::DbError;

/// Reads every column of `row` as text, in select order.
pub fn to_row(row: &PgRow) -> Result<Row, DbError> {
    let columns = (0..row.len())
        .map(|idx| row.try_get::<String, _>(idx))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Row::new(columns))
}
