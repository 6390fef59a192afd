
#[cfg(test)]
pub mod tests {
    use crate::test_utils::tests::{seed_users, setup_app, sorted};
    use futures::{StreamExt, TryStreamExt};
    use rollcall_app::{
        cqrs::{QueryHandler, queries::GetUsers},
        uow::{IsolationLevel, QueryParams},
    };
    use rollcall_types::{
        Result,
        common::UserRow,
        errors::{ApplicationError, DbError},
    };

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL"]
    async fn test_get_users_returns_matching_rows() -> Result<()> {
        let (handler, _uow_provider, pool) = setup_app(100).await?;
        let users = seed_users(&pool, &["Ann", "Bo", "Cy"]).await?;

        let query = GetUsers::new([users[0].id.clone(), users[2].id.clone()])?;
        let rows: Vec<UserRow> = handler.handle(&query).await?.collect();

        assert_eq!(
            sorted(rows),
            sorted(vec![users[0].clone(), users[2].clone()])
        );
        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL"]
    async fn test_get_users_without_matches_is_empty() -> Result<()> {
        let (handler, _uow_provider, _pool) = setup_app(100).await?;

        let query = GetUsers::new(["no-such-user"])?;
        let mut rows = handler.handle(&query).await?;

        assert_eq!(rows.next(), None);
        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL"]
    async fn test_get_users_binds_ids_as_values() -> Result<()> {
        let (handler, _uow_provider, pool) = setup_app(100).await?;
        seed_users(&pool, &["Ann"]).await?;

        let query = GetUsers::new(["x' OR '1'='1", "u1, u2"])?;
        let rows: Vec<UserRow> = handler.handle(&query).await?.collect();

        assert!(rows.is_empty());
        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL"]
    async fn test_stream_reads_across_fetch_batches() -> Result<()> {
        let (handler, _uow_provider, pool) = setup_app(2).await?;
        let users = seed_users(&pool, &["Ann", "Bo", "Cy", "Di", "Ed"]).await?;

        let query = GetUsers::new(users.iter().map(|u| u.id.clone()))?;
        let rows: Vec<UserRow> = handler.stream(&query).await?.try_collect().await?;

        assert_eq!(sorted(rows), sorted(users));
        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL"]
    async fn test_dropped_stream_releases_connection() -> Result<()> {
        let (handler, _uow_provider, pool) = setup_app(1).await?;
        let users = seed_users(&pool, &["Ann", "Bo"]).await?;
        let query = GetUsers::new(users.iter().map(|u| u.id.clone()))?;

        for _ in 0..10 {
            let mut stream = handler.stream(&query).await?;
            assert!(stream.next().await.transpose()?.is_some());
        }

        let rows: Vec<UserRow> = handler.handle(&query).await?.collect();
        assert_eq!(rows.len(), 2);
        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL"]
    async fn test_unit_of_work_runs_at_requested_isolation() -> Result<()> {
        let (_handler, uow_provider, _pool) = setup_app(100).await?;

        let uow = uow_provider.begin(IsolationLevel::Serializable).await?;
        let rows: Vec<_> = uow
            .query(
                "SELECT current_setting('transaction_isolation')",
                QueryParams::new(),
            )
            .await?
            .result()
            .try_collect()
            .await?;
        uow.rollback().await?;

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get(0), Some("serializable"));
        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL"]
    async fn test_commit_refused_while_stream_is_open() -> Result<()> {
        let (_handler, uow_provider, _pool) = setup_app(100).await?;

        let uow = uow_provider.begin(IsolationLevel::Serializable).await?;
        let stream = uow
            .query("SELECT 'a', 'b'", QueryParams::new())
            .await?
            .result();

        let result = uow.commit().await;
        drop(stream);

        assert!(matches!(
            result,
            Err(ApplicationError::Db(DbError::Transaction(_)))
        ));
        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL"]
    async fn test_rollback_refused_while_stream_is_open() -> Result<()> {
        let (_handler, uow_provider, _pool) = setup_app(1).await?;

        let uow = uow_provider.begin(IsolationLevel::Serializable).await?;
        let mut stream = uow
            .query(
                "SELECT n::text, n::text FROM generate_series(1, 3) AS n",
                QueryParams::new(),
            )
            .await?
            .result();
        assert!(stream.next().await.transpose()?.is_some());

        let result = uow.rollback().await;
        drop(stream);

        assert!(matches!(
            result,
            Err(ApplicationError::Db(DbError::Transaction(_)))
        ));
        Ok(())
    }
}
