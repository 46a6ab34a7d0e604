mod support;

use std::time::Duration;

use futures::FutureExt;
use leasehold_core::db::with_deadline;
use leasehold_core::{Error, PropertyFilter, Result};
use sqlx::SqliteConnection;
use support::open_with;

/// Writes a row, then stalls while still holding the connection.
async fn stall_mid_transaction(conn: &mut SqliteConnection) -> Result<()> {
    sqlx::query("INSERT INTO features (id, name, icon_name) VALUES (?, ?, ?)")
        .bind("f-stalled")
        .bind("Sauna")
        .bind("flame")
        .execute(&mut *conn)
        .await?;
    tokio::time::sleep(Duration::from_secs(30)).await;
    Ok(())
}

#[tokio::test]
async fn deadline_releases_connection_held_by_stalled_transaction() {
    let catalog = open_with(|mut config| {
        config.pool = config.pool.with_max_size(1).with_queue_limit(0);
        config
    })
    .await;

    let err = with_deadline(
        Duration::from_millis(100),
        catalog
            .executor()
            .transaction(|conn| stall_mid_transaction(conn).boxed()),
    )
    .await
    .err()
    .expect("stalled transaction should hit the deadline");
    assert!(matches!(err, Error::Timeout));

    let state = catalog.pool_state();
    assert_eq!(state.active, 0);
    assert_eq!(state.waiting, 0);

    // The single connection is usable again and the abandoned write is gone.
    let found = catalog
        .properties()
        .search(&PropertyFilter::new())
        .await
        .unwrap();
    assert!(found.is_empty());
    let features = catalog.features().list_all().await.unwrap();
    assert!(features.iter().all(|f| f.name != "Sauna"));
}
