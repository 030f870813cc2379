use crate::db::StoreError;
use crate::domain::Notification;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use super::{get_flag, get_time, get_variant, Repository};

fn notification_from_row(row: &SqliteRow) -> Result<Notification, StoreError> {
    Ok(Notification {
        id: row.try_get("id")?,
        dealer_id: row.try_get("dealer_id")?,
        kind: row.try_get("kind")?,
        title: row.try_get("title")?,
        message: row.try_get("message")?,
        severity: get_variant(row, "severity")?,
        read: get_flag(row, "read")?,
        timestamp: get_time(row, "timestamp")?,
    })
}

pub(super) async fn insert_notification_on(
    conn: &mut SqliteConnection,
    notification: &Notification,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO notifications (id, dealer_id, kind, title, message, severity, read, timestamp)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&notification.id)
    .bind(&notification.dealer_id)
    .bind(&notification.kind)
    .bind(&notification.title)
    .bind(&notification.message)
    .bind(notification.severity.as_str())
    .bind(notification.read)
    .bind(notification.timestamp.as_ms())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

impl Repository {
    /// A dealer's most recent notifications, newest first.
    pub async fn find_notifications(
        &self,
        dealer_id: &str,
        limit: i64,
    ) -> Result<Vec<Notification>, StoreError> {
        self.bounded("find_notifications", async {
            let rows = sqlx::query(
                r#"
                SELECT id, dealer_id, kind, title, message, severity, read, timestamp
                FROM notifications
                WHERE dealer_id = ?
                ORDER BY timestamp DESC, id ASC
                LIMIT ?
                "#,
            )
            .bind(dealer_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
            rows.iter().map(notification_from_row).collect()
        })
        .await
    }

    /// Set the read flag on one of a dealer's notifications.
    ///
    /// Returns false when the dealer has no notification with that id.
    pub async fn mark_notification_read(
        &self,
        dealer_id: &str,
        notification_id: &str,
    ) -> Result<bool, StoreError> {
        self.bounded("mark_notification_read", async {
            let result =
                sqlx::query("UPDATE notifications SET read = 1 WHERE id = ? AND dealer_id = ?")
                    .bind(notification_id)
                    .bind(dealer_id)
                    .execute(&self.pool)
                    .await?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    /// Store a standalone notification.
    pub async fn insert_notification(&self, notification: &Notification) -> Result<(), StoreError> {
        self.bounded("insert_notification", async {
            let mut conn = self.pool.acquire().await?;
            insert_notification_on(&mut *conn, notification).await
        })
        .await
    }
}
