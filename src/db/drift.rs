use anyhow::{Context, Result};
use sqlx::SqlitePool;

use crate::domain::{ContentKey, ContentType, CounterField};

/// A cached counter that disagrees with the rows it mirrors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterDrift {
    pub key: ContentKey,
    pub field: CounterField,
    pub cached: i64,
    pub actual: i64,
}

/// SQL expression counting the rows a counter mirrors for row `t`.
///
/// A post's `comments_count` covers every comment under it, replies included;
/// a comment's covers its direct replies.
fn actual_count_sql(content_type: ContentType, field: CounterField) -> String {
    let tag = content_type.as_str();
    match (field, content_type) {
        (CounterField::LikesCount, _) => format!(
            "SELECT COUNT(*) FROM likes l WHERE l.content_type = '{tag}' AND l.content_item_id = t.id"
        ),
        (CounterField::CommentsCount, ContentType::Post) => {
            "SELECT COUNT(*) FROM comments c WHERE c.parent_post_id = t.id".to_string()
        }
        (CounterField::CommentsCount, ContentType::Comment) => {
            "SELECT COUNT(*) FROM comments c WHERE c.parent_comment_id = t.id".to_string()
        }
        (CounterField::RepostsCount, _) => format!(
            "(SELECT COUNT(*) FROM posts r WHERE r.is_repost = 1 AND r.repost_of_content_type = '{tag}' AND r.repost_of = t.id) \
             + (SELECT COUNT(*) FROM comments r WHERE r.is_repost = 1 AND r.repost_of_content_type = '{tag}' AND r.repost_of = t.id)"
        ),
    }
}

/// Compare every cached counter with a fresh count of the rows it mirrors.
///
/// Pending buffered deltas show up as drift until reconciliation has run.
pub async fn find_counter_drift(pool: &SqlitePool) -> Result<Vec<CounterDrift>> {
    let mut drift = Vec::new();

    for content_type in ContentType::ALL {
        for field in CounterField::ALL {
            let sql = format!(
                r"
                SELECT id, cached, actual FROM (
                    SELECT t.id AS id, t.{col} AS cached, ({actual}) AS actual
                    FROM {table} t
                )
                WHERE cached <> actual
                ORDER BY id
                ",
                col = field.column(),
                actual = actual_count_sql(content_type, field),
                table = content_type.table(),
            );

            let rows: Vec<(i64, i64, i64)> = sqlx::query_as(&sql)
                .fetch_all(pool)
                .await
                .with_context(|| format!("Failed to check {field} drift on {content_type}"))?;

            drift.extend(rows.into_iter().map(|(id, cached, actual)| CounterDrift {
                key: ContentKey::new(content_type, id),
                field,
                cached,
                actual,
            }));
        }
    }

    Ok(drift)
}
