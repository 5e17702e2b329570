//! Tag table operations.

use muse_core::Tag;
use sqlx::SqlitePool;

use crate::error::DbResult;

/// Tag repository for database operations
pub struct TagRepository;

impl TagRepository {
    /// All tags ordered by name
    pub async fn list(pool: &SqlitePool) -> DbResult<Vec<Tag>> {
        let rows = sqlx::query_as::<_, TagRow>(
            "SELECT id, name, note_count FROM tags ORDER BY name",
        )
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().map(Tag::from).collect())
    }

    pub async fn get(pool: &SqlitePool, id: &str) -> DbResult<Option<Tag>> {
        let row = sqlx::query_as::<_, TagRow>(
            "SELECT id, name, note_count FROM tags WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(row.map(Tag::from))
    }

    /// Case-sensitive exact match on the tag name
    pub async fn find_by_name(pool: &SqlitePool, name: &str) -> DbResult<Option<Tag>> {
        let row = sqlx::query_as::<_, TagRow>(
            "SELECT id, name, note_count FROM tags WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(pool)
        .await?;

        Ok(row.map(Tag::from))
    }

    /// Insert a tag unless one with the same name exists.
    /// Returns true when a row was inserted.
    pub async fn insert_if_absent(
        pool: &SqlitePool,
        id: &str,
        name: &str,
        note_count: i64,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            "INSERT INTO tags (id, name, note_count) VALUES (?, ?, ?)
             ON CONFLICT(name) DO NOTHING",
        )
        .bind(id)
        .bind(name)
        .bind(note_count)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Insert or replace a tag by id
    pub async fn put(pool: &SqlitePool, tag: &Tag) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO tags (id, name, note_count) VALUES (?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                note_count = excluded.note_count",
        )
        .bind(&tag.id)
        .bind(&tag.name)
        .bind(tag.note_count)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn set_count(pool: &SqlitePool, id: &str, note_count: i64) -> DbResult<()> {
        sqlx::query("UPDATE tags SET note_count = ? WHERE id = ?")
            .bind(note_count)
            .bind(id)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Remove a tag. Returns false when it did not exist.
    pub async fn remove(pool: &SqlitePool, id: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM tags WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Change a tag's id, keeping its name and count.
    /// Returns false when `old_id` did not exist.
    pub async fn rekey(pool: &SqlitePool, old_id: &str, new_id: &str) -> DbResult<bool> {
        let result = sqlx::query("UPDATE tags SET id = ? WHERE id = ?")
            .bind(new_id)
            .bind(old_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TagRow {
    id: String,
    name: String,
    note_count: i64,
}

impl From<TagRow> for Tag {
    fn from(row: TagRow) -> Self {
        Tag {
            id: row.id,
            name: row.name,
            note_count: row.note_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::create_test_local_pool;

    #[tokio::test]
    async fn test_insert_if_absent_keeps_names_unique() {
        let db = create_test_local_pool().await.unwrap();
        let pool = db.pool();

        assert!(TagRepository::insert_if_absent(pool, "t1", "work", 0).await.unwrap());
        assert!(!TagRepository::insert_if_absent(pool, "t2", "work", 0).await.unwrap());
        assert!(TagRepository::insert_if_absent(pool, "t3", "Work", 0).await.unwrap());

        let work = TagRepository::find_by_name(pool, "work").await.unwrap().unwrap();
        assert_eq!(work.id, "t1");
        assert!(TagRepository::get(pool, "t2").await.unwrap().is_none());

        let names: Vec<String> = TagRepository::list(pool)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["Work", "work"]);
    }

    #[tokio::test]
    async fn test_put_set_count_rekey_remove() {
        let db = create_test_local_pool().await.unwrap();
        let pool = db.pool();

        let tag = Tag {
            id: "t1".to_string(),
            name: "work".to_string(),
            note_count: 1,
        };
        TagRepository::put(pool, &tag).await.unwrap();
        TagRepository::set_count(pool, "t1", 3).await.unwrap();
        assert_eq!(TagRepository::get(pool, "t1").await.unwrap().unwrap().note_count, 3);

        assert!(TagRepository::rekey(pool, "t1", "t9").await.unwrap());
        assert!(!TagRepository::rekey(pool, "t1", "t10").await.unwrap());
        let moved = TagRepository::find_by_name(pool, "work").await.unwrap().unwrap();
        assert_eq!(moved.id, "t9");
        assert_eq!(moved.note_count, 3);

        assert!(TagRepository::remove(pool, "t9").await.unwrap());
        assert!(!TagRepository::remove(pool, "t9").await.unwrap());
        assert!(TagRepository::list(pool).await.unwrap().is_empty());
    }
}
