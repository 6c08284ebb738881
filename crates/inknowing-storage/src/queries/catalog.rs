// SPDX-FileCopyrightText: 2026 InKnowing Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read surface over the catalog: books, characters, vector chunks.
//!
//! Rows are written by the ingestion pipeline; the runtime treats them as
//! read-only. The insert helpers exist for that pipeline and for tests.

use inknowing_core::InknowingError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::models::{Book, ChunkRow, Persona};

/// Fetch a book by id.
pub async fn get_book(db: &Database, id: &str) -> Result<Option<Book>, InknowingError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt =
                conn.prepare("SELECT id, title, author, published FROM books WHERE id = ?1")?;
            let mut rows = stmt.query_map(params![id], |row| {
                Ok(Book {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    author: row.get(2)?,
                    published: row.get::<_, i64>(3)? != 0,
                })
            })?;
            rows.next().transpose()
        })
        .await
        .map_err(map_tr_err::<rusqlite::Error>)
}

/// Fetch a character persona by id.
pub async fn get_persona(db: &Database, id: &str) -> Result<Option<Persona>, InknowingError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, book_id, name, aliases, preamble, memories, register, tone \
                 FROM characters WHERE id = ?1",
            )?;
            let mut rows = stmt.query_map(params![id], |row| {
                let aliases_json: String = row.get(3)?;
                let memories_json: String = row.get(5)?;
                Ok(Persona {
                    id: row.get(0)?,
                    book_id: row.get(1)?,
                    name: row.get(2)?,
                    aliases: serde_json::from_str(&aliases_json).unwrap_or_default(),
                    preamble: row.get(4)?,
                    memories: serde_json::from_str(&memories_json).unwrap_or_default(),
                    register: row.get(6)?,
                    tone: row.get(7)?,
                })
            })?;
            rows.next().transpose()
        })
        .await
        .map_err(map_tr_err::<rusqlite::Error>)
}

/// All chunk rows for a book, optionally bounded to a chapter range.
pub async fn get_chunks(
    db: &Database,
    book_id: &str,
    chapter_range: Option<(i64, i64)>,
) -> Result<Vec<ChunkRow>, InknowingError> {
    let book_id = book_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut chunks = Vec::new();
            let map_row = |row: &rusqlite::Row| -> Result<ChunkRow, rusqlite::Error> {
                Ok(ChunkRow {
                    id: row.get(0)?,
                    book_id: row.get(1)?,
                    chapter_index: row.get(2)?,
                    page: row.get(3)?,
                    paragraph_index: row.get(4)?,
                    content: row.get(5)?,
                    embedding: row.get(6)?,
                })
            };
            match chapter_range {
                Some((lo, hi)) => {
                    let mut stmt = conn.prepare(
                        "SELECT id, book_id, chapter_index, page, paragraph_index, content, embedding \
                         FROM book_chunks WHERE book_id = ?1 \
                         AND chapter_index BETWEEN ?2 AND ?3",
                    )?;
                    let rows = stmt.query_map(params![book_id, lo, hi], map_row)?;
                    for row in rows {
                        chunks.push(row?);
                    }
                }
                None => {
                    let mut stmt = conn.prepare(
                        "SELECT id, book_id, chapter_index, page, paragraph_index, content, embedding \
                         FROM book_chunks WHERE book_id = ?1",
                    )?;
                    let rows = stmt.query_map(params![book_id], map_row)?;
                    for row in rows {
                        chunks.push(row?);
                    }
                }
            }
            Ok(chunks)
        })
        .await
        .map_err(map_tr_err::<rusqlite::Error>)
}

/// Insert a book row (ingestion/tests).
pub async fn insert_book(db: &Database, book: &Book) -> Result<(), InknowingError> {
    let book = book.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO books (id, title, author, published) VALUES (?1, ?2, ?3, ?4)",
                params![book.id, book.title, book.author, book.published as i64],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err::<rusqlite::Error>)
}

/// Insert a character row (ingestion/tests).
pub async fn insert_persona(db: &Database, persona: &Persona) -> Result<(), InknowingError> {
    let p = persona.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO characters (id, book_id, name, aliases, preamble, memories, register, tone) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    p.id,
                    p.book_id,
                    p.name,
                    serde_json::to_string(&p.aliases).unwrap_or_else(|_| "[]".into()),
                    p.preamble,
                    serde_json::to_string(&p.memories).unwrap_or_else(|_| "[]".into()),
                    p.register,
                    p.tone,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err::<rusqlite::Error>)
}

/// Insert a chunk row (ingestion/tests).
pub async fn insert_chunk(db: &Database, chunk: &ChunkRow) -> Result<(), InknowingError> {
    let c = chunk.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO book_chunks (id, book_id, chapter_index, page, paragraph_index, content, embedding) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    c.id,
                    c.book_id,
                    c.chapter_index,
                    c.page,
                    c.paragraph_index,
                    c.content,
                    c.embedding,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err::<rusqlite::Error>)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_book(id: &str, published: bool) -> Book {
        Book {
            id: id.to_string(),
            title: "The Lighthouse".to_string(),
            author: Some("V. Woolf".to_string()),
            published,
        }
    }

    #[tokio::test]
    async fn book_round_trip() {
        let db = Database::open_in_memory().await.unwrap();
        insert_book(&db, &make_book("b1", true)).await.unwrap();

        let book = get_book(&db, "b1").await.unwrap().unwrap();
        assert_eq!(book.title, "The Lighthouse");
        assert!(book.published);
        assert!(get_book(&db, "b2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn persona_json_fields_round_trip() {
        let db = Database::open_in_memory().await.unwrap();
        insert_book(&db, &make_book("b1", true)).await.unwrap();
        let persona = Persona {
            id: "c1".to_string(),
            book_id: "b1".to_string(),
            name: "Mrs Ramsay".to_string(),
            aliases: vec!["the mother".to_string()],
            preamble: "You speak as Mrs Ramsay.".to_string(),
            memories: vec!["hosted the dinner".to_string()],
            register: Some("formal".to_string()),
            tone: Some("warm".to_string()),
        };
        insert_persona(&db, &persona).await.unwrap();

        let fetched = get_persona(&db, "c1").await.unwrap().unwrap();
        assert_eq!(fetched.aliases, vec!["the mother"]);
        assert_eq!(fetched.memories.len(), 1);
        assert_eq!(fetched.tone.as_deref(), Some("warm"));
    }

    #[tokio::test]
    async fn chunks_filter_by_chapter_range() {
        let db = Database::open_in_memory().await.unwrap();
        insert_book(&db, &make_book("b1", true)).await.unwrap();
        for chapter in 1..=4 {
            insert_chunk(
                &db,
                &ChunkRow {
                    id: format!("ch{chapter}"),
                    book_id: "b1".to_string(),
                    chapter_index: Some(chapter),
                    page: None,
                    paragraph_index: Some(0),
                    content: format!("chapter {chapter} text"),
                    embedding: vec![0u8; 16],
                },
            )
            .await
            .unwrap();
        }

        let all = get_chunks(&db, "b1", None).await.unwrap();
        assert_eq!(all.len(), 4);
        let bounded = get_chunks(&db, "b1", Some((2, 3))).await.unwrap();
        assert_eq!(bounded.len(), 2);
    }
}
