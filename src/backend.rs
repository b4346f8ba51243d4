use std::future::Future;

use log::{error, info};
use sqlx::{migrate::MigrateDatabase, Pool, Sqlite, SqlitePool, Transaction};

use crate::book::{Book, SearchField};
use crate::importer::BookRecord;
use crate::user::User;

type Result<T> = std::result::Result<T, ()>;

#[derive(Debug)]
pub enum FindError {
    NotFound,
    Internal,
}

#[derive(Debug)]
pub struct Backend(pub Pool<Sqlite>);

async fn init(url: &str) {
    match Sqlite::create_database(url).await {
        Ok(()) => {
            info!("Using {url}");
        }
        Err(e) => {
            panic!("error creating database: {e}");
        }
    }
}

impl Backend {
    pub async fn new(url: &str) -> Self {
        let pool = match SqlitePool::connect(url).await {
            Ok(pool) => pool,
            Err(_err) => {
                init(url).await;
                SqlitePool::connect(url).await.expect("db connection")
            }
        };

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("migration");

        Self(pool)
    }
}

impl Backend {
    async fn transact<'t, T, R, F>(&self, transaction: T) -> Result<R>
    where
        T: FnOnce(Transaction<'t, Sqlite>) -> F,
        F: Future<Output = Result<(Transaction<'t, Sqlite>, R)>>,
    {
        let tx = self.0.begin().await.map_err(|e| {
            error!("error beginning transaction: {:?}", e);
        })?;

        let (tx, r) = transaction(tx).await?;

        tx.commit().await.map_err(|e| {
            error!("error committing transaction: {:?}", e);
        })?;

        Ok(r)
    }
}

impl Backend {
    pub async fn find_user(&self, username: &str) -> std::result::Result<User, FindError> {
        sqlx::query_as::<_, User>(
            "
            SELECT id, username, pwhash
            FROM users
            WHERE username = ?
            ",
        )
        .bind(username)
        .fetch_one(&self.0)
        .await
        .map_err(|e| {
            if matches!(e, sqlx::Error::RowNotFound) {
                FindError::NotFound
            } else {
                error!("couldn't query for user {username}: {e:?}");
                FindError::Internal
            }
        })
    }

    pub async fn insert_user(&self, username: &str, pwhash: &str) -> Result<()> {
        sqlx::query(
            "
            INSERT INTO users (username, pwhash)
            VALUES (?, ?)
            ",
        )
        .bind(username)
        .bind(pwhash)
        .execute(&self.0)
        .await
        .map(|_| ())
        .map_err(|e| {
            error!("error inserting user {username}: {e:?}");
        })
    }
}

impl Backend {
    pub async fn find_books(&self, field: SearchField, term: &str) -> Result<Vec<Book>> {
        // the column name comes from the enum, never from the form
        let sql = format!(
            "
            SELECT DISTINCT id, isbn, title, author, year_published
            FROM books
            WHERE {} LIKE '%' || ? || '%'
            ",
            field.column(),
        );

        sqlx::query_as::<_, Book>(&sql)
            .bind(term)
            .fetch_all(&self.0)
            .await
            .map_err(|e| {
                error!("error selecting books by {}: {e:?}", field.column());
            })
    }

    pub async fn find_book(&self, id: i64) -> Result<Option<Book>> {
        sqlx::query_as::<_, Book>(
            "
            SELECT id, isbn, title, author, year_published
            FROM books
            WHERE id = ?
            ",
        )
        .bind(id)
        .fetch_optional(&self.0)
        .await
        .map_err(|e| {
            error!("error selecting book {id}: {e:?}");
        })
    }

    /// All records or none: the transaction commits after the last
    /// row, and dropping it on an earlier failure rolls the whole
    /// import back.
    pub async fn insert_books(&self, records: &[BookRecord]) -> Result<usize> {
        self.transact(|mut tx| async {
            for record in records {
                sqlx::query(
                    "
                    INSERT INTO books (isbn, title, author, year_published)
                    VALUES (?, ?, ?, ?)
                    ",
                )
                .bind(&record.isbn)
                .bind(&record.title)
                .bind(&record.author)
                .bind(record.year_published)
                .execute(&mut tx)
                .await
                .map_err(|e| {
                    error!("error inserting book {}: {e:?}", record.isbn);
                })?;

                info!("Added {} from {}.", record.title, record.author);
            }

            Ok((tx, records.len()))
        })
        .await
    }
}
