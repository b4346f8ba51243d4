use std::io::Read;

use serde::Deserialize;

use crate::backend::Backend;

/// One catalog row as it appears in the import stream: four columns,
/// fixed order, no header.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BookRecord {
    pub isbn: String,
    pub title: String,
    pub author: String,
    pub year_published: i64,
}

#[derive(Debug)]
pub enum ImportError {
    Read(csv::Error),
    Insert,
}

pub fn read_records<R: Read>(input: R) -> Result<Vec<BookRecord>, ImportError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(input);

    reader
        .deserialize()
        .collect::<Result<_, _>>()
        .map_err(ImportError::Read)
}

/// Every record parses before anything is written, and the inserts
/// share one transaction, so a malformed row or a failed insert
/// can't leave a partial import behind.
pub async fn import<R: Read>(backend: &Backend, input: R) -> Result<usize, ImportError> {
    let records = read_records(input)?;

    backend
        .insert_books(&records)
        .await
        .map_err(|()| ImportError::Insert)
}
