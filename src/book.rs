#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(sqlx::FromRow)]
pub struct Book {
    pub id: i64,
    pub isbn: String,
    pub title: String,
    pub author: String,
    pub year_published: i64,
}

/// Which column a catalog search runs against. Declaration order is
/// the priority order when a form fills in more than one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchField {
    Title,
    Author,
    Isbn,
}

impl SearchField {
    pub fn column(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Author => "author",
            Self::Isbn => "isbn",
        }
    }

    pub fn not_found_message(self) -> &'static str {
        match self {
            Self::Title => "No books found with that title.",
            Self::Author => "No books found by that author.",
            Self::Isbn => "No books found with that ISBN.",
        }
    }
}
