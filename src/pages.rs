use askama::Template;

use crate::book::Book;

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexPage;

#[derive(Template)]
#[template(path = "register.html")]
pub struct RegisterPage;

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginPage;

/// The search form, with room for a "nothing found" or
/// "pick a field" message above it.
#[derive(Template)]
#[template(path = "search.html")]
pub struct SearchPage {
    pub message: Option<&'static str>,
}

#[derive(Template)]
#[template(path = "results.html")]
pub struct ResultsPage {
    pub books: Vec<Book>,
}

/// `book` is None when the id matched nothing; the page still
/// renders, just empty.
#[derive(Template)]
#[template(path = "book.html")]
pub struct BookPage {
    pub book: Option<Book>,
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorPage {
    pub message: &'static str,
}
