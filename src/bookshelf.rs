use std::result;
use std::sync::Arc;

use log::{debug, error, info};
use serde::Deserialize;
use warp::http;

use crate::backend::{Backend, FindError};
use crate::book::{Book, SearchField};
use crate::password;
use crate::session::{SessionId, SessionStore};

#[derive(Debug)]
pub struct Bookshelf {
    backend: Backend,
    sessions: SessionStore,
}

/// Proof that a request arrived with a live session. Routes that
/// take one of these can't be reached unauthenticated.
#[derive(Debug)]
pub struct BookshelfAuthed {
    shelf: Arc<Bookshelf>,
    session_id: SessionId,
    user_id: i64,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    Internal,
    Unauthorized,
}

pub type Result<T> = result::Result<T, Error>;

impl Into<http::StatusCode> for Error {
    fn into(self) -> http::StatusCode {
        match self {
            Self::Internal => http::StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unauthorized => http::StatusCode::UNAUTHORIZED,
        }
    }
}

impl warp::reject::Reject for Error {}

/// Missing fields deserialise the same as blank ones, so presence
/// checks below are just `is_empty`.
#[derive(Debug, Default, Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub password_confirmation: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub isbn: String,
}

impl SearchForm {
    /// First non-empty field wins, in title, author, isbn order;
    /// the rest are ignored even when filled in.
    pub fn query(&self) -> Option<(SearchField, &str)> {
        [
            (SearchField::Title, &self.title),
            (SearchField::Author, &self.author),
            (SearchField::Isbn, &self.isbn),
        ]
        .into_iter()
        .find(|(_, term)| !term.is_empty())
        .map(|(field, term)| (field, term.as_str()))
    }
}

/// Why a registration attempt was turned away. Validation stops at
/// the first broken rule, in declaration order.
#[derive(Debug, PartialEq, Eq)]
pub enum RegisterError {
    MissingUsername,
    MissingPassword,
    MissingConfirmation,
    PasswordMismatch,
    UsernameTaken,
    Fault(Error),
}

impl RegisterError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::MissingUsername => "Please enter a username.",
            Self::MissingPassword => "Please enter a password.",
            Self::MissingConfirmation => "Please confirm your password.",
            Self::PasswordMismatch => "Passwords do not match.",
            Self::UsernameTaken => "Username already exists.",
            Self::Fault(_) => "Something went wrong. Please try again.",
        }
    }
}

impl From<Error> for RegisterError {
    fn from(e: Error) -> Self {
        Self::Fault(e)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum LoginError {
    MissingUsername,
    MissingPassword,
    /// Unknown user and wrong password collapse to one message, so
    /// a response never says which half was wrong.
    InvalidCredentials,
    Fault(Error),
}

impl LoginError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::MissingUsername => "Please enter a username.",
            Self::MissingPassword => "Please enter a password.",
            Self::InvalidCredentials => "Invalid username and/or password.",
            Self::Fault(_) => "Something went wrong. Please try again.",
        }
    }
}

impl From<Error> for LoginError {
    fn from(e: Error) -> Self {
        Self::Fault(e)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum SearchError {
    EmptyQuery,
    NoMatches(SearchField),
    Fault(Error),
}

impl SearchError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::EmptyQuery => "Please enter Title, Author, or ISBN.",
            Self::NoMatches(field) => field.not_found_message(),
            Self::Fault(_) => "Something went wrong. Please try again.",
        }
    }
}

impl From<Error> for SearchError {
    fn from(e: Error) -> Self {
        Self::Fault(e)
    }
}

impl Bookshelf {
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            sessions: SessionStore::default(),
        }
    }

    pub async fn register(&self, form: &RegisterForm) -> result::Result<(), RegisterError> {
        let RegisterForm {
            username,
            password,
            password_confirmation,
        } = form;

        if username.is_empty() {
            return Err(RegisterError::MissingUsername);
        }
        if password.is_empty() {
            return Err(RegisterError::MissingPassword);
        }
        if password_confirmation.is_empty() {
            return Err(RegisterError::MissingConfirmation);
        }
        if password != password_confirmation {
            return Err(RegisterError::PasswordMismatch);
        }

        match self.backend.find_user(username).await {
            Ok(_) => {
                info!("rejecting duplicate registration for {username}");
                return Err(RegisterError::UsernameTaken);
            }
            Err(FindError::NotFound) => {}
            Err(FindError::Internal) => return Err(Error::Internal.into()),
        }

        let pwhash = password::hash(password).map_err(|e| {
            error!("couldn't hash password for {username}: {e:?}");
            RegisterError::from(Error::Internal)
        })?;

        self.backend
            .insert_user(username, &pwhash)
            .await
            .map_err(|()| RegisterError::from(Error::Internal))?;

        info!("{username} registered");
        Ok(())
    }

    /// A login attempt begins by forgetting whatever session the
    /// browser presented, live or not.
    pub async fn login(
        &self,
        form: &LoginForm,
        stale: Option<SessionId>,
    ) -> result::Result<SessionId, LoginError> {
        if let Some(ref stale) = stale {
            self.sessions.remove(stale);
        }

        let LoginForm { username, password } = form;

        if username.is_empty() {
            return Err(LoginError::MissingUsername);
        }
        if password.is_empty() {
            return Err(LoginError::MissingPassword);
        }

        let user = match self.backend.find_user(username).await {
            Ok(user) => user,
            Err(FindError::NotFound) => {
                info!("rejecting login for unknown user {username}");
                return Err(LoginError::InvalidCredentials);
            }
            Err(FindError::Internal) => return Err(Error::Internal.into()),
        };

        let verified = password::verify(password, &user.pwhash).map_err(|e| {
            error!("couldn't verify password for {username}: {e:?}");
            LoginError::from(Error::Internal)
        })?;

        if !verified {
            info!("wrong password for {username}");
            return Err(LoginError::InvalidCredentials);
        }

        let session_id = self.sessions.insert(user.id);
        info!("{username} login: new session created");
        Ok(session_id)
    }

    /// Idempotent: logging out with no live session is not an error.
    pub fn logout(&self, session_id: Option<SessionId>) {
        if let Some(id) = session_id {
            if self.sessions.remove(&id).is_some() {
                info!("session {id} logged out");
            }
        }
    }

    /// The gate every authenticated route goes through: resolve the
    /// session cookie against the store, or fail Unauthorized.
    pub fn authenticate(self: &Arc<Self>, cookie: Option<&str>) -> Result<BookshelfAuthed> {
        let session_id = cookie
            .and_then(|c| c.parse::<SessionId>().ok())
            .ok_or(Error::Unauthorized)?;

        let user_id = self.sessions.user_id(&session_id).ok_or_else(|| {
            debug!("no live session for {session_id}");
            Error::Unauthorized
        })?;

        Ok(BookshelfAuthed {
            shelf: Arc::clone(self),
            session_id,
            user_id,
        })
    }

    /// Book detail is deliberately public: the catalog holds no
    /// per-user data, only search is gated.
    pub async fn book(&self, id: i64) -> Result<Option<Book>> {
        self.backend.find_book(id).await.map_err(|()| Error::Internal)
    }
}

impl BookshelfAuthed {
    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub async fn search(&self, form: &SearchForm) -> result::Result<Vec<Book>, SearchError> {
        let (field, term) = form.query().ok_or(SearchError::EmptyQuery)?;

        debug!(
            "user {} searching {} for {term:?}",
            self.user_id,
            field.column()
        );

        let books = self
            .shelf
            .backend
            .find_books(field, term)
            .await
            .map_err(|()| SearchError::from(Error::Internal))?;

        if books.is_empty() {
            return Err(SearchError::NoMatches(field));
        }

        info!(
            "user {}: {} books match {} {term:?}",
            self.user_id,
            books.len(),
            field.column()
        );
        Ok(books)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::importer::BookRecord;
    use crate::mock;

    async fn create_shelf() -> Arc<Bookshelf> {
        let db = mock::create_db().await;
        Arc::new(Bookshelf::new(Backend(db)))
    }

    fn register_form(username: &str, password: &str, confirmation: &str) -> RegisterForm {
        RegisterForm {
            username: username.into(),
            password: password.into(),
            password_confirmation: confirmation.into(),
        }
    }

    fn login_form(username: &str, password: &str) -> LoginForm {
        LoginForm {
            username: username.into(),
            password: password.into(),
        }
    }

    fn title_search(term: &str) -> SearchForm {
        SearchForm {
            title: term.into(),
            ..Default::default()
        }
    }

    async fn user_count(shelf: &Bookshelf) -> i64 {
        sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM users")
            .fetch_one(&shelf.backend.0)
            .await
            .unwrap()
            .0
    }

    async fn seed_books(shelf: &Bookshelf) {
        let records = [
            BookRecord {
                isbn: "9780547928227".into(),
                title: "The Hobbit".into(),
                author: "J.R.R. Tolkien".into(),
                year_published: 1937,
            },
            BookRecord {
                isbn: "9780618391110".into(),
                title: "The Silmarillion".into(),
                author: "J.R.R. Tolkien".into(),
                year_published: 1977,
            },
            BookRecord {
                isbn: "9781505297409".into(),
                title: "The Time Machine".into(),
                author: "H.G. Wells".into(),
                year_published: 1895,
            },
        ];

        shelf.backend.insert_books(&records).await.unwrap();
    }

    fn authed(shelf: &Arc<Bookshelf>, user_id: i64) -> BookshelfAuthed {
        BookshelfAuthed {
            shelf: Arc::clone(shelf),
            session_id: SessionId::new(),
            user_id,
        }
    }

    #[tokio::test]
    async fn register_validates_in_order() {
        let shelf = create_shelf().await;

        let cases = [
            (
                register_form("", "pw", "pw"),
                RegisterError::MissingUsername,
            ),
            (register_form("ana", "", ""), RegisterError::MissingPassword),
            (
                register_form("ana", "pw", ""),
                RegisterError::MissingConfirmation,
            ),
            (
                register_form("ana", "pw", "other"),
                RegisterError::PasswordMismatch,
            ),
        ];

        for (form, expected) in cases {
            assert_eq!(shelf.register(&form).await.unwrap_err(), expected);
        }

        // none of the failures left a row behind
        assert_eq!(user_count(&shelf).await, 0);
    }

    #[test]
    fn register_messages_are_specific() {
        assert_eq!(
            RegisterError::MissingUsername.message(),
            "Please enter a username."
        );
        assert_eq!(
            RegisterError::PasswordMismatch.message(),
            "Passwords do not match."
        );
        assert_eq!(
            RegisterError::UsernameTaken.message(),
            "Username already exists."
        );
    }

    #[tokio::test]
    async fn duplicate_username_leaves_one_row() {
        let shelf = create_shelf().await;

        shelf
            .register(&register_form("ana", "pw", "pw"))
            .await
            .unwrap();

        let err = shelf
            .register(&register_form("ana", "other", "other"))
            .await
            .unwrap_err();

        assert_eq!(err, RegisterError::UsernameTaken);
        assert_eq!(user_count(&shelf).await, 1);
    }

    #[tokio::test]
    async fn login_rejects_bad_credentials_generically() {
        let shelf = create_shelf().await;

        shelf
            .register(&register_form("ana", "pw", "pw"))
            .await
            .unwrap();

        let wrong_password = shelf
            .login(&login_form("ana", "nope"), None)
            .await
            .unwrap_err();
        let unknown_user = shelf
            .login(&login_form("bob", "pw"), None)
            .await
            .unwrap_err();

        // same variant, same message: no hint which half was wrong
        assert_eq!(wrong_password, LoginError::InvalidCredentials);
        assert_eq!(unknown_user, LoginError::InvalidCredentials);

        // and neither attempt left an authenticated session
        let unused = SessionId::new().to_string();
        assert!(shelf.authenticate(Some(unused.as_str())).is_err());
    }

    #[tokio::test]
    async fn login_missing_fields_get_their_own_messages() {
        let shelf = create_shelf().await;

        let err = shelf.login(&login_form("", "pw"), None).await.unwrap_err();
        assert_eq!(err.message(), "Please enter a username.");

        let err = shelf.login(&login_form("ana", ""), None).await.unwrap_err();
        assert_eq!(err.message(), "Please enter a password.");
    }

    #[tokio::test]
    async fn login_then_logout_cycles_the_session() {
        let shelf = create_shelf().await;

        shelf
            .register(&register_form("ana", "pw", "pw"))
            .await
            .unwrap();

        let session_id = shelf.login(&login_form("ana", "pw"), None).await.unwrap();

        let cookie = session_id.to_string();
        let authed = shelf.authenticate(Some(cookie.as_str())).unwrap();
        assert!(authed.search(&title_search("anything")).await.is_err()); // reachable, just no books

        shelf.logout(Some(session_id));
        assert_eq!(
            shelf.authenticate(Some(cookie.as_str())).unwrap_err(),
            Error::Unauthorized
        );

        // logging out again is fine
        shelf.logout(Some(session_id));
    }

    #[tokio::test]
    async fn login_attempt_clears_the_presented_session() {
        let shelf = create_shelf().await;

        shelf
            .register(&register_form("ana", "pw", "pw"))
            .await
            .unwrap();

        let old = shelf.login(&login_form("ana", "pw"), None).await.unwrap();

        // a failing attempt still drops the old session
        let err = shelf
            .login(&login_form("ana", ""), Some(old))
            .await
            .unwrap_err();
        assert_eq!(err, LoginError::MissingPassword);

        let cookie = old.to_string();
        assert_eq!(
            shelf.authenticate(Some(cookie.as_str())).unwrap_err(),
            Error::Unauthorized
        );
    }

    #[tokio::test]
    async fn authenticate_rejects_junk_cookies() {
        let shelf = create_shelf().await;

        assert_eq!(shelf.authenticate(None).unwrap_err(), Error::Unauthorized);
        assert_eq!(
            shelf.authenticate(Some("not-a-uuid")).unwrap_err(),
            Error::Unauthorized
        );
    }

    #[tokio::test]
    async fn search_matches_substrings_on_one_column() {
        let shelf = create_shelf().await;
        seed_books(&shelf).await;

        let authed = authed(&shelf, 1);

        let books = authed.search(&title_search("Hobbit")).await.unwrap();
        let [ref hobbit] = books[..] else {
            panic!("expected a single match")
        };
        assert_eq!(hobbit.title, "The Hobbit");

        // substring, not exact: "The " prefixed titles all match "The"
        let books = authed.search(&title_search("The")).await.unwrap();
        assert_eq!(books.len(), 3);
    }

    #[tokio::test]
    async fn search_prefers_title_over_author_over_isbn() {
        let shelf = create_shelf().await;
        seed_books(&shelf).await;

        let authed = authed(&shelf, 1);

        // author and isbn are ignored once title is present
        let form = SearchForm {
            title: "Time".into(),
            author: "Tolkien".into(),
            isbn: "9780547928227".into(),
        };
        let books = authed.search(&form).await.unwrap();
        let [ref wells] = books[..] else {
            panic!("expected a single match")
        };
        assert_eq!(wells.author, "H.G. Wells");

        // with no title, author wins over isbn
        let form = SearchForm {
            author: "Tolkien".into(),
            isbn: "9781505297409".into(),
            ..Default::default()
        };
        let books = authed.search(&form).await.unwrap();
        assert_eq!(books.len(), 2);
    }

    #[tokio::test]
    async fn search_by_isbn() {
        let shelf = create_shelf().await;
        seed_books(&shelf).await;

        let form = SearchForm {
            isbn: "9780547928227".into(),
            ..Default::default()
        };
        let books = authed(&shelf, 1).search(&form).await.unwrap();
        let [ref hobbit] = books[..] else {
            panic!("expected a single match")
        };
        assert_eq!(hobbit.title, "The Hobbit");
    }

    #[tokio::test]
    async fn blank_search_asks_for_a_field() {
        let shelf = create_shelf().await;
        seed_books(&shelf).await;

        let err = authed(&shelf, 1)
            .search(&SearchForm::default())
            .await
            .unwrap_err();

        assert_eq!(err, SearchError::EmptyQuery);
        assert_eq!(err.message(), "Please enter Title, Author, or ISBN.");
    }

    #[tokio::test]
    async fn empty_results_name_the_field() {
        let shelf = create_shelf().await;
        seed_books(&shelf).await;

        let err = authed(&shelf, 1)
            .search(&title_search("Dracula"))
            .await
            .unwrap_err();

        assert_eq!(err, SearchError::NoMatches(SearchField::Title));
        assert_eq!(err.message(), "No books found with that title.");

        let form = SearchForm {
            author: "Stoker".into(),
            ..Default::default()
        };
        let err = authed(&shelf, 1).search(&form).await.unwrap_err();
        assert_eq!(err.message(), "No books found by that author.");
    }

    #[tokio::test]
    async fn book_detail_by_id() {
        let shelf = create_shelf().await;
        seed_books(&shelf).await;

        let books = authed(&shelf, 1).search(&title_search("Hobbit")).await.unwrap();
        let id = books[0].id;

        let book = shelf.book(id).await.unwrap().unwrap();
        assert_eq!(book.title, "The Hobbit");
        assert_eq!(book.year_published, 1937);
    }

    #[tokio::test]
    async fn missing_book_is_none_not_an_error() {
        let shelf = create_shelf().await;
        seed_books(&shelf).await;

        assert_eq!(shelf.book(9999).await.unwrap(), None);
    }
}
