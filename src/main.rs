use std::convert::Infallible;
use std::sync::Arc;

use clap::Parser;
use cookie::Cookie;
use log::error;
use warp::http::header::SET_COOKIE;
use warp::http::{StatusCode, Uri};
use warp::{Filter, Rejection, Reply};

use askama::Template;

use bookshelf::{
    Args, Backend, BookPage, Bookshelf, BookshelfAuthed, Error, ErrorPage, IndexPage, LoginError,
    LoginForm, LoginPage, RegisterError, RegisterForm, RegisterPage, ResultsPage, SearchError,
    SearchForm, SearchPage, SESSION_COOKIE,
};

#[tokio::main]
async fn main() {
    pretty_env_logger::init();

    let args = Args::parse();
    let addr = args.addr().expect("couldn't parse listen address");
    let secure = args.secure();

    let backend = Backend::new(args.database_url()).await;
    let shelf = Arc::new(Bookshelf::new(backend));

    let with_shelf = {
        let shelf = Arc::clone(&shelf);
        warp::any().map(move || Arc::clone(&shelf))
    };

    let session_cookie = warp::cookie::optional::<String>(SESSION_COOKIE);

    // the gate: any route composed with this only runs once the
    // sessionid cookie resolves to a live session
    let authed = with_shelf
        .clone()
        .and(session_cookie.clone())
        .and_then(|shelf: Arc<Bookshelf>, cookie: Option<String>| async move {
            shelf
                .authenticate(cookie.as_deref())
                .map_err(warp::reject::custom)
        });

    let index = warp::path::end()
        .and(warp::get())
        .and_then(|| async { render(&IndexPage) });

    let register = {
        let page = warp::path!("register")
            .and(warp::get())
            .and_then(|| async { render(&RegisterPage) });

        let submit = warp::path!("register")
            .and(warp::post())
            .and(with_shelf.clone())
            .and(warp::body::form::<RegisterForm>())
            .and_then(|shelf: Arc<Bookshelf>, form: RegisterForm| async move {
                match shelf.register(&form).await {
                    Ok(()) => render(&IndexPage),
                    Err(RegisterError::Fault(e)) => Err(warp::reject::custom(e)),
                    Err(e) => render(&ErrorPage {
                        message: e.message(),
                    }),
                }
            });

        page.or(submit)
    };

    let login = {
        let page = warp::path!("login")
            .and(warp::get())
            .and_then(|| async { render(&LoginPage) });

        let submit = warp::path!("login")
            .and(warp::post())
            .and(with_shelf.clone())
            .and(session_cookie.clone())
            .and(warp::body::form::<LoginForm>())
            .and_then(
                move |shelf: Arc<Bookshelf>, cookie: Option<String>, form: LoginForm| async move {
                    let stale = cookie.and_then(|c| c.parse().ok());

                    match shelf.login(&form, stale).await {
                        Ok(session_id) => {
                            let cookie = Cookie::build((SESSION_COOKIE, session_id.to_string()))
                                .path("/")
                                .http_only(true)
                                .secure(secure)
                                .build();

                            let redirect = warp::redirect::see_other(Uri::from_static("/search"));
                            Ok(
                                warp::reply::with_header(redirect, SET_COOKIE, cookie.to_string())
                                    .into_response(),
                            )
                        }
                        Err(LoginError::Fault(e)) => Err(warp::reject::custom(e)),
                        Err(e) => render(&ErrorPage {
                            message: e.message(),
                        }),
                    }
                },
            );

        page.or(submit)
    };

    let logout = warp::path!("logout")
        .and(warp::get())
        .and(with_shelf.clone())
        .and(session_cookie.clone())
        .and_then(|shelf: Arc<Bookshelf>, cookie: Option<String>| async move {
            shelf.logout(cookie.and_then(|c| c.parse().ok()));

            let mut expired = Cookie::build((SESSION_COOKIE, ""))
                .path("/")
                .http_only(true)
                .build();
            expired.make_removal();

            let redirect = warp::redirect::see_other(Uri::from_static("/"));
            Ok::<_, Rejection>(
                warp::reply::with_header(redirect, SET_COOKIE, expired.to_string())
                    .into_response(),
            )
        });

    let search = {
        let page = warp::path!("search")
            .and(warp::get())
            .and(authed.clone())
            .and_then(|_authed: BookshelfAuthed| async move {
                render(&SearchPage { message: None })
            });

        let submit = warp::path!("search")
            .and(warp::post())
            .and(authed.clone())
            .and(warp::body::form::<SearchForm>())
            .and_then(|authed: BookshelfAuthed, form: SearchForm| async move {
                match authed.search(&form).await {
                    Ok(books) => render(&ResultsPage { books }),
                    Err(SearchError::Fault(e)) => Err(warp::reject::custom(e)),
                    Err(e) => render(&SearchPage {
                        message: Some(e.message()),
                    }),
                }
            });

        page.or(submit)
    };

    let book = warp::path!("book" / u32)
        .and(warp::get().or(warp::post()).unify())
        .and(with_shelf.clone())
        .and_then(|id: u32, shelf: Arc<Bookshelf>| async move {
            match shelf.book(i64::from(id)).await {
                Ok(book) => render(&BookPage { book }),
                Err(e) => Err(warp::reject::custom(e)),
            }
        });

    let routes = index
        .or(register)
        .or(login)
        .or(logout)
        .or(search)
        .or(book)
        .recover(handle_rejection);

    warp::serve(routes).run(addr).await;
}

fn render<T: askama::Template>(page: &T) -> Result<warp::reply::Response, Rejection> {
    let html = page.render().map_err(|e| {
        error!("couldn't render page: {e:?}");
        warp::reject::custom(Error::Internal)
    })?;

    Ok(warp::reply::html(html).into_response())
}

async fn handle_rejection(err: Rejection) -> Result<warp::reply::Response, Infallible> {
    if let Some(&e) = err.find::<Error>() {
        return Ok(match e {
            // not logged in: send them to the login page instead
            Error::Unauthorized => {
                warp::redirect::see_other(Uri::from_static("/login")).into_response()
            }
            Error::Internal => error_response(
                &ErrorPage {
                    message: "Something went wrong. Please try again.",
                },
                e.into(),
            ),
        });
    }

    if err.is_not_found() {
        return Ok(error_response(
            &ErrorPage {
                message: "Page not found.",
            },
            StatusCode::NOT_FOUND,
        ));
    }

    // malformed form bodies and the like
    Ok(error_response(
        &ErrorPage {
            message: "Bad request.",
        },
        StatusCode::BAD_REQUEST,
    ))
}

fn error_response(page: &ErrorPage, status: StatusCode) -> warp::reply::Response {
    match page.render() {
        Ok(html) => warp::reply::with_status(warp::reply::html(html), status).into_response(),
        Err(e) => {
            error!("couldn't render error page: {e:?}");
            status.into_response()
        }
    }
}
