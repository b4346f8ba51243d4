use std::net::{AddrParseError, IpAddr, SocketAddr};

use clap::Parser;

#[derive(Parser, Debug)]
pub struct Args {
    /// Whether bookshelf's clients connect to it over https.
    /// If so, the sessionid cookie is sent as a secure cookie.
    #[arg(short, long)]
    secure: bool,

    /// The address bookshelf should listen on. By default
    /// bookshelf will listen just on the IPv4 loopback.
    #[arg(short, long)]
    address: Option<String>,

    /// The port bookshelf listens on.
    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Connection string for the catalog database,
    /// e.g. sqlite://bookshelf.db
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,
}

impl Args {
    pub fn addr(&self) -> Result<SocketAddr, AddrParseError> {
        self.address
            .as_deref()
            .unwrap_or("127.0.0.1")
            .parse()
            .map(|addr: IpAddr| (addr, self.port).into())
    }

    pub fn secure(&self) -> bool {
        self.secure
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }
}
