//! Connection options.

use url::Url;

use crate::error::Error;

/// Where and how to connect, handed to [`Driver::connect`](crate::driver::Driver::connect).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opts {
    /// Server host name or address. Ignored when `socket` is set.
    ///
    /// Default: `""`
    pub host: String,

    /// Server TCP port.
    ///
    /// Default: `3306`
    pub port: u16,

    /// Path of a local socket to use instead of TCP.
    ///
    /// Default: `None`
    pub socket: Option<String>,

    /// Account name.
    ///
    /// Default: `""`
    pub user: String,

    /// Account password.
    ///
    /// Default: `None`
    pub password: Option<String>,

    /// Schema selected after connecting.
    ///
    /// Default: `None`
    pub database: Option<String>,

    /// Character set of the session, e.g. `utf8mb4`.
    ///
    /// Default: `None` (server default)
    pub charset: Option<String>,

    /// Log every statement at DEBUG level before it is sent.
    ///
    /// Default: `false`
    pub debug: bool,

    /// Query parameters of the URL not recognized above, passed through to the driver.
    ///
    /// Default: `[]`
    pub params: Vec<(String, String)>,
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            socket: None,
            user: String::new(),
            password: None,
            database: None,
            charset: None,
            debug: false,
            params: Vec::new(),
        }
    }
}

const DEFAULT_PORT: u16 = 3306;

impl Opts {
    /// `host:port`, or the socket path when one is set.
    pub fn endpoint(&self) -> String {
        match &self.socket {
            Some(path) => path.clone(),
            None => format!("{}:{}", self.host, self.port),
        }
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, Error> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(Error::InvalidUsage(format!(
            "Invalid value for {}: {}",
            key, value
        ))),
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_owned())
}

impl TryFrom<&Url> for Opts {
    type Error = Error;

    /// Read options from a URL.
    ///
    /// Format: `mysql://[user[:password]@]host[:port][/database][?key=value&..]`
    /// (`mariadb://` is accepted too).
    ///
    /// Recognized keys:
    /// - `charset`: session character set
    /// - `socket`: local socket path
    /// - `debug`: true/1/yes/on or false/0/no/off, any case
    ///
    /// Other keys are kept in [`Opts::params`].
    fn try_from(url: &Url) -> Result<Self, Self::Error> {
        if !matches!(url.scheme(), "mysql" | "mariadb") {
            return Err(Error::InvalidUsage(format!(
                "Invalid scheme: expected 'mysql://' or 'mariadb://', got '{}://'",
                url.scheme()
            )));
        }

        let mut opts = Opts {
            host: url.host_str().unwrap_or("localhost").to_owned(),
            port: url.port().unwrap_or(DEFAULT_PORT),
            user: url.username().to_owned(),
            password: url.password().map(str::to_owned),
            database: url.path().strip_prefix('/').and_then(non_empty),
            ..Opts::default()
        };

        for (key, value) in url.query_pairs() {
            match &*key {
                "charset" => opts.charset = Some(value.into_owned()),
                "socket" => opts.socket = Some(value.into_owned()),
                "debug" => opts.debug = parse_bool("debug", &value)?,
                _ => opts.params.push((key.into_owned(), value.into_owned())),
            }
        }

        Ok(opts)
    }
}

impl TryFrom<&str> for Opts {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        let url = Url::parse(s).map_err(|e| Error::InvalidUsage(format!("Invalid URL: {}", e)))?;
        Self::try_from(&url)
    }
}
