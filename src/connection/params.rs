//! Connection string parsing
//!
//! A connection string has the form `nats://[user[:password]@]host[:port]`.
//! The port defaults to [`DEFAULT_PORT`]. Credentials are attached to the
//! session only when both user and password are non-empty.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;

use super::error::ConnectionStringError;

/// Scheme accepted in connection strings
pub const SCHEME: &str = "nats";

/// Port used when the connection string omits one
pub const DEFAULT_PORT: u16 = 4222;

static CONNECTION_STRING: Lazy<Regex> = Lazy::new(|| {
	Regex::new(
		r"^nats://(?:(?P<username>[^:@/]+)(?::(?P<password>[^:@/]*))?@)?(?P<host>[^:@/]+)(?::(?P<port>\d*))?$",
	)
	.expect("connection string pattern is valid")
});

/// Parsed broker endpoint and optional credentials
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ConnectionParams {
	host: String,
	port: u16,
	username: Option<String>,
	password: Option<String>,
}

impl ConnectionParams {
	/// Parse a connection string.
	///
	/// # Errors
	/// [`ConnectionStringError`] when the input is empty, does not match the
	/// grammar, or carries a port outside the `u16` range.
	pub fn parse(connection_string: &str) -> Result<Self, ConnectionStringError> {
		if connection_string.is_empty() {
			return Err(ConnectionStringError::Empty);
		}

		let captures = CONNECTION_STRING
			.captures(connection_string)
			.ok_or(ConnectionStringError::Malformed)?;

		let port = match captures.name("port").map(|m| m.as_str()) {
			| None | Some("") => DEFAULT_PORT,
			| Some(digits) => digits.parse::<u16>().map_err(|_| {
				ConnectionStringError::InvalidPort(digits.to_string())
			})?,
		};

		Ok(Self {
			host: captures["host"].to_string(),
			port,
			username: captures.name("username").map(|m| m.as_str().to_string()),
			password: captures
				.name("password")
				.map(|m| m.as_str())
				.filter(|p| !p.is_empty())
				.map(str::to_string),
		})
	}

	/// Build params directly, bypassing string parsing.
	pub fn new(host: impl Into<String>, port: u16) -> Self {
		Self {
			host: host.into(),
			port,
			username: None,
			password: None,
		}
	}

	/// Attach user credentials.
	pub fn with_credentials(
		mut self,
		username: impl Into<String>,
		password: impl Into<String>,
	) -> Self {
		self.username = Some(username.into());
		self.password = Some(password.into());
		self
	}

	pub fn host(&self) -> &str {
		&self.host
	}

	pub fn port(&self) -> u16 {
		self.port
	}

	pub fn username(&self) -> Option<&str> {
		self.username.as_deref()
	}

	pub fn password(&self) -> Option<&str> {
		self.password.as_deref()
	}

	/// True iff both username and password are present and non-empty.
	pub fn has_credentials(&self) -> bool {
		matches!(
			(self.username(), self.password()),
			(Some(user), Some(password)) if !user.is_empty() && !password.is_empty()
		)
	}

	/// `host:port` address to dial.
	pub fn endpoint(&self) -> String {
		format!("{}:{}", self.host, self.port)
	}
}

impl FromStr for ConnectionParams {
	type Err = ConnectionStringError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::parse(s)
	}
}

// Password is never rendered, params end up in logs.
impl fmt::Display for ConnectionParams {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{SCHEME}://")?;
		match (self.username(), self.password()) {
			| (Some(user), Some(_)) => write!(f, "{user}:***@")?,
			| (Some(user), None) => write!(f, "{user}@")?,
			| _ => {}
		}
		write!(f, "{}:{}", self.host, self.port)
	}
}

impl fmt::Debug for ConnectionParams {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ConnectionParams")
			.field("host", &self.host)
			.field("port", &self.port)
			.field("username", &self.username)
			.field("password", &self.password.as_ref().map(|_| "***"))
			.finish()
	}
}
