//! Authentication gates: pre-dispatch interceptors that may answer a
//! request themselves.
//!
//! Two implementations, mirroring the two configuration-file kinds:
//! HTTP Basic credentials checked per request, and a cookie-session gate
//! with a login/logout flow and an in-memory session cache.

use crate::{
    errors::Error,
    http::{
        message::Message,
        types::{self, HEADER_AUTHORIZATION, HEADER_LOCATION, HEADER_SET_COOKIE, HEADER_WWW_AUTHENTICATE},
        writer::Writer,
    },
    server::{
        connection::Connection,
        server_impl::{send_forbidden, BoxFuture},
    },
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::Rng;
use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration, Instant},
};
use tracing::debug;

/// Pre-handler authentication predicate.
///
/// `handle_request` returning `Ok(false)` means the gate has already
/// produced a response (401, 403, or a redirect) and the server must
/// stop processing the request.
pub trait AuthGate: Send + Sync {
    fn handle_request<'a>(
        &'a self,
        request: &'a mut Message,
        conn: &'a mut Connection,
    ) -> BoxFuture<'a, Result<bool, Error>>;

    /// Small configuration protocol; unknown names are `BadOption`.
    fn set_option(&self, name: &str, value: &str) -> Result<(), Error>;

    /// Adds a resource prefix requiring authentication. With no
    /// restrictions registered, every resource requires it.
    fn add_restrict(&self, resource: &str);

    fn add_user(&self, username: &str, password: &str) -> Result<(), Error>;
}

/// Prefix-with-boundary match against the restricted set; an empty set
/// restricts everything.
fn is_restricted(restrict: &[String], resource: &str) -> bool {
    if restrict.is_empty() {
        return true;
    }
    restrict.iter().any(|prefix| {
        resource.starts_with(prefix.as_str())
            && (resource.len() == prefix.len() || resource.as_bytes()[prefix.len()] == b'/')
    })
}

// BASIC

/// HTTP Basic gate: checks `Authorization: Basic` credentials against an
/// in-memory user store and answers `401` with a `WWW-Authenticate`
/// challenge otherwise.
pub struct BasicAuthGate {
    users: Mutex<HashMap<String, String>>,
    restrict: Mutex<Vec<String>>,
    realm: Mutex<String>,
}

impl BasicAuthGate {
    pub fn new() -> Self {
        Self {
            users: Mutex::new(HashMap::new()),
            restrict: Mutex::new(Vec::new()),
            realm: Mutex::new("PION".to_string()),
        }
    }

    fn check_credentials(&self, header: &str) -> Option<String> {
        let encoded = header.strip_prefix("Basic ")?.trim();
        let decoded = BASE64.decode(encoded).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (username, password) = decoded.split_once(':')?;

        let users = self.users.lock().unwrap();
        (users.get(username).map(String::as_str) == Some(password)).then(|| username.to_string())
    }

    async fn challenge(&self, request: &Message, conn: &mut Connection) -> Result<(), Error> {
        let realm = self.realm.lock().unwrap().clone();
        let mut writer = Writer::new(conn, request);
        writer.response_mut().set_status(types::STATUS_UNAUTHORIZED);
        writer
            .response_mut()
            .change_header(HEADER_WWW_AUTHENTICATE, format!("Basic realm=\"{realm}\""));
        writer.write("401 Unauthorized");
        writer.send().await
    }
}

impl Default for BasicAuthGate {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthGate for BasicAuthGate {
    fn handle_request<'a>(
        &'a self,
        request: &'a mut Message,
        conn: &'a mut Connection,
    ) -> BoxFuture<'a, Result<bool, Error>> {
        Box::pin(async move {
            {
                let restrict = self.restrict.lock().unwrap();
                if !is_restricted(&restrict, request.resource()) {
                    return Ok(true);
                }
            }

            if let Some(header) = request.header(HEADER_AUTHORIZATION) {
                if let Some(username) = self.check_credentials(header) {
                    request.set_user(Some(username));
                    return Ok(true);
                }
                debug!("rejected credentials for {}", request.resource());
            }

            self.challenge(request, conn).await?;
            Ok(false)
        })
    }

    fn set_option(&self, name: &str, value: &str) -> Result<(), Error> {
        match name {
            "realm" => {
                *self.realm.lock().unwrap() = value.to_string();
                Ok(())
            }
            _ => Err(Error::BadOption(name.to_string())),
        }
    }

    fn add_restrict(&self, resource: &str) {
        self.restrict
            .lock()
            .unwrap()
            .push(types::strip_trailing_slash(resource).to_string());
    }

    fn add_user(&self, username: &str, password: &str) -> Result<(), Error> {
        self.users
            .lock()
            .unwrap()
            .insert(username.to_string(), password.to_string());
        Ok(())
    }
}

// COOKIE

const SESSION_COOKIE: &str = "session_id";
const SESSION_TOKEN_BYTES: usize = 20;
const SESSION_EXPIRATION: Duration = Duration::from_secs(3600);
const MAX_SESSIONS: usize = 10_000;

struct Session {
    username: String,
    last_seen: Instant,
}

struct CookieOptions {
    login: String,
    logout: String,
    redirect: String,
}

/// Cookie-session gate: a login resource exchanges `user`/`pass` query
/// parameters for a random session token carried in a cookie; restricted
/// resources require a live session.
pub struct CookieAuthGate {
    users: Mutex<HashMap<String, String>>,
    restrict: Mutex<Vec<String>>,
    sessions: Mutex<HashMap<String, Session>>,
    options: Mutex<CookieOptions>,
}

impl CookieAuthGate {
    pub fn new() -> Self {
        Self {
            users: Mutex::new(HashMap::new()),
            restrict: Mutex::new(Vec::new()),
            sessions: Mutex::new(HashMap::new()),
            options: Mutex::new(CookieOptions {
                login: "/login".to_string(),
                logout: "/logout".to_string(),
                redirect: String::new(),
            }),
        }
    }

    fn random_token() -> String {
        let mut rng = rand::thread_rng();
        (0..SESSION_TOKEN_BYTES)
            .map(|_| format!("{:02x}", rng.gen::<u8>()))
            .collect()
    }

    /// Drops expired sessions; evicts the stalest entry when the cache
    /// is full.
    fn sweep(sessions: &mut HashMap<String, Session>) {
        let now = Instant::now();
        sessions.retain(|_, session| now.duration_since(session.last_seen) < SESSION_EXPIRATION);
        if sessions.len() >= MAX_SESSIONS {
            if let Some(oldest) = sessions
                .iter()
                .min_by_key(|(_, session)| session.last_seen)
                .map(|(token, _)| token.clone())
            {
                sessions.remove(&oldest);
            }
        }
    }

    fn authenticated_user(&self, request: &Message) -> Option<String> {
        let token = request.cookie(SESSION_COOKIE)?;
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions.get_mut(token)?;
        if session.last_seen.elapsed() >= SESSION_EXPIRATION {
            sessions.remove(token);
            return None;
        }
        session.last_seen = Instant::now();
        Some(session.username.clone())
    }

    async fn handle_login(&self, request: &Message, conn: &mut Connection) -> Result<(), Error> {
        let user = request.params().get("user").unwrap_or_default().to_string();
        let pass = request.params().get("pass").unwrap_or_default().to_string();

        let valid = self.users.lock().unwrap().get(&user).map(String::as_str) == Some(pass.as_str());
        if !valid {
            debug!("login failed for user {user:?}");
            return send_forbidden(request, conn, request.resource()).await;
        }

        let token = Self::random_token();
        {
            let mut sessions = self.sessions.lock().unwrap();
            Self::sweep(&mut sessions);
            sessions.insert(
                token.clone(),
                Session {
                    username: user,
                    last_seen: Instant::now(),
                },
            );
        }

        let redirect = self.options.lock().unwrap().redirect.clone();
        let mut writer = Writer::new(conn, request);
        if redirect.is_empty() {
            writer.response_mut().set_status(204);
        } else {
            writer.response_mut().set_status(types::STATUS_FOUND);
            writer.response_mut().change_header(HEADER_LOCATION, redirect);
        }
        writer
            .response_mut()
            .change_header(HEADER_SET_COOKIE, format!("{SESSION_COOKIE}={token}; Path=/"));
        writer.send().await
    }

    async fn handle_logout(&self, request: &Message, conn: &mut Connection) -> Result<(), Error> {
        if let Some(token) = request.cookie(SESSION_COOKIE) {
            self.sessions.lock().unwrap().remove(token);
        }

        let redirect = self.options.lock().unwrap().redirect.clone();
        let mut writer = Writer::new(conn, request);
        if redirect.is_empty() {
            writer.response_mut().set_status(204);
        } else {
            writer.response_mut().set_status(types::STATUS_FOUND);
            writer.response_mut().change_header(HEADER_LOCATION, redirect);
        }
        writer
            .response_mut()
            .change_header(HEADER_SET_COOKIE, format!("{SESSION_COOKIE}=; Max-Age=0; Path=/"));
        writer.send().await
    }

    async fn deny(&self, request: &Message, conn: &mut Connection) -> Result<(), Error> {
        let login = self.options.lock().unwrap().login.clone();
        let mut writer = Writer::new(conn, request);
        writer.response_mut().set_status(types::STATUS_FOUND);
        writer.response_mut().change_header(HEADER_LOCATION, login);
        writer.send().await
    }
}

impl Default for CookieAuthGate {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthGate for CookieAuthGate {
    fn handle_request<'a>(
        &'a self,
        request: &'a mut Message,
        conn: &'a mut Connection,
    ) -> BoxFuture<'a, Result<bool, Error>> {
        Box::pin(async move {
            let (login, logout) = {
                let options = self.options.lock().unwrap();
                (options.login.clone(), options.logout.clone())
            };

            if request.resource() == login {
                self.handle_login(request, conn).await?;
                return Ok(false);
            }
            if request.resource() == logout {
                self.handle_logout(request, conn).await?;
                return Ok(false);
            }

            {
                let restrict = self.restrict.lock().unwrap();
                if !is_restricted(&restrict, request.resource()) {
                    return Ok(true);
                }
            }

            if let Some(username) = self.authenticated_user(request) {
                request.set_user(Some(username));
                return Ok(true);
            }

            debug!("no valid session for {}", request.resource());
            self.deny(request, conn).await?;
            Ok(false)
        })
    }

    fn set_option(&self, name: &str, value: &str) -> Result<(), Error> {
        let mut options = self.options.lock().unwrap();
        match name {
            "login" => options.login = value.to_string(),
            "logout" => options.logout = value.to_string(),
            "redirect" => options.redirect = value.to_string(),
            _ => return Err(Error::BadOption(name.to_string())),
        }
        Ok(())
    }

    fn add_restrict(&self, resource: &str) {
        self.restrict
            .lock()
            .unwrap()
            .push(types::strip_trailing_slash(resource).to_string());
    }

    fn add_user(&self, username: &str, password: &str) -> Result<(), Error> {
        self.users
            .lock()
            .unwrap()
            .insert(username.to_string(), password.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restriction_matching() {
        let none: Vec<String> = Vec::new();
        assert!(is_restricted(&none, "/anything"));

        let some = vec!["/admin".to_string()];
        assert!(is_restricted(&some, "/admin"));
        assert!(is_restricted(&some, "/admin/users"));
        assert!(!is_restricted(&some, "/administrator"));
        assert!(!is_restricted(&some, "/public"));
    }

    #[test]
    fn basic_credential_check() {
        let gate = BasicAuthGate::new();
        gate.add_user("mike", "secret").unwrap();

        // "mike:secret"
        assert_eq!(
            gate.check_credentials("Basic bWlrZTpzZWNyZXQ="),
            Some("mike".to_string())
        );
        // wrong password: "mike:wrong"
        assert_eq!(gate.check_credentials("Basic bWlrZTp3cm9uZw=="), None);
        assert_eq!(gate.check_credentials("Bearer token"), None);
        assert_eq!(gate.check_credentials("Basic !!!not-base64!!!"), None);
    }

    #[test]
    fn basic_options() {
        let gate = BasicAuthGate::new();
        gate.set_option("realm", "Private").unwrap();
        assert_eq!(*gate.realm.lock().unwrap(), "Private");

        let err = gate.set_option("login", "/x").unwrap_err();
        assert!(matches!(err, Error::BadOption(name) if name == "login"));
    }

    #[test]
    fn cookie_options_closed_set() {
        let gate = CookieAuthGate::new();
        gate.set_option("login", "/signin").unwrap();
        gate.set_option("logout", "/signout").unwrap();
        gate.set_option("redirect", "/home").unwrap();

        let err = gate.set_option("realm", "x").unwrap_err();
        assert!(matches!(err, Error::BadOption(name) if name == "realm"));
    }

    #[test]
    fn session_expiry() {
        let gate = CookieAuthGate::new();
        gate.sessions.lock().unwrap().insert(
            "tok".to_string(),
            Session {
                username: "mike".to_string(),
                last_seen: Instant::now() - SESSION_EXPIRATION,
            },
        );

        let mut request = Message::request();
        request.cookies_mut().add(SESSION_COOKIE, "tok");
        assert_eq!(gate.authenticated_user(&request), None);
        assert!(gate.sessions.lock().unwrap().is_empty());
    }

    #[test]
    fn session_refresh() {
        let gate = CookieAuthGate::new();
        gate.sessions.lock().unwrap().insert(
            "tok".to_string(),
            Session {
                username: "mike".to_string(),
                last_seen: Instant::now(),
            },
        );

        let mut request = Message::request();
        request.cookies_mut().add(SESSION_COOKIE, "tok");
        assert_eq!(gate.authenticated_user(&request), Some("mike".to_string()));
    }

    #[test]
    fn tokens_are_distinct() {
        let a = CookieAuthGate::random_token();
        let b = CookieAuthGate::random_token();
        assert_eq!(a.len(), SESSION_TOKEN_BYTES * 2);
        assert_ne!(a, b);
    }
}
