use hyper::header::AUTHORIZATION;
use hyper::HeaderMap;

/// The single username/password pair guarding the control surface
#[derive(Clone)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Credentials with a freshly generated random password
    pub fn generate(username: impl Into<String>) -> Self {
        Self::new(username, uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// Check an `Authorization` header value.
    ///
    /// Accepts `Basic <base64(user:pass)>` and `Bearer <password>`.
    pub fn verify(&self, header: &str) -> bool {
        let Some((scheme, value)) = header.trim().split_once(' ') else {
            return false;
        };
        let value = value.trim();

        if scheme.eq_ignore_ascii_case("basic") {
            let Ok(decoded) =
                base64::Engine::decode(&base64::engine::general_purpose::STANDARD, value)
            else {
                return false;
            };
            let Ok(decoded) = String::from_utf8(decoded) else {
                return false;
            };
            let (username, password) = decoded.split_once(':').unwrap_or((&decoded, ""));
            username == self.username && password == self.password
        } else if scheme.eq_ignore_ascii_case("bearer") {
            value == self.password
        } else {
            false
        }
    }

    /// Check the `Authorization` header of a request
    pub fn check(&self, headers: &HeaderMap) -> bool {
        headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(|auth| self.verify(auth))
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}
