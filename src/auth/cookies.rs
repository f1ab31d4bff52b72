//! The refresh-token cookie of the browser flow.

use actix_web::cookie::{time::Duration, Cookie, SameSite};
use actix_web::HttpRequest;

use super::token::REFRESH_TOKEN_TTL_DAYS;

pub const REFRESH_TOKEN_COOKIE: &str = "refreshToken";

/// HttpOnly, SameSite=Strict, 7-day cookie. `secure` follows production mode.
pub fn refresh_cookie(token: &str, secure: bool) -> Cookie<'static> {
    Cookie::build(REFRESH_TOKEN_COOKIE, token.to_string())
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Strict)
        .path("/")
        .max_age(Duration::days(REFRESH_TOKEN_TTL_DAYS))
        .finish()
}

/// A cookie that instructs the browser to drop the refresh token.
pub fn removal_cookie(secure: bool) -> Cookie<'static> {
    let mut cookie = Cookie::build(REFRESH_TOKEN_COOKIE, "")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Strict)
        .path("/")
        .finish();
    cookie.make_removal();
    cookie
}

pub fn refresh_token_from(req: &HttpRequest) -> Option<String> {
    req.cookie(REFRESH_TOKEN_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn test_refresh_cookie_attributes() {
        let cookie = refresh_cookie("abc", true);

        assert_eq!(cookie.name(), "refreshToken");
        assert_eq!(cookie.value(), "abc");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Strict));
        assert_eq!(cookie.max_age(), Some(Duration::days(7)));

        assert_eq!(refresh_cookie("abc", false).secure(), Some(false));
    }

    #[test]
    fn test_removal_cookie_expires_immediately() {
        let cookie = removal_cookie(false);

        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age(), Some(Duration::ZERO));
    }

    #[test]
    fn test_refresh_token_from_request() {
        let req = TestRequest::default()
            .cookie(Cookie::new(REFRESH_TOKEN_COOKIE, "token-value"))
            .to_http_request();
        assert_eq!(refresh_token_from(&req).as_deref(), Some("token-value"));

        let empty = TestRequest::default()
            .cookie(Cookie::new(REFRESH_TOKEN_COOKIE, ""))
            .to_http_request();
        assert!(refresh_token_from(&empty).is_none());

        assert!(refresh_token_from(&TestRequest::default().to_http_request()).is_none());
    }
}
