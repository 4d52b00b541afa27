//! Same-origin checks and proxy URL construction.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use url::Url;

use crate::error::FetchError;

/// Everything but `A-Z a-z 0-9 - _ . ! ~ * ' ( )` is escaped, so a space is
/// `%20` rather than the form encoding `+`.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
  .remove(b'-')
  .remove(b'_')
  .remove(b'.')
  .remove(b'!')
  .remove(b'~')
  .remove(b'*')
  .remove(b'\'')
  .remove(b'(')
  .remove(b')');

/// True when `target` shares scheme and host with `origin`.
///
/// Ports are ignored, matching the browser's `protocol//hostname` prefix test.
pub fn is_same_origin(target: &Url, origin: &Url) -> bool {
  target.scheme() == origin.scheme() && target.host_str() == origin.host_str()
}

/// `<proxy>?url=<percent-encoded iri>`, keeping any query the proxy base has.
pub fn proxy_url(proxy: &Url, iri: &str) -> String {
  let param = format!("url={}", utf8_percent_encode(iri, COMPONENT));
  let query = match proxy.query() {
    Some(existing) if !existing.is_empty() => format!("{}&{}", existing, param),
    _ => param,
  };
  let mut url = proxy.clone();
  url.set_query(Some(&query));
  url.to_string()
}

/// Parse an IRI, resolving relative references against `origin`.
pub fn absolutize(iri: &str, origin: &Url) -> Result<Url, FetchError> {
  match Url::parse(iri) {
    Ok(url) => Ok(url),
    Err(url::ParseError::RelativeUrlWithoutBase) => Ok(origin.join(iri)?),
    Err(e) => Err(FetchError::RequestSetup(format!("invalid IRI '{}': {}", iri, e))),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn origin() -> Url {
    Url::parse("https://social.example").unwrap()
  }

  #[test]
  fn test_same_origin_ignores_path_and_port() {
    let o = origin();
    assert!(is_same_origin(&Url::parse("https://social.example/users/a").unwrap(), &o));
    assert!(is_same_origin(&Url::parse("https://social.example:8443/x").unwrap(), &o));
    assert!(!is_same_origin(&Url::parse("http://social.example/x").unwrap(), &o));
    assert!(!is_same_origin(&Url::parse("https://remote.example/x").unwrap(), &o));
  }

  #[test]
  fn test_proxy_url_encodes_iri() {
    let proxy = Url::parse("https://social.example/proxy").unwrap();
    assert_eq!(
      proxy_url(&proxy, "https://remote.example/users/bob?page=2&x=y"),
      "https://social.example/proxy?url=https%3A%2F%2Fremote.example%2Fusers%2Fbob%3Fpage%3D2%26x%3Dy"
    );
  }

  #[test]
  fn test_proxy_url_spaces_and_existing_query() {
    let proxy = Url::parse("https://social.example/proxy?v=1").unwrap();
    assert_eq!(
      proxy_url(&proxy, "https://remote.example/search?q=a b+c"),
      "https://social.example/proxy?v=1&url=https%3A%2F%2Fremote.example%2Fsearch%3Fq%3Da%20b%2Bc"
    );
  }

  #[test]
  fn test_relative_iris_resolve_against_origin() {
    let url = absolutize("/users/alice/outbox", &origin()).unwrap();
    assert_eq!(url.as_str(), "https://social.example/users/alice/outbox");
    assert!(is_same_origin(&url, &origin()));
  }
}
