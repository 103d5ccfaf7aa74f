//! Translation of stored search descriptors into REST query parameters.
//!
//! A descriptor is normally a full search URL copied from the tracker UI
//! (`https://bugzilla.example.org/buglist.cgi?product=Core&bug_status=NEW`).
//! A bare query string (`product=Core&bug_status=NEW`) is accepted too.

use url::Url;

use crate::traits::RemoteError;

/// Parameters the client controls itself; user-supplied values are dropped.
const RESERVED_PARAMS: &[&str] = &["include_fields", "api_key", "Bugzilla_api_key"];

/// Extract the search parameters from a descriptor, preserving repeated keys
/// (e.g. several `bug_status` values) and their order.
pub fn search_params(descriptor: &str) -> Result<Vec<(String, String)>, RemoteError> {
    let descriptor = descriptor.trim();
    let raw_query = match Url::parse(descriptor) {
        Ok(url) => url.query().unwrap_or("").to_string(),
        Err(_) => descriptor.trim_start_matches('?').to_string(),
    };

    let params: Vec<(String, String)> = url::form_urlencoded::parse(raw_query.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .filter(|(k, _)| !k.is_empty() && !RESERVED_PARAMS.contains(&k.as_str()))
        .collect();

    if params.is_empty() {
        return Err(RemoteError::InvalidQuery(
            "no valid search parameters found in the query URL".into(),
        ));
    }
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_url_keeps_repeated_keys() {
        let params = search_params(
            "https://bugzilla.mozilla.org/buglist.cgi?product=Core&bug_status=NEW&bug_status=ASSIGNED",
        )
        .unwrap();
        assert_eq!(
            params,
            vec![
                ("product".to_string(), "Core".to_string()),
                ("bug_status".to_string(), "NEW".to_string()),
                ("bug_status".to_string(), "ASSIGNED".to_string()),
            ]
        );
    }

    #[test]
    fn bare_query_string_is_accepted() {
        let params = search_params("?component=DOM%3A%20Events&keywords=crash").unwrap();
        assert_eq!(params[0], ("component".to_string(), "DOM: Events".to_string()));
        assert_eq!(params[1], ("keywords".to_string(), "crash".to_string()));
    }

    #[test]
    fn reserved_params_are_stripped() {
        let params =
            search_params("https://b.example/rest/bug?product=X&include_fields=summary&api_key=leak")
                .unwrap();
        assert_eq!(params, vec![("product".to_string(), "X".to_string())]);
    }

    #[test]
    fn blank_values_are_kept() {
        let params = search_params("https://b.example/buglist.cgi?resolution=---&short_desc=").unwrap();
        assert_eq!(params.len(), 2);
        assert_eq!(params[1], ("short_desc".to_string(), String::new()));
    }

    #[test]
    fn url_without_query_is_invalid() {
        let err = search_params("https://bugzilla.mozilla.org/buglist.cgi").unwrap_err();
        assert!(matches!(err, RemoteError::InvalidQuery(_)));
    }
}
