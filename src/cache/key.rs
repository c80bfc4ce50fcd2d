use std::collections::BTreeMap;

/// Build a cache key from a namespace and query parameters.
///
/// Parameters are sorted by name, so `[("b", 2), ("a", 1)]` and `[("a", 1), ("b", 2)]` map to
/// the same key: `"{namespace}:a=1&b=2"`. With no parameters the key is the bare namespace.
pub fn generate_key<I, K, V>(namespace: &str, params: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: ToString,
{
    let sorted: BTreeMap<String, String> = params
        .into_iter()
        .map(|(k, v)| (k.into(), v.to_string()))
        .collect();

    if sorted.is_empty() {
        return namespace.to_string();
    }

    let joined = sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    format!("{namespace}:{joined}")
}
