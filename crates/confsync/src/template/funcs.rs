//! Functions available inside templates.
//!
//! Store accessors are closures bound to the resource's [`KvStore`]; the
//! rest are plain helpers with no access to render state.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::net::ToSocketAddrs;
use std::path::Path;

use base64::Engine as _;
use minijinja::value::{Rest, Value, ValueKind};
use minijinja::{Environment, Error, ErrorKind, UndefinedBehavior};
use regex::Regex;

use crate::error::StoreError;
use crate::store::{keypath, KvStore};

/// Builds the template environment for one resource. Every store function
/// reads through `store`, so refilling the store is visible to later renders.
pub fn build_environment(store: &KvStore) -> Environment<'static> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.set_keep_trailing_newline(true);

    register_store_functions(&mut env, store);

    env.add_function("base", base);
    env.add_function("dir", dir);
    env.add_function("split", split);
    env.add_function("join", join);
    env.add_function("toUpper", to_upper);
    env.add_function("toLower", to_lower);
    env.add_function("contains", contains);
    env.add_function("replace", replace);
    env.add_function("trimSuffix", trim_suffix);
    env.add_function("json", json);
    env.add_function("jsonArray", json_array);
    env.add_function("getenv", getenv);
    env.add_function("datetime", datetime);
    env.add_function("base64Encode", base64_encode);
    env.add_function("base64Decode", base64_decode);
    env.add_function("seq", seq);
    env.add_function("atoi", atoi);
    env.add_function("map", make_map);
    env.add_function("reverse", reverse);
    env.add_function("sortByLength", sort_by_length);
    env.add_function("sortKVByLength", sort_kv_by_length);
    env.add_function("fileExists", file_exists);
    env.add_function("lookupIP", lookup_all_ip);
    env.add_function("lookupV4IP", lookup_v4_ip);
    env.add_function("toJson", to_json);
    env.add_function("toYaml", to_yaml);
    env.add_function("add", |a: i64, b: i64| checked(a.checked_add(b), "add"));
    env.add_function("sub", |a: i64, b: i64| checked(a.checked_sub(b), "sub"));
    env.add_function("mul", |a: i64, b: i64| checked(a.checked_mul(b), "mul"));
    env.add_function("div", |a: i64, b: i64| checked(a.checked_div(b), "div"));
    env.add_function("mod", |a: i64, b: i64| checked(a.checked_rem(b), "mod"));
    env.add_function("max", |a: i64, b: i64| a.max(b));
    env.add_function("min", |a: i64, b: i64| a.min(b));
    env.add_function("filter", filter);

    env
}

fn register_store_functions(env: &mut Environment<'static>, store: &KvStore) {
    let s = store.clone();
    env.add_function("exists", move |key: String| s.exists(&key));

    let s = store.clone();
    env.add_function("ls", move |dir: String| s.list(&dir));

    let s = store.clone();
    env.add_function("lsdir", move |dir: String| s.list_dir(&dir));

    let s = store.clone();
    env.add_function("get", move |key: String| -> Result<Value, Error> {
        let pair = s.get(&key).map_err(store_error)?;
        Ok(Value::from_serialize(&pair))
    });

    let s = store.clone();
    env.add_function("gets", move |pattern: String| -> Result<Value, Error> {
        let pairs = s.get_all(&pattern).map_err(store_error)?;
        Ok(Value::from_serialize(&pairs))
    });

    let s = store.clone();
    env.add_function(
        "getv",
        move |key: String, default: Option<String>| -> Result<String, Error> {
            s.get_value(&key, default.as_deref()).map_err(store_error)
        },
    );

    let s = store.clone();
    env.add_function("getvs", move |pattern: String| -> Result<Vec<String>, Error> {
        s.get_all_values(&pattern).map_err(store_error)
    });
}

fn store_error(err: StoreError) -> Error {
    Error::new(ErrorKind::InvalidOperation, err.to_string())
}

fn invalid(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::InvalidOperation, message.into())
}

fn checked(result: Option<i64>, op: &str) -> Result<i64, Error> {
    result.ok_or_else(|| invalid(format!("{}: overflow or division by zero", op)))
}

fn base(path: &str) -> String {
    keypath::base(path)
}

fn dir(path: &str) -> String {
    keypath::dir(path)
}

fn split(s: &str, sep: &str) -> Vec<String> {
    s.split(sep).map(str::to_string).collect()
}

fn join(items: Vec<String>, sep: &str) -> String {
    items.join(sep)
}

fn to_upper(s: &str) -> String {
    s.to_uppercase()
}

fn to_lower(s: &str) -> String {
    s.to_lowercase()
}

fn contains(s: &str, substr: &str) -> bool {
    s.contains(substr)
}

/// Replaces the first `n` occurrences, or all of them when `n` is absent or
/// negative.
fn replace(s: &str, old: &str, new: &str, n: Option<i64>) -> String {
    match n {
        Some(n) if n >= 0 => s.replacen(old, new, n as usize),
        _ => s.replace(old, new),
    }
}

fn trim_suffix(s: &str, suffix: &str) -> String {
    s.strip_suffix(suffix).unwrap_or(s).to_string()
}

fn parse_json(data: &str) -> Result<serde_json::Value, Error> {
    serde_json::from_str(data)
        .map_err(|e| invalid(format!("invalid JSON: {}", e)).with_source(e))
}

fn json(data: &str) -> Result<Value, Error> {
    match parse_json(data)? {
        value @ serde_json::Value::Object(_) => Ok(Value::from_serialize(&value)),
        _ => Err(invalid("json: expected a JSON object")),
    }
}

fn json_array(data: &str) -> Result<Value, Error> {
    match parse_json(data)? {
        value @ serde_json::Value::Array(_) => Ok(Value::from_serialize(&value)),
        _ => Err(invalid("jsonArray: expected a JSON array")),
    }
}

fn getenv(key: &str, default: Option<String>) -> String {
    match std::env::var(key) {
        Ok(value) if !value.is_empty() => value,
        _ => default.unwrap_or_default(),
    }
}

/// Current local time, RFC 3339 unless a strftime format is given.
fn datetime(format: Option<String>) -> Result<String, Error> {
    let now = chrono::Local::now();
    match format {
        None => Ok(now.to_rfc3339()),
        Some(format) => {
            let mut out = String::new();
            write!(out, "{}", now.format(&format))
                .map_err(|_| invalid(format!("datetime: invalid format '{}'", format)))?;
            Ok(out)
        }
    }
}

fn base64_encode(data: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}

fn base64_decode(data: &str) -> Result<String, Error> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| invalid(format!("base64Decode: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| invalid(format!("base64Decode: {}", e)))
}

/// Inclusive integer range.
fn seq(first: i64, last: i64) -> Vec<i64> {
    (first..=last).collect()
}

fn atoi(s: &str) -> Result<i64, Error> {
    s.trim()
        .parse()
        .map_err(|e| invalid(format!("atoi: cannot parse '{}': {}", s, e)))
}

/// `map("a", 1, "b", 2)` builds `{"a": 1, "b": 2}`.
fn make_map(args: Rest<Value>) -> Result<Value, Error> {
    if args.len() % 2 != 0 {
        return Err(invalid("map: expected an even number of arguments"));
    }

    let mut map = BTreeMap::new();
    for pair in args.chunks(2) {
        let key = pair[0]
            .as_str()
            .ok_or_else(|| invalid(format!("map: key {} is not a string", pair[0])))?;
        map.insert(key.to_string(), pair[1].clone());
    }
    Ok(Value::from(map))
}

fn items(value: &Value, func: &str) -> Result<Vec<Value>, Error> {
    if value.kind() != ValueKind::Seq {
        return Err(invalid(format!("{}: expected a list, got {}", func, value.kind())));
    }
    Ok(value.try_iter()?.collect())
}

fn reverse(value: Value) -> Result<Value, Error> {
    let mut list = items(&value, "reverse")?;
    list.reverse();
    Ok(Value::from(list))
}

fn sort_by_length(mut values: Vec<String>) -> Vec<String> {
    values.sort_by_key(|v| v.len());
    values
}

fn sort_kv_by_length(value: Value) -> Result<Value, Error> {
    let mut keyed = Vec::new();
    for item in items(&value, "sortKVByLength")? {
        let key = item.get_attr("key")?;
        let len = key
            .as_str()
            .ok_or_else(|| invalid("sortKVByLength: item has no string key"))?
            .len();
        keyed.push((len, item));
    }
    keyed.sort_by_key(|(len, _)| *len);
    Ok(Value::from(
        keyed.into_iter().map(|(_, item)| item).collect::<Vec<_>>(),
    ))
}

fn file_exists(path: &str) -> bool {
    Path::new(path).exists()
}

/// Resolves `host` through the system resolver and returns its addresses as
/// sorted strings. A failed lookup yields an empty list.
fn lookup_ip(host: &str, v4_only: bool) -> Vec<String> {
    let addrs = match (host, 0u16).to_socket_addrs() {
        Ok(addrs) => addrs,
        Err(e) => {
            log::debug!("Lookup of {} failed: {}", host, e);
            return Vec::new();
        }
    };

    let mut ips: Vec<String> = addrs
        .map(|addr| addr.ip())
        .filter(|ip| !v4_only || ip.is_ipv4())
        .map(|ip| ip.to_string())
        .collect();
    ips.sort();
    ips.dedup();
    ips
}

fn lookup_all_ip(host: &str) -> Vec<String> {
    lookup_ip(host, false)
}

fn lookup_v4_ip(host: &str) -> Vec<String> {
    lookup_ip(host, true)
}

fn to_json(value: Value) -> Result<String, Error> {
    serde_json::to_string(&value).map_err(|e| invalid(format!("toJson: {}", e)))
}

fn to_yaml(value: Value) -> Result<String, Error> {
    serde_yaml::to_string(&value).map_err(|e| invalid(format!("toYaml: {}", e)))
}

/// Keeps list items matching `pattern`. Key/value pairs match on their value.
fn filter(pattern: &str, value: Value) -> Result<Value, Error> {
    let re = Regex::new(pattern)
        .map_err(|e| invalid(format!("filter: invalid regex '{}': {}", pattern, e)))?;

    let mut kept = Vec::new();
    for item in items(&value, "filter")? {
        let text = match item.as_str() {
            Some(s) => s.to_string(),
            None => item.get_attr("value")?.to_string(),
        };
        if re.is_match(&text) {
            kept.push(item);
        }
    }
    Ok(Value::from(kept))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn render(store: &KvStore, source: &str) -> Result<String, Error> {
        build_environment(store).render_str(source, ())
    }

    fn store_with(pairs: &[(&str, &str)]) -> KvStore {
        let store = KvStore::new();
        for (k, v) in pairs {
            store.set(*k, *v);
        }
        store
    }

    #[test]
    fn test_round_trip() {
        let store = store_with(&[("/test/key", "abc")]);
        let out = render(
            &store,
            "{% with kv = get(\"/test/key\") %}key: {{ base(kv.key) }}\nval: {{ kv.value }}{% endwith %}",
        )
        .unwrap();
        assert_eq!(out, "key: key\nval: abc");
    }

    #[test]
    fn test_store_functions() {
        let store = store_with(&[
            ("/app/upstream/b", "10.0.0.2"),
            ("/app/upstream/a", "10.0.0.1"),
            ("/app/name", "demo"),
        ]);

        assert_eq!(render(&store, "{{ exists(\"/app/name\") }}").unwrap(), "true");
        assert_eq!(render(&store, "{{ getv(\"/app/port\", \"80\") }}").unwrap(), "80");
        assert_eq!(
            render(&store, "{% for kv in gets(\"/app/upstream/*\") %}{{ kv.value }} {% endfor %}")
                .unwrap(),
            "10.0.0.1 10.0.0.2 "
        );
        assert_eq!(
            render(&store, "{{ join(getvs(\"/app/upstream/*\"), \",\") }}").unwrap(),
            "10.0.0.1,10.0.0.2"
        );
        assert_eq!(render(&store, "{{ join(ls(\"/app\"), \",\") }}").unwrap(), "name,upstream");
        assert_eq!(render(&store, "{{ join(lsdir(\"/app\"), \",\") }}").unwrap(), "upstream");
    }

    #[test]
    fn test_missing_key_is_render_error() {
        let store = KvStore::new();
        let err = render(&store, "{{ getv(\"/missing\") }}").unwrap_err();
        assert!(err.to_string().contains("/missing"));
    }

    #[test]
    fn test_undefined_variable_is_error() {
        assert!(render(&KvStore::new(), "{{ nope }}").is_err());
    }

    #[test]
    fn test_trailing_newline_kept() {
        assert_eq!(render(&KvStore::new(), "a\n").unwrap(), "a\n");
    }

    #[test]
    fn test_string_helpers() {
        let store = KvStore::new();
        assert_eq!(render(&store, "{{ toUpper(\"ab\") }}{{ toLower(\"CD\") }}").unwrap(), "ABcd");
        assert_eq!(render(&store, "{{ replace(\"a-a-a\", \"-\", \"+\") }}").unwrap(), "a+a+a");
        assert_eq!(render(&store, "{{ replace(\"a-a-a\", \"-\", \"+\", 1) }}").unwrap(), "a+a-a");
        assert_eq!(render(&store, "{{ trimSuffix(\"app.conf\", \".conf\") }}").unwrap(), "app");
        assert_eq!(render(&store, "{{ split(\"a:b\", \":\")[1] }}").unwrap(), "b");
        assert_eq!(render(&store, "{{ dir(\"/a/b/c\") }}").unwrap(), "/a/b");
        assert_eq!(render(&store, "{{ contains(\"haystack\", \"st\") }}").unwrap(), "true");
    }

    #[test]
    fn test_json_helpers() {
        let store = store_with(&[("/svc", r#"{"host": "db", "port": 5432}"#)]);
        assert_eq!(
            render(&store, "{% set svc = json(getv(\"/svc\")) %}{{ svc.host }}:{{ svc.port }}").unwrap(),
            "db:5432"
        );
        assert_eq!(render(&store, "{{ jsonArray(\"[1, 2, 3]\")[2] }}").unwrap(), "3");
        assert!(render(&store, "{{ jsonArray(\"{}\") }}").is_err());
        assert_eq!(render(&store, "{{ toJson(map(\"a\", 1)) }}").unwrap(), r#"{"a":1}"#);
    }

    #[test]
    fn test_numeric_helpers() {
        let store = KvStore::new();
        assert_eq!(render(&store, "{{ seq(1, 3) | join(\",\") }}").unwrap(), "1,2,3");
        assert_eq!(render(&store, "{{ atoi(\" 42 \") + 1 }}").unwrap(), "43");
        assert!(render(&store, "{{ atoi(\"x\") }}").is_err());
        assert_eq!(render(&store, "{{ add(2, 3) }} {{ mod(7, 4) }} {{ max(1, 9) }}").unwrap(), "5 3 9");
        assert!(render(&store, "{{ div(1, 0) }}").is_err());
    }

    #[test]
    fn test_base64() {
        let store = KvStore::new();
        assert_eq!(render(&store, "{{ base64Encode(\"hello\") }}").unwrap(), "aGVsbG8=");
        assert_eq!(render(&store, "{{ base64Decode(\"aGVsbG8=\") }}").unwrap(), "hello");
        assert!(render(&store, "{{ base64Decode(\"***\") }}").is_err());
    }

    #[test]
    fn test_list_helpers() {
        let store = store_with(&[("/k/long", "x"), ("/k/a", "keep-1"), ("/k/mid", "drop")]);
        assert_eq!(
            render(&store, "{{ reverse(ls(\"/k\")) | join(\",\") }}").unwrap(),
            "mid,long,a"
        );
        assert_eq!(
            render(&store, "{{ sortByLength([\"ccc\", \"a\", \"bb\"]) | join(\",\") }}").unwrap(),
            "a,bb,ccc"
        );
        assert_eq!(
            render(
                &store,
                "{% for kv in sortKVByLength(gets(\"/k/*\")) %}{{ kv.key }} {% endfor %}"
            )
            .unwrap(),
            "/k/a /k/mid /k/long "
        );
        assert_eq!(
            render(&store, "{% for kv in filter(\"^keep\", gets(\"/k/*\")) %}{{ kv.key }}{% endfor %}")
                .unwrap(),
            "/k/a"
        );
    }

    #[test]
    fn test_datetime() {
        let store = KvStore::new();
        let year = render(&store, "{{ datetime(\"%Y\") }}").unwrap();
        assert_eq!(year.len(), 4);
        assert!(render(&store, "{{ datetime() }}").unwrap().contains('T'));
    }

    #[test]
    #[serial]
    fn test_getenv() {
        std::env::set_var("CONFSYNC_FUNCS_TEST", "on");
        let store = KvStore::new();
        assert_eq!(render(&store, "{{ getenv(\"CONFSYNC_FUNCS_TEST\") }}").unwrap(), "on");
        assert_eq!(
            render(&store, "{{ getenv(\"CONFSYNC_FUNCS_UNSET\", \"off\") }}").unwrap(),
            "off"
        );
        std::env::remove_var("CONFSYNC_FUNCS_TEST");
    }

    #[test]
    fn test_file_exists() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("present");
        std::fs::write(&path, "").unwrap();
        let source = format!("{{{{ fileExists(\"{}\") }}}}", path.display());
        assert_eq!(render(&KvStore::new(), &source).unwrap(), "true");
    }

    #[test]
    fn test_lookup_ip_literals() {
        let store = KvStore::new();
        assert_eq!(
            render(&store, "{{ lookupIP(\"127.0.0.1\") | join(\",\") }}").unwrap(),
            "127.0.0.1"
        );
        assert_eq!(
            render(&store, "{{ lookupV4IP(\"::1\") | length }}").unwrap(),
            "0"
        );
        assert_eq!(lookup_ip("::1", false), vec!["::1".to_string()]);
    }
}
