/// Check whether `hostname` is covered by one of `common_names`.
///
/// A name matches when it equals the hostname (ASCII case-insensitive) or
/// when it equals the hostname with its first label replaced by `*`.
pub fn is_valid_hostname(hostname: &str, common_names: &[String]) -> bool {
    let wildcard = match hostname.split_once('.') {
        Some((_, rest)) => format!("*.{}", rest),
        None => "*".to_string(),
    };

    common_names
        .iter()
        .any(|cn| cn.eq_ignore_ascii_case(hostname) || cn.eq_ignore_ascii_case(&wildcard))
}
