//! Unique service name normalization.

/// Extract the normalized device ID from a unique service name.
///
/// The USN is split on `::` and the first segment kept; a leading `uuid:` is
/// then stripped. Inputs without either part are returned unchanged.
///
/// # Examples
///
/// ```
/// use upnp_discovery::normalize_usn;
///
/// assert_eq!(normalize_usn("uuid:ABCD::urn:schemas-upnp-org:device:X:1"), "ABCD");
/// assert_eq!(normalize_usn("uuid:ABCD"), "ABCD");
/// assert_eq!(normalize_usn("ABCD"), "ABCD");
/// ```
pub fn normalize_usn(usn: &str) -> &str {
    let head = usn.split("::").next().unwrap_or(usn);
    head.strip_prefix("uuid:").unwrap_or(head)
}
