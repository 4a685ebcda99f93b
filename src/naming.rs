//! Metric name construction.
//!
//! A completed root transaction is reported under a dotted hierarchical
//! name encoding application, host, call path, and status:
//!
//! ```text
//! carpy.<app>.<host>.<root>[.children.<node>]*.<status>
//! ```
//!
//! Every segment is sanitized by replacing `.` with `_` so user-supplied
//! names and dotted host names cannot split the hierarchy. The `children`
//! separator appears at every ancestor boundary. Status is `ok` or `err`,
//! evaluated at the moment the name is built.

/// Leading segment of every metric name.
pub const METRIC_ROOT: &str = "carpy";

/// Separator segment inserted at each ancestor boundary.
const SEGMENT_CHILDREN: &str = "children";

/// Status segment for a transaction without errors.
const STATUS_OK: &str = "ok";

/// Status segment for a transaction marked as failed.
const STATUS_ERR: &str = "err";

/// Sanitizes one name segment by replacing every `.` with `_`.
///
/// Empty input stays empty; absence of a name is legal and renders as an
/// empty segment.
#[must_use]
pub fn sanitize_segment(name: &str) -> String {
    name.replace('.', "_")
}

/// Builds the dotted metric name for a transaction's call path.
///
/// `names` is the chain of transaction names from the leaf up to the root.
/// Deterministic and side-effect free; status reflects `is_error` at the
/// moment of the call.
#[must_use]
pub fn metric_name(
    names_leaf_to_root: &[&str],
    app_name: &str,
    host: &str,
    is_error: bool,
) -> String {
    // Built in reverse so ancestor segments append instead of insert.
    let mut parts: Vec<String> = Vec::with_capacity(names_leaf_to_root.len() * 2 + 4);

    let mut chain = names_leaf_to_root.iter();
    if let Some(leaf) = chain.next() {
        parts.push(sanitize_segment(leaf));
    }
    for ancestor in chain {
        parts.push(SEGMENT_CHILDREN.to_string());
        parts.push(sanitize_segment(ancestor));
    }

    parts.push(sanitize_segment(host));
    parts.push(sanitize_segment(app_name));
    parts.push(METRIC_ROOT.to_string());

    parts.reverse();
    parts.push(if is_error { STATUS_ERR } else { STATUS_OK }.to_string());

    parts.join(".")
}

/// Resolves the local host name for metric names.
///
/// Priority: `HOSTNAME` env var, then `COMPUTERNAME` (Windows), then
/// `"localhost"`.
#[must_use]
pub fn local_host_name() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "localhost".to_string())
}
